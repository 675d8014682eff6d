// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Crate root of the DESFire card emulator core.
// Author: Lukas Bower

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! DESFire-compatible card emulator.
//!
//! The card is a root directory of applications, each holding keys and up
//! to 32 files. A [`Processor`] turns raw command frames into raw response
//! frames, tracking selection, authentication and multi-frame exchanges in
//! its [`Session`]. Frame codecs live in `desfire-codec`, ciphers and the
//! authentication handshake in `desfire-crypto`.

/// Bounded 32-bit counter values.
pub mod value;

/// Per-file access conditions.
pub mod permission;

/// The five file kinds and their staged state.
pub mod file;

/// Application directories.
pub mod directory;

/// Root directory and card configuration state.
pub mod card;

/// Per-connection session state.
pub mod session;

/// Instruction failures and status words.
pub mod error;

/// Instruction dispatch.
pub mod processor;

/// AID-based applet selection.
pub mod registry;

/// JSON export and restore of card state.
pub mod snapshot;

/// TOML card configuration.
pub mod config;

pub use card::{Card, CardError};
pub use config::{CardConfig, ConfigError};
pub use directory::{Application, KeySettings};
pub use error::CommandError;
pub use file::{CommMode, File, FileContent, FileKind, FileSettings};
pub use permission::{AccessCondition, AccessRights};
pub use processor::Processor;
pub use registry::{Applet, AppletRegistry, GlobalRegistry, RegistryError, CARD_APPLET_AID};
pub use session::{Continuation, Selection, Session};
pub use snapshot::{Snapshot, SnapshotError};
pub use value::{Value, ValueError};
