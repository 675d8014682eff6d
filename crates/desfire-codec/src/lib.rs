// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Provide DESFire APDU types, status words and framing primitives.
// Author: Lukas Bower
#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! ISO 7816-4 command/response APDUs as spoken by DESFire-class cards,
//! the status word and instruction tables, and the helpers that split
//! oversized responses into frames and rebuild oversized commands.

mod apdu;
mod framing;
mod types;

pub use apdu::{CommandApdu, ResponseApdu, DESFIRE_CLA, ISO_CLA, SECURE_MESSAGING_CLA_MASK};
pub use framing::{
    Accumulated, InboundAccumulator, OutboundChunker, FIRST_WRITE_FRAME_DATA, MAX_FRAME_PAYLOAD,
};
pub use types::*;
