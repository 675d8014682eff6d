// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Provide DESFire key families, block ciphers and secure messaging.
// Author: Lukas Bower
#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Cryptographic building blocks for DESFire-class cards: key material and
//! key families, zero-IV CBC ciphers, CRC checksums, the checksum-and-pad
//! secure messaging layer, and both halves of the mutual authentication
//! handshake.

mod checksum;
mod cipher;
mod family;
mod handshake;
mod key;
mod messaging;

pub use checksum::Checksum;
pub use cipher::{CbcCipher, CipherKind};
pub use family::{rotate_left, rotate_right, KeyFamily};
pub use handshake::{AuthMode, CardChallenge, CardProof, ReaderHandshake};
pub use key::{DesfireKey, KeyType};
pub use messaging::{SecureMessaging, MAC_LEN};

/// Errors raised by key handling, ciphers and secure messaging.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    /// Key material does not have the length the cipher requires.
    #[error("invalid key length: expected {expected} actual {actual}")]
    InvalidKeyLength {
        /// Length required by the cipher or key type.
        expected: usize,
        /// Length supplied by the caller.
        actual: usize,
    },
    /// Buffer is not a whole number of cipher blocks.
    #[error("buffer of {len} bytes is not aligned to {block}-byte blocks")]
    NotBlockAligned {
        /// Buffer length.
        len: usize,
        /// Cipher block length.
        block: usize,
    },
    /// Random challenge has the wrong size for the key family.
    #[error("challenge length mismatch: expected {expected} actual {actual}")]
    ChallengeLength {
        /// Challenge size of the key family.
        expected: usize,
        /// Size supplied by the caller.
        actual: usize,
    },
    /// Key type nibble outside the supported set.
    #[error("unsupported key type {0:#04x}")]
    UnsupportedKeyType(u8),
    /// Authentication mode does not match the key type.
    #[error("authentication mode {mode:?} cannot use {key_type:?} keys")]
    ModeMismatch {
        /// Requested authentication mode.
        mode: AuthMode,
        /// Type of the addressed key.
        key_type: KeyType,
    },
    /// Challenge response from the peer did not verify.
    #[error("authentication proof mismatch")]
    AuthenticationMismatch,
    /// Checksum or padding mismatch after deciphering.
    #[error("integrity check failed")]
    Integrity,
}
