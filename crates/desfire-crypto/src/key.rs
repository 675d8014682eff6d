// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Stored key material with its type and version.
// Author: Lukas Bower

//! Key slots as stored by directories.

use serde::{Deserialize, Serialize};

use crate::cipher::CbcCipher;
use crate::family::KeyFamily;
use crate::CryptoError;

/// Key type announced in the second key-settings byte of an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyType {
    /// DES or two-key triple DES, 16 bytes stored.
    TripleDes,
    /// Three-key triple DES, 24 bytes stored.
    ThreeKeyTripleDes,
    /// AES-128, 16 bytes stored.
    Aes,
}

impl KeyType {
    /// Decode the key type bits (7..6) of the second key-settings byte.
    pub fn from_settings(byte: u8) -> Result<Self, CryptoError> {
        match byte & 0xC0 {
            0x00 => Ok(Self::TripleDes),
            0x40 => Ok(Self::ThreeKeyTripleDes),
            0x80 => Ok(Self::Aes),
            other => Err(CryptoError::UnsupportedKeyType(other)),
        }
    }

    /// Key type bits for the second key-settings byte.
    #[must_use]
    pub fn settings_bits(self) -> u8 {
        match self {
            Self::TripleDes => 0x00,
            Self::ThreeKeyTripleDes => 0x40,
            Self::Aes => 0x80,
        }
    }

    /// Stored key length.
    #[must_use]
    pub fn key_len(self) -> usize {
        match self {
            Self::TripleDes | Self::Aes => 16,
            Self::ThreeKeyTripleDes => 24,
        }
    }
}

/// Key material held in a directory key slot.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesfireKey {
    key_type: KeyType,
    #[serde(with = "hex::serde")]
    material: Vec<u8>,
    version: u8,
}

impl core::fmt::Debug for DesfireKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DesfireKey")
            .field("key_type", &self.key_type)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

impl DesfireKey {
    /// Build a key, expanding an 8-byte DES key to its 16-byte form.
    pub fn new(key_type: KeyType, material: &[u8], version: u8) -> Result<Self, CryptoError> {
        let material = match (key_type, material.len()) {
            (KeyType::TripleDes, 8) => [material, material].concat(),
            (_, len) if len == key_type.key_len() => material.to_vec(),
            (_, len) => {
                return Err(CryptoError::InvalidKeyLength {
                    expected: key_type.key_len(),
                    actual: len,
                })
            }
        };
        Ok(Self {
            key_type,
            material,
            version,
        })
    }

    /// Derive a key of `key_type` from the leading bytes of a default key.
    pub fn from_default(key_type: KeyType, default_key: &[u8]) -> Result<Self, CryptoError> {
        let len = key_type.key_len();
        let material = default_key
            .get(..len)
            .ok_or(CryptoError::InvalidKeyLength {
                expected: len,
                actual: default_key.len(),
            })?;
        Self::new(key_type, material, 0)
    }

    /// All-zero key of the given type.
    #[must_use]
    pub fn zero(key_type: KeyType) -> Self {
        Self {
            key_type,
            material: vec![0u8; key_type.key_len()],
            version: 0,
        }
    }

    /// Key type of the slot.
    #[must_use]
    pub fn key_type(&self) -> KeyType {
        self.key_type
    }

    /// Raw key material.
    #[must_use]
    pub fn material(&self) -> &[u8] {
        &self.material
    }

    /// Key version byte.
    #[must_use]
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Family used when authenticating with this key.
    ///
    /// A 16-byte DES-type key whose halves are equal behaves as single DES.
    #[must_use]
    pub fn family(&self) -> KeyFamily {
        match self.key_type {
            KeyType::TripleDes if self.material[..8] == self.material[8..] => KeyFamily::Des,
            KeyType::TripleDes => KeyFamily::Tdes,
            KeyType::ThreeKeyTripleDes => KeyFamily::Tk3des,
            KeyType::Aes => KeyFamily::Aes,
        }
    }

    /// Cipher keyed with this key's material.
    pub fn cipher(&self) -> Result<CbcCipher, CryptoError> {
        let family = self.family();
        family.cipher(&self.material[..family.key_len()])
    }
}
