// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Key family parameters and session key derivation.
// Author: Lukas Bower

//! Key families fix the cipher, the random challenge size and the rule for
//! interleaving two challenges into a session key.

use serde::{Deserialize, Serialize};

use crate::cipher::{CbcCipher, CipherKind};
use crate::CryptoError;

/// Cipher family selected by the key used to authenticate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyFamily {
    /// Single DES (or two-key triple DES with identical halves).
    Des,
    /// Two-key triple DES.
    Tdes,
    /// Three-key triple DES.
    Tk3des,
    /// AES-128.
    Aes,
}

impl KeyFamily {
    /// Serialized key length.
    #[must_use]
    pub fn key_len(self) -> usize {
        self.cipher_kind().key_len()
    }

    /// Size of the random challenges exchanged during authentication.
    #[must_use]
    pub fn challenge_len(self) -> usize {
        match self {
            Self::Des | Self::Tdes => 8,
            Self::Tk3des | Self::Aes => 16,
        }
    }

    /// Cipher block length.
    #[must_use]
    pub fn block_len(self) -> usize {
        self.cipher_kind().block_len()
    }

    /// Block cipher backing the family.
    #[must_use]
    pub fn cipher_kind(self) -> CipherKind {
        match self {
            Self::Des => CipherKind::Des,
            Self::Tdes => CipherKind::TdesEde2,
            Self::Tk3des => CipherKind::TdesEde3,
            Self::Aes => CipherKind::Aes128,
        }
    }

    /// Bind key material of this family to its cipher.
    pub fn cipher(self, key: &[u8]) -> Result<CbcCipher, CryptoError> {
        CbcCipher::new(self.cipher_kind(), key)
    }

    /// Interleave the reader challenge `a` and card challenge `b` into a session key.
    pub fn derive_session_key(self, a: &[u8], b: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let expected = self.challenge_len();
        for challenge in [a, b] {
            if challenge.len() != expected {
                return Err(CryptoError::ChallengeLength {
                    expected,
                    actual: challenge.len(),
                });
            }
        }
        let slices: &[(usize, usize)] = match self {
            Self::Des => &[(0, 0)],
            Self::Tdes => &[(0, 0), (4, 4)],
            Self::Tk3des => &[(0, 0), (6, 6), (12, 12)],
            Self::Aes => &[(0, 0), (12, 12)],
        };
        let mut key = Vec::with_capacity(self.key_len());
        for &(from_a, from_b) in slices {
            key.extend_from_slice(&a[from_a..from_a + 4]);
            key.extend_from_slice(&b[from_b..from_b + 4]);
        }
        Ok(key)
    }
}

/// Rotate a challenge one byte to the left.
#[must_use]
pub fn rotate_left(data: &[u8]) -> Vec<u8> {
    let mut out = data.to_vec();
    if !out.is_empty() {
        out.rotate_left(1);
    }
    out
}

/// Rotate a challenge one byte to the right.
#[must_use]
pub fn rotate_right(data: &[u8]) -> Vec<u8> {
    let mut out = data.to_vec();
    if !out.is_empty() {
        out.rotate_right(1);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_key_triple_des_vector() {
        let a = [0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07];
        let b = [0xD1, 0xA5, 0x6D, 0x00, 0x6D, 0xB7, 0xDF, 0x5E];
        let key = KeyFamily::Tdes.derive_session_key(&a, &b).expect("derive");
        assert_eq!(
            key,
            vec![
                0x00, 0x01, 0x02, 0x03, 0xD1, 0xA5, 0x6D, 0x00, 0x04, 0x05, 0x06, 0x07, 0x6D, 0xB7,
                0xDF, 0x5E
            ]
        );
    }

    #[test]
    fn single_des_vector() {
        let a = [0x41, 0x12, 0x01, 0x1A, 0x11, 0x12, 0x0C, 0x22];
        let b = [0xB6, 0x0E, 0x3A, 0x8D, 0xB9, 0x63, 0x43, 0xDA];
        let key = KeyFamily::Des.derive_session_key(&a, &b).expect("derive");
        assert_eq!(key, vec![0x41, 0x12, 0x01, 0x1A, 0xB6, 0x0E, 0x3A, 0x8D]);
    }

    #[test]
    fn three_key_and_aes_interleave_offsets() {
        let a: Vec<u8> = (0x00..0x10).collect();
        let b: Vec<u8> = (0x10..0x20).collect();
        let tk3 = KeyFamily::Tk3des.derive_session_key(&a, &b).expect("3k3des");
        assert_eq!(
            tk3,
            [
                &a[0..4], &b[0..4], &a[6..10], &b[6..10], &a[12..16], &b[12..16]
            ]
            .concat()
        );
        let aes = KeyFamily::Aes.derive_session_key(&a, &b).expect("aes");
        assert_eq!(aes, [&a[0..4], &b[0..4], &a[12..16], &b[12..16]].concat());
        assert_eq!(aes.len(), KeyFamily::Aes.key_len());
    }

    #[test]
    fn rejects_wrong_challenge_size() {
        let err = KeyFamily::Aes
            .derive_session_key(&[0; 8], &[0; 16])
            .expect_err("short challenge");
        assert_eq!(
            err,
            CryptoError::ChallengeLength {
                expected: 16,
                actual: 8
            }
        );
    }

    #[test]
    fn rotation_round_trips() {
        let data = [1u8, 2, 3, 4];
        assert_eq!(rotate_left(&data), vec![2, 3, 4, 1]);
        assert_eq!(rotate_right(&rotate_left(&data)), data.to_vec());
    }
}
