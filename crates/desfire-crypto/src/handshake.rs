// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Card and reader halves of the three-pass mutual authentication.
// Author: Lukas Bower

//! Three-pass mutual authentication.
//!
//! 1. Card sends `E(RndB)`.
//! 2. Reader answers with `A || rotl(RndB)` enciphered (legacy readers use
//!    send mode, so the card recovers it with the encipher direction).
//! 3. Card proves knowledge of the key with `E(rotl(RndA))`; both sides
//!    derive the session key from `RndA` and `RndB`.

use serde::{Deserialize, Serialize};

use crate::checksum::Checksum;
use crate::cipher::CbcCipher;
use crate::family::{rotate_left, rotate_right, KeyFamily};
use crate::key::{DesfireKey, KeyType};
use crate::messaging::SecureMessaging;
use crate::CryptoError;

/// Authentication command generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuthMode {
    /// Native DESFire authentication (`0x0A`).
    Legacy,
    /// ISO authentication with DES-family keys (`0x1A`).
    Iso,
    /// AES authentication (`0xAA`).
    Aes,
}

impl AuthMode {
    /// Checksum used by sessions established with this mode.
    #[must_use]
    pub fn checksum(self) -> Checksum {
        match self {
            Self::Legacy => Checksum::Crc16,
            Self::Iso | Self::Aes => Checksum::Crc32,
        }
    }

    /// Reject keys whose type the mode cannot drive.
    pub fn check_key(self, key: &DesfireKey) -> Result<(), CryptoError> {
        let accepted = match self {
            Self::Legacy | Self::Iso => key.key_type() != KeyType::Aes,
            Self::Aes => key.key_type() == KeyType::Aes,
        };
        if accepted {
            Ok(())
        } else {
            Err(CryptoError::ModeMismatch {
                mode: self,
                key_type: key.key_type(),
            })
        }
    }
}

/// Card-side state between the first and second authentication frames.
#[derive(Clone, PartialEq, Eq)]
pub struct CardChallenge {
    mode: AuthMode,
    family: KeyFamily,
    cipher: CbcCipher,
    rnd_b: Vec<u8>,
}

impl core::fmt::Debug for CardChallenge {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CardChallenge")
            .field("mode", &self.mode)
            .field("family", &self.family)
            .finish_non_exhaustive()
    }
}

/// Result of a successful second authentication frame on the card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardProof {
    /// `E(rotl(RndA))` under the authenticated key.
    pub response: Vec<u8>,
    /// Secure messaging bound to the freshly derived session key.
    pub session: SecureMessaging,
}

impl CardChallenge {
    /// Encipher the card challenge `rnd_b` under `key`.
    ///
    /// Returns the pending state and the cryptogram for the first response frame.
    pub fn issue(
        key: &DesfireKey,
        mode: AuthMode,
        rnd_b: Vec<u8>,
    ) -> Result<(Self, Vec<u8>), CryptoError> {
        mode.check_key(key)?;
        let family = key.family();
        if rnd_b.len() != family.challenge_len() {
            return Err(CryptoError::ChallengeLength {
                expected: family.challenge_len(),
                actual: rnd_b.len(),
            });
        }
        let cipher = key.cipher()?;
        let mut cryptogram = rnd_b.clone();
        cipher.encrypt(&mut cryptogram)?;
        Ok((
            Self {
                mode,
                family,
                cipher,
                rnd_b,
            },
            cryptogram,
        ))
    }

    /// Authentication mode the challenge was issued for.
    #[must_use]
    pub fn mode(&self) -> AuthMode {
        self.mode
    }

    /// Length the reader token must have.
    #[must_use]
    pub fn token_len(&self) -> usize {
        2 * self.family.challenge_len()
    }

    /// Check the reader token `E(RndA || rotl(RndB))` and build the card proof.
    pub fn verify(&self, token: &[u8]) -> Result<CardProof, CryptoError> {
        if token.len() != self.token_len() {
            return Err(CryptoError::ChallengeLength {
                expected: self.token_len(),
                actual: token.len(),
            });
        }
        let mut plain = token.to_vec();
        match self.mode {
            AuthMode::Legacy => self.cipher.receive_legacy(&mut plain)?,
            AuthMode::Iso | AuthMode::Aes => self.cipher.decrypt(&mut plain)?,
        }
        let (rnd_a, rotated_b) = plain.split_at(self.family.challenge_len());
        if rotate_right(rotated_b) != self.rnd_b {
            return Err(CryptoError::AuthenticationMismatch);
        }
        let session_key = self.family.derive_session_key(rnd_a, &self.rnd_b)?;
        let mut response = rotate_left(rnd_a);
        self.cipher.encrypt(&mut response)?;
        Ok(CardProof {
            response,
            session: SecureMessaging::new(
                self.family.cipher(&session_key)?,
                self.mode.checksum(),
            ),
        })
    }
}

/// Reader-side counterpart used by host tools and tests.
#[derive(Clone, PartialEq, Eq)]
pub struct ReaderHandshake {
    mode: AuthMode,
    family: KeyFamily,
    cipher: CbcCipher,
    rnd_a: Vec<u8>,
    rnd_b: Vec<u8>,
}

impl core::fmt::Debug for ReaderHandshake {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ReaderHandshake")
            .field("mode", &self.mode)
            .field("family", &self.family)
            .finish_non_exhaustive()
    }
}

impl ReaderHandshake {
    /// Prepare to authenticate with `key` using `mode`.
    pub fn new(key: &DesfireKey, mode: AuthMode) -> Result<Self, CryptoError> {
        mode.check_key(key)?;
        Ok(Self {
            mode,
            family: key.family(),
            cipher: key.cipher()?,
            rnd_a: Vec::new(),
            rnd_b: Vec::new(),
        })
    }

    /// Challenge size of the key family.
    #[must_use]
    pub fn challenge_len(&self) -> usize {
        self.family.challenge_len()
    }

    /// Answer the card cryptogram with the reader token for `rnd_a`.
    pub fn respond(&mut self, card_cryptogram: &[u8], rnd_a: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let expected = self.challenge_len();
        for part in [card_cryptogram, rnd_a] {
            if part.len() != expected {
                return Err(CryptoError::ChallengeLength {
                    expected,
                    actual: part.len(),
                });
            }
        }
        let mut rnd_b = card_cryptogram.to_vec();
        self.cipher.decrypt(&mut rnd_b)?;

        let mut token = rnd_a.to_vec();
        token.extend(rotate_left(&rnd_b));
        match self.mode {
            AuthMode::Legacy => self.cipher.send_legacy(&mut token)?,
            AuthMode::Iso | AuthMode::Aes => self.cipher.encrypt(&mut token)?,
        }
        self.rnd_a = rnd_a.to_vec();
        self.rnd_b = rnd_b;
        Ok(token)
    }

    /// Verify the card proof and derive the session.
    pub fn finish(&self, card_proof: &[u8]) -> Result<SecureMessaging, CryptoError> {
        let mut rotated_a = card_proof.to_vec();
        if rotated_a.len() != self.challenge_len() {
            return Err(CryptoError::AuthenticationMismatch);
        }
        self.cipher.decrypt(&mut rotated_a)?;
        if rotated_a != rotate_left(&self.rnd_a) {
            return Err(CryptoError::AuthenticationMismatch);
        }
        let session_key = self.family.derive_session_key(&self.rnd_a, &self.rnd_b)?;
        Ok(SecureMessaging::new(
            self.family.cipher(&session_key)?,
            self.mode.checksum(),
        ))
    }
}
