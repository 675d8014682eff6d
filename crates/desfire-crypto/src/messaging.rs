// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Checksum, pad and encipher message bodies under a session key.
// Author: Lukas Bower

//! Secure messaging for fully enciphered payloads.
//!
//! Outbound: `plaintext || checksum`, padded PKCS-style up to the block
//! size (nothing is added when already aligned), then CBC enciphered.
//! Inbound: CBC deciphered, then verified once with the padding stripped
//! and once more over the whole buffer, since some readers omit padding.

use crate::checksum::Checksum;
use crate::cipher::CbcCipher;
use crate::CryptoError;

/// Length of the truncated MAC appended to MACed payloads.
pub const MAC_LEN: usize = 4;

/// Session-bound secure messaging context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecureMessaging {
    cipher: CbcCipher,
    checksum: Checksum,
}

impl SecureMessaging {
    /// Bind a session cipher to the checksum of its authentication generation.
    #[must_use]
    pub fn new(cipher: CbcCipher, checksum: Checksum) -> Self {
        Self { cipher, checksum }
    }

    /// Session cipher.
    #[must_use]
    pub fn cipher(&self) -> &CbcCipher {
        &self.cipher
    }

    /// Checksum algorithm.
    #[must_use]
    pub fn checksum(&self) -> Checksum {
        self.checksum
    }

    /// Append the checksum, pad and encipher.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut buf = plaintext.to_vec();
        buf.extend(self.checksum.compute(plaintext));
        self.seal(buf)
    }

    /// Pad and encipher a buffer that already carries its checksums.
    pub fn seal(&self, mut buf: Vec<u8>) -> Result<Vec<u8>, CryptoError> {
        pad(&mut buf, self.cipher.block_len());
        self.cipher.encrypt(&mut buf)?;
        Ok(buf)
    }

    /// Four-byte CBC-MAC over zero-padded `data`.
    pub fn mac(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let block = self.cipher.block_len();
        let mut buf = data.to_vec();
        let padded = buf.len().div_ceil(block).max(1) * block;
        buf.resize(padded, 0);
        self.cipher.encrypt(&mut buf)?;
        Ok(buf[padded - block..padded - block + MAC_LEN].to_vec())
    }

    /// Split a trailing MAC off `framed` and return the data when it verifies.
    pub fn verify_mac<'a>(&self, framed: &'a [u8]) -> Result<&'a [u8], CryptoError> {
        let split = framed
            .len()
            .checked_sub(MAC_LEN)
            .ok_or(CryptoError::Integrity)?;
        let (data, received) = framed.split_at(split);
        if self.mac(data)? == received {
            Ok(data)
        } else {
            Err(CryptoError::Integrity)
        }
    }

    /// Decipher and verify, returning the plaintext without checksum.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let checksum = self.checksum;
        self.open(ciphertext, |candidate| {
            checksum.split_verified(candidate).map(<[u8]>::to_vec)
        })
    }

    /// Decipher and hand the padded-stripped buffer, then the whole buffer,
    /// to `verify`; the first accepted interpretation wins.
    pub fn open<T>(
        &self,
        ciphertext: &[u8],
        verify: impl Fn(&[u8]) -> Option<T>,
    ) -> Result<T, CryptoError> {
        let block = self.cipher.block_len();
        if ciphertext.is_empty() || ciphertext.len() % block != 0 {
            return Err(CryptoError::Integrity);
        }
        let mut buf = ciphertext.to_vec();
        self.cipher.decrypt(&mut buf)?;
        if let Some(accepted) = strip_padding(&buf, block).and_then(&verify) {
            return Ok(accepted);
        }
        verify(&buf).ok_or(CryptoError::Integrity)
    }
}

fn pad(buf: &mut Vec<u8>, block: usize) {
    let pad_len = (block - buf.len() % block) % block;
    buf.resize(buf.len() + pad_len, pad_len as u8);
}

fn strip_padding(buf: &[u8], block: usize) -> Option<&[u8]> {
    let pad_len = usize::from(*buf.last()?);
    if pad_len == 0 || pad_len >= block || pad_len > buf.len() {
        return None;
    }
    let (payload, padding) = buf.split_at(buf.len() - pad_len);
    padding
        .iter()
        .all(|&byte| usize::from(byte) == pad_len)
        .then_some(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::CipherKind;

    fn session(kind: CipherKind, checksum: Checksum) -> SecureMessaging {
        let key = vec![0x5A; kind.key_len()];
        SecureMessaging::new(CbcCipher::new(kind, &key).expect("key"), checksum)
    }

    #[test]
    fn encrypt_then_decrypt_returns_plaintext() {
        let sm = session(CipherKind::TdesEde2, Checksum::Crc16);
        for len in [0usize, 1, 5, 6, 14, 30] {
            let plain: Vec<u8> = (0..len as u8).collect();
            let sealed = sm.encrypt(&plain).expect("encrypt");
            assert_eq!(sealed.len() % 8, 0);
            assert_eq!(sm.decrypt(&sealed).expect("decrypt"), plain, "len {len}");
        }
    }

    #[test]
    fn aligned_payload_is_not_padded() {
        let sm = session(CipherKind::Aes128, Checksum::Crc32);
        let sealed = sm.encrypt(&[0x01; 12]).expect("encrypt");
        assert_eq!(sealed.len(), 16);
        assert_eq!(sm.decrypt(&sealed).expect("decrypt"), vec![0x01; 12]);
    }

    #[test]
    fn block_aligned_payload_decrypts_without_padding() {
        let sm = session(CipherKind::Des, Checksum::Crc16);
        // Six bytes plus the CRC fill one block exactly.
        let plain = [0x10, 0x20, 0x30, 0x40, 0x50, 0x01];
        let sealed = sm.encrypt(&plain).expect("encrypt");
        assert_eq!(sealed.len(), 8);
        assert_eq!(sm.decrypt(&sealed).expect("decrypt"), plain.to_vec());
    }

    #[test]
    fn mac_verifies_and_detects_tampering() {
        let sm = session(CipherKind::Des, Checksum::Crc16);
        let mut framed = b"counter".to_vec();
        framed.extend(sm.mac(b"counter").expect("mac"));
        assert_eq!(framed.len(), 7 + MAC_LEN);
        assert_eq!(sm.verify_mac(&framed).expect("verify"), b"counter");
        framed[1] ^= 0x04;
        assert_eq!(sm.verify_mac(&framed), Err(CryptoError::Integrity));
        assert_eq!(sm.verify_mac(&[0u8; 3]), Err(CryptoError::Integrity));
    }

    #[test]
    fn tampered_ciphertext_fails_integrity() {
        let sm = session(CipherKind::TdesEde3, Checksum::Crc32);
        let mut sealed = sm.encrypt(b"balance").expect("encrypt");
        sealed[0] ^= 0x80;
        assert_eq!(sm.decrypt(&sealed), Err(CryptoError::Integrity));
        assert_eq!(sm.decrypt(&[0u8; 5]), Err(CryptoError::Integrity));
    }
}
