// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Zero-IV CBC block ciphers over DES, triple-DES and AES.
// Author: Lukas Bower

//! Block cipher selection and zero-IV CBC primitives.
//!
//! Besides plain CBC in both directions the legacy DESFire protocol needs
//! the "send mode" pair: the reader deciphers outbound blocks chained with
//! the previous ciphertext, and the card undoes that by enciphering.

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{
    BlockCipher, BlockDecrypt, BlockDecryptMut, BlockEncrypt, BlockEncryptMut, BlockSizeUser,
    KeyInit, KeyIvInit,
};
use aes::Aes128;
use des::{Des, TdesEde2, TdesEde3};
use serde::{Deserialize, Serialize};

use crate::CryptoError;

/// Block cipher algorithm backing a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CipherKind {
    /// Single DES, 8-byte key.
    Des,
    /// Two-key triple DES (EDE), 16-byte key.
    TdesEde2,
    /// Three-key triple DES (EDE), 24-byte key.
    TdesEde3,
    /// AES-128.
    Aes128,
}

impl CipherKind {
    /// Key length in bytes.
    #[must_use]
    pub fn key_len(self) -> usize {
        match self {
            Self::Des => 8,
            Self::TdesEde2 | Self::Aes128 => 16,
            Self::TdesEde3 => 24,
        }
    }

    /// Cipher block length in bytes.
    #[must_use]
    pub fn block_len(self) -> usize {
        match self {
            Self::Aes128 => 16,
            _ => 8,
        }
    }
}

/// Keyed block cipher operating in CBC mode with an all-zero IV.
#[derive(Clone, PartialEq, Eq)]
pub struct CbcCipher {
    kind: CipherKind,
    key: Vec<u8>,
}

impl core::fmt::Debug for CbcCipher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CbcCipher")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl CbcCipher {
    /// Bind key material to a cipher.
    pub fn new(kind: CipherKind, key: &[u8]) -> Result<Self, CryptoError> {
        if key.len() != kind.key_len() {
            return Err(CryptoError::InvalidKeyLength {
                expected: kind.key_len(),
                actual: key.len(),
            });
        }
        Ok(Self {
            kind,
            key: key.to_vec(),
        })
    }

    /// Cipher algorithm.
    #[must_use]
    pub fn kind(&self) -> CipherKind {
        self.kind
    }

    /// Cipher block length in bytes.
    #[must_use]
    pub fn block_len(&self) -> usize {
        self.kind.block_len()
    }

    /// Encrypt `buf` in place.
    pub fn encrypt(&self, buf: &mut [u8]) -> Result<(), CryptoError> {
        self.check_aligned(buf)?;
        match self.kind {
            CipherKind::Des => cbc_encrypt::<Des>(&self.key, buf),
            CipherKind::TdesEde2 => cbc_encrypt::<TdesEde2>(&self.key, buf),
            CipherKind::TdesEde3 => cbc_encrypt::<TdesEde3>(&self.key, buf),
            CipherKind::Aes128 => cbc_encrypt::<Aes128>(&self.key, buf),
        }
    }

    /// Decrypt `buf` in place.
    pub fn decrypt(&self, buf: &mut [u8]) -> Result<(), CryptoError> {
        self.check_aligned(buf)?;
        match self.kind {
            CipherKind::Des => cbc_decrypt::<Des>(&self.key, buf),
            CipherKind::TdesEde2 => cbc_decrypt::<TdesEde2>(&self.key, buf),
            CipherKind::TdesEde3 => cbc_decrypt::<TdesEde3>(&self.key, buf),
            CipherKind::Aes128 => cbc_decrypt::<Aes128>(&self.key, buf),
        }
    }

    /// Recover blocks produced by [`CbcCipher::send_legacy`], in place.
    ///
    /// Each plaintext block is `E(y[i]) ^ y[i-1]`, i.e. CBC decryption with
    /// the encipher direction.
    pub fn receive_legacy(&self, buf: &mut [u8]) -> Result<(), CryptoError> {
        self.check_aligned(buf)?;
        match self.kind {
            CipherKind::Des => legacy_receive::<Des>(&self.key, buf),
            CipherKind::TdesEde2 => legacy_receive::<TdesEde2>(&self.key, buf),
            CipherKind::TdesEde3 => legacy_receive::<TdesEde3>(&self.key, buf),
            CipherKind::Aes128 => legacy_receive::<Aes128>(&self.key, buf),
        }
    }

    /// Reader-side legacy send mode, in place: `y[i] = D(x[i] ^ y[i-1])`.
    pub fn send_legacy(&self, buf: &mut [u8]) -> Result<(), CryptoError> {
        self.check_aligned(buf)?;
        match self.kind {
            CipherKind::Des => legacy_send::<Des>(&self.key, buf),
            CipherKind::TdesEde2 => legacy_send::<TdesEde2>(&self.key, buf),
            CipherKind::TdesEde3 => legacy_send::<TdesEde3>(&self.key, buf),
            CipherKind::Aes128 => legacy_send::<Aes128>(&self.key, buf),
        }
    }

    fn check_aligned(&self, buf: &[u8]) -> Result<(), CryptoError> {
        let block = self.block_len();
        if buf.len() % block != 0 {
            return Err(CryptoError::NotBlockAligned {
                len: buf.len(),
                block,
            });
        }
        Ok(())
    }
}

fn invalid_key<C: KeyInit>(key: &[u8]) -> CryptoError {
    CryptoError::InvalidKeyLength {
        expected: C::key_size(),
        actual: key.len(),
    }
}

fn cbc_encrypt<C>(key: &[u8], buf: &mut [u8]) -> Result<(), CryptoError>
where
    C: BlockEncryptMut + BlockCipher + KeyInit,
{
    let iv = vec![0u8; C::block_size()];
    let mut mode =
        cbc::Encryptor::<C>::new_from_slices(key, &iv).map_err(|_| invalid_key::<C>(key))?;
    for block in buf.chunks_exact_mut(C::block_size()) {
        mode.encrypt_block_mut(GenericArray::from_mut_slice(block));
    }
    Ok(())
}

fn cbc_decrypt<C>(key: &[u8], buf: &mut [u8]) -> Result<(), CryptoError>
where
    C: BlockDecryptMut + BlockCipher + KeyInit,
{
    let iv = vec![0u8; C::block_size()];
    let mut mode =
        cbc::Decryptor::<C>::new_from_slices(key, &iv).map_err(|_| invalid_key::<C>(key))?;
    for block in buf.chunks_exact_mut(C::block_size()) {
        mode.decrypt_block_mut(GenericArray::from_mut_slice(block));
    }
    Ok(())
}

fn legacy_receive<C>(key: &[u8], buf: &mut [u8]) -> Result<(), CryptoError>
where
    C: BlockEncrypt + BlockSizeUser + KeyInit,
{
    let cipher = C::new_from_slice(key).map_err(|_| invalid_key::<C>(key))?;
    let mut previous = vec![0u8; C::block_size()];
    for block in buf.chunks_exact_mut(C::block_size()) {
        let received = block.to_vec();
        cipher.encrypt_block(GenericArray::from_mut_slice(block));
        block
            .iter_mut()
            .zip(&previous)
            .for_each(|(byte, chain)| *byte ^= chain);
        previous = received;
    }
    Ok(())
}

fn legacy_send<C>(key: &[u8], buf: &mut [u8]) -> Result<(), CryptoError>
where
    C: BlockDecrypt + BlockSizeUser + KeyInit,
{
    let cipher = C::new_from_slice(key).map_err(|_| invalid_key::<C>(key))?;
    let mut previous = vec![0u8; C::block_size()];
    for block in buf.chunks_exact_mut(C::block_size()) {
        block
            .iter_mut()
            .zip(&previous)
            .for_each(|(byte, chain)| *byte ^= chain);
        cipher.decrypt_block(GenericArray::from_mut_slice(block));
        previous.copy_from_slice(block);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aes_zero_key_matches_known_answer() {
        // AES-128 with an all-zero key and block.
        let cipher = CbcCipher::new(CipherKind::Aes128, &[0u8; 16]).expect("aes key");
        let mut block = [0u8; 16];
        cipher.encrypt(&mut block).expect("encrypt");
        assert_eq!(
            block.to_vec(),
            hex::decode("66e94bd4ef8a2c3b884cfa59ca342b2e").expect("hex")
        );
        cipher.decrypt(&mut block).expect("decrypt");
        assert_eq!(block, [0u8; 16]);
    }

    #[test]
    fn legacy_send_and_receive_are_inverse() {
        let cipher = CbcCipher::new(CipherKind::TdesEde2, &[0x11; 16]).expect("tdes key");
        let plain: Vec<u8> = (0u8..24).collect();
        let mut buf = plain.clone();
        cipher.send_legacy(&mut buf).expect("send");
        assert_ne!(buf, plain);
        cipher.receive_legacy(&mut buf).expect("receive");
        assert_eq!(buf, plain);
    }

    #[test]
    fn rejects_wrong_key_and_unaligned_buffers() {
        assert_eq!(
            CbcCipher::new(CipherKind::Des, &[0u8; 7]).expect_err("short key"),
            CryptoError::InvalidKeyLength {
                expected: 8,
                actual: 7
            }
        );
        let cipher = CbcCipher::new(CipherKind::Des, &[0u8; 8]).expect("des key");
        let mut buf = [0u8; 9];
        assert!(matches!(
            cipher.encrypt(&mut buf),
            Err(CryptoError::NotBlockAligned { len: 9, block: 8 })
        ));
    }
}
