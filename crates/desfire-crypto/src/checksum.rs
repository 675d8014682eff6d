// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: CRC-16 and CRC-32 integrity checksums used inside enciphered payloads.
// Author: Lukas Bower

//! Checksums appended to plaintext before enciphering.

use serde::{Deserialize, Serialize};

/// Checksum algorithm tied to the authentication generation of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Checksum {
    /// ISO 14443-A CRC (init 0x6363, reflected polynomial 0x8408).
    Crc16,
    /// DESFire CRC-32: IEEE polynomial without the final inversion.
    Crc32,
}

impl Checksum {
    /// Encoded checksum length in bytes.
    #[must_use]
    pub fn len(self) -> usize {
        match self {
            Self::Crc16 => 2,
            Self::Crc32 => 4,
        }
    }

    /// Compute the checksum of `data`, little-endian encoded.
    #[must_use]
    pub fn compute(self, data: &[u8]) -> Vec<u8> {
        match self {
            Self::Crc16 => crc16_iso14443a(data).to_le_bytes().to_vec(),
            Self::Crc32 => (!crc32fast::hash(data)).to_le_bytes().to_vec(),
        }
    }

    /// Split a trailing checksum off `data` and return the payload when it verifies.
    #[must_use]
    pub fn split_verified(self, data: &[u8]) -> Option<&[u8]> {
        let split = data.len().checked_sub(self.len())?;
        let (payload, received) = data.split_at(split);
        (self.compute(payload) == received).then_some(payload)
    }
}

/// ISO/IEC 14443-3 CRC_A.
fn crc16_iso14443a(data: &[u8]) -> u16 {
    let mut crc: u16 = 0x6363;

    for &byte in data {
        crc ^= u16::from(byte);
        for _ in 0..8 {
            if crc & 0x0001 != 0 {
                crc = (crc >> 1) ^ 0x8408;
            } else {
                crc >>= 1;
            }
        }
    }

    crc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc16_matches_iso14443_annex_vectors() {
        assert_eq!(Checksum::Crc16.compute(&[0x00, 0x00]), vec![0xA0, 0x1E]);
        assert_eq!(Checksum::Crc16.compute(&[0x12, 0x34]), vec![0x26, 0xCF]);
    }

    #[test]
    fn crc32_is_uninverted_ieee() {
        assert_eq!(
            Checksum::Crc32.compute(b"123456789"),
            0x340B_C6D9u32.to_le_bytes().to_vec()
        );
        assert_eq!(Checksum::Crc32.compute(&[]), vec![0xFF; 4]);
    }

    #[test]
    fn split_verified_rejects_tampering() {
        let mut framed = b"payload".to_vec();
        framed.extend(Checksum::Crc32.compute(b"payload"));
        assert_eq!(
            Checksum::Crc32.split_verified(&framed),
            Some(&b"payload"[..])
        );
        framed[0] ^= 1;
        assert_eq!(Checksum::Crc32.split_verified(&framed), None);
        assert_eq!(Checksum::Crc16.split_verified(&[0x01]), None);
    }
}
