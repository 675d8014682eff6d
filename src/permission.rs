// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Decode file access right words into per-operation key conditions.
// Author: Lukas Bower

//! File access rights.
//!
//! The two wire bytes carry four nibbles: byte 1 holds read (high) and
//! write (low), byte 0 holds read-write (high) and change (low). Nibble
//! `0xE` grants free access, `0xF` denies access, anything else names the
//! key that must be authenticated.

use serde::{Deserialize, Serialize};

const FREE_NIBBLE: u8 = 0x0E;
const NEVER_NIBBLE: u8 = 0x0F;

/// Condition guarding a single operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessCondition {
    /// Authentication with this key number is required.
    Key(u8),
    /// No authentication needed.
    Free,
    /// Operation is never allowed.
    Never,
}

impl AccessCondition {
    /// Decode the low four bits of `nibble`.
    #[must_use]
    pub fn from_nibble(nibble: u8) -> Self {
        match nibble & 0x0F {
            FREE_NIBBLE => Self::Free,
            NEVER_NIBBLE => Self::Never,
            key => Self::Key(key),
        }
    }

    /// Encode as a four-bit nibble.
    #[must_use]
    pub fn nibble(self) -> u8 {
        match self {
            Self::Key(key) => key & 0x0F,
            Self::Free => FREE_NIBBLE,
            Self::Never => NEVER_NIBBLE,
        }
    }

    /// Whether a session authenticated with `authenticated` satisfies the condition.
    #[must_use]
    pub fn allows(self, authenticated: Option<u8>) -> bool {
        match self {
            Self::Free => true,
            Self::Never => false,
            Self::Key(key) => authenticated == Some(key),
        }
    }

    /// True for [`AccessCondition::Free`].
    #[must_use]
    pub fn is_free(self) -> bool {
        self == Self::Free
    }
}

/// Access rights of one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccessRights {
    /// Read-only access.
    pub read: AccessCondition,
    /// Write-only access.
    pub write: AccessCondition,
    /// Combined read and write access.
    pub read_write: AccessCondition,
    /// Changing the file settings.
    pub change: AccessCondition,
}

impl AccessRights {
    /// Every operation free.
    #[must_use]
    pub fn free() -> Self {
        Self::from_wire([0xEE, 0xEE])
    }

    /// Decode the two access right bytes as received on the wire.
    #[must_use]
    pub fn from_wire(bytes: [u8; 2]) -> Self {
        Self {
            read: AccessCondition::from_nibble(bytes[1] >> 4),
            write: AccessCondition::from_nibble(bytes[1]),
            read_write: AccessCondition::from_nibble(bytes[0] >> 4),
            change: AccessCondition::from_nibble(bytes[0]),
        }
    }

    /// Wire encoding.
    #[must_use]
    pub fn to_wire(self) -> [u8; 2] {
        [
            (self.read_write.nibble() << 4) | self.change.nibble(),
            (self.read.nibble() << 4) | self.write.nibble(),
        ]
    }

    /// Read allowed through the read or read-write condition.
    #[must_use]
    pub fn can_read(&self, authenticated: Option<u8>) -> bool {
        self.read.allows(authenticated) || self.read_write.allows(authenticated)
    }

    /// Write allowed through the write or read-write condition.
    #[must_use]
    pub fn can_write(&self, authenticated: Option<u8>) -> bool {
        self.write.allows(authenticated) || self.read_write.allows(authenticated)
    }

    /// Settings change allowed.
    #[must_use]
    pub fn can_change(&self, authenticated: Option<u8>) -> bool {
        self.change.allows(authenticated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_nibbles_from_both_bytes() {
        let rights = AccessRights::from_wire([0x12, 0x34]);
        assert_eq!(rights.read, AccessCondition::Key(3));
        assert_eq!(rights.write, AccessCondition::Key(4));
        assert_eq!(rights.read_write, AccessCondition::Key(1));
        assert_eq!(rights.change, AccessCondition::Key(2));
        assert_eq!(rights.to_wire(), [0x12, 0x34]);
    }

    #[test]
    fn free_and_never_conditions() {
        let rights = AccessRights::from_wire([0xFF, 0xE0]);
        assert!(rights.can_read(None));
        assert!(!rights.can_write(None));
        assert!(rights.can_write(Some(0)));
        assert!(!rights.can_change(Some(0)));
        assert!(AccessRights::free().can_change(None));
    }

    #[test]
    fn read_write_condition_grants_both() {
        let rights = AccessRights::from_wire([0x2F, 0xFF]);
        assert!(rights.can_read(Some(2)));
        assert!(rights.can_write(Some(2)));
        assert!(!rights.can_read(Some(1)));
    }
}
