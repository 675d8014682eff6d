// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Command failures and their status word mapping.
// Author: Lukas Bower

//! Failure type returned by every instruction handler.
//!
//! Each variant maps to exactly one status word; the processor performs the
//! conversion once when it builds the response frame.

use desfire_codec::{CodecError, StatusWord};
use desfire_crypto::CryptoError;
use thiserror::Error;

use crate::file::FileError;

/// Reasons an instruction fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// Frame length outside the accepted shape.
    #[error("length error")]
    Length,
    /// Parameter value out of domain.
    #[error("parameter error")]
    Parameter,
    /// Access rule or authentication state forbids the command.
    #[error("permission denied")]
    PermissionDenied,
    /// Identifier already in use.
    #[error("duplicate identifier")]
    Duplicate,
    /// File number not present in the selected application.
    #[error("file {0} not found")]
    FileNotFound(u8),
    /// Application identifier not present.
    #[error("application not found")]
    ApplicationNotFound,
    /// File, record or counter limit exceeded.
    #[error("boundary error")]
    Boundary,
    /// Challenge response did not match.
    #[error("authentication error")]
    Authentication,
    /// Checksum or MAC mismatch after deciphering.
    #[error("integrity error")]
    Integrity,
    /// Multi-frame exchange interrupted by another instruction.
    #[error("command aborted")]
    CommandAborted,
    /// Key number outside the directory's key slots.
    #[error("no such key {0}")]
    NoSuchKey(u8),
    /// Application table full.
    #[error("application table full")]
    OutOfSlots,
    /// Not enough free memory for the new file.
    #[error("out of eeprom")]
    OutOfEeprom,
    /// Unknown instruction, or continue with nothing pending.
    #[error("illegal command {0:#04x}")]
    IllegalCommand(u8),
    /// Unexpected fault.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CommandError {
    /// Status word reported for the failure.
    #[must_use]
    pub fn status(&self) -> StatusWord {
        match self {
            Self::Length => StatusWord::LENGTH_ERROR,
            Self::Parameter => StatusWord::PARAMETER_ERROR,
            Self::PermissionDenied => StatusWord::PERMISSION_DENIED,
            Self::Duplicate => StatusWord::DUPLICATE_ERROR,
            Self::FileNotFound(_) => StatusWord::FILE_NOT_FOUND,
            Self::ApplicationNotFound => StatusWord::APPLICATION_NOT_FOUND,
            Self::Boundary => StatusWord::BOUNDARY_ERROR,
            Self::Authentication => StatusWord::AUTHENTICATION_ERROR,
            Self::Integrity => StatusWord::INTEGRITY_ERROR,
            Self::CommandAborted => StatusWord::COMMAND_ABORTED,
            Self::NoSuchKey(_) => StatusWord::NO_SUCH_KEY,
            Self::OutOfSlots => StatusWord::COUNT_ERROR,
            Self::OutOfEeprom => StatusWord::OUT_OF_EEPROM,
            Self::IllegalCommand(_) => StatusWord::ILLEGAL_COMMAND,
            Self::Internal(_) => StatusWord::INTERNAL_ERROR,
        }
    }

    /// Failures that end the authenticated session.
    #[must_use]
    pub fn resets_authentication(&self) -> bool {
        matches!(self, Self::Authentication | Self::Integrity)
    }
}

impl From<FileError> for CommandError {
    fn from(err: FileError) -> Self {
        match err {
            FileError::Boundary | FileError::Value(_) => Self::Boundary,
            FileError::WrongKind(_) | FileError::NegativeAmount | FileError::InvalidGeometry => {
                Self::Parameter
            }
            FileError::ClearPending | FileError::LimitedCreditDisabled => Self::PermissionDenied,
        }
    }
}

impl From<CryptoError> for CommandError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::Integrity | CryptoError::NotBlockAligned { .. } => Self::Integrity,
            CryptoError::AuthenticationMismatch | CryptoError::ModeMismatch { .. } => {
                Self::Authentication
            }
            CryptoError::ChallengeLength { .. } => Self::Length,
            CryptoError::InvalidKeyLength { .. } | CryptoError::UnsupportedKeyType(_) => {
                Self::Parameter
            }
        }
    }
}

impl From<CodecError> for CommandError {
    fn from(_: CodecError) -> Self {
        Self::Length
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::FileKind;

    #[test]
    fn statuses_match_wire_codes() {
        assert_eq!(CommandError::OutOfSlots.status().into_raw(), 0x91CE);
        assert_eq!(CommandError::FileNotFound(3).status().into_raw(), 0x91F0);
        assert_eq!(CommandError::Internal("x".into()).status().into_raw(), 0x6D66);
        assert_eq!(CommandError::IllegalCommand(0x42).status().into_raw(), 0x911C);
    }

    #[test]
    fn lower_errors_convert() {
        assert_eq!(
            CommandError::from(FileError::WrongKind(FileKind::Value)),
            CommandError::Parameter
        );
        assert_eq!(
            CommandError::from(FileError::ClearPending),
            CommandError::PermissionDenied
        );
        assert_eq!(
            CommandError::from(CryptoError::AuthenticationMismatch),
            CommandError::Authentication
        );
        assert!(CommandError::Integrity.resets_authentication());
        assert!(!CommandError::Boundary.resets_authentication());
    }
}
