// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Define DESFire status words, instruction codes and codec errors.
// Author: Lukas Bower
#![allow(clippy::module_name_repetitions)]

//! Status word and instruction tables shared by the card core and host tools.

use core::fmt;

/// Two-byte trailer carried by every response frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusWord(u16);

impl StatusWord {
    /// Successful operation.
    pub const OPERATION_OK: Self = Self(0x9100);
    /// No changes done to backup files, commit/abort not necessary.
    pub const NO_CHANGES: Self = Self(0x910C);
    /// Insufficient non-volatile memory to complete the command.
    pub const OUT_OF_EEPROM: Self = Self(0x910E);
    /// Instruction code not supported.
    pub const ILLEGAL_COMMAND: Self = Self(0x911C);
    /// Checksum or padding mismatch after deciphering.
    pub const INTEGRITY_ERROR: Self = Self(0x911E);
    /// Invalid key number.
    pub const NO_SUCH_KEY: Self = Self(0x9140);
    /// Length of command string invalid.
    pub const LENGTH_ERROR: Self = Self(0x917E);
    /// Current configuration or authentication state forbids the command.
    pub const PERMISSION_DENIED: Self = Self(0x919D);
    /// Value of a parameter is invalid.
    pub const PARAMETER_ERROR: Self = Self(0x919E);
    /// Requested application identifier not present.
    pub const APPLICATION_NOT_FOUND: Self = Self(0x91A0);
    /// Unrecoverable error within an application.
    pub const APPL_INTEGRITY: Self = Self(0x91A1);
    /// Authentication failed or the key is not authenticated.
    pub const AUTHENTICATION_ERROR: Self = Self(0x91AE);
    /// More frames follow.
    pub const ADDITIONAL_FRAME: Self = Self(0x91AF);
    /// Attempt to read or write beyond the file or record limits.
    pub const BOUNDARY_ERROR: Self = Self(0x91BE);
    /// Unrecoverable error within the PICC.
    pub const PICC_INTEGRITY: Self = Self(0x91C1);
    /// Previous multi-frame command was not fully completed.
    pub const COMMAND_ABORTED: Self = Self(0x91CA);
    /// PICC was disabled by an unrecoverable error.
    pub const PICC_DISABLED: Self = Self(0x91CD);
    /// Number of applications limited to the table size.
    pub const COUNT_ERROR: Self = Self(0x91CE);
    /// Application or file identifier already exists.
    pub const DUPLICATE_ERROR: Self = Self(0x91DE);
    /// Could not complete a non-volatile write.
    pub const EEPROM_ERROR: Self = Self(0x91EE);
    /// Specified file number does not exist.
    pub const FILE_NOT_FOUND: Self = Self(0x91F0);
    /// Unrecoverable error within a file.
    pub const FILE_INTEGRITY: Self = Self(0x91F1);

    /// ISO success trailer used by the select boundary.
    pub const ISO_OK: Self = Self(0x9000);
    /// ISO applet selection failure.
    pub const APPLET_SELECT_FAILED: Self = Self(0x6999);
    /// ISO instruction not supported.
    pub const INS_NOT_SUPPORTED: Self = Self(0x6D00);
    /// ISO class not supported.
    pub const CLA_NOT_SUPPORTED: Self = Self(0x6E00);
    /// Generic internal fault.
    pub const INTERNAL_ERROR: Self = Self(0x6D66);

    /// Construct a status word from its raw value.
    #[must_use]
    pub const fn from_raw(value: u16) -> Self {
        Self(value)
    }

    /// Construct a status word from its two trailer bytes.
    #[must_use]
    pub const fn from_bytes(sw1: u8, sw2: u8) -> Self {
        Self(((sw1 as u16) << 8) | sw2 as u16)
    }

    /// Access the raw status word value.
    #[must_use]
    pub const fn into_raw(self) -> u16 {
        self.0
    }

    /// First trailer byte.
    #[must_use]
    pub const fn sw1(self) -> u8 {
        (self.0 >> 8) as u8
    }

    /// Second trailer byte.
    #[must_use]
    pub const fn sw2(self) -> u8 {
        self.0 as u8
    }

    /// Trailer bytes in transmission order.
    #[must_use]
    pub const fn to_bytes(self) -> [u8; 2] {
        self.0.to_be_bytes()
    }

    /// True for the DESFire and ISO success trailers.
    #[must_use]
    pub fn is_success(self) -> bool {
        self == Self::OPERATION_OK || self == Self::ISO_OK
    }

    /// Symbolic name of a known status word.
    #[must_use]
    pub fn name(self) -> Option<&'static str> {
        let name = match self {
            Self::OPERATION_OK => "OPERATION_OK",
            Self::NO_CHANGES => "NO_CHANGES",
            Self::OUT_OF_EEPROM => "OUT_OF_EEPROM",
            Self::ILLEGAL_COMMAND => "ILLEGAL_COMMAND",
            Self::INTEGRITY_ERROR => "INTEGRITY_ERROR",
            Self::NO_SUCH_KEY => "NO_SUCH_KEY",
            Self::LENGTH_ERROR => "LENGTH_ERROR",
            Self::PERMISSION_DENIED => "PERMISSION_DENIED",
            Self::PARAMETER_ERROR => "PARAMETER_ERROR",
            Self::APPLICATION_NOT_FOUND => "APPLICATION_NOT_FOUND",
            Self::APPL_INTEGRITY => "APPL_INTEGRITY",
            Self::AUTHENTICATION_ERROR => "AUTHENTICATION_ERROR",
            Self::ADDITIONAL_FRAME => "ADDITIONAL_FRAME",
            Self::BOUNDARY_ERROR => "BOUNDARY_ERROR",
            Self::PICC_INTEGRITY => "PICC_INTEGRITY",
            Self::COMMAND_ABORTED => "COMMAND_ABORTED",
            Self::PICC_DISABLED => "PICC_DISABLED",
            Self::COUNT_ERROR => "COUNT_ERROR",
            Self::DUPLICATE_ERROR => "DUPLICATE_ERROR",
            Self::EEPROM_ERROR => "EEPROM_ERROR",
            Self::FILE_NOT_FOUND => "FILE_NOT_FOUND",
            Self::FILE_INTEGRITY => "FILE_INTEGRITY",
            Self::ISO_OK => "ISO_OK",
            Self::APPLET_SELECT_FAILED => "APPLET_SELECT_FAILED",
            Self::INS_NOT_SUPPORTED => "INS_NOT_SUPPORTED",
            Self::CLA_NOT_SUPPORTED => "CLA_NOT_SUPPORTED",
            Self::INTERNAL_ERROR => "INTERNAL_ERROR",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for StatusWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{:04X} ({name})", self.0),
            None => write!(f, "{:04X}", self.0),
        }
    }
}

impl From<u16> for StatusWord {
    fn from(value: u16) -> Self {
        Self::from_raw(value)
    }
}

/// Native DESFire instruction codes.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Instruction {
    /// Legacy (native) authentication.
    Authenticate = 0x0A,
    /// ISO authentication with DES-family keys.
    AuthenticateIso = 0x1A,
    /// AES authentication.
    AuthenticateAes = 0xAA,
    /// Change the key settings of the selected directory.
    ChangeKeySettings = 0x54,
    /// Configure the PICC.
    SetConfiguration = 0x5C,
    /// Replace a key.
    ChangeKey = 0xC4,
    /// Read the version byte of a key.
    GetKeyVersion = 0x64,
    /// Create an application directory.
    CreateApplication = 0xCA,
    /// Delete an application directory.
    DeleteApplication = 0xDA,
    /// List application identifiers.
    GetApplicationIds = 0x6A,
    /// Report free EEPROM.
    FreeMemory = 0x6E,
    /// List ISO DF names.
    GetDfNames = 0x6D,
    /// Read the key settings byte and key count.
    GetKeySettings = 0x45,
    /// Select an application directory.
    SelectApplication = 0x5A,
    /// Delete all applications.
    FormatPicc = 0xFC,
    /// Read the three-part version information.
    GetVersion = 0x60,
    /// Read the real UID.
    GetCardUid = 0x51,
    /// List file identifiers.
    GetFileIds = 0x6F,
    /// Read the settings of a file.
    GetFileSettings = 0xF5,
    /// Change communication settings and access rights of a file.
    ChangeFileSettings = 0x5F,
    /// Create a plain data file.
    CreateStdDataFile = 0xCD,
    /// Create a backed-up data file.
    CreateBackupDataFile = 0xCB,
    /// Create a value file.
    CreateValueFile = 0xCC,
    /// Create a linear record file.
    CreateLinearRecordFile = 0xC1,
    /// Create a cyclic record file.
    CreateCyclicRecordFile = 0xC0,
    /// Delete a file.
    DeleteFile = 0xDF,
    /// List ISO file identifiers.
    GetIsoFileIds = 0x61,
    /// Read from a data file.
    ReadData = 0x8D,
    /// Write to a data file.
    WriteData = 0x3D,
    /// Read a value file.
    GetValue = 0x6C,
    /// Increase a value file.
    Credit = 0x0C,
    /// Decrease a value file.
    Debit = 0xDC,
    /// Increase a value file within the limited-credit budget.
    LimitedCredit = 0x1C,
    /// Append a record.
    WriteRecord = 0x3B,
    /// Read records.
    ReadRecords = 0xBB,
    /// Clear a record file.
    ClearRecordFile = 0xEB,
    /// Commit staged writes.
    CommitTransaction = 0xC7,
    /// Discard staged writes.
    AbortTransaction = 0xA7,
    /// Continue a multi-frame exchange.
    Continue = 0xAF,
}

impl Instruction {
    /// Upper-case mnemonic used in logs and transcripts.
    #[must_use]
    pub fn mnemonic(self) -> &'static str {
        use Instruction::*;
        match self {
            Authenticate => "AUTHENTICATE",
            AuthenticateIso => "AUTHENTICATE_ISO",
            AuthenticateAes => "AUTHENTICATE_AES",
            ChangeKeySettings => "CHANGE_KEY_SETTINGS",
            SetConfiguration => "SET_CONFIGURATION",
            ChangeKey => "CHANGE_KEY",
            GetKeyVersion => "GET_KEY_VERSION",
            CreateApplication => "CREATE_APPLICATION",
            DeleteApplication => "DELETE_APPLICATION",
            GetApplicationIds => "GET_APPLICATION_IDS",
            FreeMemory => "FREE_MEMORY",
            GetDfNames => "GET_DF_NAMES",
            GetKeySettings => "GET_KEY_SETTINGS",
            SelectApplication => "SELECT_APPLICATION",
            FormatPicc => "FORMAT_PICC",
            GetVersion => "GET_VERSION",
            GetCardUid => "GET_CARD_UID",
            GetFileIds => "GET_FILE_IDS",
            GetFileSettings => "GET_FILE_SETTINGS",
            ChangeFileSettings => "CHANGE_FILE_SETTINGS",
            CreateStdDataFile => "CREATE_STD_DATA_FILE",
            CreateBackupDataFile => "CREATE_BACKUP_DATA_FILE",
            CreateValueFile => "CREATE_VALUE_FILE",
            CreateLinearRecordFile => "CREATE_LINEAR_RECORD_FILE",
            CreateCyclicRecordFile => "CREATE_CYCLIC_RECORD_FILE",
            DeleteFile => "DELETE_FILE",
            GetIsoFileIds => "GET_ISO_FILE_IDS",
            ReadData => "READ_DATA",
            WriteData => "WRITE_DATA",
            GetValue => "GET_VALUE",
            Credit => "CREDIT",
            Debit => "DEBIT",
            LimitedCredit => "LIMITED_CREDIT",
            WriteRecord => "WRITE_RECORD",
            ReadRecords => "READ_RECORDS",
            ClearRecordFile => "CLEAR_RECORD_FILE",
            CommitTransaction => "COMMIT_TRANSACTION",
            AbortTransaction => "ABORT_TRANSACTION",
            Continue => "CONTINUE",
        }
    }
}

impl From<Instruction> for u8 {
    fn from(value: Instruction) -> Self {
        value as u8
    }
}

impl TryFrom<u8> for Instruction {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use Instruction::*;
        Ok(match value {
            0x0A => Authenticate,
            0x1A => AuthenticateIso,
            0xAA => AuthenticateAes,
            0x54 => ChangeKeySettings,
            0x5C => SetConfiguration,
            0xC4 => ChangeKey,
            0x64 => GetKeyVersion,
            0xCA => CreateApplication,
            0xDA => DeleteApplication,
            0x6A => GetApplicationIds,
            0x6E => FreeMemory,
            0x6D => GetDfNames,
            0x45 => GetKeySettings,
            0x5A => SelectApplication,
            0xFC => FormatPicc,
            0x60 => GetVersion,
            0x51 => GetCardUid,
            0x6F => GetFileIds,
            0xF5 => GetFileSettings,
            0x5F => ChangeFileSettings,
            0xCD => CreateStdDataFile,
            0xCB => CreateBackupDataFile,
            0xCC => CreateValueFile,
            0xC1 => CreateLinearRecordFile,
            0xC0 => CreateCyclicRecordFile,
            0xDF => DeleteFile,
            0x61 => GetIsoFileIds,
            0x8D => ReadData,
            0x3D => WriteData,
            0x6C => GetValue,
            0x0C => Credit,
            0xDC => Debit,
            0x1C => LimitedCredit,
            0x3B => WriteRecord,
            0xBB => ReadRecords,
            0xEB => ClearRecordFile,
            0xC7 => CommitTransaction,
            0xA7 => AbortTransaction,
            0xAF => Continue,
            other => return Err(CodecError::UnsupportedInstruction(other)),
        })
    }
}

/// Possible errors produced while encoding or decoding APDUs.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CodecError {
    /// Input buffer was shorter than the APDU header.
    #[error("truncated frame: {0} bytes")]
    Truncated(usize),
    /// Encountered an unknown instruction byte.
    #[error("unsupported instruction {0:#04x}")]
    UnsupportedInstruction(u8),
    /// Declared Lc does not match the bytes present in the frame.
    #[error("length mismatch: declared {declared} actual {actual}")]
    LengthMismatch {
        /// Length declared by the frame.
        declared: usize,
        /// Bytes actually available.
        actual: usize,
    },
    /// Payload too large for the selected length encoding.
    #[error("payload of {0} bytes exceeds the extended length limit")]
    PayloadTooLarge(usize),
    /// Inbound continuation carried more bytes than were announced.
    #[error("accumulated {received} bytes but only {expected} were announced")]
    Overrun {
        /// Byte count announced by the first frame.
        expected: usize,
        /// Bytes received so far, including the offending frame.
        received: usize,
    },
}
