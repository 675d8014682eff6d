// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: File variants held by applications and their shared settings.
// Author: Lukas Bower

//! Application files.
//!
//! Five storage kinds share one [`File`] header (id, communication mode,
//! access rights, optional ISO identifier). Kind-specific behaviour is
//! dispatched by matching on [`FileContent`].

mod data;
mod record;
mod value;

use core::ops::Range;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::permission::AccessRights;
use crate::value::ValueError;

pub use data::{BackupFile, DataFile};
pub use record::RecordFile;
pub use value::ValueFile;

/// Highest file number inside an application.
pub const MAX_FILE_ID: u8 = 31;

/// Errors raised by file primitives.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FileError {
    /// Offset, length, record count or value bound outside the file.
    #[error("access outside file boundary")]
    Boundary,
    /// Operation does not apply to this file kind.
    #[error("operation not supported by {0:?} files")]
    WrongKind(FileKind),
    /// Record file has a clear staged until commit.
    #[error("record file clear pending")]
    ClearPending,
    /// Limited credit is not enabled or was requested without budget.
    #[error("limited credit not enabled")]
    LimitedCreditDisabled,
    /// Negative credit or debit amount.
    #[error("negative amount")]
    NegativeAmount,
    /// Zero sized file or record geometry.
    #[error("invalid file geometry")]
    InvalidGeometry,
    /// Counter arithmetic failure.
    #[error(transparent)]
    Value(#[from] ValueError),
}

/// Communication mode applied to file payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CommMode {
    /// Plain data.
    #[default]
    Plain,
    /// Plain data followed by a four-byte MAC.
    Maced,
    /// Checksummed, padded and enciphered.
    Enciphered,
}

impl CommMode {
    /// Decode a communication settings byte.
    #[must_use]
    pub fn from_byte(byte: u8) -> Self {
        match byte & 0x03 {
            0x03 => Self::Enciphered,
            0x01 => Self::Maced,
            _ => Self::Plain,
        }
    }

    /// Encode as a communication settings byte.
    #[must_use]
    pub fn to_byte(self) -> u8 {
        match self {
            Self::Plain => 0x00,
            Self::Maced => 0x01,
            Self::Enciphered => 0x03,
        }
    }
}

/// File kind codes reported by get file settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileKind {
    /// Plain data file.
    StandardData,
    /// Data file with shadow buffer.
    BackupData,
    /// Bounded counter.
    Value,
    /// Append-only record log.
    LinearRecord,
    /// Ring-buffer record log.
    CyclicRecord,
}

impl FileKind {
    /// Wire type code.
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::StandardData => 0,
            Self::BackupData => 1,
            Self::Value => 2,
            Self::LinearRecord => 3,
            Self::CyclicRecord => 4,
        }
    }

    /// Kinds whose writes wait for a commit.
    #[must_use]
    pub fn is_transactional(self) -> bool {
        !matches!(self, Self::StandardData)
    }
}

/// Header fields shared by every file kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSettings {
    /// Payload protection.
    pub comm: CommMode,
    /// Per-operation key conditions.
    pub access: AccessRights,
    /// Optional ISO 7816-4 file identifier.
    pub iso_id: Option<u16>,
}

/// Kind-specific storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileContent {
    /// Plain data file.
    StandardData(DataFile),
    /// Backed-up data file.
    BackupData(BackupFile),
    /// Bounded counter.
    Value(ValueFile),
    /// Append-only record log.
    LinearRecord(RecordFile),
    /// Ring-buffer record log.
    CyclicRecord(RecordFile),
}

/// A file inside an application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct File {
    id: u8,
    settings: FileSettings,
    content: FileContent,
}

impl File {
    /// Assemble a file.
    #[must_use]
    pub fn new(id: u8, settings: FileSettings, content: FileContent) -> Self {
        Self {
            id,
            settings,
            content,
        }
    }

    /// File number.
    #[must_use]
    pub fn id(&self) -> u8 {
        self.id
    }

    /// Shared header.
    #[must_use]
    pub fn settings(&self) -> &FileSettings {
        &self.settings
    }

    /// Replace communication mode and access rights.
    pub fn change_settings(&mut self, comm: CommMode, access: AccessRights) {
        self.settings.comm = comm;
        self.settings.access = access;
    }

    /// Kind-specific storage.
    #[must_use]
    pub fn content(&self) -> &FileContent {
        &self.content
    }

    /// Kind of this file.
    #[must_use]
    pub fn kind(&self) -> FileKind {
        match &self.content {
            FileContent::StandardData(_) => FileKind::StandardData,
            FileContent::BackupData(_) => FileKind::BackupData,
            FileContent::Value(_) => FileKind::Value,
            FileContent::LinearRecord(_) => FileKind::LinearRecord,
            FileContent::CyclicRecord(_) => FileKind::CyclicRecord,
        }
    }

    /// Bytes of card memory the file occupies.
    #[must_use]
    pub fn capacity(&self) -> usize {
        match &self.content {
            FileContent::StandardData(file) => file.size(),
            FileContent::BackupData(file) => file.size(),
            FileContent::Value(_) => 4,
            FileContent::LinearRecord(file) | FileContent::CyclicRecord(file) => file.capacity(),
        }
    }

    /// Read `len` bytes at `offset`; zero length reads to the end.
    pub fn read_data(&self, offset: usize, len: usize) -> Result<Vec<u8>, FileError> {
        match &self.content {
            FileContent::StandardData(file) => file.read(offset, len),
            FileContent::BackupData(file) => file.read(offset, len),
            _ => Err(FileError::WrongKind(self.kind())),
        }
    }

    /// Validate a data write window before any payload arrives.
    pub fn check_data_write(&self, offset: usize, len: usize) -> Result<(), FileError> {
        let size = match &self.content {
            FileContent::StandardData(file) => file.size(),
            FileContent::BackupData(file) => file.size(),
            _ => return Err(FileError::WrongKind(self.kind())),
        };
        write_window(size, offset, len).map(|_| ())
    }

    /// Write data; backup files stage the bytes until commit.
    pub fn write_data(&mut self, offset: usize, bytes: &[u8]) -> Result<(), FileError> {
        let kind = self.kind();
        match &mut self.content {
            FileContent::StandardData(file) => file.write(offset, bytes),
            FileContent::BackupData(file) => file.write(offset, bytes),
            _ => Err(FileError::WrongKind(kind)),
        }
    }

    /// Record file storage, or the wrong-kind error.
    pub fn records(&self) -> Result<&RecordFile, FileError> {
        match &self.content {
            FileContent::LinearRecord(file) | FileContent::CyclicRecord(file) => Ok(file),
            _ => Err(FileError::WrongKind(self.kind())),
        }
    }

    /// Read `count` records starting `offset` records back from the newest.
    pub fn read_records(&self, offset: usize, count: usize) -> Result<Vec<u8>, FileError> {
        self.records()?.read(offset, count)
    }

    /// Validate a record write window before any payload arrives.
    pub fn check_record_write(&self, offset: usize, len: usize) -> Result<(), FileError> {
        let cyclic = self.kind() == FileKind::CyclicRecord;
        self.records()?.check_write(offset, len, cyclic)
    }

    /// Stage bytes into the record being written in this transaction.
    pub fn write_record(&mut self, offset: usize, bytes: &[u8]) -> Result<(), FileError> {
        let kind = self.kind();
        match &mut self.content {
            FileContent::LinearRecord(file) => file.write(offset, bytes, false),
            FileContent::CyclicRecord(file) => file.write(offset, bytes, true),
            _ => Err(FileError::WrongKind(kind)),
        }
    }

    /// Stage clearing every record.
    pub fn clear_records(&mut self) -> Result<(), FileError> {
        let kind = self.kind();
        match &mut self.content {
            FileContent::LinearRecord(file) | FileContent::CyclicRecord(file) => {
                file.clear();
                Ok(())
            }
            _ => Err(FileError::WrongKind(kind)),
        }
    }

    /// Counter storage, or the wrong-kind error.
    pub fn value(&self) -> Result<&ValueFile, FileError> {
        match &self.content {
            FileContent::Value(file) => Ok(file),
            _ => Err(FileError::WrongKind(self.kind())),
        }
    }

    /// Mutable counter storage, or the wrong-kind error.
    pub fn value_mut(&mut self) -> Result<&mut ValueFile, FileError> {
        let kind = self.kind();
        match &mut self.content {
            FileContent::Value(file) => Ok(file),
            _ => Err(FileError::WrongKind(kind)),
        }
    }

    /// Make staged changes visible.
    pub fn commit(&mut self) {
        match &mut self.content {
            FileContent::StandardData(_) => {}
            FileContent::BackupData(file) => file.commit(),
            FileContent::Value(file) => file.commit(),
            FileContent::LinearRecord(file) => file.commit(false),
            FileContent::CyclicRecord(file) => file.commit(true),
        }
    }

    /// Discard staged changes.
    pub fn abort(&mut self) {
        match &mut self.content {
            FileContent::StandardData(_) => {}
            FileContent::BackupData(file) => file.abort(),
            FileContent::Value(file) => file.abort(),
            FileContent::LinearRecord(file) | FileContent::CyclicRecord(file) => file.abort(),
        }
    }

    /// Get-file-settings payload.
    #[must_use]
    pub fn settings_payload(&self) -> Vec<u8> {
        let mut out = vec![self.kind().code(), self.settings.comm.to_byte()];
        out.extend_from_slice(&self.settings.access.to_wire());
        match &self.content {
            FileContent::StandardData(file) => out.extend_from_slice(&u24_le(file.size())),
            FileContent::BackupData(file) => out.extend_from_slice(&u24_le(file.size())),
            FileContent::Value(file) => {
                out.extend_from_slice(&file.lower().to_wire());
                out.extend_from_slice(&file.upper().to_wire());
                out.extend_from_slice(&file.limited_credit_budget().to_wire());
                out.push(file.flags());
            }
            FileContent::LinearRecord(file) | FileContent::CyclicRecord(file) => {
                out.extend_from_slice(&u24_le(file.record_size()));
                out.extend_from_slice(&u24_le(file.max_records()));
                out.extend_from_slice(&u24_le(file.record_count()));
            }
        }
        out
    }
}

/// Encode the low 24 bits of `value` little-endian.
#[must_use]
pub fn u24_le(value: usize) -> [u8; 3] {
    let bytes = (value as u32).to_le_bytes();
    [bytes[0], bytes[1], bytes[2]]
}

/// Byte range for a read; zero `len` extends to the end of `size`.
pub(crate) fn read_window(size: usize, offset: usize, len: usize) -> Result<Range<usize>, FileError> {
    if offset > size {
        return Err(FileError::Boundary);
    }
    let len = if len == 0 { size - offset } else { len };
    write_window(size, offset, len)
}

/// Byte range for a write of exactly `len` bytes.
pub(crate) fn write_window(
    size: usize,
    offset: usize,
    len: usize,
) -> Result<Range<usize>, FileError> {
    let end = offset.checked_add(len).ok_or(FileError::Boundary)?;
    if end > size {
        return Err(FileError::Boundary);
    }
    Ok(offset..end)
}
