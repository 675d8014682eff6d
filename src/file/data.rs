// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Standard and backed-up data file storage.
// Author: Lukas Bower

use serde::{Deserialize, Serialize};

use super::{read_window, write_window, FileError};

/// Fixed-capacity byte buffer written in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataFile {
    #[serde(with = "hex::serde")]
    data: Vec<u8>,
    used: usize,
}

impl DataFile {
    /// Zero-filled file of `size` bytes.
    pub fn new(size: usize) -> Result<Self, FileError> {
        if size == 0 {
            return Err(FileError::InvalidGeometry);
        }
        Ok(Self {
            data: vec![0; size],
            used: 0,
        })
    }

    /// Capacity in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Highest byte position ever written.
    #[must_use]
    pub fn used(&self) -> usize {
        self.used
    }

    pub(crate) fn read(&self, offset: usize, len: usize) -> Result<Vec<u8>, FileError> {
        let range = read_window(self.size(), offset, len)?;
        Ok(self.data[range].to_vec())
    }

    pub(crate) fn write(&mut self, offset: usize, bytes: &[u8]) -> Result<(), FileError> {
        let range = write_window(self.size(), offset, bytes.len())?;
        self.used = self.used.max(range.end);
        self.data[range].copy_from_slice(bytes);
        Ok(())
    }
}

/// Data file whose writes land in a shadow copy until commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupFile {
    committed: DataFile,
    #[serde(skip)]
    staged: Option<DataFile>,
}

impl BackupFile {
    /// Zero-filled file of `size` bytes.
    pub fn new(size: usize) -> Result<Self, FileError> {
        Ok(Self {
            committed: DataFile::new(size)?,
            staged: None,
        })
    }

    /// Capacity in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.committed.size()
    }

    /// True while uncommitted writes exist.
    #[must_use]
    pub fn has_staged(&self) -> bool {
        self.staged.is_some()
    }

    /// Reads always see committed data.
    pub(crate) fn read(&self, offset: usize, len: usize) -> Result<Vec<u8>, FileError> {
        self.committed.read(offset, len)
    }

    pub(crate) fn write(&mut self, offset: usize, bytes: &[u8]) -> Result<(), FileError> {
        write_window(self.size(), offset, bytes.len())?;
        let committed = &self.committed;
        self.staged
            .get_or_insert_with(|| committed.clone())
            .write(offset, bytes)
    }

    pub(crate) fn commit(&mut self) {
        if let Some(staged) = self.staged.take() {
            self.committed = staged;
        }
    }

    pub(crate) fn abort(&mut self) {
        self.staged = None;
    }
}
