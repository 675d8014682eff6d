// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Linear and cyclic record logs with one staged record per transaction.
// Author: Lukas Bower

use serde::{Deserialize, Serialize};

use super::{write_window, FileError};

/// Fixed-size records, committed oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFile {
    record_size: usize,
    max_records: usize,
    #[serde(with = "hex::serde")]
    records: Vec<u8>,
    #[serde(skip)]
    staged: Option<Vec<u8>>,
    #[serde(skip)]
    clear_pending: bool,
}

impl RecordFile {
    /// Empty log holding at most `max_records` records of `record_size` bytes.
    pub fn new(record_size: usize, max_records: usize) -> Result<Self, FileError> {
        if record_size == 0 || max_records == 0 {
            return Err(FileError::InvalidGeometry);
        }
        Ok(Self {
            record_size,
            max_records,
            records: Vec::new(),
            staged: None,
            clear_pending: false,
        })
    }

    /// Bytes reserved for the log.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.record_size.saturating_mul(self.max_records)
    }

    /// Size of one record.
    #[must_use]
    pub fn record_size(&self) -> usize {
        self.record_size
    }

    /// Record limit.
    #[must_use]
    pub fn max_records(&self) -> usize {
        self.max_records
    }

    /// Committed records.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.records.len() / self.record_size
    }

    /// True while a record or clear awaits commit.
    #[must_use]
    pub fn has_staged(&self) -> bool {
        self.staged.is_some() || self.clear_pending
    }

    /// `count` records ending `offset` records before the newest, oldest first.
    pub(crate) fn read(&self, offset: usize, count: usize) -> Result<Vec<u8>, FileError> {
        let total = self.record_count();
        if total == 0 || offset >= total {
            return Err(FileError::Boundary);
        }
        let available = total - offset;
        let count = if count == 0 { available } else { count };
        if count > available {
            return Err(FileError::Boundary);
        }
        let end = available * self.record_size;
        let start = end - count * self.record_size;
        Ok(self.records[start..end].to_vec())
    }

    pub(crate) fn check_write(&self, offset: usize, len: usize, cyclic: bool) -> Result<(), FileError> {
        if self.clear_pending {
            return Err(FileError::ClearPending);
        }
        write_window(self.record_size, offset, len)?;
        if !cyclic && self.staged.is_none() && self.record_count() >= self.max_records {
            return Err(FileError::Boundary);
        }
        Ok(())
    }

    pub(crate) fn write(&mut self, offset: usize, bytes: &[u8], cyclic: bool) -> Result<(), FileError> {
        self.check_write(offset, bytes.len(), cyclic)?;
        let record_size = self.record_size;
        let staged = self.staged.get_or_insert_with(|| vec![0; record_size]);
        staged[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// Stage removal of every record, discarding any staged record.
    pub(crate) fn clear(&mut self) {
        self.staged = None;
        self.clear_pending = true;
    }

    pub(crate) fn commit(&mut self, cyclic: bool) {
        if std::mem::take(&mut self.clear_pending) {
            self.records.clear();
        }
        if let Some(record) = self.staged.take() {
            if cyclic && self.record_count() >= self.max_records {
                self.records.drain(..self.record_size);
            }
            self.records.extend_from_slice(&record);
        }
    }

    pub(crate) fn abort(&mut self) {
        self.staged = None;
        self.clear_pending = false;
    }
}
