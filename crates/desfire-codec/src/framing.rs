// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Slice oversized responses into frames and rebuild chained commands.
// Author: Lukas Bower

//! Multi-frame helpers for both transfer directions.

use crate::types::CodecError;

/// Largest data field carried by a single response or continuation frame.
pub const MAX_FRAME_PAYLOAD: usize = 59;

/// Data bytes carried by the first frame of a chained write, after its
/// seven-byte file/offset/length header.
pub const FIRST_WRITE_FRAME_DATA: usize = 52;

/// Cursor over an outbound payload that yields one frame of data at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundChunker {
    buffer: Vec<u8>,
    offset: usize,
    frame_len: usize,
}

impl OutboundChunker {
    /// Chunk `buffer` using the default frame payload size.
    #[must_use]
    pub fn new(buffer: Vec<u8>) -> Self {
        Self::with_frame_len(buffer, MAX_FRAME_PAYLOAD)
    }

    /// Chunk `buffer` into frames of at most `frame_len` bytes.
    #[must_use]
    pub fn with_frame_len(buffer: Vec<u8>, frame_len: usize) -> Self {
        Self {
            buffer,
            offset: 0,
            frame_len: frame_len.max(1),
        }
    }

    /// Take the next chunk, advancing the cursor.
    ///
    /// An empty payload yields one empty chunk.
    pub fn next_chunk(&mut self) -> Vec<u8> {
        let end = (self.offset + self.frame_len).min(self.buffer.len());
        let chunk = self.buffer[self.offset..end].to_vec();
        self.offset = end;
        chunk
    }

    /// True once every byte has been handed out.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.offset >= self.buffer.len()
    }
}

/// Progress report from [`InboundAccumulator::push`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accumulated {
    /// More continuation frames are required.
    NeedMore {
        /// Bytes still outstanding.
        remaining: usize,
    },
    /// The announced byte count has been reached.
    Complete,
}

/// Buffer that collects a chained command payload until its announced size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundAccumulator {
    buffer: Vec<u8>,
    expected: usize,
}

impl InboundAccumulator {
    /// Start collecting a payload of `expected` bytes.
    #[must_use]
    pub fn new(expected: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(expected),
            expected,
        }
    }

    /// Append one frame's worth of data.
    pub fn push(&mut self, data: &[u8]) -> Result<Accumulated, CodecError> {
        let received = self.buffer.len() + data.len();
        if received > self.expected {
            return Err(CodecError::Overrun {
                expected: self.expected,
                received,
            });
        }
        self.buffer.extend_from_slice(data);
        Ok(self.progress())
    }

    /// Report progress without appending.
    #[must_use]
    pub fn progress(&self) -> Accumulated {
        match self.remaining() {
            0 => Accumulated::Complete,
            remaining => Accumulated::NeedMore { remaining },
        }
    }

    /// Bytes still outstanding.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.expected - self.buffer.len()
    }

    /// Consume the accumulator and return the collected bytes.
    #[must_use]
    pub fn into_inner(self) -> Vec<u8> {
        self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunker_marks_last_frame() {
        let payload: Vec<u8> = (0..130u8).collect();
        let mut chunker = OutboundChunker::new(payload.clone());
        let first = chunker.next_chunk();
        assert_eq!(first.len(), MAX_FRAME_PAYLOAD);
        assert!(!chunker.is_exhausted());
        let second = chunker.next_chunk();
        assert_eq!(second.len(), MAX_FRAME_PAYLOAD);
        let third = chunker.next_chunk();
        assert_eq!(third.len(), 12);
        assert!(chunker.is_exhausted());
        assert_eq!([first, second, third].concat(), payload);
    }

    #[test]
    fn chunker_yields_single_empty_frame_for_empty_payload() {
        let mut chunker = OutboundChunker::new(Vec::new());
        assert!(chunker.next_chunk().is_empty());
        assert!(chunker.is_exhausted());
    }

    #[test]
    fn accumulator_reports_progress_and_overrun() {
        let mut acc = InboundAccumulator::new(10);
        assert_eq!(
            acc.push(&[0; 4]).expect("first"),
            Accumulated::NeedMore { remaining: 6 }
        );
        let err = acc.push(&[0; 7]).expect_err("overrun");
        assert_eq!(
            err,
            CodecError::Overrun {
                expected: 10,
                received: 11
            }
        );
        assert_eq!(acc.push(&[1; 6]).expect("last"), Accumulated::Complete);
        assert_eq!(acc.into_inner().len(), 10);
    }
}
