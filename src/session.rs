// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Per-connection selection, authentication and continuation state.
// Author: Lukas Bower

//! Session state owned by the processor.

use std::collections::VecDeque;

use desfire_codec::{InboundAccumulator, OutboundChunker};
use desfire_crypto::{CardChallenge, SecureMessaging};

use crate::file::CommMode;

/// Directory addressed by subsequent commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Selection {
    /// Card root.
    #[default]
    Root,
    /// Application in this slot.
    Application(u8),
}

/// Which chained write a continuation completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    /// Data file write.
    Data,
    /// Record file write.
    Record,
}

/// Destination of an inbound multi-frame write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteTarget {
    /// Data or record write.
    pub kind: WriteKind,
    /// Target file number.
    pub file_id: u8,
    /// Byte offset inside the file or record.
    pub offset: usize,
    /// Plain payload length.
    pub len: usize,
    /// Protection of the payload on the wire.
    pub comm: CommMode,
}

/// Multi-frame operation in flight.
#[derive(Debug, Default)]
pub enum Continuation {
    /// Nothing pending.
    #[default]
    Idle,
    /// First authentication frame answered.
    AwaitingAuthPhase2 {
        /// Key slot being authenticated.
        key_no: u8,
        /// Card-side challenge state.
        challenge: CardChallenge,
    },
    /// Chained write collecting payload.
    AwaitingMoreWriteData {
        /// Where the payload goes.
        target: WriteTarget,
        /// Bytes collected so far.
        accumulator: InboundAccumulator,
    },
    /// Oversized response being handed out.
    AwaitingMoreReadFrames {
        /// Remaining payload.
        chunker: OutboundChunker,
    },
    /// Response whose frames were laid out up front.
    QueuedFrames {
        /// Frames still to send, in order.
        frames: VecDeque<Vec<u8>>,
    },
}

impl Continuation {
    /// True when nothing is pending.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }
}

/// Selection, authentication and continuation of one reader connection.
#[derive(Debug, Default)]
pub struct Session {
    /// Current directory.
    pub selection: Selection,
    /// Authenticated key number.
    pub authenticated: Option<u8>,
    /// Security level negotiated by the last authentication.
    pub security: CommMode,
    /// Secure messaging under the session key.
    pub messaging: Option<SecureMessaging>,
    /// Operation spanning several frames.
    pub continuation: Continuation,
}

impl Session {
    /// Drop authentication, session key and security level.
    pub fn reset_authentication(&mut self) {
        self.authenticated = None;
        self.security = CommMode::Plain;
        self.messaging = None;
    }

    /// Switch directory; authentication does not survive the switch.
    pub fn select(&mut self, selection: Selection) {
        self.selection = selection;
        self.reset_authentication();
        self.continuation = Continuation::Idle;
    }

    /// Slot of the selected application, if any.
    #[must_use]
    pub fn application_slot(&self) -> Option<u8> {
        match self.selection {
            Selection::Root => None,
            Selection::Application(slot) => Some(slot),
        }
    }

    /// Communication mode applied to a file set to `file_comm`.
    ///
    /// Without a negotiated security level everything travels plain.
    #[must_use]
    pub fn effective_comm(&self, file_comm: CommMode) -> CommMode {
        match self.security {
            CommMode::Plain => CommMode::Plain,
            CommMode::Maced | CommMode::Enciphered => file_comm,
        }
    }
}
