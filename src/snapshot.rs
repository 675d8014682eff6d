// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Export and restore the card directory tree as versioned JSON.
// Author: Lukas Bower

//! Card snapshots.
//!
//! A snapshot holds the committed directory tree only. Staged writes,
//! pending-transaction marks and session state are not captured, so a
//! restored card starts with no transaction in progress.

use log::info;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::card::{Card, CardError};

/// Format revision written by [`Snapshot::capture`].
pub const SNAPSHOT_VERSION: u32 = 1;

/// Errors raised while exporting or restoring a snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// JSON encoding or decoding failed.
    #[error("snapshot json: {0}")]
    Json(#[from] serde_json::Error),
    /// Snapshot written by an incompatible format revision.
    #[error("unsupported snapshot version {0}")]
    UnsupportedVersion(u32),
    /// Snapshot decoded but describes an impossible card.
    #[error("inconsistent snapshot: {0}")]
    Inconsistent(#[from] CardError),
}

/// Serializable copy of a card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Format revision.
    pub version: u32,
    /// Directory tree, keys and configuration.
    pub card: Card,
}

impl Snapshot {
    /// Copy the committed state of `card`.
    #[must_use]
    pub fn capture(card: &Card) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            card: card.clone(),
        }
    }

    /// Pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Decode JSON without validating it.
    pub fn from_json(text: &str) -> Result<Self, SnapshotError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Check the format revision and structure, then yield the card.
    pub fn restore(self) -> Result<Card, SnapshotError> {
        if self.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(self.version));
        }
        self.card.validate()?;
        info!(
            "snapshot restored with {} applications",
            self.card.application_count()
        );
        Ok(self.card)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::Application;

    #[test]
    fn restore_checks_version() {
        let mut snapshot = Snapshot::capture(&Card::default());
        snapshot.version = 7;
        assert!(matches!(
            snapshot.restore(),
            Err(SnapshotError::UnsupportedVersion(7))
        ));
    }

    #[test]
    fn json_keeps_applications() {
        let mut card = Card::default();
        let app = Application::new([1, 2, 3], 0x0F, 0x82, card.default_key(), None, Vec::new())
            .expect("app");
        card.create_application(app).expect("create");
        let json = Snapshot::capture(&card).to_json().expect("json");
        let restored = Snapshot::from_json(&json)
            .expect("decode")
            .restore()
            .expect("restore");
        assert_eq!(restored, card);
    }

    #[test]
    fn garbage_is_a_json_error() {
        assert!(matches!(
            Snapshot::from_json("{\"version\": 1"),
            Err(SnapshotError::Json(_))
        ));
    }
}
