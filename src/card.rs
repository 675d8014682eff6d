// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Root directory of the card: master key, configuration and application index.
// Author: Lukas Bower

//! The card root.
//!
//! Applications live in numbered slots `1..=max_applications`; slot 0 is the
//! root itself and never holds a user application. Lookups by AID scan the
//! slot table, which is ordered by slot number.

use std::collections::BTreeMap;

use desfire_crypto::{DesfireKey, KeyType};
use log::info;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::directory::{Application, KeySettings};
use crate::error::CommandError;

/// Upper bound on application slots.
pub const MAX_APPLICATIONS: usize = 28;
/// AID addressing the root directory.
pub const ROOT_AID: [u8; 3] = [0; 3];
/// Length of the default key used to seed new applications.
pub const DEFAULT_KEY_LEN: usize = 24;
/// ATS reported when none is configured.
pub const DEFAULT_ATS: [u8; 6] = [0x06, 0x75, 0x77, 0x81, 0x02, 0x80];
/// Memory reported by a factory card.
pub const DEFAULT_EEPROM_SIZE: usize = 8192;

/// Structural faults in a card assembled from external data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CardError {
    /// Default key has the wrong length.
    #[error("default key must be {} bytes, got {0}", DEFAULT_KEY_LEN)]
    DefaultKeyLength(usize),
    /// Application limit exceeds what the card supports.
    #[error("at most {} applications, configured {0}", MAX_APPLICATIONS)]
    TooManyApplications(usize),
    /// Application stored outside `1..=max_applications`.
    #[error("application slot {0} out of range")]
    SlotOutOfRange(u8),
    /// Two slots hold the same AID, or an application uses the root AID.
    #[error("application {} duplicated", hex::encode_upper(.0))]
    DuplicateApplication([u8; 3]),
    /// Application without a key in slot 0.
    #[error("application {} has no master key", hex::encode_upper(.0))]
    MissingMasterKey([u8; 3]),
}

/// Root directory and card-wide configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    #[serde(with = "hex::serde")]
    uid: [u8; 7],
    master_key: DesfireKey,
    key_settings: KeySettings,
    #[serde(with = "hex::serde")]
    default_key: Vec<u8>,
    default_key_version: u8,
    format_enabled: bool,
    random_uid: bool,
    #[serde(with = "hex::serde")]
    ats: Vec<u8>,
    eeprom_size: usize,
    max_applications: usize,
    applications: BTreeMap<u8, Application>,
}

impl Default for Card {
    fn default() -> Self {
        Self::new([0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00], DesfireKey::zero(KeyType::TripleDes))
    }
}

impl Card {
    /// Factory-fresh card with the given UID and master key.
    #[must_use]
    pub fn new(uid: [u8; 7], master_key: DesfireKey) -> Self {
        Self {
            uid,
            master_key,
            key_settings: KeySettings::default(),
            default_key: vec![0; DEFAULT_KEY_LEN],
            default_key_version: 0,
            format_enabled: true,
            random_uid: false,
            ats: DEFAULT_ATS.to_vec(),
            eeprom_size: DEFAULT_EEPROM_SIZE,
            max_applications: MAX_APPLICATIONS,
            applications: BTreeMap::new(),
        }
    }

    /// Seven-byte UID.
    #[must_use]
    pub fn uid(&self) -> [u8; 7] {
        self.uid
    }

    /// Card master key.
    #[must_use]
    pub fn master_key(&self) -> &DesfireKey {
        &self.master_key
    }

    /// Replace the card master key.
    pub fn set_master_key(&mut self, key: DesfireKey) {
        self.master_key = key;
    }

    /// Root key settings; the change-key nibble is unused at this level.
    #[must_use]
    pub fn key_settings(&self) -> KeySettings {
        self.key_settings
    }

    /// Replace the root key settings.
    pub fn set_key_settings(&mut self, mut settings: KeySettings) {
        settings.change_key_access = 0;
        self.key_settings = settings;
    }

    /// Key material seeding key 0 of new applications.
    #[must_use]
    pub fn default_key(&self) -> &[u8] {
        &self.default_key
    }

    /// Version byte recorded with the default key.
    #[must_use]
    pub fn default_key_version(&self) -> u8 {
        self.default_key_version
    }

    /// Replace the default key; shorter material is zero-extended.
    pub fn set_default_key(&mut self, material: &[u8], version: u8) -> Result<(), CommandError> {
        if material.is_empty() || material.len() > DEFAULT_KEY_LEN {
            return Err(CommandError::Parameter);
        }
        let mut key = material.to_vec();
        key.resize(DEFAULT_KEY_LEN, 0);
        self.default_key = key;
        self.default_key_version = version;
        Ok(())
    }

    /// Whether format is still permitted.
    #[must_use]
    pub fn format_enabled(&self) -> bool {
        self.format_enabled
    }

    /// Enable or disable format.
    pub fn set_format_enabled(&mut self, enabled: bool) {
        self.format_enabled = enabled;
    }

    /// Whether the UID is hidden from anticollision and get version.
    #[must_use]
    pub fn random_uid(&self) -> bool {
        self.random_uid
    }

    /// Switch the random UID mode.
    pub fn set_random_uid(&mut self, random: bool) {
        self.random_uid = random;
    }

    /// Answer to select.
    #[must_use]
    pub fn ats(&self) -> &[u8] {
        &self.ats
    }

    /// Replace the answer to select.
    pub fn set_ats(&mut self, ats: Vec<u8>) -> Result<(), CommandError> {
        if ats.is_empty() || usize::from(ats[0]) != ats.len() {
            return Err(CommandError::Parameter);
        }
        self.ats = ats;
        Ok(())
    }

    /// Total card memory.
    #[must_use]
    pub fn eeprom_size(&self) -> usize {
        self.eeprom_size
    }

    /// Set the total card memory.
    pub fn set_eeprom_size(&mut self, size: usize) {
        self.eeprom_size = size;
    }

    /// Application slot count.
    #[must_use]
    pub fn max_applications(&self) -> usize {
        self.max_applications
    }

    /// Set the application slot count, capped at [`MAX_APPLICATIONS`].
    pub fn set_max_applications(&mut self, max: usize) {
        self.max_applications = max.min(MAX_APPLICATIONS);
    }

    /// Applications in slot order.
    pub fn applications(&self) -> impl Iterator<Item = &Application> {
        self.applications.values()
    }

    /// Number of applications present.
    #[must_use]
    pub fn application_count(&self) -> usize {
        self.applications.len()
    }

    /// Slot holding `aid`.
    pub fn slot_of(&self, aid: [u8; 3]) -> Result<u8, CommandError> {
        self.applications
            .iter()
            .find(|(_, app)| app.aid() == aid)
            .map(|(slot, _)| *slot)
            .ok_or(CommandError::ApplicationNotFound)
    }

    /// Application in `slot`.
    pub fn application(&self, slot: u8) -> Result<&Application, CommandError> {
        self.applications
            .get(&slot)
            .ok_or(CommandError::ApplicationNotFound)
    }

    /// Mutable application in `slot`.
    pub fn application_mut(&mut self, slot: u8) -> Result<&mut Application, CommandError> {
        self.applications
            .get_mut(&slot)
            .ok_or(CommandError::ApplicationNotFound)
    }

    /// Store `app` in the first free slot.
    pub fn create_application(&mut self, app: Application) -> Result<u8, CommandError> {
        let aid = app.aid();
        if aid == ROOT_AID {
            return Err(CommandError::Parameter);
        }
        if self.slot_of(aid).is_ok() {
            return Err(CommandError::Duplicate);
        }
        let limit = self.max_applications.min(MAX_APPLICATIONS) as u8;
        let slot = (1..=limit)
            .find(|slot| !self.applications.contains_key(slot))
            .ok_or(CommandError::OutOfSlots)?;
        self.applications.insert(slot, app);
        info!("application {} created in slot {slot}", hex::encode_upper(aid));
        Ok(slot)
    }

    /// Remove `aid`, returning the freed slot.
    pub fn delete_application(&mut self, aid: [u8; 3]) -> Result<u8, CommandError> {
        let slot = self.slot_of(aid)?;
        self.applications.remove(&slot);
        info!("application {} deleted from slot {slot}", hex::encode_upper(aid));
        Ok(slot)
    }

    /// Remove every application.
    pub fn format(&mut self) {
        let removed = self.applications.len();
        self.applications.clear();
        info!("card formatted, {removed} applications removed");
    }

    /// Memory not yet claimed by files.
    #[must_use]
    pub fn free_memory(&self) -> usize {
        let used: usize = self.applications.values().map(Application::capacity).sum();
        self.eeprom_size.saturating_sub(used)
    }

    /// Whether a session authenticated with `authenticated` may change root key `key_no`.
    pub fn may_change_master_key(
        &self,
        authenticated: Option<u8>,
        key_no: u8,
    ) -> Result<bool, CommandError> {
        if key_no != 0 {
            return Err(CommandError::Parameter);
        }
        Ok(authenticated == Some(0) && self.key_settings.master_key_changeable)
    }

    /// Check structural invariants of a card assembled from external data.
    pub fn validate(&self) -> Result<(), CardError> {
        if self.default_key.len() != DEFAULT_KEY_LEN {
            return Err(CardError::DefaultKeyLength(self.default_key.len()));
        }
        if self.max_applications > MAX_APPLICATIONS {
            return Err(CardError::TooManyApplications(self.max_applications));
        }
        let mut seen = Vec::with_capacity(self.applications.len());
        for (slot, app) in &self.applications {
            if *slot == 0 || usize::from(*slot) > self.max_applications {
                return Err(CardError::SlotOutOfRange(*slot));
            }
            if app.aid() == ROOT_AID || seen.contains(&app.aid()) {
                return Err(CardError::DuplicateApplication(app.aid()));
            }
            if app.key(0).is_err() {
                return Err(CardError::MissingMasterKey(app.aid()));
            }
            seen.push(app.aid());
        }
        Ok(())
    }
}
