// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Application directories holding key slots, key settings and files.
// Author: Lukas Bower

//! Application level of the card hierarchy.
//!
//! An [`Application`] owns its files by id and its key slots by number.
//! Files with staged writes are tracked in a pending bitmask so commit and
//! abort can visit them in id order.

use std::collections::BTreeMap;

use desfire_crypto::{DesfireKey, KeyType};
use serde::{Deserialize, Serialize};

use crate::error::CommandError;
use crate::file::{File, MAX_FILE_ID};

/// Largest number of key slots an application may declare.
pub const MAX_APPLICATION_KEYS: u8 = 14;
/// Longest ISO DF name accepted at creation.
pub const MAX_DF_NAME_LEN: usize = 16;

const CONFIG_CHANGEABLE: u8 = 0x08;
const FREE_CREATE_DELETE: u8 = 0x04;
const FREE_DIRECTORY_LIST: u8 = 0x02;
const MASTER_KEY_CHANGEABLE: u8 = 0x01;

/// Decoded key settings byte of a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeySettings {
    /// Change-key access nibble (applications only).
    pub change_key_access: u8,
    /// Key settings may still be changed.
    pub config_changeable: bool,
    /// Create and delete need no master key authentication.
    pub free_create_delete: bool,
    /// Listing needs no master key authentication.
    pub free_directory_list: bool,
    /// The master key may be changed.
    pub master_key_changeable: bool,
}

impl KeySettings {
    /// Decode a key settings byte.
    #[must_use]
    pub fn from_byte(byte: u8) -> Self {
        Self {
            change_key_access: byte >> 4,
            config_changeable: byte & CONFIG_CHANGEABLE != 0,
            free_create_delete: byte & FREE_CREATE_DELETE != 0,
            free_directory_list: byte & FREE_DIRECTORY_LIST != 0,
            master_key_changeable: byte & MASTER_KEY_CHANGEABLE != 0,
        }
    }

    /// Encode as a key settings byte.
    #[must_use]
    pub fn to_byte(self) -> u8 {
        let mut byte = self.change_key_access << 4;
        for (set, bit) in [
            (self.config_changeable, CONFIG_CHANGEABLE),
            (self.free_create_delete, FREE_CREATE_DELETE),
            (self.free_directory_list, FREE_DIRECTORY_LIST),
            (self.master_key_changeable, MASTER_KEY_CHANGEABLE),
        ] {
            if set {
                byte |= bit;
            }
        }
        byte
    }

    /// Creating and deleting entries.
    #[must_use]
    pub fn allows_manage(&self, authenticated: Option<u8>) -> bool {
        self.free_create_delete || authenticated == Some(0)
    }

    /// Listing ids, names and settings.
    #[must_use]
    pub fn allows_listing(&self, authenticated: Option<u8>) -> bool {
        self.free_directory_list || authenticated == Some(0)
    }

    /// Replacing the key settings.
    #[must_use]
    pub fn allows_settings_change(&self, authenticated: Option<u8>) -> bool {
        self.config_changeable && authenticated == Some(0)
    }
}

impl Default for KeySettings {
    fn default() -> Self {
        Self::from_byte(0x0F)
    }
}

/// An application directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    #[serde(with = "hex::serde")]
    aid: [u8; 3],
    key_settings: KeySettings,
    key_type: KeyType,
    keys: Vec<Option<DesfireKey>>,
    files: BTreeMap<u8, File>,
    iso_fid: Option<u16>,
    #[serde(with = "hex::serde")]
    df_name: Vec<u8>,
    #[serde(skip)]
    pending: u32,
}

impl Application {
    /// Build an application from its two key settings bytes; key 0 is
    /// seeded from `default_key`.
    pub fn new(
        aid: [u8; 3],
        settings: u8,
        key_config: u8,
        default_key: &[u8],
        iso_fid: Option<u16>,
        df_name: Vec<u8>,
    ) -> Result<Self, CommandError> {
        let key_type = KeyType::from_settings(key_config)?;
        let max_keys = key_config & 0x0F;
        if max_keys == 0 || max_keys > MAX_APPLICATION_KEYS || df_name.len() > MAX_DF_NAME_LEN {
            return Err(CommandError::Parameter);
        }
        let mut keys = vec![None; usize::from(max_keys)];
        keys[0] = Some(DesfireKey::from_default(key_type, default_key)?);
        Ok(Self {
            aid,
            key_settings: KeySettings::from_byte(settings),
            key_type,
            keys,
            files: BTreeMap::new(),
            iso_fid,
            df_name,
            pending: 0,
        })
    }

    /// Application identifier.
    #[must_use]
    pub fn aid(&self) -> [u8; 3] {
        self.aid
    }

    /// Decoded key settings.
    #[must_use]
    pub fn key_settings(&self) -> KeySettings {
        self.key_settings
    }

    /// Replace the key settings.
    pub fn set_key_settings(&mut self, settings: KeySettings) {
        self.key_settings = settings;
    }

    /// Type shared by every key slot.
    #[must_use]
    pub fn key_type(&self) -> KeyType {
        self.key_type
    }

    /// Declared key slot count.
    #[must_use]
    pub fn max_keys(&self) -> u8 {
        self.keys.len() as u8
    }

    /// Key-count byte of get key settings: key type bits and slot count.
    #[must_use]
    pub fn key_count_byte(&self) -> u8 {
        self.key_type.settings_bits() | self.max_keys()
    }

    /// ISO file identifier given at creation.
    #[must_use]
    pub fn iso_fid(&self) -> Option<u16> {
        self.iso_fid
    }

    /// ISO DF name given at creation.
    #[must_use]
    pub fn df_name(&self) -> &[u8] {
        &self.df_name
    }

    /// Key in slot `key_no`.
    pub fn key(&self, key_no: u8) -> Result<&DesfireKey, CommandError> {
        self.keys
            .get(usize::from(key_no))
            .and_then(Option::as_ref)
            .ok_or(CommandError::NoSuchKey(key_no))
    }

    /// Version byte of slot `key_no`; unset slots report zero.
    pub fn key_version(&self, key_no: u8) -> Result<u8, CommandError> {
        let slot = self
            .keys
            .get(usize::from(key_no))
            .ok_or(CommandError::NoSuchKey(key_no))?;
        Ok(slot.as_ref().map_or(0, DesfireKey::version))
    }

    /// Key material used as the XOR base when changing `key_no`.
    pub fn old_key_material(&self, key_no: u8) -> Result<Vec<u8>, CommandError> {
        let slot = self
            .keys
            .get(usize::from(key_no))
            .ok_or(CommandError::NoSuchKey(key_no))?;
        Ok(slot
            .as_ref()
            .map_or_else(|| vec![0; self.key_type.key_len()], |key| key.material().to_vec()))
    }

    /// Store `key` in slot `key_no`.
    pub fn set_key(&mut self, key_no: u8, key: DesfireKey) -> Result<(), CommandError> {
        if key.key_type() != self.key_type {
            return Err(CommandError::Parameter);
        }
        let slot = self
            .keys
            .get_mut(usize::from(key_no))
            .ok_or(CommandError::NoSuchKey(key_no))?;
        *slot = Some(key);
        Ok(())
    }

    /// Whether a session authenticated with `authenticated` may change `key_no`.
    pub fn may_change_key(&self, authenticated: Option<u8>, key_no: u8) -> Result<bool, CommandError> {
        if key_no >= self.max_keys() {
            return Err(CommandError::NoSuchKey(key_no));
        }
        let master_changeable = self.key_settings.master_key_changeable;
        let allowed = match self.key_settings.change_key_access {
            0x0 => authenticated == Some(0) && (key_no != 0 || master_changeable),
            0xF => key_no == 0 && authenticated == Some(0) && master_changeable,
            0xE => {
                (key_no != 0 || master_changeable) && authenticated == Some(key_no)
            }
            change_key => {
                if key_no == 0 {
                    authenticated == Some(0) && master_changeable
                } else if key_no == change_key {
                    authenticated == Some(0)
                } else {
                    authenticated == Some(change_key)
                }
            }
        };
        Ok(allowed)
    }

    /// File `id`.
    pub fn file(&self, id: u8) -> Result<&File, CommandError> {
        self.files.get(&id).ok_or(CommandError::FileNotFound(id))
    }

    /// Mutable file `id`.
    pub fn file_mut(&mut self, id: u8) -> Result<&mut File, CommandError> {
        self.files.get_mut(&id).ok_or(CommandError::FileNotFound(id))
    }

    /// Active files in ascending id order.
    pub fn files(&self) -> impl Iterator<Item = &File> {
        self.files.values()
    }

    /// Ids of active files in ascending order.
    #[must_use]
    pub fn file_ids(&self) -> Vec<u8> {
        self.files.keys().copied().collect()
    }

    /// Add a file; its id must be free and in range.
    pub fn insert_file(&mut self, file: File) -> Result<(), CommandError> {
        let id = file.id();
        if id > MAX_FILE_ID {
            return Err(CommandError::Parameter);
        }
        if self.files.contains_key(&id) {
            return Err(CommandError::Duplicate);
        }
        if let Some(iso_id) = file.settings().iso_id {
            if self.files.values().any(|other| other.settings().iso_id == Some(iso_id)) {
                return Err(CommandError::Duplicate);
            }
        }
        self.files.insert(id, file);
        Ok(())
    }

    /// Remove file `id`, dropping any staged changes.
    pub fn remove_file(&mut self, id: u8) -> Result<File, CommandError> {
        let file = self.files.remove(&id).ok_or(CommandError::FileNotFound(id))?;
        self.pending &= !(1 << id);
        Ok(file)
    }

    /// Flag file `id` as carrying staged changes.
    pub fn mark_pending(&mut self, id: u8) {
        if id <= MAX_FILE_ID {
            self.pending |= 1 << id;
        }
    }

    /// Clear the pending flag of file `id`.
    pub fn clear_pending(&mut self, id: u8) {
        if id <= MAX_FILE_ID {
            self.pending &= !(1 << id);
        }
    }

    /// Ids of files with staged changes, ascending.
    #[must_use]
    pub fn pending_ids(&self) -> Vec<u8> {
        (0..=MAX_FILE_ID)
            .filter(|id| self.pending & (1 << id) != 0)
            .collect()
    }

    /// Bytes of card memory the files occupy.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.files.values().map(File::capacity).sum()
    }
}
