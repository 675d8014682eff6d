// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Load factory card configuration from TOML and build a card from it.
// Author: Lukas Bower

use std::fs;
use std::path::Path;

use desfire_crypto::{DesfireKey, KeyType};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::card::{Card, DEFAULT_ATS, DEFAULT_EEPROM_SIZE, DEFAULT_KEY_LEN, MAX_APPLICATIONS};

/// Environment variable naming a TOML configuration file.
pub const CONFIG_ENV: &str = "DESFIRE_CONFIG";

/// Errors raised while loading a card configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read card config: {0}")]
    Io(String),
    /// The file is not valid TOML for [`CardConfig`].
    #[error("invalid card config: {0}")]
    Parse(String),
    /// A field holds a value the card cannot take.
    #[error("card config rejected: {0}")]
    Invalid(&'static str),
}

/// Factory settings of an emulated card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CardConfig {
    /// Seven-byte UID.
    #[serde(with = "hex::serde")]
    pub uid: Vec<u8>,
    /// Type of the card master key.
    pub master_key_type: KeyType,
    /// Card master key material.
    #[serde(with = "hex::serde")]
    pub master_key: Vec<u8>,
    /// Default key seeding new applications.
    #[serde(with = "hex::serde")]
    pub default_key: Vec<u8>,
    /// Whether format is permitted.
    pub format_enabled: bool,
    /// Whether the UID is hidden.
    pub random_uid: bool,
    /// Answer to select; the first byte is the total length.
    #[serde(with = "hex::serde")]
    pub ats: Vec<u8>,
    /// Card memory in bytes.
    pub eeprom_size: usize,
    /// Application slot count.
    pub max_applications: usize,
}

impl Default for CardConfig {
    fn default() -> Self {
        Self {
            uid: vec![0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00],
            master_key_type: KeyType::TripleDes,
            master_key: vec![0; 16],
            default_key: vec![0; DEFAULT_KEY_LEN],
            format_enabled: true,
            random_uid: false,
            ats: DEFAULT_ATS.to_vec(),
            eeprom_size: DEFAULT_EEPROM_SIZE,
            max_applications: MAX_APPLICATIONS,
        }
    }
}

impl CardConfig {
    /// Parse and validate TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Load the file named by `DESFIRE_CONFIG`, or defaults when unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::load(Path::new(&path)),
            None => Ok(Self::default()),
        }
    }

    /// Reject values a card cannot hold.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.uid.len() != 7 {
            return Err(ConfigError::Invalid("uid must be 7 bytes"));
        }
        if self.master_key.len() != self.master_key_type.key_len() {
            return Err(ConfigError::Invalid("master key length does not match its type"));
        }
        if self.default_key.len() != DEFAULT_KEY_LEN {
            return Err(ConfigError::Invalid("default key must be 24 bytes"));
        }
        if self.ats.is_empty() || usize::from(self.ats[0]) != self.ats.len() {
            return Err(ConfigError::Invalid("ats length byte does not match"));
        }
        if self.max_applications == 0 || self.max_applications > MAX_APPLICATIONS {
            return Err(ConfigError::Invalid("max applications out of range"));
        }
        Ok(())
    }

    /// Factory-fresh card with these settings.
    pub fn build_card(&self) -> Result<Card, ConfigError> {
        self.validate()?;
        let mut uid = [0u8; 7];
        uid.copy_from_slice(&self.uid);
        let master_key = DesfireKey::new(self.master_key_type, &self.master_key, 0)
            .map_err(|_| ConfigError::Invalid("master key length does not match its type"))?;
        let mut card = Card::new(uid, master_key);
        card.set_default_key(&self.default_key, 0)
            .map_err(|_| ConfigError::Invalid("default key must be 24 bytes"))?;
        card.set_ats(self.ats.clone())
            .map_err(|_| ConfigError::Invalid("ats length byte does not match"))?;
        card.set_format_enabled(self.format_enabled);
        card.set_random_uid(self.random_uid);
        card.set_eeprom_size(self.eeprom_size);
        card.set_max_applications(self.max_applications);
        Ok(card)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_is_factory_default() {
        let config = CardConfig::from_toml_str("").expect("defaults");
        assert_eq!(config, CardConfig::default());
        let card = config.build_card().expect("card");
        assert_eq!(card, Card::default());
    }

    #[test]
    fn overrides_and_rejections() {
        let config = CardConfig::from_toml_str(
            "uid = \"04112233445566\"\nmaster_key_type = \"Aes\"\nmaster_key = \"000102030405060708090a0b0c0d0e0f\"\nrandom_uid = true\neeprom_size = 4096\n",
        )
        .expect("config");
        let card = config.build_card().expect("card");
        assert_eq!(card.uid(), [0x04, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66]);
        assert_eq!(card.master_key().key_type(), KeyType::Aes);
        assert!(card.random_uid());
        assert_eq!(card.free_memory(), 4096);

        assert!(matches!(
            CardConfig::from_toml_str("uid = \"0411\""),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            CardConfig::from_toml_str("uid = \"zz\""),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            CardConfig::from_toml_str("ats = \"0501\""),
            Err(ConfigError::Invalid(_))
        ));
    }
}
