// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Card configuration from files and the environment.
// Author: Lukas Bower

use std::fs;
use std::path::PathBuf;

use desfire_emu::config::CONFIG_ENV;
use desfire_emu::{CardConfig, ConfigError, Processor};
use serial_test::serial;

fn temp_config(name: &str, body: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("desfire-{}-{name}.toml", std::process::id()));
    fs::write(&path, body).expect("write config");
    path
}

#[test]
#[serial]
fn env_variable_selects_config_file() {
    let path = temp_config("env", "uid = \"04a1b2c3d4e5f6\"\nformat_enabled = false\n");
    std::env::set_var(CONFIG_ENV, &path);
    let config = CardConfig::from_env();
    std::env::remove_var(CONFIG_ENV);
    let _ = fs::remove_file(&path);

    let card = config.expect("config").build_card().expect("card");
    assert_eq!(card.uid(), [0x04, 0xA1, 0xB2, 0xC3, 0xD4, 0xE5, 0xF6]);
    assert!(!card.format_enabled());

    let mut processor = Processor::with_seed(card, 9);
    processor.process(&[0x90, 0x60, 0x00, 0x00, 0x00]);
    processor.process(&[0x90, 0xAF, 0x00, 0x00, 0x00]);
    let third = processor.process(&[0x90, 0xAF, 0x00, 0x00, 0x00]);
    assert_eq!(&third[..7], &[0x04, 0xA1, 0xB2, 0xC3, 0xD4, 0xE5, 0xF6]);
}

#[test]
#[serial]
fn missing_env_variable_means_defaults() {
    std::env::remove_var(CONFIG_ENV);
    assert_eq!(CardConfig::from_env().expect("defaults"), CardConfig::default());
}

#[test]
#[serial]
fn unreadable_file_is_an_io_error() {
    std::env::set_var(CONFIG_ENV, "/nonexistent/desfire.toml");
    let result = CardConfig::from_env();
    std::env::remove_var(CONFIG_ENV);
    assert!(matches!(result, Err(ConfigError::Io(_))));
}

#[test]
fn random_uid_hides_uid_in_version() {
    let config = CardConfig::from_toml_str("uid = \"04010203040506\"\nrandom_uid = true\n")
        .expect("config");
    let mut processor = Processor::with_seed(config.build_card().expect("card"), 9);
    processor.process(&[0x90, 0x60, 0x00, 0x00, 0x00]);
    processor.process(&[0x90, 0xAF, 0x00, 0x00, 0x00]);
    let third = processor.process(&[0x90, 0xAF, 0x00, 0x00, 0x00]);
    assert_eq!(&third[..7], &[0; 7]);
}
