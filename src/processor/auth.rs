// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Authentication, key management and card configuration instructions.
// Author: Lukas Bower

use desfire_codec::{ResponseApdu, StatusWord};
use desfire_crypto::{AuthMode, CardChallenge, Checksum, DesfireKey, KeyType, SecureMessaging};
use log::{debug, info, warn};
use rand::RngCore;

use super::{expect_len, ok, ok_with, CommandResult, Processor};
use crate::directory::KeySettings;
use crate::error::CommandError;
use crate::file::CommMode;
use crate::session::{Continuation, Selection};

const CONFIG_OPTION_FLAGS: u8 = 0x00;
const CONFIG_OPTION_DEFAULT_KEY: u8 = 0x01;
const CONFIG_OPTION_ATS: u8 = 0x02;
const CONFIG_DISABLE_FORMAT: u8 = 0x01;
const CONFIG_RANDOM_UID: u8 = 0x02;
const ROOT_KEY_COUNT: u8 = 0x01;

impl Processor {
    fn directory_key(&self, key_no: u8) -> Result<&DesfireKey, CommandError> {
        match self.session.selection {
            Selection::Root if key_no == 0 => Ok(self.card.master_key()),
            Selection::Root => Err(CommandError::NoSuchKey(key_no)),
            Selection::Application(slot) => self.card.application(slot)?.key(key_no),
        }
    }

    pub(super) fn authenticate(&mut self, mode: AuthMode, data: &[u8]) -> CommandResult {
        expect_len(data, 1)?;
        let key_no = data[0];
        let key = self.directory_key(key_no)?.clone();
        self.session.reset_authentication();
        let mut rnd_b = vec![0u8; key.family().challenge_len()];
        self.rng.fill_bytes(&mut rnd_b);
        let (challenge, cryptogram) = CardChallenge::issue(&key, mode, rnd_b)?;
        debug!("authentication of key {key_no} started ({mode:?}, {:?})", key.family());
        self.session.continuation = Continuation::AwaitingAuthPhase2 { key_no, challenge };
        Ok(ResponseApdu::new(cryptogram, StatusWord::ADDITIONAL_FRAME))
    }

    pub(super) fn finish_authentication(
        &mut self,
        key_no: u8,
        challenge: &CardChallenge,
        token: &[u8],
    ) -> CommandResult {
        if token.len() != challenge.token_len() {
            return Err(CommandError::Length);
        }
        let proof = challenge.verify(token).map_err(|err| {
            warn!("authentication of key {key_no} failed");
            CommandError::from(err)
        })?;
        self.session.authenticated = Some(key_no);
        self.session.security = CommMode::Enciphered;
        self.session.messaging = Some(proof.session);
        info!("authenticated with key {key_no} ({:?})", challenge.mode());
        ok_with(proof.response)
    }

    pub(super) fn change_key_settings(&mut self, data: &[u8]) -> CommandResult {
        if data.len() != 8 && data.len() != 16 {
            return Err(CommandError::Length);
        }
        if !self
            .directory_settings()?
            .allows_settings_change(self.session.authenticated)
        {
            return Err(CommandError::PermissionDenied);
        }
        let plain = self.messaging()?.decrypt(data)?;
        let byte = *plain.first().ok_or(CommandError::Length)?;
        let settings = KeySettings::from_byte(byte);
        match self.session.selection {
            Selection::Root => self.card.set_key_settings(settings),
            Selection::Application(slot) => {
                self.card.application_mut(slot)?.set_key_settings(settings);
            }
        }
        info!("key settings changed to {byte:#04x}");
        ok()
    }

    pub(super) fn set_configuration(&mut self, data: &[u8]) -> CommandResult {
        self.require_root()?;
        if self.session.authenticated != Some(0) {
            return Err(CommandError::PermissionDenied);
        }
        if data.len() < 9 {
            return Err(CommandError::Length);
        }
        let plain = self.messaging()?.decrypt(&data[1..])?;
        match data[0] {
            CONFIG_OPTION_FLAGS => {
                let flags = *plain.first().ok_or(CommandError::Length)?;
                self.card
                    .set_format_enabled(flags & CONFIG_DISABLE_FORMAT == 0);
                self.card.set_random_uid(flags & CONFIG_RANDOM_UID != 0);
                info!("card configuration byte set to {flags:#04x}");
            }
            CONFIG_OPTION_DEFAULT_KEY => {
                let (version, material) = plain.split_last().ok_or(CommandError::Length)?;
                if ![8, 16, 24].contains(&material.len()) {
                    return Err(CommandError::Parameter);
                }
                self.card.set_default_key(material, *version)?;
                info!("default key replaced (version {version})");
            }
            CONFIG_OPTION_ATS => {
                self.card.set_ats(plain)?;
                info!("ats replaced");
            }
            _ => return Err(CommandError::Parameter),
        }
        ok()
    }

    pub(super) fn change_key(&mut self, data: &[u8]) -> CommandResult {
        if data.len() < 9 {
            return Err(CommandError::Length);
        }
        let key_no = data[0];
        let cryptogram = &data[1..];
        let authenticated = self.session.authenticated;
        let (allowed, key_type, old_material) = match self.session.selection {
            Selection::Root => {
                let master = self.card.master_key();
                (
                    self.card.may_change_master_key(authenticated, key_no)?,
                    master.key_type(),
                    master.material().to_vec(),
                )
            }
            Selection::Application(slot) => {
                let app = self.card.application(slot)?;
                (
                    app.may_change_key(authenticated, key_no)?,
                    app.key_type(),
                    app.old_key_material(key_no)?,
                )
            }
        };
        if !allowed {
            return Err(CommandError::PermissionDenied);
        }
        let messaging = self.messaging()?;
        let (material, version) = if authenticated == Some(key_no) {
            open_same_key(messaging, cryptogram, key_type)?
        } else {
            open_xored_key(messaging, cryptogram, &old_material)?
        };
        let key = DesfireKey::new(key_type, &material, version)?;
        match self.session.selection {
            Selection::Root => self.card.set_master_key(key),
            Selection::Application(slot) => self.card.application_mut(slot)?.set_key(key_no, key)?,
        }
        if authenticated == Some(key_no) {
            self.session.reset_authentication();
        }
        info!("key {key_no} changed (version {version})");
        ok()
    }

    pub(super) fn get_key_version(&mut self, data: &[u8]) -> CommandResult {
        expect_len(data, 1)?;
        let key_no = data[0];
        let version = match self.session.selection {
            Selection::Root => self.directory_key(key_no)?.version(),
            Selection::Application(slot) => self.card.application(slot)?.key_version(key_no)?,
        };
        ok_with(vec![version])
    }

    pub(super) fn get_key_settings(&mut self, data: &[u8]) -> CommandResult {
        expect_len(data, 0)?;
        let settings = self.directory_settings()?;
        if !settings.allows_listing(self.session.authenticated) {
            return Err(CommandError::PermissionDenied);
        }
        let key_count = match self.session.selection {
            Selection::Root => ROOT_KEY_COUNT,
            Selection::Application(slot) => self.card.application(slot)?.key_count_byte(),
        };
        ok_with(vec![settings.to_byte(), key_count])
    }
}

/// New key enciphered under the session key: `key [|| version] || checksum`.
fn open_same_key(
    messaging: &SecureMessaging,
    cryptogram: &[u8],
    key_type: KeyType,
) -> Result<(Vec<u8>, u8), CommandError> {
    let checksum = messaging.checksum();
    let key_len = key_type.key_len();
    Ok(messaging.open(cryptogram, |candidate| {
        let plain = checksum.split_verified(candidate)?;
        split_version(plain, key_len)
    })?)
}

/// New key XORed with the old one:
/// `xor [|| version] || checksum(xor [|| version]) || checksum(new key)`.
fn open_xored_key(
    messaging: &SecureMessaging,
    cryptogram: &[u8],
    old: &[u8],
) -> Result<(Vec<u8>, u8), CommandError> {
    let checksum = messaging.checksum();
    Ok(messaging.open(cryptogram, |candidate| {
        unxor_key(candidate, old, checksum)
    })?)
}

fn unxor_key(candidate: &[u8], old: &[u8], checksum: Checksum) -> Option<(Vec<u8>, u8)> {
    let body_len = candidate.len().checked_sub(2 * checksum.len())?;
    let (body, sums) = candidate.split_at(body_len);
    let (body_sum, key_sum) = sums.split_at(checksum.len());
    if checksum.compute(body) != body_sum {
        return None;
    }
    let (xored, version) = split_version(body, old.len())?;
    let key: Vec<u8> = xored.iter().zip(old).map(|(a, b)| a ^ b).collect();
    (checksum.compute(&key) == key_sum).then_some((key, version))
}

fn split_version(plain: &[u8], key_len: usize) -> Option<(Vec<u8>, u8)> {
    match plain.len() {
        len if len == key_len => Some((plain.to_vec(), 0)),
        len if len == key_len + 1 => Some((plain[..key_len].to_vec(), plain[key_len])),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_byte_is_optional() {
        assert_eq!(split_version(&[1; 16], 16), Some((vec![1; 16], 0)));
        let mut with_version = vec![2; 16];
        with_version.push(9);
        assert_eq!(split_version(&with_version, 16), Some((vec![2; 16], 9)));
        assert_eq!(split_version(&[0; 15], 16), None);
    }

    #[test]
    fn xored_key_checks_both_checksums() {
        let checksum = Checksum::Crc16;
        let old = [0x11u8; 16];
        let new = [0x5Au8; 16];
        let xored: Vec<u8> = new.iter().zip(&old).map(|(a, b)| a ^ b).collect();
        let mut frame = xored.clone();
        frame.extend(checksum.compute(&xored));
        frame.extend(checksum.compute(&new));
        assert_eq!(unxor_key(&frame, &old, checksum), Some((new.to_vec(), 0)));

        let last = frame.len() - 1;
        frame[last] ^= 0xFF;
        assert_eq!(unxor_key(&frame, &old, checksum), None);
    }
}
