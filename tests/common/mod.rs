// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Reader-side helpers shared by the card integration tests.
// Author: Lukas Bower
#![allow(dead_code)]

use desfire_codec::{CommandApdu, ResponseApdu, StatusWord};
use desfire_crypto::{AuthMode, DesfireKey, KeyType, ReaderHandshake, SecureMessaging};
use desfire_emu::{Card, Processor};

pub const OK: StatusWord = StatusWord::OPERATION_OK;
pub const MORE: StatusWord = StatusWord::ADDITIONAL_FRAME;

pub const APP: [u8; 3] = [0x01, 0x00, 0x00];

/// Reader driving a processor frame by frame.
pub struct HostSession {
    pub processor: Processor,
    pub messaging: Option<SecureMessaging>,
    rnd_a: u8,
}

impl HostSession {
    pub fn new() -> Self {
        Self::with_card(Card::default())
    }

    pub fn with_card(card: Card) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        Self {
            processor: Processor::with_seed(card, 0x5EED),
            messaging: None,
            rnd_a: 0,
        }
    }

    pub fn send(&mut self, ins: u8, data: &[u8]) -> ResponseApdu {
        let frame = CommandApdu::native(ins, data.to_vec())
            .encode()
            .expect("encode command");
        self.raw(&frame)
    }

    pub fn raw(&mut self, frame: &[u8]) -> ResponseApdu {
        ResponseApdu::parse(&self.processor.process(frame)).expect("response frame")
    }

    pub fn status(&mut self, ins: u8, data: &[u8]) -> StatusWord {
        self.send(ins, data).status
    }

    /// Send a command that must succeed in one frame; returns its data.
    pub fn ok(&mut self, ins: u8, data: &[u8]) -> Vec<u8> {
        let response = self.send(ins, data);
        assert_eq!(response.status, OK, "instruction {ins:#04x}");
        response.data
    }

    /// Send a command and follow additional frames until the last one.
    pub fn collect(&mut self, ins: u8, data: &[u8]) -> (Vec<Vec<u8>>, StatusWord) {
        let mut frames = Vec::new();
        let mut response = self.send(ins, data);
        while response.status == MORE {
            frames.push(response.data);
            response = self.send(0xAF, &[]);
        }
        frames.push(response.data);
        (frames, response.status)
    }

    /// Run both authentication phases. Errors carry the failing status word.
    pub fn authenticate(
        &mut self,
        key_no: u8,
        key: &DesfireKey,
        mode: AuthMode,
    ) -> Result<(), StatusWord> {
        self.authenticate_with(key_no, key, mode, |_| {})
    }

    /// Authentication whose reader token passes through `tamper` first.
    pub fn authenticate_with(
        &mut self,
        key_no: u8,
        key: &DesfireKey,
        mode: AuthMode,
        tamper: impl FnOnce(&mut Vec<u8>),
    ) -> Result<(), StatusWord> {
        self.messaging = None;
        let ins = match mode {
            AuthMode::Legacy => 0x0A,
            AuthMode::Iso => 0x1A,
            AuthMode::Aes => 0xAA,
        };
        let first = self.send(ins, &[key_no]);
        if first.status != MORE {
            return Err(first.status);
        }
        let mut reader = ReaderHandshake::new(key, mode).expect("reader key");
        self.rnd_a = self.rnd_a.wrapping_add(0x11);
        let rnd_a = vec![self.rnd_a; reader.challenge_len()];
        let mut token = reader.respond(&first.data, &rnd_a).expect("reader token");
        tamper(&mut token);
        let second = self.send(0xAF, &token);
        if second.status != OK {
            return Err(second.status);
        }
        self.messaging = Some(reader.finish(&second.data).expect("card proof"));
        Ok(())
    }

    pub fn session_key(&self) -> &SecureMessaging {
        self.messaging.as_ref().expect("authenticated")
    }

    /// Change key `key_no` while authenticated with that same key.
    pub fn change_own_key(&mut self, key_no: u8, new: &DesfireKey) -> StatusWord {
        let mut plain = new.material().to_vec();
        plain.push(new.version());
        let cryptogram = self.session_key().encrypt(&plain).expect("seal key");
        let mut data = vec![key_no];
        data.extend(cryptogram);
        self.status(0xC4, &data)
    }

    /// Change another key slot, XORing the new key with `old`.
    pub fn change_other_key(&mut self, key_no: u8, old: &[u8], new: &DesfireKey) -> StatusWord {
        let messaging = self.session_key();
        let checksum = messaging.checksum();
        let mut body: Vec<u8> = new
            .material()
            .iter()
            .zip(old)
            .map(|(a, b)| a ^ b)
            .collect();
        body.push(new.version());
        let mut buf = body.clone();
        buf.extend(checksum.compute(&body));
        buf.extend(checksum.compute(new.material()));
        let cryptogram = messaging.seal(buf).expect("seal key");
        let mut data = vec![key_no];
        data.extend(cryptogram);
        self.status(0xC4, &data)
    }

    /// Create `APP` with two-key 3DES keys and select it.
    pub fn enter_app(&mut self, settings: u8, key_count: u8) {
        self.ok(0xCA, &[APP[0], APP[1], APP[2], settings, key_count]);
        self.ok(0x5A, &APP);
    }

    /// Free-access plain standard data file of `size` bytes.
    pub fn create_std_file(&mut self, id: u8, size: u32) {
        let s = size.to_le_bytes();
        self.ok(0xCD, &[id, 0x00, 0xEE, 0xEE, s[0], s[1], s[2]]);
    }

    pub fn create_backup_file(&mut self, id: u8, size: u32) {
        let s = size.to_le_bytes();
        self.ok(0xCB, &[id, 0x00, 0xEE, 0xEE, s[0], s[1], s[2]]);
    }

    pub fn create_value_file(&mut self, id: u8, lower: i32, upper: i32, value: i32, flags: u8) {
        let mut data = vec![id, 0x00, 0xEE, 0xEE];
        data.extend(lower.to_le_bytes());
        data.extend(upper.to_le_bytes());
        data.extend(value.to_le_bytes());
        data.push(flags);
        self.ok(0xCC, &data);
    }

    pub fn create_record_file(&mut self, id: u8, cyclic: bool, record_size: u32, max: u32) {
        let s = record_size.to_le_bytes();
        let m = max.to_le_bytes();
        let ins = if cyclic { 0xC0 } else { 0xC1 };
        self.ok(ins, &[id, 0x00, 0xEE, 0xEE, s[0], s[1], s[2], m[0], m[1], m[2]]);
    }
}

pub fn zero_des_key() -> DesfireKey {
    DesfireKey::zero(KeyType::TripleDes)
}

/// `fid offset(3) len(3)` access header.
pub fn access(file_id: u8, offset: u32, len: u32) -> Vec<u8> {
    let mut out = vec![file_id];
    out.extend_from_slice(&offset.to_le_bytes()[..3]);
    out.extend_from_slice(&len.to_le_bytes()[..3]);
    out
}
