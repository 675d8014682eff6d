// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Export a populated card to JSON and continue on the restored copy.
// Author: Lukas Bower

mod common;

use common::{access, zero_des_key, HostSession, APP, OK};
use desfire_crypto::{AuthMode, DesfireKey, KeyType};
use desfire_emu::{CardError, Snapshot, SnapshotError};

#[test]
fn restored_card_keeps_files_and_keys() {
    let mut host = HostSession::new();
    host.enter_app(0x0F, 0x02);
    host.create_std_file(1, 8);
    host.create_value_file(2, 0, 50, 20, 0x00);
    host.create_record_file(3, true, 2, 3);
    let mut write = access(1, 0, 3);
    write.extend_from_slice(b"abc");
    host.ok(0x3D, &write);
    let mut record = access(3, 0, 2);
    record.extend_from_slice(&[4, 2]);
    host.ok(0x3B, &record);
    host.ok(0xC7, &[]);

    host.authenticate(0, &zero_des_key(), AuthMode::Legacy)
        .expect("key 0");
    let new_key = DesfireKey::new(KeyType::TripleDes, &[0x33; 16], 4).expect("key");
    assert_eq!(host.change_other_key(1, &[0u8; 16], &new_key), OK);

    host.ok(0x0C, &[2, 5, 0, 0, 0]);

    let json = Snapshot::capture(host.processor.card())
        .to_json()
        .expect("export");
    let card = Snapshot::from_json(&json)
        .expect("decode")
        .restore()
        .expect("restore");

    let mut restored = HostSession::with_card(card);
    restored.ok(0x5A, &APP);
    assert_eq!(restored.ok(0x6F, &[]), vec![1, 2, 3]);
    assert_eq!(restored.ok(0x8D, &access(1, 0, 3)), b"abc".to_vec());
    assert_eq!(restored.ok(0xBB, &access(3, 0, 0)), vec![4, 2]);
    assert_eq!(restored.ok(0x6C, &[2]), 20i32.to_le_bytes().to_vec());
    assert_eq!(restored.ok(0x64, &[1]), vec![4]);
    restored
        .authenticate(1, &new_key, AuthMode::Legacy)
        .expect("changed key survives");
}

#[test]
fn tampered_snapshot_is_inconsistent() {
    let mut host = HostSession::new();
    host.ok(0xCA, &[APP[0], APP[1], APP[2], 0x0F, 0x01]);
    let mut snapshot = Snapshot::capture(host.processor.card());
    snapshot.card.set_max_applications(0);
    let json = snapshot.to_json().expect("export");
    assert!(matches!(
        Snapshot::from_json(&json).expect("decode").restore(),
        Err(SnapshotError::Inconsistent(CardError::SlotOutOfRange(1)))
    ));
}
