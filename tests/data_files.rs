// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Standard and backup data files over plain, MACed and enciphered links.
// Author: Lukas Bower

mod common;

use common::{access, zero_des_key, HostSession, MORE, OK};
use desfire_codec::StatusWord;
use desfire_crypto::AuthMode;

#[test]
fn chained_write_reads_back_over_three_frames() {
    let mut host = HostSession::new();
    host.enter_app(0x0F, 0x01);
    host.create_std_file(1, 150);
    let payload: Vec<u8> = (0..150u32).map(|n| (n * 7 % 251) as u8).collect();

    let mut first = access(1, 0, 150);
    first.extend_from_slice(&payload[..41]);
    assert_eq!(host.status(0x3D, &first), MORE);
    assert_eq!(host.status(0xAF, &payload[41..100]), MORE);
    assert_eq!(host.status(0xAF, &payload[100..]), OK);

    let (frames, status) = host.collect(0x8D, &access(1, 0, 0));
    assert_eq!(status, OK);
    assert_eq!(frames.len(), 3);
    assert!(frames[..2].iter().all(|frame| frame.len() == 59));
    assert_eq!(frames.concat(), payload);
}

#[test]
fn read_window_limits() {
    let mut host = HostSession::new();
    host.enter_app(0x0F, 0x01);
    host.create_std_file(2, 16);
    let mut write = access(2, 4, 3);
    write.extend_from_slice(&[0xA1, 0xA2, 0xA3]);
    host.ok(0x3D, &write);

    assert_eq!(host.ok(0x8D, &access(2, 3, 5)), vec![0, 0xA1, 0xA2, 0xA3, 0]);
    assert_eq!(host.ok(0x8D, &access(2, 12, 0)).len(), 4);
    assert_eq!(host.status(0x8D, &access(2, 12, 5)), StatusWord::BOUNDARY_ERROR);
    assert_eq!(host.status(0x8D, &access(9, 0, 1)), StatusWord::FILE_NOT_FOUND);
    assert_eq!(host.status(0x8D, &[2, 0, 0]), StatusWord::LENGTH_ERROR);

    let mut overflow = access(2, 14, 3);
    overflow.extend_from_slice(&[1, 2, 3]);
    assert_eq!(host.status(0x3D, &overflow), StatusWord::BOUNDARY_ERROR);
}

#[test]
fn backup_file_needs_commit() {
    let mut host = HostSession::new();
    host.enter_app(0x0F, 0x01);
    host.create_backup_file(3, 8);
    let mut write = access(3, 0, 4);
    write.extend_from_slice(b"DESF");
    host.ok(0x3D, &write);
    assert_eq!(host.ok(0x8D, &access(3, 0, 4)), vec![0; 4]);
    host.ok(0xC7, &[]);
    assert_eq!(host.ok(0x8D, &access(3, 0, 4)), b"DESF".to_vec());
}

#[test]
fn enciphered_file_round_trips_under_session_key() {
    let mut host = HostSession::new();
    host.enter_app(0x0F, 0x01);
    host.ok(0xCD, &[4, 0x03, 0x00, 0x00, 32, 0, 0]);
    assert_eq!(host.status(0x8D, &access(4, 0, 0)), StatusWord::PERMISSION_DENIED);

    host.authenticate(0, &zero_des_key(), AuthMode::Iso)
        .expect("key 0");
    let secret: Vec<u8> = (0..20).collect();
    let mut write = access(4, 6, 20);
    write.extend(host.session_key().encrypt(&secret).expect("seal"));
    host.ok(0x3D, &write);

    let sealed = host.ok(0x8D, &access(4, 6, 20));
    assert_eq!(host.session_key().decrypt(&sealed).expect("open"), secret);

    let mut tampered = access(4, 0, 4);
    let mut cryptogram = host.session_key().encrypt(&[9; 4]).expect("seal");
    cryptogram[0] ^= 0x01;
    tampered.extend(cryptogram);
    assert_eq!(host.status(0x3D, &tampered), StatusWord::INTEGRITY_ERROR);
    assert_eq!(host.processor.session().authenticated, None);
}

#[test]
fn maced_file_checks_mac() {
    let mut host = HostSession::new();
    host.enter_app(0x0F, 0x01);
    host.ok(0xCD, &[5, 0x01, 0x00, 0x00, 8, 0, 0]);
    host.authenticate(0, &zero_des_key(), AuthMode::Legacy)
        .expect("key 0");

    let data = [1u8, 2, 3, 4, 5, 6, 7, 8];
    let mut write = access(5, 0, 8);
    write.extend_from_slice(&data);
    write.extend(host.session_key().mac(&data).expect("mac"));
    host.ok(0x3D, &write);

    let framed = host.ok(0x8D, &access(5, 0, 0));
    assert_eq!(
        host.session_key().verify_mac(&framed).expect("mac verifies"),
        &data
    );

    let mut bad = access(5, 0, 2);
    bad.extend_from_slice(&[1, 2, 0, 0, 0, 0]);
    assert_eq!(host.status(0x3D, &bad), StatusWord::INTEGRITY_ERROR);
}

#[test]
fn file_settings_and_ids() {
    let mut host = HostSession::new();
    host.enter_app(0x0F, 0x01);
    host.ok(0xCD, &[7, 0x04, 0xE1, 0x00, 0x12, 0x34, 16, 0, 0]);
    host.create_std_file(2, 8);
    assert_eq!(host.ok(0x6F, &[]), vec![2, 7]);
    assert_eq!(host.ok(0x61, &[]), vec![0x04, 0xE1]);
    assert_eq!(
        host.ok(0xF5, &[7]),
        vec![0x00, 0x00, 0x12, 0x34, 16, 0, 0]
    );
    host.ok(0x5F, &[2, 0x01, 0xEE, 0xEE]);
    assert_eq!(host.ok(0xF5, &[2])[1], 0x01);
    assert_eq!(
        host.status(0xCD, &[2, 0x00, 0xEE, 0xEE, 8, 0, 0]),
        StatusWord::DUPLICATE_ERROR
    );
    host.ok(0xDF, &[2]);
    assert_eq!(host.ok(0x6F, &[]), vec![7]);
    assert_eq!(host.status(0xDF, &[2]), StatusWord::FILE_NOT_FOUND);
}

#[test]
fn file_capacity_counts_against_free_memory() {
    let mut card = desfire_emu::Card::default();
    card.set_eeprom_size(64);
    let mut host = HostSession::with_card(card);
    host.enter_app(0x0F, 0x01);
    host.create_std_file(1, 48);
    assert_eq!(host.ok(0x6E, &[]), vec![16, 0, 0]);
    assert_eq!(
        host.status(0xCD, &[2, 0x00, 0xEE, 0xEE, 17, 0, 0]),
        StatusWord::OUT_OF_EEPROM
    );
}
