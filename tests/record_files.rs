// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Linear and cyclic record files through write, read, clear and commit.
// Author: Lukas Bower

mod common;

use common::{access, HostSession};
use desfire_codec::StatusWord;

fn append(host: &mut HostSession, file_id: u8, record: &[u8]) -> StatusWord {
    let mut data = access(file_id, 0, record.len() as u32);
    data.extend_from_slice(record);
    host.status(0x3B, &data)
}

#[test]
fn linear_file_fills_then_refuses() {
    let mut host = HostSession::new();
    host.enter_app(0x0F, 0x01);
    host.create_record_file(1, false, 4, 2);

    assert_eq!(host.status(0xBB, &access(1, 0, 0)), StatusWord::BOUNDARY_ERROR);
    for record in [[1u8; 4], [2u8; 4]] {
        assert_eq!(append(&mut host, 1, &record), StatusWord::OPERATION_OK);
        host.ok(0xC7, &[]);
    }
    assert_eq!(append(&mut host, 1, &[3; 4]), StatusWord::BOUNDARY_ERROR);

    assert_eq!(host.ok(0xBB, &access(1, 0, 0)), [[1u8; 4], [2u8; 4]].concat());
    assert_eq!(host.ok(0xBB, &access(1, 0, 1)), vec![2; 4]);
    assert_eq!(host.ok(0xBB, &access(1, 1, 1)), vec![1; 4]);
    assert_eq!(host.status(0xBB, &access(1, 2, 0)), StatusWord::BOUNDARY_ERROR);
    assert_eq!(host.status(0xBB, &access(1, 0, 3)), StatusWord::BOUNDARY_ERROR);
    assert_eq!(host.ok(0xF5, &[1])[4..], [4, 0, 0, 2, 0, 0, 2, 0, 0]);
}

#[test]
fn cyclic_file_drops_oldest() {
    let mut host = HostSession::new();
    host.enter_app(0x0F, 0x01);
    host.create_record_file(2, true, 2, 3);
    for n in 1..=5u8 {
        assert_eq!(append(&mut host, 2, &[n, n]), StatusWord::OPERATION_OK);
        host.ok(0xC7, &[]);
    }
    assert_eq!(host.ok(0xBB, &access(2, 0, 0)), vec![3, 3, 4, 4, 5, 5]);
}

#[test]
fn partial_record_writes_patch_one_record() {
    let mut host = HostSession::new();
    host.enter_app(0x0F, 0x01);
    host.create_record_file(3, false, 6, 4);
    let mut head = access(3, 0, 2);
    head.extend_from_slice(&[0xAA, 0xBB]);
    host.ok(0x3B, &head);
    let mut tail = access(3, 4, 2);
    tail.extend_from_slice(&[0xCC, 0xDD]);
    host.ok(0x3B, &tail);
    assert_eq!(host.status(0xBB, &access(3, 0, 0)), StatusWord::BOUNDARY_ERROR);
    host.ok(0xC7, &[]);
    assert_eq!(
        host.ok(0xBB, &access(3, 0, 0)),
        vec![0xAA, 0xBB, 0, 0, 0xCC, 0xDD]
    );
    let mut too_long = access(3, 3, 4);
    too_long.extend_from_slice(&[0; 4]);
    assert_eq!(host.status(0x3B, &too_long), StatusWord::BOUNDARY_ERROR);
}

#[test]
fn clear_blocks_writes_until_commit() {
    let mut host = HostSession::new();
    host.enter_app(0x0F, 0x01);
    host.create_record_file(4, false, 1, 2);
    append(&mut host, 4, &[7]);
    append(&mut host, 4, &[8]);
    host.ok(0xC7, &[]);
    assert_eq!(append(&mut host, 4, &[9]), StatusWord::BOUNDARY_ERROR);

    host.ok(0xEB, &[4]);
    assert_eq!(append(&mut host, 4, &[9]), StatusWord::PERMISSION_DENIED);
    assert_eq!(host.ok(0xBB, &access(4, 0, 0)), vec![7, 8]);
    host.ok(0xC7, &[]);
    assert_eq!(host.status(0xBB, &access(4, 0, 0)), StatusWord::BOUNDARY_ERROR);
    assert_eq!(append(&mut host, 4, &[9]), StatusWord::OPERATION_OK);
    host.ok(0xC7, &[]);
    assert_eq!(host.ok(0xBB, &access(4, 0, 0)), vec![9]);

    host.create_std_file(5, 4);
    assert_eq!(host.status(0xEB, &[5]), StatusWord::PARAMETER_ERROR);
}
