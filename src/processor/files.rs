// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: File management instructions inside the selected application.
// Author: Lukas Bower

use desfire_codec::OutboundChunker;
use log::info;

use super::{expect_len, ok, ok_with, u24, CommandResult, Processor};
use crate::error::CommandError;
use crate::file::{
    BackupFile, CommMode, DataFile, File, FileContent, FileSettings, RecordFile, ValueFile,
};
use crate::permission::AccessRights;
use crate::value::Value;

/// Whole ISO file ids per frame.
const ISO_IDS_FRAME_LEN: usize = 58;

/// Leading fields shared by every create-file command.
struct FileHeader {
    id: u8,
    settings: FileSettings,
}

/// Split `fid [iso(2)] comm access(2)` off the front of `data`; the ISO id
/// is present when `data` has the longer of the two accepted lengths.
fn parse_header(data: &[u8], with_iso: bool) -> (FileHeader, &[u8]) {
    let id = data[0];
    let (iso_id, rest) = if with_iso {
        (Some(u16::from_le_bytes([data[1], data[2]])), &data[3..])
    } else {
        (None, &data[1..])
    };
    let header = FileHeader {
        id,
        settings: FileSettings {
            comm: CommMode::from_byte(rest[0]),
            access: AccessRights::from_wire([rest[1], rest[2]]),
            iso_id,
        },
    };
    (header, &rest[3..])
}

impl Processor {
    fn check_listing(&self) -> Result<(), CommandError> {
        let app = self.selected_app()?;
        if app.key_settings().allows_listing(self.session.authenticated) {
            Ok(())
        } else {
            Err(CommandError::PermissionDenied)
        }
    }

    fn check_manage(&self) -> Result<(), CommandError> {
        let app = self.selected_app()?;
        if app.key_settings().allows_manage(self.session.authenticated) {
            Ok(())
        } else {
            Err(CommandError::PermissionDenied)
        }
    }

    fn install_file(&mut self, header: FileHeader, content: FileContent) -> CommandResult {
        let file = File::new(header.id, header.settings, content);
        if file.capacity() > self.card.free_memory() {
            return Err(CommandError::OutOfEeprom);
        }
        let kind = file.kind();
        self.selected_app_mut()?.insert_file(file)?;
        info!("{kind:?} file {} created", header.id);
        ok()
    }

    pub(super) fn get_file_ids(&mut self, data: &[u8]) -> CommandResult {
        expect_len(data, 0)?;
        self.check_listing()?;
        ok_with(self.selected_app()?.file_ids())
    }

    pub(super) fn get_iso_file_ids(&mut self, data: &[u8]) -> CommandResult {
        expect_len(data, 0)?;
        self.check_listing()?;
        let ids: Vec<u8> = self
            .selected_app()?
            .files()
            .filter_map(|file| file.settings().iso_id)
            .flat_map(u16::to_le_bytes)
            .collect();
        Ok(self.send_chunked(OutboundChunker::with_frame_len(ids, ISO_IDS_FRAME_LEN)))
    }

    pub(super) fn get_file_settings(&mut self, data: &[u8]) -> CommandResult {
        expect_len(data, 1)?;
        self.check_listing()?;
        ok_with(self.selected_app()?.file(data[0])?.settings_payload())
    }

    pub(super) fn change_file_settings(&mut self, data: &[u8]) -> CommandResult {
        expect_len(data, 4)?;
        let authenticated = self.session.authenticated;
        let file = self.selected_app_mut()?.file_mut(data[0])?;
        if !file.settings().access.can_change(authenticated) {
            return Err(CommandError::PermissionDenied);
        }
        file.change_settings(
            CommMode::from_byte(data[1]),
            AccessRights::from_wire([data[2], data[3]]),
        );
        info!("settings of file {} changed", data[0]);
        ok()
    }

    pub(super) fn create_data_file(&mut self, data: &[u8], backup: bool) -> CommandResult {
        let with_iso = match data.len() {
            7 => false,
            9 => true,
            _ => return Err(CommandError::Length),
        };
        self.check_manage()?;
        let (header, rest) = parse_header(data, with_iso);
        let size = u24(rest);
        let content = if backup {
            FileContent::BackupData(BackupFile::new(size)?)
        } else {
            FileContent::StandardData(DataFile::new(size)?)
        };
        self.install_file(header, content)
    }

    pub(super) fn create_value_file(&mut self, data: &[u8]) -> CommandResult {
        expect_len(data, 17)?;
        self.check_manage()?;
        let (header, rest) = parse_header(data, false);
        let lower = Value::from_wire(&rest[0..4]).map_err(|_| CommandError::Length)?;
        let upper = Value::from_wire(&rest[4..8]).map_err(|_| CommandError::Length)?;
        let value = Value::from_wire(&rest[8..12]).map_err(|_| CommandError::Length)?;
        let content = FileContent::Value(ValueFile::new(lower, upper, value, rest[12])?);
        self.install_file(header, content)
    }

    pub(super) fn create_record_file(&mut self, data: &[u8], cyclic: bool) -> CommandResult {
        let with_iso = match data.len() {
            10 => false,
            12 => true,
            _ => return Err(CommandError::Length),
        };
        self.check_manage()?;
        let (header, rest) = parse_header(data, with_iso);
        let records = RecordFile::new(u24(&rest[0..3]), u24(&rest[3..6]))?;
        let content = if cyclic {
            FileContent::CyclicRecord(records)
        } else {
            FileContent::LinearRecord(records)
        };
        self.install_file(header, content)
    }

    pub(super) fn delete_file(&mut self, data: &[u8]) -> CommandResult {
        expect_len(data, 1)?;
        self.check_manage()?;
        self.selected_app_mut()?.remove_file(data[0])?;
        info!("file {} deleted", data[0]);
        ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_with_and_without_iso_id() {
        let (plain, rest) = parse_header(&[3, 0x03, 0x12, 0x34, 0x20, 0, 0], false);
        assert_eq!(plain.id, 3);
        assert_eq!(plain.settings.comm, CommMode::Enciphered);
        assert_eq!(plain.settings.iso_id, None);
        assert_eq!(rest, &[0x20, 0, 0]);

        let (iso, rest) = parse_header(&[4, 0x02, 0xE1, 0x00, 0xEE, 0xEE, 8, 0, 0], true);
        assert_eq!(iso.settings.iso_id, Some(0xE102));
        assert_eq!(iso.settings.comm, CommMode::Plain);
        assert_eq!(iso.settings.access, AccessRights::free());
        assert_eq!(u24(rest), 8);
    }
}
