// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Card-level instructions: applications, selection, format and identification.
// Author: Lukas Bower

use std::collections::VecDeque;

use desfire_codec::OutboundChunker;
use log::info;

use super::{expect_len, ok, ok_with, CommandResult, Processor};
use crate::card::ROOT_AID;
use crate::directory::Application;
use crate::error::CommandError;
use crate::file::u24_le;
use crate::session::Selection;

/// Key settings bit announcing an ISO file identifier in create application.
const ISO_FID_PRESENT: u8 = 0x20;
const CREATE_APPLICATION_MIN: usize = 5;
const CREATE_APPLICATION_MAX: usize = 23;
/// AIDs per get application IDs frame.
const AIDS_PER_FRAME: usize = 19;

const VERSION_HARDWARE: [u8; 7] = [0x04, 0x01, 0x01, 0x01, 0x00, 0x1A, 0x05];
const VERSION_SOFTWARE: [u8; 7] = [0x04, 0x01, 0x01, 0x01, 0x03, 0x1A, 0x05];
const VERSION_PRODUCTION: [u8; 7] = [0x00, 0x00, 0x00, 0x00, 0x00, 0x39, 0x08];

fn aid(data: &[u8]) -> [u8; 3] {
    [data[0], data[1], data[2]]
}

impl Processor {
    pub(super) fn select_application(&mut self, data: &[u8]) -> CommandResult {
        expect_len(data, 3)?;
        let aid = aid(data);
        let selection = if aid == ROOT_AID {
            Selection::Root
        } else {
            Selection::Application(self.card.slot_of(aid)?)
        };
        self.session.select(selection);
        ok()
    }

    pub(super) fn create_application(&mut self, data: &[u8]) -> CommandResult {
        if !(CREATE_APPLICATION_MIN..=CREATE_APPLICATION_MAX).contains(&data.len()) {
            return Err(CommandError::Length);
        }
        self.require_root()?;
        if !self
            .card
            .key_settings()
            .allows_manage(self.session.authenticated)
        {
            return Err(CommandError::PermissionDenied);
        }
        let (settings, key_config) = (data[3], data[4]);
        let (iso_fid, df_name) = if key_config & ISO_FID_PRESENT != 0 {
            if data.len() < 7 {
                return Err(CommandError::Length);
            }
            (Some(u16::from_le_bytes([data[5], data[6]])), data[7..].to_vec())
        } else {
            if data.len() != CREATE_APPLICATION_MIN {
                return Err(CommandError::Length);
            }
            (None, Vec::new())
        };
        if iso_fid.is_some() && self.card.applications().any(|app| app.iso_fid() == iso_fid) {
            return Err(CommandError::Duplicate);
        }
        let app = Application::new(
            aid(data),
            settings,
            key_config,
            self.card.default_key(),
            iso_fid,
            df_name,
        )?;
        self.card.create_application(app)?;
        ok()
    }

    pub(super) fn delete_application(&mut self, data: &[u8]) -> CommandResult {
        expect_len(data, 3)?;
        let aid = aid(data);
        let slot = self.card.slot_of(aid)?;
        let authenticated = self.session.authenticated;
        let allowed = match self.session.selection {
            Selection::Root => self.card.key_settings().allows_manage(authenticated),
            Selection::Application(selected) => selected == slot && authenticated == Some(0),
        };
        if !allowed {
            return Err(CommandError::PermissionDenied);
        }
        self.card.delete_application(aid)?;
        if self.session.selection == Selection::Application(slot) {
            self.session.select(Selection::Root);
        }
        ok()
    }

    pub(super) fn get_application_ids(&mut self, data: &[u8]) -> CommandResult {
        expect_len(data, 0)?;
        self.require_root()?;
        if !self
            .card
            .key_settings()
            .allows_listing(self.session.authenticated)
        {
            return Err(CommandError::PermissionDenied);
        }
        let ids: Vec<u8> = self.card.applications().flat_map(Application::aid).collect();
        Ok(self.send_chunked(OutboundChunker::with_frame_len(ids, 3 * AIDS_PER_FRAME)))
    }

    pub(super) fn get_df_names(&mut self, data: &[u8]) -> CommandResult {
        expect_len(data, 0)?;
        self.require_root()?;
        if !self
            .card
            .key_settings()
            .allows_listing(self.session.authenticated)
        {
            return Err(CommandError::PermissionDenied);
        }
        let frames: VecDeque<Vec<u8>> = self
            .card
            .applications()
            .filter_map(|app| {
                let fid = app.iso_fid()?;
                let mut frame = app.aid().to_vec();
                frame.extend_from_slice(&fid.to_le_bytes());
                frame.extend_from_slice(app.df_name());
                Some(frame)
            })
            .collect();
        Ok(self.send_queued(frames))
    }

    pub(super) fn free_memory(&mut self, data: &[u8]) -> CommandResult {
        expect_len(data, 0)?;
        ok_with(u24_le(self.card.free_memory()).to_vec())
    }

    pub(super) fn format_picc(&mut self, data: &[u8]) -> CommandResult {
        expect_len(data, 0)?;
        self.require_root()?;
        if !self.card.format_enabled() || self.session.authenticated != Some(0) {
            return Err(CommandError::PermissionDenied);
        }
        self.card.format();
        ok()
    }

    pub(super) fn get_version(&mut self, data: &[u8]) -> CommandResult {
        expect_len(data, 0)?;
        let uid = if self.card.random_uid() {
            [0; 7]
        } else {
            self.card.uid()
        };
        let mut production = uid.to_vec();
        production.extend_from_slice(&VERSION_PRODUCTION);
        let frames = VecDeque::from(vec![
            VERSION_HARDWARE.to_vec(),
            VERSION_SOFTWARE.to_vec(),
            production,
        ]);
        Ok(self.send_queued(frames))
    }

    pub(super) fn get_card_uid(&mut self, data: &[u8]) -> CommandResult {
        expect_len(data, 0)?;
        let sealed = self.messaging()?.encrypt(&self.card.uid())?;
        info!("card uid released to authenticated reader");
        ok_with(sealed)
    }
}
