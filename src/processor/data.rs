// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Data, value and record access instructions plus transaction control.
// Author: Lukas Bower

use desfire_codec::{
    Accumulated, InboundAccumulator, OutboundChunker, FIRST_WRITE_FRAME_DATA, MAX_FRAME_PAYLOAD,
};
use log::{debug, info};

use super::{expect_len, ok, ok_with, u24, CommandResult, Processor, ValueOp};
use crate::error::CommandError;
use crate::file::{File, FileKind};
use crate::session::{WriteKind, WriteTarget};
use crate::value::Value;

/// `fid offset(3) length(3)` prefix of reads and chained writes.
const ACCESS_HEADER_LEN: usize = 7;

impl Processor {
    fn selected_file(&self, id: u8) -> Result<&File, CommandError> {
        self.selected_app()?.file(id)
    }

    pub(super) fn read_data(&mut self, data: &[u8]) -> CommandResult {
        expect_len(data, ACCESS_HEADER_LEN)?;
        let file = self.selected_file(data[0])?;
        if !file.settings().access.can_read(self.session.authenticated) {
            return Err(CommandError::PermissionDenied);
        }
        let payload = file.read_data(u24(&data[1..4]), u24(&data[4..7]))?;
        let comm = self.session.effective_comm(file.settings().comm);
        let payload = self.protect(payload, comm)?;
        Ok(self.send_chunked(OutboundChunker::new(payload)))
    }

    pub(super) fn read_records(&mut self, data: &[u8]) -> CommandResult {
        expect_len(data, ACCESS_HEADER_LEN)?;
        let file = self.selected_file(data[0])?;
        if !file.settings().access.can_read(self.session.authenticated) {
            return Err(CommandError::PermissionDenied);
        }
        let payload = file.read_records(u24(&data[1..4]), u24(&data[4..7]))?;
        let comm = self.session.effective_comm(file.settings().comm);
        let payload = self.protect(payload, comm)?;
        Ok(self.send_chunked(OutboundChunker::new(payload)))
    }

    pub(super) fn write(&mut self, data: &[u8], kind: WriteKind) -> CommandResult {
        if data.len() < ACCESS_HEADER_LEN
            || data.len() - ACCESS_HEADER_LEN > FIRST_WRITE_FRAME_DATA
        {
            return Err(CommandError::Length);
        }
        let (file_id, offset, len) = (data[0], u24(&data[1..4]), u24(&data[4..7]));
        let file = self.selected_file(file_id)?;
        if !file.settings().access.can_write(self.session.authenticated) {
            return Err(CommandError::PermissionDenied);
        }
        if len == 0 {
            return Err(CommandError::Parameter);
        }
        match kind {
            WriteKind::Data => file.check_data_write(offset, len)?,
            WriteKind::Record => file.check_record_write(offset, len)?,
        }
        let comm = self.session.effective_comm(file.settings().comm);
        let target = WriteTarget {
            kind,
            file_id,
            offset,
            len,
            comm,
        };
        let accumulator = InboundAccumulator::new(self.inbound_wire_len(len, comm)?);
        self.continue_write(target, accumulator, &data[ACCESS_HEADER_LEN..])
    }

    pub(super) fn continue_write(
        &mut self,
        target: WriteTarget,
        mut accumulator: InboundAccumulator,
        data: &[u8],
    ) -> CommandResult {
        if data.len() > MAX_FRAME_PAYLOAD {
            return Err(CommandError::Length);
        }
        match accumulator.push(data)? {
            Accumulated::NeedMore { remaining } => {
                debug!("write to file {} awaiting {remaining} bytes", target.file_id);
                Ok(self.await_more(target, accumulator))
            }
            Accumulated::Complete => self.apply_write(target, &accumulator.into_inner()),
        }
    }

    fn apply_write(&mut self, target: WriteTarget, wire: &[u8]) -> CommandResult {
        let plain = self.unprotect(wire, target.len, target.comm)?;
        let app = self.selected_app_mut()?;
        let file = app.file_mut(target.file_id).map_err(|_| {
            CommandError::Internal(format!(
                "file {} vanished while a write was pending",
                target.file_id
            ))
        })?;
        match target.kind {
            WriteKind::Data => file.write_data(target.offset, &plain)?,
            WriteKind::Record => file.write_record(target.offset, &plain)?,
        }
        if file.kind().is_transactional() {
            app.mark_pending(target.file_id);
        }
        ok()
    }

    pub(super) fn get_value(&mut self, data: &[u8]) -> CommandResult {
        expect_len(data, 1)?;
        let file = self.selected_file(data[0])?;
        let counter = file.value()?;
        let access = file.settings().access;
        let authenticated = self.session.authenticated;
        if !(counter.free_get_value()
            || access.can_read(authenticated)
            || access.can_write(authenticated))
        {
            return Err(CommandError::PermissionDenied);
        }
        let payload = counter.value().to_wire().to_vec();
        let comm = self.session.effective_comm(file.settings().comm);
        ok_with(self.protect(payload, comm)?)
    }

    pub(super) fn change_value(&mut self, data: &[u8], op: ValueOp) -> CommandResult {
        let (&file_id, wire) = data.split_first().ok_or(CommandError::Length)?;
        let file = self.selected_file(file_id)?;
        if file.kind() != FileKind::Value {
            return Err(CommandError::Parameter);
        }
        if !file.settings().access.can_write(self.session.authenticated) {
            return Err(CommandError::PermissionDenied);
        }
        let comm = self.session.effective_comm(file.settings().comm);
        let plain = self.unprotect(wire, 4, comm)?;
        let amount = Value::from_wire(&plain).map_err(|_| CommandError::Length)?;
        let app = self.selected_app_mut()?;
        let counter = app.file_mut(file_id)?.value_mut()?;
        match op {
            ValueOp::Credit => counter.credit(amount)?,
            ValueOp::Debit => counter.debit(amount)?,
            ValueOp::LimitedCredit => counter.limited_credit(amount)?,
        }
        app.mark_pending(file_id);
        ok()
    }

    pub(super) fn clear_record_file(&mut self, data: &[u8]) -> CommandResult {
        expect_len(data, 1)?;
        let authenticated = self.session.authenticated;
        let app = self.selected_app_mut()?;
        let file = app.file_mut(data[0])?;
        file.records()?;
        if !file.settings().access.can_write(authenticated) {
            return Err(CommandError::PermissionDenied);
        }
        file.clear_records()?;
        app.mark_pending(data[0]);
        ok()
    }

    /// Commit or abort every pending file in id order. The first file the
    /// session may not write stops the pass; files before it stay done.
    pub(super) fn finish_transaction(&mut self, data: &[u8], commit: bool) -> CommandResult {
        let authenticated = self.session.authenticated;
        let app = self.selected_app_mut()?;
        expect_len(data, 0)?;
        for id in app.pending_ids() {
            let file = app.file_mut(id)?;
            if !file.settings().access.can_write(authenticated) {
                return Err(CommandError::PermissionDenied);
            }
            if commit {
                file.commit();
            } else {
                file.abort();
            }
            app.clear_pending(id);
        }
        if commit {
            info!("transaction committed");
        } else {
            debug!("transaction aborted");
        }
        ok()
    }
}
