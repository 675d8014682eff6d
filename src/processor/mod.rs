// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Frame-level instruction dispatch, continuation handling and payload protection.
// Author: Lukas Bower

//! Instruction processor.
//!
//! [`Processor::process`] takes one command frame and returns one response
//! frame. Handlers return `Result<ResponseApdu, CommandError>`; the status
//! word of a failure is produced once, in [`Processor::respond`], which also
//! applies the recovery policy: every failure drops a pending continuation
//! and authentication or integrity failures end the session.

mod application;
mod auth;
mod data;
pub mod envelope;
mod files;

use std::collections::VecDeque;

use desfire_codec::{
    CommandApdu, InboundAccumulator, Instruction, OutboundChunker, ResponseApdu, StatusWord,
};
use desfire_crypto::{AuthMode, SecureMessaging, MAC_LEN};
use log::{debug, error, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::card::Card;
use crate::directory::{Application, KeySettings};
use crate::error::CommandError;
use crate::file::CommMode;
use crate::session::{Continuation, Selection, Session, WriteKind, WriteTarget};

/// Shortest frame accepted: class, instruction, two parameters and a length byte.
pub const MIN_FRAME_LEN: usize = 5;

pub(crate) type CommandResult = Result<ResponseApdu, CommandError>;

/// DESFire command processor bound to one card.
#[derive(Debug)]
pub struct Processor {
    card: Card,
    session: Session,
    rng: StdRng,
}

impl Processor {
    /// Processor drawing challenges from OS entropy.
    #[must_use]
    pub fn new(card: Card) -> Self {
        Self {
            card,
            session: Session::default(),
            rng: StdRng::from_entropy(),
        }
    }

    /// Processor with a reproducible challenge stream.
    #[must_use]
    pub fn with_seed(card: Card, seed: u64) -> Self {
        Self {
            card,
            session: Session::default(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Card state.
    #[must_use]
    pub fn card(&self) -> &Card {
        &self.card
    }

    /// Session state.
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Swap in another card and start a fresh session.
    pub fn replace_card(&mut self, card: Card) -> Card {
        self.reset_session();
        std::mem::replace(&mut self.card, card)
    }

    /// Consume the processor, keeping the card.
    #[must_use]
    pub fn into_card(self) -> Card {
        self.card
    }

    /// Forget selection, authentication and any continuation.
    pub fn reset_session(&mut self) {
        self.session = Session::default();
    }

    /// Process one raw command frame into one raw response frame.
    pub fn process(&mut self, frame: &[u8]) -> Vec<u8> {
        self.respond(frame).encode()
    }

    /// Process one raw command frame.
    pub fn respond(&mut self, frame: &[u8]) -> ResponseApdu {
        let result = if frame.len() < MIN_FRAME_LEN {
            Err(CommandError::Length)
        } else {
            CommandApdu::parse(frame)
                .map_err(CommandError::from)
                .and_then(|apdu| self.execute(apdu))
        };
        match result {
            Ok(response) => response,
            Err(err) => self.fail(err),
        }
    }

    /// Execute a decoded command.
    pub fn execute(&mut self, apdu: CommandApdu) -> CommandResult {
        if !self.session.continuation.is_idle() && apdu.ins != u8::from(Instruction::Continue) {
            warn!(
                "instruction {:#04x} interrupted a multi-frame exchange",
                apdu.ins
            );
            self.session.continuation = Continuation::Idle;
            self.session.reset_authentication();
            return Err(CommandError::CommandAborted);
        }
        let apdu = if apdu.is_secure_messaging() {
            envelope::unwrap(self.session.messaging.as_ref(), &apdu)?
        } else {
            apdu
        };
        let ins =
            Instruction::try_from(apdu.ins).map_err(|_| CommandError::IllegalCommand(apdu.ins))?;
        debug!("{} lc={}", ins.mnemonic(), apdu.lc());
        self.dispatch(ins, &apdu.data)
    }

    fn fail(&mut self, err: CommandError) -> ResponseApdu {
        self.session.continuation = Continuation::Idle;
        if err.resets_authentication() {
            warn!("{err}; session security reset");
            self.session.reset_authentication();
        } else if matches!(err, CommandError::Internal(_)) {
            error!("{err}");
        } else {
            debug!("{err}");
        }
        ResponseApdu::status_only(err.status())
    }

    fn dispatch(&mut self, ins: Instruction, data: &[u8]) -> CommandResult {
        use Instruction::*;
        match ins {
            Authenticate => self.authenticate(AuthMode::Legacy, data),
            AuthenticateIso => self.authenticate(AuthMode::Iso, data),
            AuthenticateAes => self.authenticate(AuthMode::Aes, data),
            ChangeKeySettings => self.change_key_settings(data),
            SetConfiguration => self.set_configuration(data),
            ChangeKey => self.change_key(data),
            GetKeyVersion => self.get_key_version(data),
            GetKeySettings => self.get_key_settings(data),
            CreateApplication => self.create_application(data),
            DeleteApplication => self.delete_application(data),
            GetApplicationIds => self.get_application_ids(data),
            FreeMemory => self.free_memory(data),
            GetDfNames => self.get_df_names(data),
            SelectApplication => self.select_application(data),
            FormatPicc => self.format_picc(data),
            GetVersion => self.get_version(data),
            GetCardUid => self.get_card_uid(data),
            GetFileIds => self.get_file_ids(data),
            GetIsoFileIds => self.get_iso_file_ids(data),
            GetFileSettings => self.get_file_settings(data),
            ChangeFileSettings => self.change_file_settings(data),
            CreateStdDataFile => self.create_data_file(data, false),
            CreateBackupDataFile => self.create_data_file(data, true),
            CreateValueFile => self.create_value_file(data),
            CreateLinearRecordFile => self.create_record_file(data, false),
            CreateCyclicRecordFile => self.create_record_file(data, true),
            DeleteFile => self.delete_file(data),
            ReadData => self.read_data(data),
            WriteData => self.write(data, WriteKind::Data),
            GetValue => self.get_value(data),
            Credit => self.change_value(data, ValueOp::Credit),
            Debit => self.change_value(data, ValueOp::Debit),
            LimitedCredit => self.change_value(data, ValueOp::LimitedCredit),
            WriteRecord => self.write(data, WriteKind::Record),
            ReadRecords => self.read_records(data),
            ClearRecordFile => self.clear_record_file(data),
            CommitTransaction => self.finish_transaction(data, true),
            AbortTransaction => self.finish_transaction(data, false),
            Continue => self.resume(data),
        }
    }

    fn resume(&mut self, data: &[u8]) -> CommandResult {
        match std::mem::take(&mut self.session.continuation) {
            Continuation::Idle => Err(CommandError::IllegalCommand(Instruction::Continue.into())),
            Continuation::AwaitingAuthPhase2 { key_no, challenge } => {
                self.finish_authentication(key_no, &challenge, data)
            }
            Continuation::AwaitingMoreWriteData {
                target,
                accumulator,
            } => self.continue_write(target, accumulator, data),
            Continuation::AwaitingMoreReadFrames { chunker } => Ok(self.send_chunked(chunker)),
            Continuation::QueuedFrames { frames } => Ok(self.send_queued(frames)),
        }
    }

    /// Hand out the next chunk, parking the rest in the session.
    fn send_chunked(&mut self, mut chunker: OutboundChunker) -> ResponseApdu {
        let chunk = chunker.next_chunk();
        if chunker.is_exhausted() {
            ResponseApdu::new(chunk, StatusWord::OPERATION_OK)
        } else {
            self.session.continuation = Continuation::AwaitingMoreReadFrames { chunker };
            ResponseApdu::new(chunk, StatusWord::ADDITIONAL_FRAME)
        }
    }

    fn send_queued(&mut self, mut frames: VecDeque<Vec<u8>>) -> ResponseApdu {
        let frame = frames.pop_front().unwrap_or_default();
        if frames.is_empty() {
            ResponseApdu::new(frame, StatusWord::OPERATION_OK)
        } else {
            self.session.continuation = Continuation::QueuedFrames { frames };
            ResponseApdu::new(frame, StatusWord::ADDITIONAL_FRAME)
        }
    }

    fn await_more(&mut self, target: WriteTarget, accumulator: InboundAccumulator) -> ResponseApdu {
        self.session.continuation = Continuation::AwaitingMoreWriteData {
            target,
            accumulator,
        };
        ResponseApdu::status_only(StatusWord::ADDITIONAL_FRAME)
    }

    fn selected_app(&self) -> Result<&Application, CommandError> {
        let slot = self
            .session
            .application_slot()
            .ok_or(CommandError::PermissionDenied)?;
        self.card.application(slot)
    }

    fn selected_app_mut(&mut self) -> Result<&mut Application, CommandError> {
        let slot = self
            .session
            .application_slot()
            .ok_or(CommandError::PermissionDenied)?;
        self.card.application_mut(slot)
    }

    fn require_root(&self) -> Result<(), CommandError> {
        match self.session.selection {
            Selection::Root => Ok(()),
            Selection::Application(_) => Err(CommandError::PermissionDenied),
        }
    }

    fn directory_settings(&self) -> Result<KeySettings, CommandError> {
        match self.session.selection {
            Selection::Root => Ok(self.card.key_settings()),
            Selection::Application(slot) => Ok(self.card.application(slot)?.key_settings()),
        }
    }

    fn messaging(&self) -> Result<&SecureMessaging, CommandError> {
        self.session
            .messaging
            .as_ref()
            .ok_or(CommandError::PermissionDenied)
    }

    /// Apply `comm` to an outbound payload.
    fn protect(&self, payload: Vec<u8>, comm: CommMode) -> Result<Vec<u8>, CommandError> {
        match comm {
            CommMode::Plain => Ok(payload),
            CommMode::Maced => {
                let mac = self.messaging()?.mac(&payload)?;
                let mut framed = payload;
                framed.extend(mac);
                Ok(framed)
            }
            CommMode::Enciphered => Ok(self.messaging()?.encrypt(&payload)?),
        }
    }

    /// Wire size of a `len`-byte inbound payload under `comm`.
    fn inbound_wire_len(&self, len: usize, comm: CommMode) -> Result<usize, CommandError> {
        Ok(match comm {
            CommMode::Plain => len,
            CommMode::Maced => len + MAC_LEN,
            CommMode::Enciphered => {
                let messaging = self.messaging()?;
                let block = messaging.cipher().block_len();
                (len + messaging.checksum().len()).div_ceil(block) * block
            }
        })
    }

    /// Strip `comm` from an inbound payload expected to carry `len` plain bytes.
    fn unprotect(&self, wire: &[u8], len: usize, comm: CommMode) -> Result<Vec<u8>, CommandError> {
        if wire.len() != self.inbound_wire_len(len, comm)? {
            return Err(CommandError::Length);
        }
        match comm {
            CommMode::Plain => Ok(wire.to_vec()),
            CommMode::Maced => Ok(self.messaging()?.verify_mac(wire)?.to_vec()),
            CommMode::Enciphered => {
                let messaging = self.messaging()?;
                let checksum = messaging.checksum();
                Ok(messaging.open(wire, |candidate| {
                    checksum
                        .split_verified(candidate)
                        .filter(|plain| plain.len() == len)
                        .map(<[u8]>::to_vec)
                })?)
            }
        }
    }
}

/// Counter mutation requested by credit, debit or limited credit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ValueOp {
    Credit,
    Debit,
    LimitedCredit,
}

fn expect_len(data: &[u8], len: usize) -> Result<(), CommandError> {
    if data.len() == len {
        Ok(())
    } else {
        Err(CommandError::Length)
    }
}

fn u24(bytes: &[u8]) -> usize {
    usize::from(bytes[0]) | usize::from(bytes[1]) << 8 | usize::from(bytes[2]) << 16
}

fn ok() -> CommandResult {
    Ok(ResponseApdu::status_only(StatusWord::OPERATION_OK))
}

fn ok_with(data: Vec<u8>) -> CommandResult {
    Ok(ResponseApdu::new(data, StatusWord::OPERATION_OK))
}
