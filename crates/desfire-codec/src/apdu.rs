// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Parse and encode ISO 7816-4 command and response APDUs.
// Author: Lukas Bower

//! Command and response APDU encode/decode helpers.

use crate::types::{CodecError, Instruction, StatusWord};

/// Class byte used by natively wrapped DESFire commands.
pub const DESFIRE_CLA: u8 = 0x90;
/// Class byte used by inter-industry commands such as SELECT.
pub const ISO_CLA: u8 = 0x00;
/// Class bits announcing a secure-messaging envelope.
pub const SECURE_MESSAGING_CLA_MASK: u8 = 0x0C;

const SELECT_INS: u8 = 0xA4;
const SELECT_BY_NAME: u8 = 0x04;
const MAX_SHORT_LC: usize = 0xFF;
const MAX_EXTENDED_LC: usize = 0xFFFF;

/// Decoded command APDU `[cla][ins][p1][p2][lc][data...][le]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandApdu {
    /// Class byte.
    pub cla: u8,
    /// Instruction byte.
    pub ins: u8,
    /// First parameter byte.
    pub p1: u8,
    /// Second parameter byte.
    pub p2: u8,
    /// Command data field.
    pub data: Vec<u8>,
    /// Expected response length, `Some(0)` meaning "as much as available".
    pub le: Option<usize>,
}

impl CommandApdu {
    /// Build a command with an explicit class and parameters.
    #[must_use]
    pub fn new(cla: u8, ins: u8, p1: u8, p2: u8, data: Vec<u8>) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data,
            le: Some(0),
        }
    }

    /// Build an ISO-wrapped native DESFire command (`90 ins 00 00 lc data 00`).
    #[must_use]
    pub fn native(ins: impl Into<u8>, data: impl Into<Vec<u8>>) -> Self {
        Self::new(DESFIRE_CLA, ins.into(), 0, 0, data.into())
    }

    /// Build the continuation command carrying `data`.
    #[must_use]
    pub fn continuation(data: impl Into<Vec<u8>>) -> Self {
        Self::native(Instruction::Continue, data)
    }

    /// Build an ISO SELECT by DF name for the supplied application identifier.
    #[must_use]
    pub fn select_by_name(aid: &[u8]) -> Self {
        Self::new(ISO_CLA, SELECT_INS, SELECT_BY_NAME, 0x00, aid.to_vec())
    }

    /// Parse a raw command frame.
    pub fn parse(frame: &[u8]) -> Result<Self, CodecError> {
        if frame.len() < 4 {
            return Err(CodecError::Truncated(frame.len()));
        }
        let (cla, ins, p1, p2) = (frame[0], frame[1], frame[2], frame[3]);
        let body = &frame[4..];
        let (data, le) = match body.len() {
            0 => (Vec::new(), None),
            1 => (Vec::new(), Some(usize::from(body[0]))),
            _ if body[0] != 0 => {
                let lc = usize::from(body[0]);
                let rest = &body[1..];
                if rest.len() < lc {
                    return Err(CodecError::LengthMismatch {
                        declared: lc,
                        actual: rest.len(),
                    });
                }
                let le = match rest.len() - lc {
                    0 => None,
                    1 => Some(usize::from(rest[lc])),
                    _ => {
                        return Err(CodecError::LengthMismatch {
                            declared: lc,
                            actual: rest.len(),
                        })
                    }
                };
                (rest[..lc].to_vec(), le)
            }
            3 => {
                let le = usize::from(u16::from_be_bytes([body[1], body[2]]));
                (Vec::new(), Some(le))
            }
            len if len >= 3 => {
                let lc = usize::from(u16::from_be_bytes([body[1], body[2]]));
                let rest = &body[3..];
                if rest.len() < lc {
                    return Err(CodecError::LengthMismatch {
                        declared: lc,
                        actual: rest.len(),
                    });
                }
                let le = match rest.len() - lc {
                    0 => None,
                    2 => Some(usize::from(u16::from_be_bytes([rest[lc], rest[lc + 1]]))),
                    _ => {
                        return Err(CodecError::LengthMismatch {
                            declared: lc,
                            actual: rest.len(),
                        })
                    }
                };
                (rest[..lc].to_vec(), le)
            }
            len => {
                return Err(CodecError::LengthMismatch {
                    declared: 0,
                    actual: len - 1,
                })
            }
        };
        Ok(Self {
            cla,
            ins,
            p1,
            p2,
            data,
            le,
        })
    }

    /// Encode the command into its wire representation.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::with_capacity(self.data.len() + 7);
        out.extend_from_slice(&[self.cla, self.ins, self.p1, self.p2]);
        if self.data.len() > MAX_EXTENDED_LC {
            return Err(CodecError::PayloadTooLarge(self.data.len()));
        }
        let extended = self.data.len() > MAX_SHORT_LC || self.le.is_some_and(|le| le > 256);
        if extended {
            out.push(0);
            if !self.data.is_empty() {
                out.extend_from_slice(&(self.data.len() as u16).to_be_bytes());
                out.extend_from_slice(&self.data);
            }
            if let Some(le) = self.le {
                out.extend_from_slice(&(le as u16).to_be_bytes());
            }
        } else {
            if !self.data.is_empty() {
                out.push(self.data.len() as u8);
                out.extend_from_slice(&self.data);
            }
            if let Some(le) = self.le {
                out.push(le as u8);
            }
        }
        Ok(out)
    }

    /// Length of the command data field.
    #[must_use]
    pub fn lc(&self) -> usize {
        self.data.len()
    }

    /// True when the class byte announces a secure-messaging envelope.
    #[must_use]
    pub fn is_secure_messaging(&self) -> bool {
        self.cla & SECURE_MESSAGING_CLA_MASK == SECURE_MESSAGING_CLA_MASK
    }

    /// True for an ISO SELECT by DF name.
    #[must_use]
    pub fn is_select_by_name(&self) -> bool {
        self.cla & 0xF0 == ISO_CLA && self.ins == SELECT_INS && self.p1 == SELECT_BY_NAME
    }
}

/// Response APDU: data followed by the two-byte status word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseApdu {
    /// Response data field.
    pub data: Vec<u8>,
    /// Trailing status word.
    pub status: StatusWord,
}

impl ResponseApdu {
    /// Build a response carrying data.
    #[must_use]
    pub fn new(data: Vec<u8>, status: StatusWord) -> Self {
        Self { data, status }
    }

    /// Build a response that carries only a status word.
    #[must_use]
    pub fn status_only(status: StatusWord) -> Self {
        Self::new(Vec::new(), status)
    }

    /// Parse a raw response frame.
    pub fn parse(frame: &[u8]) -> Result<Self, CodecError> {
        if frame.len() < 2 {
            return Err(CodecError::Truncated(frame.len()));
        }
        let split = frame.len() - 2;
        Ok(Self {
            data: frame[..split].to_vec(),
            status: StatusWord::from_bytes(frame[split], frame[split + 1]),
        })
    }

    /// Encode the response into its wire representation.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.data.len() + 2);
        out.extend_from_slice(&self.data);
        out.extend_from_slice(&self.status.to_bytes());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_native_command_with_le() {
        let frame = [0x90, 0x5A, 0x00, 0x00, 0x03, 0x01, 0x02, 0x03, 0x00];
        let apdu = CommandApdu::parse(&frame).expect("parse select application");
        assert_eq!(apdu.cla, DESFIRE_CLA);
        assert_eq!(apdu.ins, 0x5A);
        assert_eq!(apdu.data, vec![1, 2, 3]);
        assert_eq!(apdu.le, Some(0));
        assert_eq!(apdu.encode().expect("encode"), frame.to_vec());
    }

    #[test]
    fn parses_header_only_and_le_only_frames() {
        let bare = CommandApdu::parse(&[0x90, 0xC7, 0x00, 0x00]).expect("case 1");
        assert!(bare.data.is_empty());
        assert_eq!(bare.le, None);

        let le_only = CommandApdu::parse(&[0x90, 0x60, 0x00, 0x00, 0x00]).expect("case 2");
        assert!(le_only.data.is_empty());
        assert_eq!(le_only.le, Some(0));
    }

    #[test]
    fn parses_extended_length_frames() {
        let payload = vec![0xAB; 300];
        let apdu = CommandApdu::native(0x3D, payload.clone());
        let encoded = apdu.encode().expect("encode extended");
        assert_eq!(&encoded[4..7], &[0x00, 0x01, 0x2C]);
        let decoded = CommandApdu::parse(&encoded).expect("parse extended");
        assert_eq!(decoded.data, payload);
        assert_eq!(decoded.le, Some(0));
    }

    #[test]
    fn rejects_short_data_field() {
        let err = CommandApdu::parse(&[0x90, 0x5A, 0x00, 0x00, 0x03, 0x01]).expect_err("short");
        assert_eq!(
            err,
            CodecError::LengthMismatch {
                declared: 3,
                actual: 1
            }
        );
        assert!(matches!(
            CommandApdu::parse(&[0x90, 0x5A]),
            Err(CodecError::Truncated(2))
        ));
    }

    #[test]
    fn detects_envelope_and_select() {
        let mut apdu = CommandApdu::native(0x8D, vec![]);
        assert!(!apdu.is_secure_messaging());
        apdu.cla = 0x9C;
        assert!(apdu.is_secure_messaging());
        assert!(CommandApdu::select_by_name(&[0xD2, 0x76]).is_select_by_name());
    }

    #[test]
    fn response_round_trips_status() {
        let frame = [0x01, 0x02, 0x91, 0xAF];
        let response = ResponseApdu::parse(&frame).expect("parse response");
        assert_eq!(response.data, vec![1, 2]);
        assert_eq!(response.status, StatusWord::ADDITIONAL_FRAME);
        assert_eq!(response.encode(), frame.to_vec());
    }
}
