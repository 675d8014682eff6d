// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Unwrap and build ISO secure-messaging envelopes around native commands.
// Author: Lukas Bower

//! Secure-messaging envelope.
//!
//! The command data is a sequence of data objects:
//!
//! | Tag | Value |
//! |-----|-------|
//! | `87` | `01` followed by the enciphered inner data (optional) |
//! | `97` | expected response length (optional) |
//! | `8E` | checksum over the value of `87` |

use desfire_codec::{CommandApdu, DESFIRE_CLA};
use desfire_crypto::SecureMessaging;

use crate::error::CommandError;

const TAG_CRYPTOGRAM: u8 = 0x87;
const TAG_EXPECTED_LEN: u8 = 0x97;
const TAG_CHECKSUM: u8 = 0x8E;
const PADDING_INDICATOR: u8 = 0x01;

/// Recover the plain native command carried by an envelope.
pub fn unwrap(
    messaging: Option<&SecureMessaging>,
    apdu: &CommandApdu,
) -> Result<CommandApdu, CommandError> {
    let messaging = messaging.ok_or(CommandError::PermissionDenied)?;
    let mut cryptogram: Option<&[u8]> = None;
    let mut le = apdu.le;
    let mut checksum: Option<&[u8]> = None;
    let mut rest = apdu.data.as_slice();
    while let [tag, len, tail @ ..] = rest {
        let len = usize::from(*len);
        if tail.len() < len {
            return Err(CommandError::Length);
        }
        let (value, next) = tail.split_at(len);
        match *tag {
            TAG_CRYPTOGRAM => cryptogram = Some(value),
            TAG_EXPECTED_LEN => le = value.first().map(|&byte| usize::from(byte)),
            TAG_CHECKSUM => checksum = Some(value),
            _ => return Err(CommandError::Parameter),
        }
        rest = next;
    }
    if !rest.is_empty() {
        return Err(CommandError::Length);
    }
    let cryptogram = cryptogram.unwrap_or_default();
    let expected = messaging.checksum().compute(cryptogram);
    if checksum != Some(expected.as_slice()) {
        return Err(CommandError::Integrity);
    }
    let data = match cryptogram.split_first() {
        None => Vec::new(),
        Some((&PADDING_INDICATOR, enciphered)) => messaging.decrypt(enciphered)?,
        Some(_) => return Err(CommandError::Parameter),
    };
    Ok(CommandApdu {
        cla: DESFIRE_CLA,
        ins: apdu.ins,
        p1: apdu.p1,
        p2: apdu.p2,
        data,
        le,
    })
}

/// Wrap a native command in an envelope under `messaging`.
pub fn wrap(messaging: &SecureMessaging, command: &CommandApdu) -> Result<CommandApdu, CommandError> {
    let mut data = Vec::new();
    let mut cryptogram = Vec::new();
    if !command.data.is_empty() {
        cryptogram.push(PADDING_INDICATOR);
        cryptogram.extend(messaging.encrypt(&command.data)?);
        push_object(&mut data, TAG_CRYPTOGRAM, &cryptogram)?;
    }
    if let Some(le) = command.le {
        push_object(&mut data, TAG_EXPECTED_LEN, &[le as u8])?;
    }
    push_object(&mut data, TAG_CHECKSUM, &messaging.checksum().compute(&cryptogram))?;
    Ok(CommandApdu {
        cla: DESFIRE_CLA | 0x0C,
        ins: command.ins,
        p1: command.p1,
        p2: command.p2,
        data,
        le: Some(0),
    })
}

fn push_object(out: &mut Vec<u8>, tag: u8, value: &[u8]) -> Result<(), CommandError> {
    let len = u8::try_from(value.len()).map_err(|_| CommandError::Length)?;
    out.push(tag);
    out.push(len);
    out.extend_from_slice(value);
    Ok(())
}
