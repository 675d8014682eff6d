// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Signed 32-bit counter value with overflow-checked arithmetic.
// Author: Lukas Bower

//! Counter values held by value files.
//!
//! Values are kept big-endian internally and travel little-endian on the wire.

use core::cmp::Ordering;
use core::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by counter arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValueError {
    /// The result does not fit in a signed 32-bit value.
    #[error("value arithmetic overflow")]
    Overflow,
    /// Wire encoding is not exactly four bytes.
    #[error("value encoding needs 4 bytes, got {0}")]
    Length(usize),
}

/// Signed 32-bit counter stored as big-endian bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub struct Value([u8; 4]);

impl Value {
    /// Zero.
    pub const ZERO: Self = Self([0; 4]);

    /// Build from an integer.
    #[must_use]
    pub const fn new(value: i32) -> Self {
        Self(value.to_be_bytes())
    }

    /// Build from the little-endian wire encoding.
    pub fn from_wire(bytes: &[u8]) -> Result<Self, ValueError> {
        let raw: [u8; 4] = bytes
            .try_into()
            .map_err(|_| ValueError::Length(bytes.len()))?;
        Ok(Self::new(i32::from_le_bytes(raw)))
    }

    /// Little-endian wire encoding.
    #[must_use]
    pub fn to_wire(self) -> [u8; 4] {
        self.get().to_le_bytes()
    }

    /// Big-endian storage bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    /// Integer view.
    #[must_use]
    pub const fn get(self) -> i32 {
        i32::from_be_bytes(self.0)
    }

    /// True when the value is below zero.
    #[must_use]
    pub const fn is_negative(self) -> bool {
        self.get() < 0
    }

    /// `self + other`, failing instead of wrapping.
    pub fn checked_add(self, other: Self) -> Result<Self, ValueError> {
        self.get()
            .checked_add(other.get())
            .map(Self::new)
            .ok_or(ValueError::Overflow)
    }

    /// `self - other`, failing instead of wrapping.
    pub fn checked_sub(self, other: Self) -> Result<Self, ValueError> {
        self.get()
            .checked_sub(other.get())
            .map(Self::new)
            .ok_or(ValueError::Overflow)
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        self.get().cmp(&other.get())
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::new(value)
    }
}

impl From<Value> for i32 {
    fn from(value: Value) -> Self {
        value.get()
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Value({})", self.get())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.get())
    }
}
