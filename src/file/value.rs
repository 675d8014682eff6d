// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Bounded counter file with staged credit, debit and limited credit.
// Author: Lukas Bower

use serde::{Deserialize, Serialize};

use super::FileError;
use crate::value::Value;

const LIMITED_CREDIT_FLAG: u8 = 0x01;
const FREE_GET_VALUE_FLAG: u8 = 0x02;

/// Counter bounded by an inclusive `[lower, upper]` range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueFile {
    lower: Value,
    upper: Value,
    value: Value,
    limited_credit_enabled: bool,
    free_get_value: bool,
    limited_credit: Value,
    #[serde(skip)]
    staged: Option<Value>,
    #[serde(skip)]
    staged_debits: Value,
    #[serde(skip)]
    limited_spent: Value,
}

impl ValueFile {
    /// Create a counter; `flags` bit 0 enables limited credit, bit 1 free get value.
    pub fn new(lower: Value, upper: Value, value: Value, flags: u8) -> Result<Self, FileError> {
        if lower > upper || value < lower || value > upper {
            return Err(FileError::Boundary);
        }
        Ok(Self {
            lower,
            upper,
            value,
            limited_credit_enabled: flags & LIMITED_CREDIT_FLAG != 0,
            free_get_value: flags & FREE_GET_VALUE_FLAG != 0,
            limited_credit: Value::ZERO,
            staged: None,
            staged_debits: Value::ZERO,
            limited_spent: Value::ZERO,
        })
    }

    /// Lower bound.
    #[must_use]
    pub fn lower(&self) -> Value {
        self.lower
    }

    /// Upper bound.
    #[must_use]
    pub fn upper(&self) -> Value {
        self.upper
    }

    /// Committed value.
    #[must_use]
    pub fn value(&self) -> Value {
        self.value
    }

    /// Amount a limited credit may still add.
    #[must_use]
    pub fn limited_credit_budget(&self) -> Value {
        self.limited_credit
    }

    /// Whether get value needs no authentication.
    #[must_use]
    pub fn free_get_value(&self) -> bool {
        self.free_get_value
    }

    /// Creation flags byte.
    #[must_use]
    pub fn flags(&self) -> u8 {
        let mut flags = 0;
        if self.limited_credit_enabled {
            flags |= LIMITED_CREDIT_FLAG;
        }
        if self.free_get_value {
            flags |= FREE_GET_VALUE_FLAG;
        }
        flags
    }

    /// True while an uncommitted change exists.
    #[must_use]
    pub fn has_staged(&self) -> bool {
        self.staged.is_some()
    }

    fn current(&self) -> Value {
        self.staged.unwrap_or(self.value)
    }

    /// Stage an increase.
    pub fn credit(&mut self, amount: Value) -> Result<(), FileError> {
        let next = self.raised_by(amount)?;
        self.staged = Some(next);
        Ok(())
    }

    /// Stage a decrease.
    pub fn debit(&mut self, amount: Value) -> Result<(), FileError> {
        if amount.is_negative() {
            return Err(FileError::NegativeAmount);
        }
        let next = self.current().checked_sub(amount)?;
        if next < self.lower {
            return Err(FileError::Boundary);
        }
        let debits = self.staged_debits.checked_add(amount)?;
        self.staged = Some(next);
        self.staged_debits = debits;
        Ok(())
    }

    /// Stage an increase paid from the limited credit budget.
    pub fn limited_credit(&mut self, amount: Value) -> Result<(), FileError> {
        if !self.limited_credit_enabled {
            return Err(FileError::LimitedCreditDisabled);
        }
        let next = self.raised_by(amount)?;
        let spent = self.limited_spent.checked_add(amount)?;
        if spent > self.limited_credit {
            return Err(FileError::Boundary);
        }
        self.staged = Some(next);
        self.limited_spent = spent;
        Ok(())
    }

    fn raised_by(&self, amount: Value) -> Result<Value, FileError> {
        if amount.is_negative() {
            return Err(FileError::NegativeAmount);
        }
        let next = self.current().checked_add(amount)?;
        if next > self.upper {
            return Err(FileError::Boundary);
        }
        Ok(next)
    }

    pub(crate) fn commit(&mut self) {
        if let Some(value) = self.staged.take() {
            self.value = value;
        }
        if self.staged_debits > Value::ZERO {
            self.limited_credit = self.staged_debits;
        } else if self.limited_spent > Value::ZERO {
            self.limited_credit = Value::ZERO;
        }
        self.staged_debits = Value::ZERO;
        self.limited_spent = Value::ZERO;
    }

    pub(crate) fn abort(&mut self) {
        self.staged = None;
        self.staged_debits = Value::ZERO;
        self.limited_spent = Value::ZERO;
    }
}
