// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Ready-made field validators.

use super::field::ValidationContext;
use crate::error::{AbiError, AbiResult};
use crate::value::{Record, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Native limits (e.g. the device's `Limits` struct) keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitsTable {
    limits: HashMap<String, u64>,
}

impl LimitsTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: u64) -> Self {
        self.limits.insert(name.into(), value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: u64) {
        self.limits.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<u64> {
        self.limits.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.limits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.limits.is_empty()
    }

    /// Collect every unsigned integer field of an unpacked limits struct.
    pub fn from_record(record: &Record) -> Self {
        let limits = record
            .iter()
            .filter_map(|(name, value)| value.as_u64().map(|v| (name.to_string(), v)))
            .collect();
        Self { limits }
    }
}

fn unsigned(value: &Value, ctx: &ValidationContext<'_>) -> AbiResult<u64> {
    value.as_u64().ok_or_else(|| AbiError::Operation {
        field: ctx.field.to_string(),
        reason: format!("expected a non-negative integer, found {}", value.kind_name()),
    })
}

/// Reject zero.
pub fn non_zero() -> impl Fn(&Value, &ValidationContext<'_>) -> AbiResult<()> + Send + Sync + 'static
{
    |value: &Value, ctx: &ValidationContext<'_>| {
        if unsigned(value, ctx)? == 0 {
            return Err(AbiError::Operation {
                field: ctx.field.to_string(),
                reason: "must be non-zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Reject values that are not a multiple of `n`.
pub fn multiple_of(
    n: u64,
) -> impl Fn(&Value, &ValidationContext<'_>) -> AbiResult<()> + Send + Sync + 'static {
    move |value: &Value, ctx: &ValidationContext<'_>| {
        let v = unsigned(value, ctx)?;
        if n != 0 && v % n != 0 {
            return Err(AbiError::Operation {
                field: ctx.field.to_string(),
                reason: format!("{} is not a multiple of {}", v, n),
            });
        }
        Ok(())
    }
}

/// Reject values above the named native limit. Passes when the caller
/// supplied no limits table, or the table lacks `limit`.
pub fn max_limit(
    limit: &str,
) -> impl Fn(&Value, &ValidationContext<'_>) -> AbiResult<()> + Send + Sync + 'static {
    let limit = limit.to_string();
    move |value: &Value, ctx: &ValidationContext<'_>| {
        let Some(max) = ctx.limits.and_then(|l| l.get(&limit)) else {
            return Ok(());
        };
        let v = unsigned(value, ctx)?;
        if v > max {
            return Err(AbiError::Range {
                field: ctx.field.to_string(),
                value: v,
                limit: max,
            });
        }
        Ok(())
    }
}

/// Reject values above a fixed bound.
pub fn at_most(
    max: u64,
) -> impl Fn(&Value, &ValidationContext<'_>) -> AbiResult<()> + Send + Sync + 'static {
    move |value: &Value, ctx: &ValidationContext<'_>| {
        let v = unsigned(value, ctx)?;
        if v > max {
            return Err(AbiError::Range {
                field: ctx.field.to_string(),
                value: v,
                limit: max,
            });
        }
        Ok(())
    }
}
