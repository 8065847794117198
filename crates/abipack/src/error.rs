// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error taxonomy for struct packing and native callback brokering.

use thiserror::Error;

/// Result alias used across the crate.
pub type AbiResult<T> = Result<T, AbiError>;

/// Native error classification carried by a failed async callback.
///
/// Mirrors the native `ErrorType` enumeration (2 = validation,
/// 3 = out-of-memory, 4 = internal, anything else = unknown).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeErrorKind {
    Validation,
    OutOfMemory,
    Internal,
    Unknown,
}

impl NativeErrorKind {
    /// Classify a native error-type code.
    pub fn from_code(code: u32) -> Self {
        match code {
            2 => Self::Validation,
            3 => Self::OutOfMemory,
            4 => Self::Internal,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for NativeErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Validation => "validation",
            Self::OutOfMemory => "out-of-memory",
            Self::Internal => "internal",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Every failure the packing layer and the callback bridge can report.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AbiError {
    #[error("invalid value {value} for enum {enum_name}")]
    InvalidEnumValue { enum_name: String, value: String },

    #[error("operation error on field '{field}': {reason}")]
    Operation { field: String, reason: String },

    #[error("field '{field}' value {value} exceeds native limit {limit}")]
    Range { field: String, value: u64, limit: u64 },

    #[error("array field '{field}' has a null pointer but claims {length} elements")]
    InconsistentArrayField { field: String, length: u64 },

    #[error("correlation token pool exhausted (cap {cap})")]
    PoolExhausted { cap: usize },

    #[error("token slot {slot} released twice")]
    DoubleRelease { slot: u32 },

    #[error("token slot {slot} outside pool capacity {capacity}")]
    OutOfRange { slot: u32, capacity: usize },

    #[error("pointer {address:#x} does not belong to this token pool")]
    UnknownToken { address: usize },

    #[error("missing required field '{field}' in struct {layout}")]
    MissingField { layout: String, field: String },

    #[error("type mismatch on field '{field}': expected {expected}, found {found}")]
    TypeMismatch {
        field: String,
        expected: String,
        found: String,
    },

    #[error("value for field '{field}' does not fit in {kind}")]
    ValueOutOfRange { field: String, kind: String },

    #[error("native {family} call failed with status {status} ({kind}): {message}")]
    NativeCallFailed {
        family: String,
        status: u32,
        kind: NativeErrorKind,
        message: String,
    },

    #[error("{family} request {id} timed out")]
    Timeout { family: String, id: u32 },

    #[error("callback bridge dropped before completion")]
    BridgeClosed,

    #[error("layout error: {0}")]
    Layout(String),

    #[error("layout {layout} targets {expected}-byte pointers, host differs")]
    PointerWidthMismatch { layout: String, expected: usize },

    #[error("native symbol not found: {0}")]
    MissingSymbol(String),

    #[error("signature mismatch calling {symbol}: {reason}")]
    SignatureMismatch { symbol: String, reason: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("event pump could not start: {0}")]
    PumpUnavailable(String),
}

impl AbiError {
    /// Name of the taxonomy bucket this error belongs to.
    pub fn category(&self) -> &'static str {
        match self {
            Self::InvalidEnumValue { .. } => "InvalidEnumValue",
            Self::Operation { .. } => "OperationError",
            Self::Range { .. } => "RangeError",
            Self::InconsistentArrayField { .. } => "InconsistentArrayField",
            Self::PoolExhausted { .. } => "PoolExhausted",
            Self::DoubleRelease { .. } => "DoubleRelease",
            Self::OutOfRange { .. } | Self::UnknownToken { .. } => "OutOfRange",
            Self::MissingField { .. }
            | Self::TypeMismatch { .. }
            | Self::ValueOutOfRange { .. }
            | Self::PointerWidthMismatch { .. } => "PackingError",
            Self::NativeCallFailed { .. } | Self::Timeout { .. } | Self::BridgeClosed => {
                "NativeCallFailed"
            }
            Self::Layout(_) => "LayoutError",
            Self::MissingSymbol(_) | Self::SignatureMismatch { .. } => "NativeTableError",
            Self::Config(_) | Self::PumpUnavailable(_) => "ConfigError",
        }
    }

    pub(crate) fn mismatch(field: &str, expected: &str, found: &crate::Value) -> Self {
        Self::TypeMismatch {
            field: field.to_string(),
            expected: expected.to_string(),
            found: found.kind_name().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_error_kind_from_code() {
        assert_eq!(NativeErrorKind::from_code(2), NativeErrorKind::Validation);
        assert_eq!(NativeErrorKind::from_code(3), NativeErrorKind::OutOfMemory);
        assert_eq!(NativeErrorKind::from_code(4), NativeErrorKind::Internal);
        assert_eq!(NativeErrorKind::from_code(5), NativeErrorKind::Unknown);
        assert_eq!(NativeErrorKind::from_code(0), NativeErrorKind::Unknown);
    }

    #[test]
    fn test_categories() {
        let missing = AbiError::MissingField {
            layout: "Foo".into(),
            field: "bar".into(),
        };
        assert_eq!(missing.category(), "PackingError");
        assert_eq!(
            AbiError::Range {
                field: "x".into(),
                value: 9,
                limit: 8
            }
            .category(),
            "RangeError"
        );
        assert_eq!(AbiError::DoubleRelease { slot: 1 }.category(), "DoubleRelease");
    }

    #[test]
    fn test_display_mentions_field() {
        let err = AbiError::InconsistentArrayField {
            field: "values".into(),
            length: 5,
        };
        assert!(err.to_string().contains("values"));
        assert!(err.to_string().contains('5'));
    }
}
