// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fixed-width scalar codec (little-endian throughout).
//!
//! Offsets are trusted: the layout builder computes them once and every
//! caller writes inside a buffer sized from the same layout. Slicing still
//! goes through indexing, so a broken invariant panics instead of writing
//! past the allocation.

use super::PointerWidth;
use crate::error::{AbiError, AbiResult};
use crate::value::Value;

/// Scalar field kinds with a fixed native width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    U8,
    I8,
    I16,
    U16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
    /// C `bool` stored in one byte.
    BoolU8,
    /// WebGPU-style `WGPUBool` stored in four bytes.
    BoolU32,
    /// Address-sized value (`usize` on the target).
    Pointer,
    /// C `size_t`: pointer-width unsigned count.
    Usize,
}

impl PrimitiveKind {
    /// Size in bytes for the given pointer width.
    pub fn size(&self, width: PointerWidth) -> usize {
        match self {
            Self::U8 | Self::I8 | Self::BoolU8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::U32 | Self::I32 | Self::F32 | Self::BoolU32 => 4,
            Self::U64 | Self::I64 | Self::F64 => 8,
            Self::Pointer | Self::Usize => width.bytes(),
        }
    }

    /// Natural alignment (equal to size for every scalar we support).
    pub fn alignment(&self, width: PointerWidth) -> usize {
        self.size(width)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::U8 => "u8",
            Self::I8 => "i8",
            Self::I16 => "i16",
            Self::U16 => "u16",
            Self::U32 => "u32",
            Self::I32 => "i32",
            Self::U64 => "u64",
            Self::I64 => "i64",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::BoolU8 => "bool8",
            Self::BoolU32 => "bool32",
            Self::Pointer => "pointer",
            Self::Usize => "usize",
        }
    }

    /// True for the kinds an enum may use as underlying storage.
    pub fn is_integral(&self) -> bool {
        !matches!(self, Self::F32 | Self::F64 | Self::BoolU8 | Self::BoolU32)
    }
}

/// Generate an integer arm: convert losslessly or report the overflow.
macro_rules! write_int {
    ($buf:expr, $offset:expr, $value:expr, $field:expr, $kind:expr, $ty:ty) => {{
        let raw = $value
            .as_integer()
            .ok_or_else(|| AbiError::mismatch($field, $kind.name(), $value))?;
        let v = <$ty>::try_from(raw).map_err(|_| AbiError::ValueOutOfRange {
            field: $field.to_string(),
            kind: $kind.name().to_string(),
        })?;
        let bytes = v.to_le_bytes();
        $buf[$offset..$offset + bytes.len()].copy_from_slice(&bytes);
    }};
}

/// Generate a read arm returning the matching `Value` variant.
macro_rules! read_le {
    ($buf:expr, $offset:expr, $ty:ty) => {{
        const N: usize = std::mem::size_of::<$ty>();
        let mut bytes = [0u8; N];
        bytes.copy_from_slice(&$buf[$offset..$offset + N]);
        <$ty>::from_le_bytes(bytes)
    }};
}

/// Write `value` at `offset` using the width implied by `kind`.
pub fn encode(
    kind: PrimitiveKind,
    value: &Value,
    buf: &mut [u8],
    offset: usize,
    width: PointerWidth,
    field: &str,
) -> AbiResult<()> {
    match kind {
        PrimitiveKind::U8 => write_int!(buf, offset, value, field, kind, u8),
        PrimitiveKind::I8 => write_int!(buf, offset, value, field, kind, i8),
        PrimitiveKind::I16 => write_int!(buf, offset, value, field, kind, i16),
        PrimitiveKind::U16 => write_int!(buf, offset, value, field, kind, u16),
        PrimitiveKind::U32 => write_int!(buf, offset, value, field, kind, u32),
        PrimitiveKind::I32 => write_int!(buf, offset, value, field, kind, i32),
        PrimitiveKind::U64 => write_int!(buf, offset, value, field, kind, u64),
        PrimitiveKind::I64 => write_int!(buf, offset, value, field, kind, i64),
        PrimitiveKind::F32 => {
            let v = value
                .as_float()
                .ok_or_else(|| AbiError::mismatch(field, kind.name(), value))?;
            buf[offset..offset + 4].copy_from_slice(&(v as f32).to_le_bytes());
        }
        PrimitiveKind::F64 => {
            let v = value
                .as_float()
                .ok_or_else(|| AbiError::mismatch(field, kind.name(), value))?;
            buf[offset..offset + 8].copy_from_slice(&v.to_le_bytes());
        }
        PrimitiveKind::BoolU8 | PrimitiveKind::BoolU32 => {
            let flag = match value {
                Value::Bool(b) => *b,
                other => {
                    other
                        .as_integer()
                        .ok_or_else(|| AbiError::mismatch(field, kind.name(), value))?
                        != 0
                }
            };
            let n = kind.size(width);
            buf[offset..offset + n].fill(0);
            buf[offset] = u8::from(flag);
        }
        PrimitiveKind::Pointer | PrimitiveKind::Usize => {
            let raw = value
                .as_integer()
                .ok_or_else(|| AbiError::mismatch(field, kind.name(), value))?;
            let address = u64::try_from(raw).map_err(|_| AbiError::ValueOutOfRange {
                field: field.to_string(),
                kind: kind.name().to_string(),
            })?;
            write_address(buf, offset, width, address).map_err(|()| {
                AbiError::ValueOutOfRange {
                    field: field.to_string(),
                    kind: kind.name().to_string(),
                }
            })?;
        }
    }
    Ok(())
}

/// Read a scalar at `offset`. Exact inverse of [`encode`].
pub fn decode(kind: PrimitiveKind, buf: &[u8], offset: usize, width: PointerWidth) -> Value {
    match kind {
        PrimitiveKind::U8 => Value::U8(buf[offset]),
        PrimitiveKind::I8 => Value::I8(read_le!(buf, offset, i8)),
        PrimitiveKind::I16 => Value::I16(read_le!(buf, offset, i16)),
        PrimitiveKind::U16 => Value::U16(read_le!(buf, offset, u16)),
        PrimitiveKind::U32 => Value::U32(read_le!(buf, offset, u32)),
        PrimitiveKind::I32 => Value::I32(read_le!(buf, offset, i32)),
        PrimitiveKind::U64 => Value::U64(read_le!(buf, offset, u64)),
        PrimitiveKind::I64 => Value::I64(read_le!(buf, offset, i64)),
        PrimitiveKind::F32 => Value::F32(read_le!(buf, offset, f32)),
        PrimitiveKind::F64 => Value::F64(read_le!(buf, offset, f64)),
        PrimitiveKind::BoolU8 => Value::Bool(buf[offset] != 0),
        PrimitiveKind::BoolU32 => Value::Bool(read_le!(buf, offset, u32) != 0),
        PrimitiveKind::Pointer => Value::Pointer(read_address(buf, offset, width) as usize),
        PrimitiveKind::Usize => Value::U64(read_address(buf, offset, width)),
    }
}

/// Write an address-sized unsigned value. Fails if it does not fit a
/// 4-byte pointer slot.
pub(crate) fn write_address(
    buf: &mut [u8],
    offset: usize,
    width: PointerWidth,
    address: u64,
) -> Result<(), ()> {
    match width {
        PointerWidth::Four => {
            let v = u32::try_from(address).map_err(|_| ())?;
            buf[offset..offset + 4].copy_from_slice(&v.to_le_bytes());
        }
        PointerWidth::Eight => buf[offset..offset + 8].copy_from_slice(&address.to_le_bytes()),
    }
    Ok(())
}

/// Read an address-sized unsigned value.
pub(crate) fn read_address(buf: &[u8], offset: usize, width: PointerWidth) -> u64 {
    match width {
        PointerWidth::Four => u64::from(read_le!(buf, offset, u32)),
        PointerWidth::Eight => read_le!(buf, offset, u64),
    }
}
