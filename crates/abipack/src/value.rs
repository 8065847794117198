// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Dynamic values packed into and unpacked from native structs.

use crate::native::NativeHandle;
use std::collections::HashMap;

/// Symbolic or raw enum value.
///
/// Callers that already hold a native code can pass it through as `Raw`
/// without knowing the symbolic name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EnumTag {
    Symbol(String),
    Raw(i64),
}

impl From<&str> for EnumTag {
    fn from(v: &str) -> Self {
        Self::Symbol(v.to_string())
    }
}

impl From<i64> for EnumTag {
    fn from(v: i64) -> Self {
        Self::Raw(v)
    }
}

/// A value that can be written into any supported field kind.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Missing value (the field may still be filled by a default).
    #[default]
    Absent,

    // Scalars
    Bool(bool),
    U8(u8),
    I8(i8),
    I16(i16),
    U16(u16),
    U32(u32),
    I32(i32),
    U64(u64),
    I64(i64),
    F32(f32),
    F64(f64),
    Pointer(usize),
    Handle(NativeHandle),

    // Composites
    Text(String),
    Enum(EnumTag),
    Record(Record),
    List(Vec<Value>),
}

impl Value {
    /// Check if value is absent.
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// Short name of the variant, used in mismatch errors.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Absent => "absent",
            Self::Bool(_) => "bool",
            Self::U8(_) => "u8",
            Self::I8(_) => "i8",
            Self::I16(_) => "i16",
            Self::U16(_) => "u16",
            Self::U32(_) => "u32",
            Self::I32(_) => "i32",
            Self::U64(_) => "u64",
            Self::I64(_) => "i64",
            Self::F32(_) => "f32",
            Self::F64(_) => "f64",
            Self::Pointer(_) => "pointer",
            Self::Handle(_) => "handle",
            Self::Text(_) => "text",
            Self::Enum(_) => "enum",
            Self::Record(_) => "record",
            Self::List(_) => "list",
        }
    }

    /// Integer view of any integral variant, including bools and addresses.
    pub fn as_integer(&self) -> Option<i128> {
        match self {
            Self::Bool(v) => Some(i128::from(*v)),
            Self::U8(v) => Some(i128::from(*v)),
            Self::I8(v) => Some(i128::from(*v)),
            Self::I16(v) => Some(i128::from(*v)),
            Self::U16(v) => Some(i128::from(*v)),
            Self::U32(v) => Some(i128::from(*v)),
            Self::I32(v) => Some(i128::from(*v)),
            Self::U64(v) => Some(i128::from(*v)),
            Self::I64(v) => Some(i128::from(*v)),
            Self::Pointer(v) => Some(*v as i128),
            Self::Handle(h) => Some(h.address() as i128),
            _ => None,
        }
    }

    /// Float view of any numeric variant.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::F32(v) => Some(f64::from(*v)),
            Self::F64(v) => Some(*v),
            other => other.as_integer().map(|i| i as f64),
        }
    }

    /// Try to get as u32.
    pub fn as_u32(&self) -> Option<u32> {
        self.as_integer().and_then(|v| u32::try_from(v).ok())
    }

    /// Try to get as u64.
    pub fn as_u64(&self) -> Option<u64> {
        self.as_integer().and_then(|v| u64::try_from(v).ok())
    }

    /// Try to get as bool.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Try to get as text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Try to get as list.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(v) => Some(v),
            _ => None,
        }
    }

    /// Try to get as record.
    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Self::Record(r) => Some(r),
            _ => None,
        }
    }

    /// Try to get as a native handle (a null address reads as `None`).
    pub fn as_handle(&self) -> Option<NativeHandle> {
        match self {
            Self::Handle(h) if !h.is_null() => Some(*h),
            Self::Pointer(p) if *p != 0 => Some(NativeHandle::from_address(*p)),
            _ => None,
        }
    }

    /// Get enum symbol name.
    pub fn enum_symbol(&self) -> Option<&str> {
        match self {
            Self::Enum(EnumTag::Symbol(s)) => Some(s),
            _ => None,
        }
    }

    /// Element count for lists, byte length for text.
    pub fn length(&self) -> Option<usize> {
        match self {
            Self::Text(s) => Some(s.len()),
            Self::List(v) => Some(v.len()),
            _ => None,
        }
    }
}

/// Named fields of a struct value.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    fields: HashMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Get a present field. `Value::Absent` entries read as missing.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name).filter(|v| !v.is_absent())
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.fields.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl From<HashMap<String, Value>> for Record {
    fn from(fields: HashMap<String, Value>) -> Self {
        Self { fields }
    }
}

// Conversion traits
impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Self::U8(v)
    }
}

impl From<i8> for Value {
    fn from(v: i8) -> Self {
        Self::I8(v)
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Self::I16(v)
    }
}

impl From<u16> for Value {
    fn from(v: u16) -> Self {
        Self::U16(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::U32(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::I32(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Self::U64(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::I64(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::F32(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::F64(v)
    }
}

impl From<NativeHandle> for Value {
    fn from(v: NativeHandle) -> Self {
        Self::Handle(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<EnumTag> for Value {
    fn from(v: EnumTag) -> Self {
        Self::Enum(v)
    }
}

impl From<Record> for Value {
    fn from(v: Record) -> Self {
        Self::Record(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Absent, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Self::List(v.into_iter().map(Into::into).collect())
    }
}

/// Shorthand for a symbolic enum value.
pub fn sym(name: &str) -> Value {
    Value::Enum(EnumTag::Symbol(name.to_string()))
}
