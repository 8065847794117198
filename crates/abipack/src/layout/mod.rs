// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Native struct layouts.
//!
//! A [`StructLayout`] is computed once from an ordered field list, using
//! C placement rules: each offset is rounded up to the field's alignment,
//! and the total size is rounded up to the largest alignment.
//!
//! # Example
//!
//! ```
//! use abipack::codec::PrimitiveKind;
//! use abipack::layout::{ElementKind, PackOptions, StructLayoutBuilder};
//! use abipack::Record;
//!
//! let layout = StructLayoutBuilder::new("Samples")
//!     .field("width", PrimitiveKind::U32)
//!     .string_field("label")
//!     .optional()
//!     .field("count", PrimitiveKind::U32)
//!     .length_of("values")
//!     .array_field("values", ElementKind::Primitive(PrimitiveKind::F32))
//!     .build()?;
//!
//! let input = Record::new()
//!     .with("width", 4u32)
//!     .with("values", vec![1.0f32, 2.0, 3.0]);
//! let packed = layout.pack(&input, &PackOptions::default())?;
//! let output = layout.unpack(&packed)?;
//! assert_eq!(output.get("width"), input.get("width"));
//! # Ok::<(), abipack::AbiError>(())
//! ```

pub mod array;
pub mod builder;
pub mod field;
pub mod registry;
pub mod validate;


pub use builder::StructLayoutBuilder;
pub use field::{
    Condition, ElementKind, FieldKind, FieldSpec, LaidOutField, Modifiers, NestedBy,
    ValidationContext, Validator,
};
pub use registry::LayoutRegistry;
pub use validate::LimitsTable;

use crate::buffer::{AlignedBytes, PackedBuffer, SideBuffers};
use crate::codec::primitive::{self, read_address, write_address};
use crate::codec::{PointerWidth, PrimitiveKind, StringView};
use crate::error::{AbiError, AbiResult};
use crate::native::NativeHandle;
use crate::value::{Record, Value};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::sync::Arc;

/// Round `offset` up to the next multiple of `align` (a power of two).
#[inline]
pub(crate) const fn align_up(offset: usize, align: usize) -> usize {
    (offset + align - 1) & !(align - 1)
}

/// Operating system family, for platform-conditional fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetPlatform {
    Windows,
    Linux,
    Apple,
    Other,
}

impl TargetPlatform {
    pub const HOST: Self = if cfg!(windows) {
        Self::Windows
    } else if cfg!(target_os = "linux") {
        Self::Linux
    } else if cfg!(target_vendor = "apple") {
        Self::Apple
    } else {
        Self::Other
    };

    pub fn is_windows(self) -> bool {
        self == Self::Windows
    }
}

/// Target description a layout is computed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LayoutOptions {
    pub pointer_width: PointerWidth,
    pub platform: TargetPlatform,
}

impl LayoutOptions {
    /// The running process.
    pub const fn host() -> Self {
        Self {
            pointer_width: PointerWidth::HOST,
            platform: TargetPlatform::HOST,
        }
    }
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self::host()
    }
}

/// Per-call packing hints.
#[derive(Debug, Clone, Default)]
pub struct PackOptions {
    /// Limits handed to validators.
    pub limits: Option<Arc<LimitsTable>>,
}

impl PackOptions {
    pub fn with_limits(limits: Arc<LimitsTable>) -> Self {
        Self {
            limits: Some(limits),
        }
    }
}

/// Serializable summary of a layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutDescription {
    pub name: String,
    pub size: usize,
    pub align: usize,
    pub pointer_width: usize,
    pub fields: Vec<FieldDescription>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescription {
    pub name: String,
    pub kind: String,
    pub offset: usize,
    pub size: usize,
    pub align: usize,
    pub optional: bool,
    pub writes_only: bool,
}

impl LayoutDescription {
    pub fn to_json_pretty(&self) -> AbiResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| AbiError::Layout(e.to_string()))
    }
}

/// Where pointer fields may be followed during unpack.
#[derive(Clone, Copy)]
pub(crate) enum MemoryReader<'a> {
    /// Only addresses inside these side buffers are dereferenced.
    Owned(&'a SideBuffers),
    /// Native memory, valid per the contract of [`StructLayout::unpack_raw`].
    Native,
}

impl<'a> MemoryReader<'a> {
    /// `len` bytes at `address`, or `None` when the range may not be read.
    pub(crate) fn region(&self, address: usize, len: usize) -> Option<&'a [u8]> {
        if address == 0 {
            return None;
        }
        match self {
            Self::Owned(side) if !side.contains_range(address, len) => None,
            // SAFETY: the range lies inside a side buffer borrowed for 'a.
            Self::Owned(_) => Some(unsafe { std::slice::from_raw_parts(address as *const u8, len) }),
            // SAFETY: `unpack_raw` callers guarantee every pointer in the
            // struct graph addresses readable memory of the declared size.
            Self::Native => Some(unsafe { std::slice::from_raw_parts(address as *const u8, len) }),
        }
    }

    pub(crate) fn text(&self, view: StringView, field: &str) -> AbiResult<String> {
        if view.data == 0 || view.length == 0 {
            return Ok(String::new());
        }
        match self {
            // SAFETY: see `region`.
            Self::Native => Ok(unsafe { view.decode() }),
            Self::Owned(_) => {
                let outside = || {
                    AbiError::Layout(format!("string '{}' points outside the packed buffer", field))
                };
                if view.is_strlen() {
                    return Err(outside());
                }
                let len = usize::try_from(view.length).map_err(|_| outside())?;
                let bytes = self.region(view.data, len).ok_or_else(outside)?;
                Ok(String::from_utf8_lossy(bytes).into_owned())
            }
        }
    }
}

/// Computed layout of one native struct plus its pack/unpack logic.
#[derive(Debug, Clone)]
pub struct StructLayout {
    pub(crate) name: String,
    pub(crate) fields: Vec<LaidOutField>,
    pub(crate) size: usize,
    pub(crate) align: usize,
    pub(crate) options: LayoutOptions,
    pub(crate) defaults: Record,
}

impl StructLayout {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn align(&self) -> usize {
        self.align
    }

    pub fn options(&self) -> &LayoutOptions {
        &self.options
    }

    pub fn fields(&self) -> &[LaidOutField] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&LaidOutField> {
        self.fields.iter().find(|f| f.name() == name)
    }

    pub fn describe(&self) -> LayoutDescription {
        LayoutDescription {
            name: self.name.clone(),
            size: self.size,
            align: self.align,
            pointer_width: self.options.pointer_width.bytes(),
            fields: self
                .fields
                .iter()
                .map(|f| FieldDescription {
                    name: f.name().to_string(),
                    kind: f.kind().label(),
                    offset: f.offset,
                    size: f.size,
                    align: f.align,
                    optional: f.modifiers().optional,
                    writes_only: f.is_write_only(),
                })
                .collect(),
        }
    }

    fn check_host_width(&self) -> AbiResult<()> {
        if self.options.pointer_width != PointerWidth::HOST {
            return Err(AbiError::PointerWidthMismatch {
                layout: self.name.clone(),
                expected: self.options.pointer_width.bytes(),
            });
        }
        Ok(())
    }

    /// Pack `record` into a fresh buffer.
    pub fn pack(&self, record: &Record, options: &PackOptions) -> AbiResult<PackedBuffer> {
        let mut main = AlignedBytes::zeroed(self.size);
        let mut side = SideBuffers::new();
        self.pack_into(record, main.as_mut_slice(), &mut side, options)?;
        Ok(PackedBuffer::new(&self.name, main, side))
    }

    /// Pack into caller storage; side payloads go into `side`.
    ///
    /// The first `size()` bytes of `out` are overwritten.
    pub fn pack_into(
        &self,
        record: &Record,
        out: &mut [u8],
        side: &mut SideBuffers,
        options: &PackOptions,
    ) -> AbiResult<()> {
        self.check_host_width()?;
        if out.len() < self.size {
            return Err(AbiError::Layout(format!(
                "{}: output holds {} bytes, layout needs {}",
                self.name,
                out.len(),
                self.size
            )));
        }
        let out = &mut out[..self.size];
        out.fill(0);
        for field in &self.fields {
            self.pack_field(field, record, out, side, options)?;
        }
        Ok(())
    }

    /// Value a field packs from before length derivation.
    fn effective<'r>(&'r self, field: &'r LaidOutField, record: &'r Record) -> Option<&'r Value> {
        record
            .get(field.name())
            .filter(|v| !v.is_absent())
            .or(field.modifiers().default.as_ref())
    }

    fn pack_field(
        &self,
        field: &LaidOutField,
        record: &Record,
        out: &mut [u8],
        side: &mut SideBuffers,
        options: &PackOptions,
    ) -> AbiResult<()> {
        let name = field.name();
        let mods = field.modifiers();
        if mods.padding {
            return Ok(());
        }

        let mut value = self.effective(field, record).map(Cow::Borrowed);

        if let Some(target) = field.length_source {
            let source = &self.fields[target];
            let n = self
                .effective(source, record)
                .and_then(Value::length)
                .unwrap_or(0);
            value = Some(Cow::Owned(Value::U64(n as u64)));
        }

        if let Some(v) = value.as_deref() {
            let ctx = ValidationContext {
                layout: &self.name,
                field: name,
                limits: options.limits.as_deref(),
            };
            for validator in &mods.validators {
                validator(v, &ctx)?;
            }
        }

        log::trace!("pack {}.{} at +{}", self.name, name, field.offset);
        let width = self.options.pointer_width;
        let at = field.offset;
        let Some(value) = value else {
            return match field.kind() {
                FieldKind::Array(_) => Ok(()),
                FieldKind::StringView if mods.optional => {
                    StringView::NULL.write(out, at, width)
                }
                _ if mods.optional => Ok(()),
                _ => Err(AbiError::MissingField {
                    layout: self.name.clone(),
                    field: name.to_string(),
                }),
            };
        };
        let value: &Value = &value;

        match field.kind() {
            FieldKind::Primitive(kind) => primitive::encode(*kind, value, out, at, width, name),
            FieldKind::Enum(codec) => codec.encode(value, out, at, width, name),
            FieldKind::Struct {
                layout,
                by: NestedBy::Value,
            } => {
                let rec = value
                    .as_record()
                    .ok_or_else(|| AbiError::mismatch(name, "record", value))?;
                layout.pack_into(rec, &mut out[at..at + field.size], side, options)
            }
            FieldKind::Struct {
                layout,
                by: NestedBy::Pointer,
            } => {
                let address = match value {
                    Value::Record(rec) => {
                        let mut bytes = AlignedBytes::zeroed(layout.size());
                        layout.pack_into(rec, bytes.as_mut_slice(), side, options)?;
                        side.adopt(bytes)
                    }
                    Value::Pointer(p) => *p,
                    Value::Handle(h) => h.address(),
                    other => return Err(AbiError::mismatch(name, "record", other)),
                };
                put_address(out, at, width, address, name)
            }
            FieldKind::StringView => {
                let text = value
                    .as_str()
                    .ok_or_else(|| AbiError::mismatch(name, "text", value))?;
                StringView::encode(Some(text), side).write(out, at, width)
            }
            FieldKind::Array(elem) => {
                let address = array::pack_array(elem, value, side, options, width, name)?;
                put_address(out, at, width, address, name)
            }
            FieldKind::RawPointer | FieldKind::ObjectHandle => {
                primitive::encode(PrimitiveKind::Pointer, value, out, at, width, name)
            }
        }
    }

    /// Unpack a buffer produced by [`pack`](Self::pack).
    ///
    /// Pointers are only followed into the buffer's own side buffers. A
    /// pointer field that leads elsewhere reads back as `Value::Pointer`.
    pub fn unpack(&self, packed: &PackedBuffer) -> AbiResult<Record> {
        self.check_host_width()?;
        if packed.layout_name() != self.name || packed.len() != self.size {
            return Err(AbiError::Layout(format!(
                "buffer packed as {} ({} bytes), not {}",
                packed.layout_name(),
                packed.len(),
                self.name
            )));
        }
        self.unpack_from(packed.as_bytes(), MemoryReader::Owned(packed.side_buffers()))
    }

    /// Unpack native memory.
    ///
    /// # Safety
    /// `ptr` must address `size()` readable bytes laid out as this struct.
    /// Every non-null pointer in it (strings, arrays, nested structs) must
    /// address readable memory of the size its paired length implies.
    pub unsafe fn unpack_raw(&self, ptr: *const u8) -> AbiResult<Record> {
        self.check_host_width()?;
        if ptr.is_null() {
            return Err(AbiError::Layout(format!("{}: null struct pointer", self.name)));
        }
        // SAFETY: guaranteed by the caller.
        let bytes = unsafe { std::slice::from_raw_parts(ptr, self.size) };
        self.unpack_from(bytes, MemoryReader::Native)
    }

    pub(crate) fn unpack_from(&self, bytes: &[u8], reader: MemoryReader<'_>) -> AbiResult<Record> {
        let mut out = self.defaults.clone();
        for field in self.fields.iter().filter(|f| !f.is_write_only()) {
            if let Some(value) = self.decode_field(field, bytes, reader)? {
                out.insert(field.name(), value);
            }
        }
        Ok(out)
    }

    /// Decode one field, including write-only ones.
    pub fn read_field(&self, packed: &PackedBuffer, name: &str) -> AbiResult<Value> {
        let field = self.field(name).ok_or_else(|| AbiError::MissingField {
            layout: self.name.clone(),
            field: name.to_string(),
        })?;
        self.decode_field(field, packed.as_bytes(), MemoryReader::Owned(packed.side_buffers()))
            .map(Option::unwrap_or_default)
    }

    fn decode_field(
        &self,
        field: &LaidOutField,
        bytes: &[u8],
        reader: MemoryReader<'_>,
    ) -> AbiResult<Option<Value>> {
        let width = self.options.pointer_width;
        let at = field.offset;
        let name = field.name();
        let value = match field.kind() {
            FieldKind::Primitive(kind) => primitive::decode(*kind, bytes, at, width),
            FieldKind::Enum(codec) => codec.decode(bytes, at, width)?,
            FieldKind::Struct {
                layout,
                by: NestedBy::Value,
            } => Value::Record(layout.unpack_from(&bytes[at..at + field.size], reader)?),
            FieldKind::Struct {
                layout,
                by: NestedBy::Pointer,
            } => {
                let address = read_address(bytes, at, width) as usize;
                if address == 0 {
                    return Ok(None);
                }
                match reader.region(address, layout.size()) {
                    Some(region) => Value::Record(layout.unpack_from(region, reader)?),
                    None => Value::Pointer(address),
                }
            }
            FieldKind::StringView => Value::Text(reader.text(StringView::read(bytes, at, width), name)?),
            FieldKind::Array(elem) => {
                let address = read_address(bytes, at, width) as usize;
                let Some(len_index) = field.paired_length else {
                    return Ok(Some(Value::Pointer(address)));
                };
                // The builder only pairs integral primitive length fields.
                let len_field = &self.fields[len_index];
                let FieldKind::Primitive(len_kind) = len_field.kind() else {
                    return Err(AbiError::Layout(format!("{}: bad length field", name)));
                };
                let length = primitive::decode(*len_kind, bytes, len_field.offset, width);
                let length = length.as_u64().ok_or_else(|| AbiError::ValueOutOfRange {
                    field: len_field.name().to_string(),
                    kind: "array length".to_string(),
                })?;
                array::unpack_array(elem, address, length, reader, width, name)?
            }
            FieldKind::RawPointer => Value::Pointer(read_address(bytes, at, width) as usize),
            FieldKind::ObjectHandle => Value::Handle(NativeHandle::from_address(
                read_address(bytes, at, width) as usize,
            )),
        };
        Ok(Some(value))
    }
}

pub(crate) fn put_address(
    out: &mut [u8],
    at: usize,
    width: PointerWidth,
    address: usize,
    field: &str,
) -> AbiResult<()> {
    write_address(out, at, width, address as u64).map_err(|()| AbiError::ValueOutOfRange {
        field: field.to_string(),
        kind: "pointer".to_string(),
    })
}
