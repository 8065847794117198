// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Field descriptors for native struct layouts.

use super::validate::LimitsTable;
use super::{LayoutOptions, StructLayout};
use crate::codec::{EnumCodec, PointerWidth, PrimitiveKind};
use crate::error::{AbiError, AbiResult};
use crate::value::Value;
use std::fmt;
use std::sync::Arc;

/// How a nested struct is embedded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NestedBy {
    /// Inline, at the nested layout's own size and alignment.
    Value,
    /// As a pointer to a separately packed copy.
    Pointer,
}

/// Element kind of a variable-length array.
#[derive(Debug, Clone)]
pub enum ElementKind {
    Primitive(PrimitiveKind),
    Enum(Arc<EnumCodec>),
    Struct(Arc<StructLayout>),
    Pointer,
    Handle,
}

impl ElementKind {
    /// Distance between consecutive elements.
    pub fn stride(&self, width: PointerWidth) -> usize {
        match self {
            Self::Primitive(p) => p.size(width),
            Self::Enum(codec) => codec.width().size(width),
            Self::Struct(layout) => layout.size(),
            Self::Pointer | Self::Handle => width.bytes(),
        }
    }

    pub fn label(&self) -> String {
        match self {
            Self::Primitive(p) => p.name().to_string(),
            Self::Enum(codec) => format!("enum {}", codec.name()),
            Self::Struct(layout) => format!("struct {}", layout.name()),
            Self::Pointer => "pointer".to_string(),
            Self::Handle => "handle".to_string(),
        }
    }
}

/// Closed set of field kinds.
#[derive(Debug, Clone)]
pub enum FieldKind {
    Primitive(PrimitiveKind),
    Enum(Arc<EnumCodec>),
    Struct {
        layout: Arc<StructLayout>,
        by: NestedBy,
    },
    /// Two-word `{ data, length }` string view.
    StringView,
    /// Pointer to a side buffer of elements. The count lives in a
    /// separate `length_of` field.
    Array(ElementKind),
    RawPointer,
    ObjectHandle,
}

impl FieldKind {
    /// `(size, align)` under `options`.
    ///
    /// Nested layouts must have been built for the same pointer width.
    pub fn size_align(&self, options: &LayoutOptions) -> AbiResult<(usize, usize)> {
        let width = options.pointer_width;
        let ptr = width.bytes();
        match self {
            Self::Primitive(p) => Ok((p.size(width), p.alignment(width))),
            Self::Enum(codec) => Ok((codec.width().size(width), codec.width().alignment(width))),
            Self::Struct { layout, by } => {
                if layout.options().pointer_width != width {
                    return Err(AbiError::Layout(format!(
                        "nested struct {} built for {}-byte pointers",
                        layout.name(),
                        layout.options().pointer_width.bytes()
                    )));
                }
                match by {
                    NestedBy::Value => Ok((layout.size(), layout.align())),
                    NestedBy::Pointer => Ok((ptr, ptr)),
                }
            }
            Self::StringView => Ok((2 * ptr, ptr)),
            Self::Array(ElementKind::Struct(layout))
                if layout.options().pointer_width != width =>
            {
                Err(AbiError::Layout(format!(
                    "array element struct {} built for {}-byte pointers",
                    layout.name(),
                    layout.options().pointer_width.bytes()
                )))
            }
            Self::Array(_) | Self::RawPointer | Self::ObjectHandle => Ok((ptr, ptr)),
        }
    }

    pub fn label(&self) -> String {
        match self {
            Self::Primitive(p) => p.name().to_string(),
            Self::Enum(codec) => format!("enum {}", codec.name()),
            Self::Struct {
                layout,
                by: NestedBy::Value,
            } => format!("struct {}", layout.name()),
            Self::Struct {
                layout,
                by: NestedBy::Pointer,
            } => format!("*struct {}", layout.name()),
            Self::StringView => "string_view".to_string(),
            Self::Array(elem) => format!("array<{}>", elem.label()),
            Self::RawPointer => "pointer".to_string(),
            Self::ObjectHandle => "handle".to_string(),
        }
    }

    pub(crate) fn can_carry_length(&self) -> bool {
        matches!(self, Self::Primitive(p) if p.is_integral() && *p != PrimitiveKind::Pointer)
    }

    pub(crate) fn has_length(&self) -> bool {
        matches!(self, Self::Array(_) | Self::StringView)
    }
}

/// Context handed to validators.
#[derive(Debug, Clone, Copy)]
pub struct ValidationContext<'a> {
    pub layout: &'a str,
    pub field: &'a str,
    /// Native limits reported by the device, when the caller has them.
    pub limits: Option<&'a LimitsTable>,
}

/// Field validator. Returns `Operation` for a generally invalid value and
/// `Range` for a value outside a native limit.
pub type Validator = Arc<dyn Fn(&Value, &ValidationContext<'_>) -> AbiResult<()> + Send + Sync>;

/// Build-time predicate deciding whether a field exists on a target.
#[derive(Clone)]
pub struct Condition {
    label: String,
    test: Arc<dyn Fn(&LayoutOptions) -> bool + Send + Sync>,
}

impl Condition {
    pub fn new(
        label: impl Into<String>,
        test: impl Fn(&LayoutOptions) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            label: label.into(),
            test: Arc::new(test),
        }
    }

    /// Present everywhere except Windows targets.
    pub fn not_windows() -> Self {
        Self::new("not(windows)", |o| !o.platform.is_windows())
    }

    pub fn windows() -> Self {
        Self::new("windows", |o| o.platform.is_windows())
    }

    pub fn pointer_width(width: PointerWidth) -> Self {
        Self::new(format!("pointer_width={}", width.bytes()), move |o| {
            o.pointer_width == width
        })
    }

    pub fn holds(&self, options: &LayoutOptions) -> bool {
        (self.test)(options)
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Condition").field(&self.label).finish()
    }
}

/// Per-field modifiers.
#[derive(Clone, Default)]
pub struct Modifiers {
    pub optional: bool,
    pub default: Option<Value>,
    /// Name of the array / string field whose length this field carries.
    pub length_of: Option<String>,
    pub validators: Vec<Validator>,
    pub condition: Option<Condition>,
    /// Always zero on pack, never read back.
    pub padding: bool,
}

impl fmt::Debug for Modifiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Modifiers")
            .field("optional", &self.optional)
            .field("default", &self.default)
            .field("length_of", &self.length_of)
            .field("validators", &self.validators.len())
            .field("condition", &self.condition)
            .field("padding", &self.padding)
            .finish()
    }
}

/// One declared field, before layout.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub modifiers: Modifiers,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            modifiers: Modifiers::default(),
        }
    }
}

/// A field with its resolved placement.
#[derive(Debug, Clone)]
pub struct LaidOutField {
    pub(crate) spec: FieldSpec,
    pub(crate) offset: usize,
    pub(crate) size: usize,
    pub(crate) align: usize,
    /// Index of the field this one carries the length of.
    pub(crate) length_source: Option<usize>,
    /// For arrays: index of the field carrying the element count.
    pub(crate) paired_length: Option<usize>,
}

impl LaidOutField {
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn kind(&self) -> &FieldKind {
        &self.spec.kind
    }

    pub fn modifiers(&self) -> &Modifiers {
        &self.spec.modifiers
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn align(&self) -> usize {
        self.align
    }

    /// Packed but never decoded by `unpack`.
    pub fn is_write_only(&self) -> bool {
        self.spec.modifiers.padding
            || self.length_source.is_some()
            || matches!(self.spec.kind, FieldKind::Array(_)) && self.paired_length.is_none()
    }
}
