// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fluent builder API for StructLayout.

use super::field::{
    Condition, ElementKind, FieldKind, FieldSpec, LaidOutField, NestedBy, ValidationContext,
};
use super::{align_up, LayoutOptions, StructLayout};
use crate::codec::{EnumCodec, PrimitiveKind};
use crate::error::{AbiError, AbiResult};
use crate::value::{Record, Value};
use std::collections::HashSet;
use std::sync::Arc;

/// Builder for creating StructLayout instances.
///
/// Modifier methods (`optional`, `default_value`, ...) apply to the most
/// recently added field.
#[derive(Debug)]
pub struct StructLayoutBuilder {
    name: String,
    fields: Vec<FieldSpec>,
    options: LayoutOptions,
    defaults: Record,
    error: Option<AbiError>,
}

impl StructLayoutBuilder {
    /// Create a new builder for a struct type.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            options: LayoutOptions::host(),
            defaults: Record::new(),
            error: None,
        }
    }

    /// Add a primitive field.
    pub fn field(self, name: impl Into<String>, kind: PrimitiveKind) -> Self {
        self.field_with_kind(name, FieldKind::Primitive(kind))
    }

    /// Add a field of any kind.
    pub fn field_with_kind(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(FieldSpec::new(name, kind));
        self
    }

    pub fn enum_field(self, name: impl Into<String>, codec: Arc<EnumCodec>) -> Self {
        self.field_with_kind(name, FieldKind::Enum(codec))
    }

    /// Add a `{ data, length }` string view.
    pub fn string_field(self, name: impl Into<String>) -> Self {
        self.field_with_kind(name, FieldKind::StringView)
    }

    /// Add an array pointer. Pair it with a `length_of` count field.
    pub fn array_field(self, name: impl Into<String>, element: ElementKind) -> Self {
        self.field_with_kind(name, FieldKind::Array(element))
    }

    /// Add a nested struct embedded by value.
    pub fn struct_field(self, name: impl Into<String>, layout: Arc<StructLayout>) -> Self {
        self.field_with_kind(
            name,
            FieldKind::Struct {
                layout,
                by: NestedBy::Value,
            },
        )
    }

    /// Add a pointer to a nested struct.
    pub fn struct_ptr_field(self, name: impl Into<String>, layout: Arc<StructLayout>) -> Self {
        self.field_with_kind(
            name,
            FieldKind::Struct {
                layout,
                by: NestedBy::Pointer,
            },
        )
    }

    pub fn pointer_field(self, name: impl Into<String>) -> Self {
        self.field_with_kind(name, FieldKind::RawPointer)
    }

    pub fn handle_field(self, name: impl Into<String>) -> Self {
        self.field_with_kind(name, FieldKind::ObjectHandle)
    }

    /// Add an explicit padding field (always zero).
    pub fn padding(self, name: impl Into<String>, kind: PrimitiveKind) -> Self {
        self.field(name, kind).modify(|spec| {
            spec.modifiers.padding = true;
            spec.modifiers.optional = true;
        })
    }

    /// Mark the last field optional: absent packs as zero.
    pub fn optional(self) -> Self {
        self.modify(|spec| spec.modifiers.optional = true)
    }

    /// Value used when the field is absent.
    pub fn default_value(self, value: impl Into<Value>) -> Self {
        let value = value.into();
        self.modify(move |spec| spec.modifiers.default = Some(value))
    }

    /// The last field always carries the length of `target`.
    pub fn length_of(self, target: impl Into<String>) -> Self {
        let target = target.into();
        self.modify(move |spec| spec.modifiers.length_of = Some(target))
    }

    pub fn validate(
        self,
        validator: impl Fn(&Value, &ValidationContext<'_>) -> AbiResult<()> + Send + Sync + 'static,
    ) -> Self {
        self.modify(move |spec| spec.modifiers.validators.push(Arc::new(validator)))
    }

    /// Only lay out the last field when `condition` holds for the target.
    pub fn when(self, condition: Condition) -> Self {
        self.modify(move |spec| spec.modifiers.condition = Some(condition))
    }

    /// Record that seeds every `unpack` result.
    pub fn defaults(mut self, defaults: Record) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn options(mut self, options: LayoutOptions) -> Self {
        self.options = options;
        self
    }

    fn modify(mut self, f: impl FnOnce(&mut FieldSpec)) -> Self {
        match self.fields.last_mut() {
            Some(spec) => f(spec),
            None => {
                self.error.get_or_insert_with(|| {
                    AbiError::Layout(format!("{}: modifier applied before any field", self.name))
                });
            }
        }
        self
    }

    /// Build the StructLayout.
    pub fn build(self) -> AbiResult<StructLayout> {
        if let Some(err) = self.error {
            return Err(err);
        }
        let options = self.options;
        let mut seen = HashSet::new();
        let mut fields: Vec<LaidOutField> = Vec::with_capacity(self.fields.len());
        let mut offset = 0usize;
        let mut max_align = 1usize;

        for spec in self.fields {
            if let Some(condition) = &spec.modifiers.condition {
                if !condition.holds(&options) {
                    log::trace!(
                        "layout {}: field '{}' skipped ({})",
                        self.name,
                        spec.name,
                        condition.label()
                    );
                    continue;
                }
            }
            if !seen.insert(spec.name.clone()) {
                return Err(AbiError::Layout(format!(
                    "{}: duplicate field '{}'",
                    self.name, spec.name
                )));
            }
            let (size, align) = spec.kind.size_align(&options)?;
            offset = align_up(offset, align);
            fields.push(LaidOutField {
                spec,
                offset,
                size,
                align,
                length_source: None,
                paired_length: None,
            });
            offset += size;
            max_align = max_align.max(align);
        }
        let size = align_up(offset, max_align);

        for i in 0..fields.len() {
            let Some(target) = fields[i].spec.modifiers.length_of.clone() else {
                continue;
            };
            let j = fields
                .iter()
                .position(|f| f.name() == target)
                .ok_or_else(|| {
                    AbiError::Layout(format!(
                        "{}.{}: length_of target '{}' not found",
                        self.name,
                        fields[i].name(),
                        target
                    ))
                })?;
            if !fields[j].kind().has_length() {
                return Err(AbiError::Layout(format!(
                    "{}.{}: length_of target '{}' is {}, not an array or string",
                    self.name,
                    fields[i].name(),
                    target,
                    fields[j].kind().label()
                )));
            }
            if !fields[i].kind().can_carry_length() {
                return Err(AbiError::Layout(format!(
                    "{}.{}: a length field must be an integer, not {}",
                    self.name,
                    fields[i].name(),
                    fields[i].kind().label()
                )));
            }
            fields[i].length_source = Some(j);
            if matches!(fields[j].kind(), FieldKind::Array(_)) && fields[j].paired_length.is_none()
            {
                fields[j].paired_length = Some(i);
            }
        }

        log::debug!(
            "layout {} built: {} fields, size {}, align {}",
            self.name,
            fields.len(),
            size,
            max_align
        );
        Ok(StructLayout {
            name: self.name,
            fields,
            size,
            align: max_align,
            options,
            defaults: self.defaults,
        })
    }
}
