// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Symbolic tag <-> native integer mapping.

use super::{primitive, PointerWidth, PrimitiveKind};
use crate::error::{AbiError, AbiResult};
use crate::value::{EnumTag, Value};
use std::collections::HashMap;

/// Bidirectional enum table.
///
/// Native enums are frequently sparse (feature flags, vendor extensions in
/// the `0x0003_0000` range), so the mapping is an explicit table rather than
/// an ordinal.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumCodec {
    name: String,
    to_native: HashMap<String, i64>,
    from_native: HashMap<i64, String>,
    width: PrimitiveKind,
}

impl EnumCodec {
    /// Build from `(tag, value)` pairs with 4-byte storage.
    pub fn new(name: impl Into<String>, variants: &[(&str, i64)]) -> Self {
        let mut to_native = HashMap::with_capacity(variants.len());
        let mut from_native = HashMap::with_capacity(variants.len());
        for (tag, value) in variants {
            to_native.insert((*tag).to_string(), *value);
            // First tag wins when two tags alias the same value.
            from_native.entry(*value).or_insert_with(|| (*tag).to_string());
        }
        Self {
            name: name.into(),
            to_native,
            from_native,
            width: PrimitiveKind::U32,
        }
    }

    /// Set the underlying storage kind (must be integral).
    pub fn with_width(mut self, width: PrimitiveKind) -> Self {
        debug_assert!(width.is_integral(), "enum storage must be integral");
        self.width = width;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn width(&self) -> PrimitiveKind {
        self.width
    }

    /// Number of symbolic variants.
    pub fn len(&self) -> usize {
        self.to_native.len()
    }

    pub fn is_empty(&self) -> bool {
        self.to_native.is_empty()
    }

    /// Symbolic tags in ascending native order.
    pub fn tags(&self) -> Vec<&str> {
        let mut pairs: Vec<(&i64, &String)> = self.from_native.iter().collect();
        pairs.sort_by_key(|(v, _)| **v);
        pairs.into_iter().map(|(_, t)| t.as_str()).collect()
    }

    /// Tag to native value. Raw codes pass through untouched.
    pub fn to_int(&self, tag: &EnumTag) -> AbiResult<i64> {
        match tag {
            EnumTag::Raw(v) => Ok(*v),
            EnumTag::Symbol(s) => self.to_native.get(s).copied().ok_or_else(|| {
                AbiError::InvalidEnumValue {
                    enum_name: self.name.clone(),
                    value: s.clone(),
                }
            }),
        }
    }

    /// Native value to symbolic tag.
    pub fn from_int(&self, value: i64) -> AbiResult<EnumTag> {
        self.from_native
            .get(&value)
            .map(|s| EnumTag::Symbol(s.clone()))
            .ok_or_else(|| AbiError::InvalidEnumValue {
                enum_name: self.name.clone(),
                value: value.to_string(),
            })
    }

    /// Resolve a field value (enum tag, symbol text or raw integer).
    pub fn resolve(&self, value: &Value, field: &str) -> AbiResult<i64> {
        match value {
            Value::Enum(tag) => self.to_int(tag),
            Value::Text(s) => self.to_int(&EnumTag::Symbol(s.clone())),
            other => other
                .as_integer()
                .and_then(|v| i64::try_from(v).ok())
                .ok_or_else(|| AbiError::mismatch(field, &self.name, other)),
        }
    }

    pub fn encode(
        &self,
        value: &Value,
        buf: &mut [u8],
        offset: usize,
        width: PointerWidth,
        field: &str,
    ) -> AbiResult<()> {
        let raw = self.resolve(value, field)?;
        primitive::encode(self.width, &Value::I64(raw), buf, offset, width, field)
    }

    pub fn decode(&self, buf: &[u8], offset: usize, width: PointerWidth) -> AbiResult<Value> {
        let raw = primitive::decode(self.width, buf, offset, width)
            .as_integer()
            .unwrap_or_default();
        let raw = i64::try_from(raw).map_err(|_| AbiError::InvalidEnumValue {
            enum_name: self.name.clone(),
            value: raw.to_string(),
        })?;
        self.from_int(raw).map(Value::Enum)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feature_names() -> EnumCodec {
        EnumCodec::new(
            "FeatureName",
            &[
                ("depth-clip-control", 0x01),
                ("depth32float-stencil8", 0x02),
                ("timestamp-query", 0x03),
                ("push-constants", 0x0003_0001),
                ("texture-adapter-specific-format-features", 0x0003_0002),
            ],
        )
    }

    #[test]
    fn test_bidirectional() {
        let codec = feature_names();
        for tag in codec.tags() {
            let t = EnumTag::Symbol(tag.to_string());
            let v = codec.to_int(&t).unwrap();
            assert_eq!(codec.from_int(v).unwrap(), t);
        }
    }

    #[test]
    fn test_unknown_value_rejected() {
        let codec = feature_names();
        let err = codec.from_int(0x99).unwrap_err();
        assert!(matches!(err, AbiError::InvalidEnumValue { .. }));

        let err = codec.to_int(&EnumTag::from("nope")).unwrap_err();
        assert!(matches!(err, AbiError::InvalidEnumValue { .. }));
    }

    #[test]
    fn test_raw_passthrough() {
        let codec = feature_names();
        assert_eq!(codec.to_int(&EnumTag::Raw(0x0003_0001)).unwrap(), 0x0003_0001);
        assert_eq!(codec.resolve(&Value::U32(7), "f").unwrap(), 7);
        assert_eq!(codec.resolve(&Value::from("timestamp-query"), "f").unwrap(), 3);
    }

    #[test]
    fn test_sparse_tags_sorted() {
        let codec = feature_names();
        assert_eq!(codec.tags().first().copied(), Some("depth-clip-control"));
        assert_eq!(
            codec.tags().last().copied(),
            Some("texture-adapter-specific-format-features")
        );
    }

    #[test]
    fn test_narrow_storage() {
        let codec = EnumCodec::new("Mode", &[("a", 1), ("b", 2)]).with_width(PrimitiveKind::U8);
        let mut buf = [0u8; 2];
        codec
            .encode(&Value::from("b"), &mut buf, 1, PointerWidth::Eight, "m")
            .unwrap();
        assert_eq!(buf, [0, 2]);
        assert_eq!(
            codec.decode(&buf, 1, PointerWidth::Eight).unwrap(),
            Value::Enum(EnumTag::from("b"))
        );
    }
}
