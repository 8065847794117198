// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Variable-length arrays: a pointer field plus a side buffer of
//! `count * stride` bytes. The count itself lives in a separate
//! `length_of` field.

use super::field::ElementKind;
use super::{MemoryReader, PackOptions};
use crate::buffer::{AlignedBytes, SideBuffers};
use crate::codec::{primitive, PointerWidth, PrimitiveKind};
use crate::error::{AbiError, AbiResult};
use crate::native::NativeHandle;
use crate::value::Value;

/// Pack `value` (a list) into a side buffer and return its address.
/// An empty list yields a null pointer.
pub(crate) fn pack_array(
    elem: &ElementKind,
    value: &Value,
    side: &mut SideBuffers,
    options: &PackOptions,
    width: PointerWidth,
    field: &str,
) -> AbiResult<usize> {
    let items = value
        .as_list()
        .ok_or_else(|| AbiError::mismatch(field, "list", value))?;
    if items.is_empty() {
        return Ok(0);
    }

    let stride = elem.stride(width);
    let total = items.len().checked_mul(stride).ok_or_else(|| AbiError::ValueOutOfRange {
        field: field.to_string(),
        kind: "array byte size".to_string(),
    })?;
    let mut bytes = AlignedBytes::zeroed(total);
    for (i, item) in items.iter().enumerate() {
        let at = i * stride;
        let buf = bytes.as_mut_slice();
        match elem {
            ElementKind::Primitive(kind) => primitive::encode(*kind, item, buf, at, width, field)?,
            ElementKind::Enum(codec) => codec.encode(item, buf, at, width, field)?,
            ElementKind::Struct(layout) => {
                let rec = item
                    .as_record()
                    .ok_or_else(|| AbiError::mismatch(field, "record", item))?;
                layout.pack_into(rec, &mut buf[at..at + stride], side, options)?;
            }
            ElementKind::Pointer | ElementKind::Handle => {
                primitive::encode(PrimitiveKind::Pointer, item, buf, at, width, field)?
            }
        }
    }
    log::trace!("array '{}': {} elements, {} bytes", field, items.len(), total);
    Ok(side.adopt(bytes))
}

/// Decode `length` elements at `address`.
pub(crate) fn unpack_array(
    elem: &ElementKind,
    address: usize,
    length: u64,
    reader: MemoryReader<'_>,
    width: PointerWidth,
    field: &str,
) -> AbiResult<Value> {
    if address == 0 {
        if length > 0 {
            return Err(AbiError::InconsistentArrayField {
                field: field.to_string(),
                length,
            });
        }
        return Ok(Value::List(Vec::new()));
    }

    let stride = elem.stride(width);
    let too_large = || AbiError::ValueOutOfRange {
        field: field.to_string(),
        kind: "array byte size".to_string(),
    };
    let count = usize::try_from(length).map_err(|_| too_large())?;
    let total = count.checked_mul(stride).ok_or_else(too_large)?;
    let region = reader.region(address, total).ok_or_else(|| {
        AbiError::Layout(format!("array '{}' points outside the packed buffer", field))
    })?;

    let mut items = Vec::with_capacity(count);
    for i in 0..count {
        let at = i * stride;
        let item = match elem {
            ElementKind::Primitive(kind) => primitive::decode(*kind, region, at, width),
            ElementKind::Enum(codec) => codec.decode(region, at, width)?,
            ElementKind::Struct(layout) => {
                Value::Record(layout.unpack_from(&region[at..at + stride], reader)?)
            }
            ElementKind::Pointer => {
                Value::Pointer(primitive::read_address(region, at, width) as usize)
            }
            ElementKind::Handle => Value::Handle(NativeHandle::from_address(
                primitive::read_address(region, at, width) as usize,
            )),
        };
        items.push(item);
    }
    Ok(Value::List(items))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::EnumCodec;
    use crate::layout::StructLayoutBuilder;
    use crate::value::{sym, EnumTag, Record};
    use std::sync::Arc;

    const W: PointerWidth = PointerWidth::HOST;
    const F32: ElementKind = ElementKind::Primitive(PrimitiveKind::F32);

    #[test]
    fn test_null_with_length_is_inconsistent() {
        let err = unpack_array(&F32, 0, 5, MemoryReader::Native, W, "values").unwrap_err();
        assert_eq!(
            err,
            AbiError::InconsistentArrayField {
                field: "values".into(),
                length: 5
            }
        );
    }

    #[test]
    fn test_null_with_zero_length_is_empty() {
        let value = unpack_array(&F32, 0, 0, MemoryReader::Native, W, "values").unwrap();
        assert_eq!(value, Value::List(vec![]));
    }

    #[test]
    fn test_empty_list_packs_null() {
        let mut side = SideBuffers::new();
        let address = pack_array(
            &F32,
            &Value::List(vec![]),
            &mut side,
            &PackOptions::default(),
            W,
            "values",
        )
        .unwrap();
        assert_eq!(address, 0);
        assert!(side.is_empty());
    }

    #[test]
    fn test_primitive_array_round_trip() {
        let mut side = SideBuffers::new();
        let input = Value::from(vec![1.0f32, 2.0, 3.0]);
        let address =
            pack_array(&F32, &input, &mut side, &PackOptions::default(), W, "values").unwrap();
        assert_eq!(side.total_bytes(), 12);
        let back = unpack_array(&F32, address, 3, MemoryReader::Owned(&side), W, "values").unwrap();
        assert_eq!(back, input);
    }

    #[test]
    fn test_enum_array_round_trip() {
        let codec = Arc::new(EnumCodec::new("Feature", &[("a", 1), ("b", 0x0003_0001)]));
        let elem = ElementKind::Enum(codec);
        let input = Value::List(vec![sym("b"), sym("a")]);
        let mut side = SideBuffers::new();
        let address =
            pack_array(&elem, &input, &mut side, &PackOptions::default(), W, "features").unwrap();
        let back =
            unpack_array(&elem, address, 2, MemoryReader::Owned(&side), W, "features").unwrap();
        assert_eq!(back, Value::List(vec![
            Value::Enum(EnumTag::from("b")),
            Value::Enum(EnumTag::from("a")),
        ]));
    }

    #[test]
    fn test_struct_array_round_trip() {
        let point = Arc::new(
            StructLayoutBuilder::new("Point")
                .field("x", PrimitiveKind::I16)
                .field("y", PrimitiveKind::I32)
                .build()
                .unwrap(),
        );
        let elem = ElementKind::Struct(point);
        let input = Value::List(vec![
            Value::Record(Record::new().with("x", 1i16).with("y", -2i32)),
            Value::Record(Record::new().with("x", 3i16).with("y", 4i32)),
        ]);
        let mut side = SideBuffers::new();
        let address =
            pack_array(&elem, &input, &mut side, &PackOptions::default(), W, "points").unwrap();
        assert_eq!(side.total_bytes(), 16);
        let back =
            unpack_array(&elem, address, 2, MemoryReader::Owned(&side), W, "points").unwrap();
        assert_eq!(back, input);
    }

    #[test]
    fn test_handle_array_round_trip() {
        let input = Value::List(vec![
            Value::Handle(NativeHandle::from_address(0x1000)),
            Value::Handle(NativeHandle::from_address(0x2000)),
        ]);
        let mut side = SideBuffers::new();
        let address = pack_array(
            &ElementKind::Handle,
            &input,
            &mut side,
            &PackOptions::default(),
            W,
            "layouts",
        )
        .unwrap();
        let back = unpack_array(
            &ElementKind::Handle,
            address,
            2,
            MemoryReader::Owned(&side),
            W,
            "layouts",
        )
        .unwrap();
        assert_eq!(back, input);
    }

    #[test]
    fn test_foreign_pointer_not_followed() {
        let side = SideBuffers::new();
        let err =
            unpack_array(&F32, 0xdead_0000, 2, MemoryReader::Owned(&side), W, "values").unwrap_err();
        assert!(matches!(err, AbiError::Layout(_)));
    }

    #[test]
    fn test_non_list_rejected() {
        let mut side = SideBuffers::new();
        let err = pack_array(
            &F32,
            &Value::U32(3),
            &mut side,
            &PackOptions::default(),
            W,
            "values",
        )
        .unwrap_err();
        assert!(matches!(err, AbiError::TypeMismatch { .. }));
    }
}
