// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! WebGPU-style enum tables.
//!
//! Tags use the lowercase, hyphenated spelling of the JS API. Native
//! extension values live in the `0x0003_xxxx` block.

use crate::codec::{EnumCodec, PrimitiveKind};

pub fn power_preference() -> EnumCodec {
    EnumCodec::new(
        "PowerPreference",
        &[
            ("undefined", 0),
            ("low-power", 1),
            ("high-performance", 2),
        ],
    )
}

pub fn backend_type() -> EnumCodec {
    EnumCodec::new(
        "BackendType",
        &[
            ("undefined", 0),
            ("null", 1),
            ("webgpu", 2),
            ("d3d11", 3),
            ("d3d12", 4),
            ("metal", 5),
            ("vulkan", 6),
            ("opengl", 7),
            ("opengles", 8),
        ],
    )
}

pub fn adapter_type() -> EnumCodec {
    EnumCodec::new(
        "AdapterType",
        &[
            ("discrete-gpu", 1),
            ("integrated-gpu", 2),
            ("cpu", 3),
            ("unknown", 4),
        ],
    )
}

/// Sparse: core features count up from 1, native ones start at 0x0003_0001.
pub fn feature_name() -> EnumCodec {
    EnumCodec::new(
        "FeatureName",
        &[
            ("depth-clip-control", 0x0000_0001),
            ("depth32float-stencil8", 0x0000_0002),
            ("timestamp-query", 0x0000_0003),
            ("texture-compression-bc", 0x0000_0004),
            ("texture-compression-etc2", 0x0000_0006),
            ("texture-compression-astc", 0x0000_0007),
            ("indirect-first-instance", 0x0000_0009),
            ("shader-f16", 0x0000_000a),
            ("float32-filterable", 0x0000_000d),
            ("push-constants", 0x0003_0001),
            ("texture-adapter-specific-format-features", 0x0003_0002),
            ("multi-draw-indirect", 0x0003_0003),
            ("vertex-writable-storage", 0x0003_0005),
            ("texture-binding-array", 0x0003_0006),
        ],
    )
}

/// Error class reported by device error scopes.
pub fn error_type() -> EnumCodec {
    EnumCodec::new(
        "ErrorType",
        &[
            ("no-error", 1),
            ("validation", 2),
            ("out-of-memory", 3),
            ("internal", 4),
            ("unknown", 5),
        ],
    )
}

pub fn error_filter() -> EnumCodec {
    EnumCodec::new(
        "ErrorFilter",
        &[("validation", 1), ("out-of-memory", 2), ("internal", 3)],
    )
}

/// Buffer map mode flags (64-bit).
pub fn map_mode() -> EnumCodec {
    EnumCodec::new("MapMode", &[("none", 0), ("read", 1), ("write", 2)])
        .with_width(PrimitiveKind::U64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::EnumTag;

    #[test]
    fn test_sparse_feature_values() {
        let codec = feature_name();
        assert_eq!(
            codec.to_int(&EnumTag::from("push-constants")).unwrap(),
            0x0003_0001
        );
        assert_eq!(
            codec.from_int(0x0003_0006).unwrap(),
            EnumTag::Symbol("texture-binding-array".into())
        );
        assert!(codec.from_int(0x0003_00ff).is_err());
        assert_eq!(codec.to_int(&EnumTag::Raw(0x0003_00ff)).unwrap(), 0x0003_00ff);
    }

    #[test]
    fn test_map_mode_is_64bit() {
        assert_eq!(map_mode().width(), PrimitiveKind::U64);
        assert_eq!(error_filter().width(), PrimitiveKind::U32);
    }
}
