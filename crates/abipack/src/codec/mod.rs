// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Leaf codecs: scalars, enums and string views.

pub mod enum_codec;
pub mod primitive;
pub mod string_view;

pub use enum_codec::EnumCodec;
pub use primitive::PrimitiveKind;
pub use string_view::{decode_view, encode_view, StringView, STRLEN};

use serde::{Deserialize, Serialize};

/// Pointer width of the target ABI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PointerWidth {
    Four,
    Eight,
}

impl PointerWidth {
    /// Width of the running process, fixed at compile time.
    pub const HOST: Self = if std::mem::size_of::<usize>() == 8 {
        Self::Eight
    } else {
        Self::Four
    };

    pub fn bytes(self) -> usize {
        match self {
            Self::Four => 4,
            Self::Eight => 8,
        }
    }
}

impl Default for PointerWidth {
    fn default() -> Self {
        Self::HOST
    }
}
