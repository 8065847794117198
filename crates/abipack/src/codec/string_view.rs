// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! `{ data, length }` string views.
//!
//! A null `data` with `length == STRLEN` tells the native side to treat the
//! string as absent / NUL-terminated. The sentinel is part of the native
//! ABI and must stay bit-exact.

use super::primitive::{read_address, write_address};
use super::PointerWidth;
use crate::buffer::{AlignedBytes, SideBuffers};
use crate::error::{AbiError, AbiResult};
use std::os::raw::c_char;

/// "Use strlen" length sentinel (all ones).
pub const STRLEN: u64 = u64::MAX;

/// An encoded view, as written into a struct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StringView {
    pub data: usize,
    pub length: u64,
}

impl StringView {
    /// The absent-string view: null pointer, `STRLEN` length.
    pub const NULL: Self = Self {
        data: 0,
        length: STRLEN,
    };

    /// Encode `text`, copying its bytes into a side buffer.
    ///
    /// `Some("")` still gets a valid non-null pointer with length zero,
    /// which native code distinguishes from an absent string.
    pub fn encode(text: Option<&str>, side: &mut SideBuffers) -> Self {
        match text {
            None => Self::NULL,
            Some(s) => {
                let data = side.adopt(AlignedBytes::from_slice(s.as_bytes()));
                Self {
                    data,
                    length: s.len() as u64,
                }
            }
        }
    }

    /// Decode the view back to text.
    ///
    /// # Safety
    /// When `data` is non-null it must point to `length` readable bytes, or
    /// to a NUL-terminated string when `length == STRLEN`.
    pub unsafe fn decode(&self) -> String {
        if self.data == 0 || self.length == 0 {
            return String::new();
        }
        let ptr = self.data as *const c_char;
        let len = if self.is_strlen() {
            // SAFETY: caller guarantees NUL termination for the sentinel length.
            unsafe { libc::strlen(ptr) }
        } else {
            self.length as usize
        };
        // SAFETY: caller guarantees `len` readable bytes at `ptr`.
        let bytes = unsafe { std::slice::from_raw_parts(ptr.cast::<u8>(), len) };
        String::from_utf8_lossy(bytes).into_owned()
    }

    /// True when the length is the strlen sentinel.
    pub fn is_strlen(&self) -> bool {
        self.length == STRLEN
    }

    /// Write the view at `offset` (data word, then length word).
    pub fn write(&self, buf: &mut [u8], offset: usize, width: PointerWidth) -> AbiResult<()> {
        let length = match width {
            PointerWidth::Eight => self.length,
            // size_t is 32-bit: the sentinel truncates to all-ones u32.
            PointerWidth::Four if self.length == STRLEN => u64::from(u32::MAX),
            PointerWidth::Four => self.length,
        };
        let overflow = |_| AbiError::Layout("string view does not fit 4-byte size_t".into());
        write_address(buf, offset, width, self.data as u64).map_err(overflow)?;
        write_address(buf, offset + width.bytes(), width, length).map_err(overflow)?;
        Ok(())
    }

    /// Read a view written by [`write`](Self::write).
    pub fn read(buf: &[u8], offset: usize, width: PointerWidth) -> Self {
        let data = read_address(buf, offset, width) as usize;
        let raw_len = read_address(buf, offset + width.bytes(), width);
        let length = match width {
            PointerWidth::Four if raw_len == u64::from(u32::MAX) => STRLEN,
            _ => raw_len,
        };
        Self { data, length }
    }
}

/// Encode optional text into a `(data, length)` pair.
pub fn encode_view(text: Option<&str>, side: &mut SideBuffers) -> (usize, u64) {
    let view = StringView::encode(text, side);
    (view.data, view.length)
}

/// Decode a native `(data, length)` pair.
///
/// # Safety
/// See [`StringView::decode`].
pub unsafe fn decode_view(data: *const c_char, length: u64) -> String {
    let view = StringView {
        data: data as usize,
        length,
    };
    // SAFETY: forwarded to the caller.
    unsafe { view.decode() }
}
