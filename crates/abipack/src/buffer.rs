// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Packed struct buffers and the side buffers they point into.
//!
//! A packed struct stores raw addresses of its side buffers, never
//! ownership. The [`PackedBuffer`] owns both, so every embedded pointer
//! stays valid for as long as the `PackedBuffer` itself is alive. Keep it
//! alive across the native call that reads it.

use std::fmt;

/// Heap bytes with 8-byte alignment and a stable address.
///
/// Backed by `Vec<u64>`: moving the `AlignedBytes` value never moves the
/// heap block, which is what lets packed structs hold bare addresses.
pub struct AlignedBytes {
    words: Vec<u64>,
    len: usize,
}

/// Maximum alignment a packed struct may require.
pub const MAX_ALIGN: usize = 8;

impl AlignedBytes {
    /// Allocate `len` zeroed bytes. Zero-length allocations still get a
    /// valid, non-null address.
    pub fn zeroed(len: usize) -> Self {
        let words = len.div_ceil(8).max(1);
        Self {
            words: vec![0u64; words],
            len,
        }
    }

    /// Copy `data` into a fresh allocation.
    pub fn from_slice(data: &[u8]) -> Self {
        let mut out = Self::zeroed(data.len());
        out.as_mut_slice().copy_from_slice(data);
        out
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: `words` owns at least `len` initialized bytes (len <= words.len() * 8)
        // and u8 has no alignment requirement.
        unsafe { std::slice::from_raw_parts(self.words.as_ptr().cast::<u8>(), self.len) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: same bounds as `as_slice`; `&mut self` guarantees exclusivity.
        unsafe { std::slice::from_raw_parts_mut(self.words.as_mut_ptr().cast::<u8>(), self.len) }
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.words.as_ptr().cast::<u8>()
    }

    pub fn address(&self) -> usize {
        self.as_ptr() as usize
    }
}

impl fmt::Debug for AlignedBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlignedBytes")
            .field("address", &format_args!("{:#x}", self.address()))
            .field("len", &self.len)
            .finish()
    }
}

/// Payload storage referenced from a packed struct (arrays, strings,
/// nested-by-pointer structs).
#[derive(Debug, Default)]
pub struct SideBuffers {
    buffers: Vec<AlignedBytes>,
}

impl SideBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a filled buffer and return its address.
    pub fn adopt(&mut self, bytes: AlignedBytes) -> usize {
        let address = bytes.address();
        self.buffers.push(bytes);
        address
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Total payload bytes held.
    pub fn total_bytes(&self) -> usize {
        self.buffers.iter().map(AlignedBytes::len).sum()
    }

    /// True if `address..address + len` lies inside one of the buffers.
    pub fn contains_range(&self, address: usize, len: usize) -> bool {
        let Some(end) = address.checked_add(len) else {
            return false;
        };
        self.buffers.iter().any(|b| {
            let start = b.address();
            address >= start && end <= start + b.len().max(1)
        })
    }
}

/// One packed struct plus everything it points into.
#[derive(Debug)]
pub struct PackedBuffer {
    layout: String,
    main: AlignedBytes,
    side: SideBuffers,
}

impl PackedBuffer {
    pub(crate) fn new(layout: &str, main: AlignedBytes, side: SideBuffers) -> Self {
        Self {
            layout: layout.to_string(),
            main,
            side,
        }
    }

    /// Name of the layout that produced this buffer.
    pub fn layout_name(&self) -> &str {
        &self.layout
    }

    /// Struct bytes (not including side buffers).
    pub fn as_bytes(&self) -> &[u8] {
        self.main.as_slice()
    }

    /// Address of the struct, suitable for passing to a native call.
    pub fn as_ptr(&self) -> *const u8 {
        self.main.as_ptr()
    }

    pub fn len(&self) -> usize {
        self.main.len()
    }

    pub fn is_empty(&self) -> bool {
        self.main.is_empty()
    }

    pub fn side_buffers(&self) -> &SideBuffers {
        &self.side
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alignment_and_zeroing() {
        let bytes = AlignedBytes::zeroed(13);
        assert_eq!(bytes.len(), 13);
        assert_eq!(bytes.address() % MAX_ALIGN, 0);
        assert!(bytes.as_slice().iter().all(|b| *b == 0));
    }

    #[test]
    fn test_empty_has_valid_address() {
        let bytes = AlignedBytes::zeroed(0);
        assert!(bytes.is_empty());
        assert_ne!(bytes.address(), 0);
    }

    #[test]
    fn test_address_stable_across_moves() {
        let bytes = AlignedBytes::from_slice(b"pipe");
        let before = bytes.address();
        let mut side = SideBuffers::new();
        let adopted = side.adopt(bytes);
        assert_eq!(before, adopted);
        let moved = side;
        assert!(moved.contains_range(adopted, 4));
        assert_eq!(moved.total_bytes(), 4);
    }
}
