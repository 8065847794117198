// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Single-use correlation tokens for native `void*` userdata.
//!
//! Each block holds `{ id, slot }` (two `u32`, 8 bytes) at a stable heap
//! address. The address goes to the native side as userdata and comes back
//! in the callback, where [`TokenPool::unpack`] recovers the id and frees
//! the slot in one step.
//!
//! Incoming pointers are matched against an address index and never
//! dereferenced, so a corrupted or foreign pointer yields an error instead
//! of a wild read.

use crate::error::{AbiError, AbiResult};
use std::collections::{HashMap, VecDeque};
use std::ffi::c_void;

/// Native-visible token block.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenBlock {
    pub id: u32,
    pub slot: u32,
}

/// A granted, not yet packed, pool slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TokenSlot(u32);

impl TokenSlot {
    pub fn index(self) -> u32 {
        self.0
    }
}

/// Growable-up-to-a-cap pool of token blocks.
///
/// Freed slots are reused in FIFO order, so a just-released block is the
/// last to be handed out again.
#[derive(Debug)]
pub struct TokenPool {
    blocks: Vec<Box<TokenBlock>>,
    in_use: Vec<bool>,
    free: VecDeque<u32>,
    by_address: HashMap<usize, u32>,
    max_capacity: usize,
}

impl TokenPool {
    /// Pool with `initial` blocks that may double up to `max_capacity`.
    pub fn new(initial: usize, max_capacity: usize) -> Self {
        let max_capacity = max_capacity.clamp(1, u32::MAX as usize);
        let mut pool = Self {
            blocks: Vec::new(),
            in_use: Vec::new(),
            free: VecDeque::new(),
            by_address: HashMap::new(),
            max_capacity,
        };
        pool.grow_to(initial.clamp(1, max_capacity));
        pool
    }

    pub fn capacity(&self) -> usize {
        self.blocks.len()
    }

    pub fn max_capacity(&self) -> usize {
        self.max_capacity
    }

    /// Slots currently granted.
    pub fn in_use(&self) -> usize {
        self.blocks.len() - self.free.len()
    }

    fn grow_to(&mut self, target: usize) {
        for slot in self.blocks.len()..target {
            // `slot` < max_capacity <= u32::MAX
            let index = slot as u32;
            let block = Box::new(TokenBlock { id: 0, slot: index });
            let address = std::ptr::addr_of!(*block) as usize;
            self.by_address.insert(address, index);
            self.blocks.push(block);
            self.in_use.push(false);
            self.free.push_back(index);
        }
    }

    /// Grant a free slot, doubling capacity when none is left.
    pub fn request(&mut self) -> AbiResult<TokenSlot> {
        if self.free.is_empty() {
            let current = self.capacity();
            let target = current.saturating_mul(2).min(self.max_capacity);
            if target <= current {
                return Err(AbiError::PoolExhausted {
                    cap: self.max_capacity,
                });
            }
            log::debug!("token pool grows {} -> {}", current, target);
            self.grow_to(target);
        }
        let index = self.free.pop_front().ok_or(AbiError::PoolExhausted {
            cap: self.max_capacity,
        })?;
        self.in_use[index as usize] = true;
        Ok(TokenSlot(index))
    }

    fn check_live(&self, slot: u32) -> AbiResult<usize> {
        let index = slot as usize;
        if index >= self.blocks.len() {
            return Err(AbiError::OutOfRange {
                slot,
                capacity: self.blocks.len(),
            });
        }
        if !self.in_use[index] {
            return Err(AbiError::DoubleRelease { slot });
        }
        Ok(index)
    }

    /// Write `id` into the slot's block and return the block address.
    pub fn pack(&mut self, slot: TokenSlot, id: u32) -> AbiResult<*mut c_void> {
        let index = self.check_live(slot.0)?;
        let block = &mut self.blocks[index];
        block.id = id;
        block.slot = slot.0;
        Ok(std::ptr::addr_of_mut!(**block).cast::<c_void>())
    }

    /// Recover the id behind a block pointer and release its slot.
    pub fn unpack(&mut self, ptr: *const c_void) -> AbiResult<u32> {
        self.unpack_block(ptr).map(|block| block.id)
    }

    /// Read the block behind `ptr` without releasing its slot.
    pub fn peek(&self, ptr: *const c_void) -> AbiResult<TokenBlock> {
        let address = ptr as usize;
        let slot = *self
            .by_address
            .get(&address)
            .ok_or(AbiError::UnknownToken { address })?;
        let index = self.check_live(slot)?;
        Ok(*self.blocks[index])
    }

    /// Like [`unpack`](Self::unpack), returning the whole block.
    pub fn unpack_block(&mut self, ptr: *const c_void) -> AbiResult<TokenBlock> {
        let block = self.peek(ptr)?;
        self.release(block.slot)?;
        Ok(block)
    }

    /// Return a slot to the free list.
    pub fn release(&mut self, slot: u32) -> AbiResult<()> {
        let index = self.check_live(slot)?;
        self.in_use[index] = false;
        self.free.push_back(slot);
        Ok(())
    }
}
