// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Callback-info struct, the `extern "C"` trampoline and instance routing.

use super::BridgeInner;
use crate::codec::{decode_view, EnumCodec, STRLEN};
use crate::error::{AbiError, AbiResult};
use crate::layout::{LayoutOptions, StructLayout, StructLayoutBuilder};
use crate::value::{EnumTag, Record, Value};
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::ffi::{c_char, c_void};
use std::panic::AssertUnwindSafe;
use std::rc::{Rc, Weak};
use std::sync::Arc;

/// Native status meaning success. Every other status is a failure.
pub const STATUS_SUCCESS: u32 = 1;

/// Callback signature the native side invokes on completion.
pub type NativeCallback = extern "C" fn(
    status: u32,
    error_type: u32,
    payload: *const c_void,
    message: *const c_char,
    message_len: usize,
    userdata1: *mut c_void,
    userdata2: *mut c_void,
);

/// When the native side is allowed to fire a callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackMode {
    /// Only from inside a native wait-any.
    WaitAnyOnly,
    /// From wait-any or `process_events`.
    AllowProcessEvents,
    /// From any thread at any time.
    AllowSpontaneous,
}

impl CallbackMode {
    pub fn code(self) -> u32 {
        match self {
            Self::WaitAnyOnly => 1,
            Self::AllowProcessEvents => 2,
            Self::AllowSpontaneous => 3,
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "wait-any-only" => Some(Self::WaitAnyOnly),
            "allow-process-events" => Some(Self::AllowProcessEvents),
            "allow-spontaneous" => Some(Self::AllowSpontaneous),
            _ => None,
        }
    }

    pub fn codec() -> EnumCodec {
        EnumCodec::new(
            "CallbackMode",
            &[
                ("wait-any-only", 1),
                ("allow-process-events", 2),
                ("allow-spontaneous", 3),
            ],
        )
    }
}

/// `{ next_in_chain, mode, callback, userdata1, userdata2 }`.
pub fn callback_info_layout(options: LayoutOptions) -> AbiResult<StructLayout> {
    StructLayoutBuilder::new("CallbackInfo")
        .pointer_field("next_in_chain")
        .optional()
        .enum_field("mode", Arc::new(CallbackMode::codec()))
        .pointer_field("callback")
        .pointer_field("userdata1")
        .optional()
        .pointer_field("userdata2")
        .optional()
        .options(options)
        .build()
}

/// Decoded callback-info struct, as a native implementation sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallbackInfo {
    pub next_in_chain: usize,
    pub mode: CallbackMode,
    pub callback: usize,
    pub userdata1: usize,
    pub userdata2: usize,
}

fn pointer_of(record: &Record, name: &str) -> usize {
    match record.get(name) {
        Some(Value::Pointer(address)) => *address,
        _ => 0,
    }
}

impl CallbackInfo {
    /// Read a callback-info struct out of native memory.
    ///
    /// # Safety
    /// `ptr` must address a live struct laid out by `layout`.
    pub unsafe fn read(layout: &StructLayout, ptr: *const c_void) -> AbiResult<Self> {
        // SAFETY: forwarded from the caller.
        let record = unsafe { layout.unpack_raw(ptr.cast()) }?;
        let mode = match record.get("mode") {
            Some(Value::Enum(EnumTag::Symbol(tag))) => CallbackMode::from_tag(tag),
            _ => None,
        }
        .ok_or_else(|| AbiError::InvalidEnumValue {
            enum_name: "CallbackMode".into(),
            value: format!("{:?}", record.get("mode")),
        })?;
        Ok(Self {
            next_in_chain: pointer_of(&record, "next_in_chain"),
            mode,
            callback: pointer_of(&record, "callback"),
            userdata1: pointer_of(&record, "userdata1"),
            userdata2: pointer_of(&record, "userdata2"),
        })
    }

    /// Invoke the stored callback the way a native implementation would.
    ///
    /// # Safety
    /// `callback` must hold a [`NativeCallback`] address (any info struct
    /// packed by the bridge does), and `payload` must be null or match the
    /// response layout of the operation.
    pub unsafe fn fire(
        &self,
        status: u32,
        error_type: u32,
        payload: *const c_void,
        message: Option<&str>,
    ) {
        if self.callback == 0 {
            return;
        }
        // SAFETY: non-null and a NativeCallback per the contract above.
        let callback: NativeCallback = unsafe { std::mem::transmute(self.callback) };
        let (text, len) = match message {
            Some(m) => (m.as_ptr().cast::<c_char>(), m.len()),
            None => (std::ptr::null(), 0),
        };
        callback(
            status,
            error_type,
            payload,
            text,
            len,
            self.userdata1 as *mut c_void,
            self.userdata2 as *mut c_void,
        );
    }
}

/// `userdata2` holds the route in its low half and the low half of the
/// call ticket in its high half.
const STAMP_SHIFT: u32 = usize::BITS / 2;
const HALF_MASK: usize = (1usize << STAMP_SHIFT) - 1;

pub(crate) fn pack_userdata2(route: u32, ticket: u32) -> usize {
    (((ticket as usize) & HALF_MASK) << STAMP_SHIFT) | ((route as usize) & HALF_MASK)
}

/// `(route, ticket stamp)` carried by a callback's `userdata2`.
pub(crate) fn unpack_userdata2(raw: usize) -> (u32, u32) {
    ((raw & HALF_MASK) as u32, ((raw >> STAMP_SHIFT) & HALF_MASK) as u32)
}

/// Whether a callback stamped with `stamp` belongs to the call holding `ticket`.
pub(crate) fn stamp_matches(ticket: u32, stamp: u32) -> bool {
    ((ticket as usize) & HALF_MASK) as u32 == stamp
}

thread_local! {
    static ROUTES: RefCell<HashMap<u32, Weak<BridgeInner>>> = RefCell::new(HashMap::new());
    static NEXT_ROUTE: Cell<u32> = const { Cell::new(1) };
}

pub(crate) fn allocate_route() -> u32 {
    NEXT_ROUTE.with(|next| {
        let id = next.get();
        // Routes must fit the low half of userdata2.
        let following = if id as usize >= HALF_MASK { 1 } else { id + 1 };
        next.set(following);
        id
    })
}

pub(crate) fn register_route(route: u32, bridge: Weak<BridgeInner>) {
    ROUTES.with(|routes| routes.borrow_mut().insert(route, bridge));
}

pub(crate) fn unregister_route(route: u32) {
    // The table may already be gone during thread teardown.
    let _ = ROUTES.try_with(|routes| routes.borrow_mut().remove(&route));
}

fn lookup_route(route: u32) -> Option<Rc<BridgeInner>> {
    ROUTES
        .try_with(|routes| routes.borrow().get(&route).and_then(Weak::upgrade))
        .ok()
        .flatten()
}

/// Trampoline handed to every native async entry point.
pub(crate) extern "C" fn bridge_callback(
    status: u32,
    error_type: u32,
    payload: *const c_void,
    message: *const c_char,
    message_len: usize,
    userdata1: *mut c_void,
    userdata2: *mut c_void,
) {
    let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
        let (route, stamp) = unpack_userdata2(userdata2 as usize);
        let Some(bridge) = lookup_route(route) else {
            log::warn!(
                "callback for unknown bridge route {:p} dropped",
                userdata2
            );
            return;
        };
        let length = if message_len == usize::MAX {
            STRLEN
        } else {
            message_len as u64
        };
        // SAFETY: the native side passes a readable message of that length
        // (or NUL-terminated for STRLEN), or null.
        let message = unsafe { decode_view(message, length) };
        bridge.settle(status, error_type, payload, message, userdata1, stamp);
    }));
    if outcome.is_err() {
        log::error!("panic inside native callback suppressed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_info_layout_64bit() {
        let layout = callback_info_layout(LayoutOptions::host()).unwrap();
        if cfg!(target_pointer_width = "64") {
            assert_eq!(layout.size(), 40);
            assert_eq!(layout.field("mode").unwrap().offset(), 8);
            assert_eq!(layout.field("userdata2").unwrap().offset(), 32);
        }
    }

    #[test]
    fn test_info_read_back() {
        let layout = callback_info_layout(LayoutOptions::host()).unwrap();
        let packed = layout
            .pack(
                &Record::new()
                    .with("mode", Value::U32(CallbackMode::AllowSpontaneous.code()))
                    .with("callback", Value::Pointer(0x1000))
                    .with("userdata1", Value::Pointer(0x2000))
                    .with("userdata2", Value::Pointer(7)),
                &Default::default(),
            )
            .unwrap();
        // SAFETY: packed is a live CallbackInfo buffer.
        let info = unsafe { CallbackInfo::read(&layout, packed.as_ptr().cast()) }.unwrap();
        assert_eq!(
            info,
            CallbackInfo {
                next_in_chain: 0,
                mode: CallbackMode::AllowSpontaneous,
                callback: 0x1000,
                userdata1: 0x2000,
                userdata2: 7,
            }
        );
    }

    #[test]
    fn test_mode_codes_match_codec() {
        let codec = CallbackMode::codec();
        for mode in [
            CallbackMode::WaitAnyOnly,
            CallbackMode::AllowProcessEvents,
            CallbackMode::AllowSpontaneous,
        ] {
            let tag = codec.from_int(mode.code() as i64).unwrap();
            let EnumTag::Symbol(tag) = tag else {
                panic!("expected a symbol");
            };
            assert_eq!(CallbackMode::from_tag(&tag), Some(mode));
        }
    }

    #[test]
    fn test_userdata2_carries_route_and_stamp() {
        let raw = pack_userdata2(5, 42);
        assert_eq!(unpack_userdata2(raw), (5, 42));
        assert!(stamp_matches(42, unpack_userdata2(raw).1));
        assert!(!stamp_matches(43, unpack_userdata2(raw).1));
        if cfg!(target_pointer_width = "64") {
            assert_eq!(unpack_userdata2(pack_userdata2(1, u32::MAX)), (1, u32::MAX));
        }
    }

    #[test]
    fn test_unknown_route_is_dropped() {
        bridge_callback(
            STATUS_SUCCESS,
            0,
            std::ptr::null(),
            std::ptr::null(),
            0,
            std::ptr::null_mut(),
            0xdead_usize as *mut c_void,
        );
    }
}
