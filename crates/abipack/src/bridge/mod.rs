// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Async callback bridge.
//!
//! Turns a native "call with a callback-info struct, get called back later"
//! entry point into a Rust future:
//!
//! 1. Pack the request struct and a callback-info struct whose `userdata1`
//!    is a [`TokenPool`] block and whose `userdata2` carries this bridge's
//!    route plus a per-call ticket.
//! 2. Check the entry point's signature, take an event pump obligation and
//!    register a pending entry for `(family, id)`.
//! 3. When the native side invokes the trampoline, the ticket is compared
//!    with the call currently holding the token's slot. On a match the token
//!    is unpacked (freeing its slot), the pending entry is removed, and the
//!    future is settled exactly once. A stale ticket is dropped.
//!
//! The bridge is single-threaded (`Rc` + `RefCell`), so it is `!Send`.
//! Callbacks must arrive on the thread that owns the bridge; a callback on
//! another thread finds no route and is dropped with a warning.

mod callback;
mod pending;
mod pump;

pub use callback::{
    callback_info_layout, CallbackInfo, CallbackMode, NativeCallback, STATUS_SUCCESS,
};
pub use pending::PendingCall;
pub use pump::{EventPump, PumpScheduler};

use crate::buffer::PackedBuffer;
use crate::config::BridgeConfig;
use crate::error::{AbiError, AbiResult, NativeErrorKind};
use crate::layout::{LayoutOptions, LimitsTable, PackOptions, StructLayout};
use crate::native::{NativeArg, NativeHandle, NativeTable};
use crate::token_pool::{TokenPool, TokenSlot};
use crate::value::{Record, Value};
use callback::bridge_callback;
use pending::{FamilyState, PendingRequest};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::ffi::c_void;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

/// Message reported when a native failure carries no text.
pub const EMPTY_FAILURE_MESSAGE: &str = "native operation failed without a message";

/// Successful settlement of an async call.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    /// Response struct, unpacked with the operation's response layout
    /// (empty when the operation has none or the payload was null).
    pub payload: Record,
    pub message: String,
}

/// Static description of one async native entry point.
#[derive(Debug, Clone)]
pub struct OperationSpec {
    /// Family name; request ids are allocated per family.
    pub family: String,
    /// Native symbol taking `(target, [request], callback_info)`.
    pub entry_point: String,
    /// Request struct. `None` for entry points without a descriptor.
    pub request: Option<Arc<StructLayout>>,
    /// Layout of the struct the callback's payload points at.
    pub response: Option<Arc<StructLayout>>,
}

impl OperationSpec {
    pub fn new(family: impl Into<String>, entry_point: impl Into<String>) -> Self {
        Self {
            family: family.into(),
            entry_point: entry_point.into(),
            request: None,
            response: None,
        }
    }

    pub fn with_request(mut self, layout: Arc<StructLayout>) -> Self {
        self.request = Some(layout);
        self
    }

    pub fn with_response(mut self, layout: Arc<StructLayout>) -> Self {
        self.response = Some(layout);
        self
    }
}

/// Call the native side still owes a callback for, keyed by token slot.
#[derive(Debug, Clone, Copy)]
struct InFlight {
    family: usize,
    ticket: u32,
}

pub(crate) struct BridgeInner {
    table: NativeTable,
    instance: NativeHandle,
    config: BridgeConfig,
    route: u32,
    callback_info: StructLayout,
    pool: RefCell<TokenPool>,
    families: RefCell<Vec<FamilyState>>,
    in_flight: RefCell<HashMap<u32, InFlight>>,
    next_ticket: Cell<u32>,
    limits: RefCell<Option<Arc<LimitsTable>>>,
    pub(crate) pump: EventPump,
}

impl Drop for BridgeInner {
    fn drop(&mut self) {
        callback::unregister_route(self.route);
    }
}

impl BridgeInner {
    fn family_index(&self, name: &str) -> usize {
        let mut families = self.families.borrow_mut();
        if let Some(index) = families.iter().position(|f| f.name == name) {
            return index;
        }
        families.push(FamilyState::new(name));
        families.len() - 1
    }

    /// Call `process_events` once. Returns whether obligations remain.
    pub(crate) fn tick(&self) -> AbiResult<bool> {
        // No borrow is held here: callbacks fired inside may issue or settle.
        self.table.call(
            &self.config.process_events_symbol,
            &[NativeArg::Pointer(self.instance.address())],
        )?;
        Ok(self.pump.outstanding() > 0)
    }

    fn release_slot(&self, slot: TokenSlot) {
        if let Err(e) = self.pool.borrow_mut().release(slot.index()) {
            log::error!("token slot {} release failed: {}", slot.index(), e);
        }
    }

    /// Bridge-wide call ticket. Never 0.
    fn next_ticket(&self) -> u32 {
        let ticket = self.next_ticket.get();
        self.next_ticket.set(ticket.wrapping_add(1).max(1));
        ticket
    }

    fn prepare(&self, family: usize, slot: TokenSlot) -> AbiResult<Prepared> {
        let id = self.families.borrow_mut()[family].next_id();
        let ticket = self.next_ticket();
        let token = self.pool.borrow_mut().pack(slot, id)?;
        let info = Record::new()
            .with("mode", Value::U32(self.config.callback_mode.code()))
            .with(
                "callback",
                Value::Pointer(bridge_callback as NativeCallback as usize),
            )
            .with("userdata1", Value::Pointer(token as usize))
            .with(
                "userdata2",
                Value::Pointer(callback::pack_userdata2(self.route, ticket)),
            );
        let info = self.callback_info.pack(&info, &PackOptions::default())?;
        Ok(Prepared { id, ticket, info })
    }

    fn issue(
        self: &Rc<Self>,
        family: usize,
        spec: &OperationSpec,
        target: NativeHandle,
        request: &Record,
    ) -> AbiResult<PendingCall> {
        let pack_options = PackOptions {
            limits: self.limits.borrow().clone(),
        };
        let packed_request = spec
            .request
            .as_ref()
            .map(|layout| layout.pack(request, &pack_options))
            .transpose()?;

        let slot = self.pool.borrow_mut().request()?;
        let Prepared { id, ticket, info } = match self.prepare(family, slot) {
            Ok(prepared) => prepared,
            Err(e) => {
                self.release_slot(slot);
                return Err(e);
            }
        };

        let mut args = Vec::with_capacity(3);
        args.push(NativeArg::Pointer(target.address()));
        if let Some(packed) = &packed_request {
            args.push(NativeArg::ptr(packed.as_ptr()));
        }
        args.push(NativeArg::ptr(info.as_ptr()));
        if let Err(e) = self.table.check(&spec.entry_point, &args) {
            self.release_slot(slot);
            return Err(e);
        }

        if let Some(interval) = self.pump.acquire() {
            if let Err(e) = pump::spawn_tick_task(self, interval) {
                self.pump.stopped();
                self.pump.release();
                self.release_slot(slot);
                return Err(e);
            }
        }

        let (sender, receiver) = oneshot::channel();
        let family_name = {
            let mut families = self.families.borrow_mut();
            let state = &mut families[family];
            state.insert(
                id,
                PendingRequest {
                    sender,
                    response: spec.response.clone(),
                },
            );
            state.name.clone()
        };
        self.in_flight
            .borrow_mut()
            .insert(slot.index(), InFlight { family, ticket });
        log::debug!("{} #{} -> {}", family_name, id, spec.entry_point);

        let result = self.table.call(&spec.entry_point, &args);
        // Request and info buffers must outlive the native call.
        drop(info);
        drop(packed_request);

        if let Err(e) = result {
            // The symbol already ran and may still call back with this token.
            log::error!("{} #{} abandoned: {}", family_name, id, e);
            self.abandon(family, id);
            return Err(e);
        }

        let mut call = PendingCall::new(receiver, Rc::downgrade(self), family, family_name, id);
        if let Some(timeout) = self.config.default_timeout() {
            call = call.with_timeout(timeout);
        }
        Ok(call)
    }

    pub(crate) fn abandon(&self, family: usize, id: u32) {
        let abandoned = self.families.borrow_mut()[family].abandon(id);
        if abandoned {
            self.pump.release();
        }
    }

    /// Settle the call behind `token`. Runs inside the trampoline.
    ///
    /// `stamp` is the ticket half of `userdata2`; a callback whose stamp does
    /// not match the call now holding the slot is discarded untouched.
    pub(crate) fn settle(
        &self,
        status: u32,
        error_type: u32,
        payload: *const c_void,
        message: String,
        token: *mut c_void,
        stamp: u32,
    ) {
        let block = match self.pool.borrow().peek(token) {
            Ok(block) => block,
            Err(e) => {
                log::error!("callback token {:p} rejected: {}", token, e);
                return;
            }
        };
        let Some(InFlight { family, ticket }) = self.in_flight.borrow().get(&block.slot).copied()
        else {
            log::warn!("token slot {} has no call in flight", block.slot);
            return;
        };
        if !callback::stamp_matches(ticket, stamp) {
            log::warn!(
                "stale callback for token slot {} dropped (stamp {}, ticket {})",
                block.slot,
                stamp,
                ticket
            );
            return;
        }
        if let Err(e) = self.pool.borrow_mut().unpack_block(token) {
            log::error!("callback token {:p} rejected: {}", token, e);
            return;
        }
        self.in_flight.borrow_mut().remove(&block.slot);

        let (name, pending) = {
            let mut families = self.families.borrow_mut();
            let state = &mut families[family];
            let pending = state.take(block.id);
            if pending.is_none() {
                if state.forget_abandoned(block.id) {
                    log::debug!("late callback for abandoned {} #{}", state.name, block.id);
                } else {
                    log::warn!("callback for unknown {} #{}", state.name, block.id);
                }
            }
            (state.name.clone(), pending)
        };
        let Some(pending) = pending else {
            return;
        };

        let result = if status == STATUS_SUCCESS {
            decode_payload(pending.response.as_deref(), payload)
                .map(|payload| Completion { payload, message })
        } else {
            Err(AbiError::NativeCallFailed {
                family: name.clone(),
                status,
                kind: NativeErrorKind::from_code(error_type),
                message: if message.is_empty() {
                    EMPTY_FAILURE_MESSAGE.to_string()
                } else {
                    message
                },
            })
        };
        self.pump.release();
        log::debug!(
            "{} #{} settled ({})",
            name,
            block.id,
            if result.is_ok() { "ok" } else { "error" }
        );
        if pending.sender.send(result).is_err() {
            log::debug!("{} #{}: caller went away before settlement", name, block.id);
        }
    }
}

struct Prepared {
    id: u32,
    ticket: u32,
    info: PackedBuffer,
}

fn decode_payload(layout: Option<&StructLayout>, payload: *const c_void) -> AbiResult<Record> {
    match layout {
        Some(layout) if !payload.is_null() => {
            // SAFETY: the native side hands a struct of the operation's
            // response layout, valid for the duration of the callback.
            unsafe { layout.unpack_raw(payload.cast()) }
        }
        _ => Ok(Record::new()),
    }
}

/// One bridge per native instance.
pub struct CallbackBridge {
    inner: Rc<BridgeInner>,
}

impl fmt::Debug for CallbackBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackBridge")
            .field("instance", &self.inner.instance)
            .field("route", &self.inner.route)
            .field("pending", &self.pending_count())
            .field("pump_outstanding", &self.inner.pump.outstanding())
            .finish()
    }
}

impl CallbackBridge {
    pub fn new(table: NativeTable, instance: NativeHandle, config: BridgeConfig) -> AbiResult<Self> {
        config.validate()?;
        let route = callback::allocate_route();
        let inner = Rc::new(BridgeInner {
            callback_info: callback_info_layout(LayoutOptions::host())?,
            pool: RefCell::new(TokenPool::new(
                config.token_pool_initial,
                config.token_pool_max,
            )),
            families: RefCell::new(Vec::new()),
            in_flight: RefCell::new(HashMap::new()),
            next_ticket: Cell::new(1),
            limits: RefCell::new(None),
            pump: EventPump::new(config.pump),
            table,
            instance,
            config,
            route,
        });
        callback::register_route(route, Rc::downgrade(&inner));
        log::debug!("callback bridge route {} for instance {:?}", route, instance);
        Ok(Self { inner })
    }

    /// Wrap one async entry point.
    pub fn operation(&self, spec: OperationSpec) -> AsyncOperation {
        let family = self.inner.family_index(&spec.family);
        AsyncOperation {
            bridge: Rc::clone(&self.inner),
            spec,
            family,
        }
    }

    /// Pump native events once.
    ///
    /// Returns `true` while calls are still outstanding.
    pub fn tick(&self) -> AbiResult<bool> {
        self.inner.tick()
    }

    /// Calls waiting for their callback, across all families.
    pub fn pending_count(&self) -> usize {
        self.inner
            .families
            .borrow()
            .iter()
            .map(FamilyState::pending_len)
            .sum()
    }

    /// Timed-out ids whose late callback has not been seen yet.
    pub fn abandoned_count(&self) -> usize {
        self.inner
            .families
            .borrow()
            .iter()
            .map(FamilyState::abandoned_len)
            .sum()
    }

    pub fn outstanding_pumps(&self) -> usize {
        self.inner.pump.outstanding()
    }

    pub fn is_pump_ticking(&self) -> bool {
        self.inner.pump.is_ticking()
    }

    pub fn in_use_tokens(&self) -> usize {
        self.inner.pool.borrow().in_use()
    }

    pub fn route_id(&self) -> u32 {
        self.inner.route
    }

    /// Limits handed to request-struct validators from now on.
    pub fn set_limits(&self, limits: Option<Arc<LimitsTable>>) {
        *self.inner.limits.borrow_mut() = limits;
    }

    pub fn limits(&self) -> Option<Arc<LimitsTable>> {
        self.inner.limits.borrow().clone()
    }

    /// Native entry points, for synchronous calls.
    pub fn table(&self) -> &NativeTable {
        &self.inner.table
    }

    pub fn instance(&self) -> NativeHandle {
        self.inner.instance
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    /// Layout of the callback-info struct handed to native calls.
    pub fn callback_info_layout(&self) -> &StructLayout {
        &self.inner.callback_info
    }
}

/// Callable wrapper around one [`OperationSpec`].
pub struct AsyncOperation {
    bridge: Rc<BridgeInner>,
    spec: OperationSpec,
    family: usize,
}

impl fmt::Debug for AsyncOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncOperation")
            .field("family", &self.spec.family)
            .field("entry_point", &self.spec.entry_point)
            .finish()
    }
}

impl AsyncOperation {
    pub fn spec(&self) -> &OperationSpec {
        &self.spec
    }

    /// Issue against the bridge's instance.
    pub fn call(&self, request: &Record) -> AbiResult<PendingCall> {
        self.call_on(self.bridge.instance, request)
    }

    /// Issue against `target` (adapter, device, buffer...).
    ///
    /// Fails synchronously on packing, pool, native-table or pump-start
    /// errors; the returned future carries everything after that.
    pub fn call_on(&self, target: NativeHandle, request: &Record) -> AbiResult<PendingCall> {
        self.bridge.issue(self.family, &self.spec, target, request)
    }

    pub async fn call_with_timeout(
        &self,
        request: &Record,
        timeout: Duration,
    ) -> AbiResult<Completion> {
        self.call(request)?.with_timeout(timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::{NativeSignature, NativeType};
    use std::cell::Cell;

    type Stash = Rc<Cell<Option<CallbackInfo>>>;

    /// Native double whose async entry point keeps the callback info, and
    /// whose `process_events` fires it.
    fn deferred_native(stash: Stash, info: Rc<StructLayout>) -> NativeTable {
        let store = Rc::clone(&stash);
        NativeTable::new()
            .with(
                NativeSignature::new(
                    "asyncThing",
                    &[NativeType::Pointer, NativeType::Pointer],
                    NativeType::Void,
                ),
                move |args| {
                    let ptr = args[1].as_pointer().unwrap_or(0) as *const c_void;
                    // SAFETY: the bridge passes a live callback-info struct.
                    store.set(unsafe { CallbackInfo::read(&info, ptr) }.ok());
                    NativeArg::Void
                },
            )
            .with(
                NativeSignature::new(
                    crate::config::DEFAULT_PROCESS_EVENTS,
                    &[NativeType::Pointer],
                    NativeType::Void,
                ),
                move |_| {
                    if let Some(cb) = stash.take() {
                        // SAFETY: callback address comes from the bridge.
                        unsafe { cb.fire(STATUS_SUCCESS, 0, std::ptr::null(), Some("done")) };
                    }
                    NativeArg::Void
                },
            )
    }

    #[test]
    fn test_synchronous_table_error_rolls_back() {
        let bridge = CallbackBridge::new(
            NativeTable::new(),
            NativeHandle::from_address(0x10),
            BridgeConfig::default(),
        )
        .unwrap();
        let op = bridge.operation(OperationSpec::new("thing", "missingSymbol"));
        let err = op.call(&Record::new()).unwrap_err();
        assert!(matches!(err, AbiError::MissingSymbol(_)));
        assert_eq!(bridge.pending_count(), 0);
        assert_eq!(bridge.in_use_tokens(), 0);
        assert_eq!(bridge.outstanding_pumps(), 0);
    }

    #[test]
    fn test_operations_share_family_state() {
        let bridge = CallbackBridge::new(
            NativeTable::new(),
            NativeHandle::NULL,
            BridgeConfig::default(),
        )
        .unwrap();
        let a = bridge.operation(OperationSpec::new("map", "a"));
        let b = bridge.operation(OperationSpec::new("map", "b"));
        let c = bridge.operation(OperationSpec::new("other", "c"));
        assert_eq!(a.family, b.family);
        assert_ne!(a.family, c.family);
    }

    #[test]
    fn test_routes_are_distinct() {
        let config = BridgeConfig::default();
        let one = CallbackBridge::new(NativeTable::new(), NativeHandle::NULL, config.clone())
            .unwrap();
        let two = CallbackBridge::new(NativeTable::new(), NativeHandle::NULL, config).unwrap();
        assert_ne!(one.route_id(), two.route_id());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = BridgeConfig {
            token_pool_initial: 0,
            ..BridgeConfig::default()
        };
        let err = CallbackBridge::new(NativeTable::new(), NativeHandle::NULL, config).unwrap_err();
        assert!(matches!(err, AbiError::Config(_)));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_manual_tick_settles() {
        let info = Rc::new(callback_info_layout(LayoutOptions::host()).unwrap());
        let stash: Stash = Rc::new(Cell::new(None));
        let bridge = CallbackBridge::new(
            deferred_native(Rc::clone(&stash), info),
            NativeHandle::from_address(0x10),
            BridgeConfig::default(),
        )
        .unwrap();
        let op = bridge.operation(OperationSpec::new("thing", "asyncThing"));
        let call = op.call(&Record::new()).unwrap();
        assert_eq!(bridge.pending_count(), 1);
        assert_eq!(bridge.outstanding_pumps(), 1);

        assert!(!bridge.tick().unwrap());
        let completion = call.await.unwrap();
        assert_eq!(completion.message, "done");
        assert!(completion.payload.is_empty());
        assert_eq!(bridge.pending_count(), 0);
        assert_eq!(bridge.in_use_tokens(), 0);
    }
}
