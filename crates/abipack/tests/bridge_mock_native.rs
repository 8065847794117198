// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bridge behaviour against a scripted native side.

use abipack::bridge::{
    callback_info_layout, CallbackInfo, NativeCallback, EMPTY_FAILURE_MESSAGE, STATUS_SUCCESS,
};
use abipack::codec::PrimitiveKind;
use abipack::config::DEFAULT_PROCESS_EVENTS;
use abipack::layout::StructLayoutBuilder;
use abipack::{
    AbiError, BridgeConfig, CallbackBridge, LayoutOptions, NativeArg, NativeErrorKind,
    NativeHandle, NativeSignature, NativeTable, NativeType, OperationSpec, PackOptions,
    PumpScheduler, Record, StructLayout, Value,
};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::ffi::{c_void, CString};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

const INSTANCE: NativeHandle = NativeHandle::NULL;

/// Native double: `asyncOp(target, info)` queues the callback, and
/// `process_events` completes every queued call successfully.
#[derive(Clone)]
struct MockNative {
    queue: Rc<RefCell<VecDeque<CallbackInfo>>>,
    info_layout: Rc<StructLayout>,
    fire_inline: bool,
    /// `asyncOp` returns a `u32` although it is declared `void`.
    bad_return: bool,
}

impl MockNative {
    fn new() -> Self {
        Self {
            queue: Rc::new(RefCell::new(VecDeque::new())),
            info_layout: Rc::new(callback_info_layout(LayoutOptions::host()).unwrap()),
            fire_inline: false,
            bad_return: false,
        }
    }

    fn inline() -> Self {
        Self {
            fire_inline: true,
            ..Self::new()
        }
    }

    fn bad_return() -> Self {
        Self {
            bad_return: true,
            ..Self::new()
        }
    }

    fn table(&self) -> NativeTable {
        let issue = self.clone();
        let pump = self.clone();
        NativeTable::new()
            .with(
                NativeSignature::new(
                    "asyncOp",
                    &[NativeType::Pointer, NativeType::Pointer],
                    NativeType::Void,
                ),
                move |args| {
                    let ptr = args[1].as_pointer().unwrap() as *const c_void;
                    let info = unsafe { CallbackInfo::read(&issue.info_layout, ptr) }.unwrap();
                    if issue.fire_inline {
                        unsafe { info.fire(STATUS_SUCCESS, 0, std::ptr::null(), Some("inline")) };
                    } else {
                        issue.queue.borrow_mut().push_back(info);
                    }
                    if issue.bad_return {
                        NativeArg::U32(1)
                    } else {
                        NativeArg::Void
                    }
                },
            )
            .with(
                NativeSignature::new(DEFAULT_PROCESS_EVENTS, &[NativeType::Pointer], NativeType::Void),
                move |_| {
                    // Pop before firing: callbacks may issue new calls.
                    loop {
                        let next = pump.queue.borrow_mut().pop_front();
                        let Some(info) = next else { break };
                        unsafe { info.fire(STATUS_SUCCESS, 0, std::ptr::null(), Some("ok")) };
                    }
                    NativeArg::Void
                },
            )
    }

    fn take(&self) -> CallbackInfo {
        self.queue.borrow_mut().pop_front().expect("a queued callback")
    }
}

fn bridge(mock: &MockNative, config: BridgeConfig) -> CallbackBridge {
    CallbackBridge::new(mock.table(), INSTANCE, config).unwrap()
}

#[tokio::test]
async fn test_double_invoke_settles_once() {
    let mock = MockNative::new();
    let bridge = bridge(&mock, BridgeConfig::default());
    let op = bridge.operation(OperationSpec::new("thing", "asyncOp"));

    let call = op.call(&Record::new()).unwrap();
    let info = mock.take();
    unsafe {
        info.fire(STATUS_SUCCESS, 0, std::ptr::null(), Some("first"));
        // Same token again: rejected by the pool, logged, ignored.
        info.fire(2, 2, std::ptr::null(), Some("second"));
    }

    let completion = call.await.unwrap();
    assert_eq!(completion.message, "first");
    assert_eq!(bridge.pending_count(), 0);
    assert_eq!(bridge.in_use_tokens(), 0);
    assert_eq!(bridge.outstanding_pumps(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_then_late_callback() {
    let mock = MockNative::new();
    let bridge = bridge(&mock, BridgeConfig::default());
    let op = bridge.operation(OperationSpec::new("slow", "asyncOp"));

    let err = op
        .call_with_timeout(&Record::new(), Duration::from_millis(50))
        .await
        .unwrap_err();
    assert!(matches!(err, AbiError::Timeout { ref family, .. } if family == "slow"));
    assert_eq!(bridge.pending_count(), 0);
    assert_eq!(bridge.abandoned_count(), 1);
    assert_eq!(bridge.outstanding_pumps(), 0);
    // The native side still owns the token until it calls back.
    assert_eq!(bridge.in_use_tokens(), 1);

    let late = mock.take();
    unsafe { late.fire(STATUS_SUCCESS, 0, std::ptr::null(), None) };
    assert_eq!(bridge.abandoned_count(), 0);
    assert_eq!(bridge.in_use_tokens(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_default_timeout_from_config() {
    let mock = MockNative::new();
    let config = BridgeConfig {
        default_timeout_ms: Some(10),
        ..BridgeConfig::default()
    };
    let bridge = bridge(&mock, config);
    let op = bridge.operation(OperationSpec::new("slow", "asyncOp"));
    let err = op.call(&Record::new()).unwrap().await.unwrap_err();
    assert_eq!(err.category(), "NativeCallFailed");
    assert!(matches!(err, AbiError::Timeout { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_local_task_pump_drives_calls() {
    let mock = MockNative::new();
    let config = BridgeConfig {
        pump: PumpScheduler::LocalTask { interval_ms: 2 },
        ..BridgeConfig::default()
    };
    let bridge = bridge(&mock, config);
    let op = bridge.operation(OperationSpec::new("thing", "asyncOp"));

    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let a = op.call(&Record::new()).unwrap();
            let b = op.call(&Record::new()).unwrap();
            assert!(bridge.is_pump_ticking());
            assert_eq!(bridge.outstanding_pumps(), 2);

            let (a, b) = tokio::join!(a, b);
            assert_eq!(a.unwrap().message, "ok");
            assert_eq!(b.unwrap().message, "ok");
            assert!(!bridge.is_pump_ticking());

            // A new call restarts the loop.
            let c = op.call(&Record::new()).unwrap();
            assert!(bridge.is_pump_ticking());
            assert!(c.await.is_ok());
        })
        .await;
    assert_eq!(bridge.pending_count(), 0);
}

#[tokio::test]
async fn test_failure_classification() {
    let mock = MockNative::new();
    let bridge = bridge(&mock, BridgeConfig::default());
    let op = bridge.operation(OperationSpec::new("request_device", "asyncOp"));

    for (error_type, kind) in [
        (2, NativeErrorKind::Validation),
        (3, NativeErrorKind::OutOfMemory),
        (4, NativeErrorKind::Internal),
        (9, NativeErrorKind::Unknown),
    ] {
        let call = op.call(&Record::new()).unwrap();
        unsafe { mock.take().fire(3, error_type, std::ptr::null(), Some("device lost")) };
        assert_eq!(
            call.await.unwrap_err(),
            AbiError::NativeCallFailed {
                family: "request_device".into(),
                status: 3,
                kind,
                message: "device lost".into(),
            }
        );
    }
}

#[tokio::test]
async fn test_failure_message_fallback_and_strlen() {
    let mock = MockNative::new();
    let bridge = bridge(&mock, BridgeConfig::default());
    let op = bridge.operation(OperationSpec::new("thing", "asyncOp"));

    let call = op.call(&Record::new()).unwrap();
    unsafe { mock.take().fire(0, 2, std::ptr::null(), None) };
    match call.await.unwrap_err() {
        AbiError::NativeCallFailed { message, .. } => assert_eq!(message, EMPTY_FAILURE_MESSAGE),
        other => panic!("unexpected {:?}", other),
    }

    // NUL-terminated message with the strlen length sentinel.
    let call = op.call(&Record::new()).unwrap();
    let info = mock.take();
    let text = CString::new("shader compile failed").unwrap();
    let callback: NativeCallback = unsafe { std::mem::transmute(info.callback) };
    callback(
        0,
        2,
        std::ptr::null(),
        text.as_ptr(),
        usize::MAX,
        info.userdata1 as *mut c_void,
        info.userdata2 as *mut c_void,
    );
    match call.await.unwrap_err() {
        AbiError::NativeCallFailed { message, kind, .. } => {
            assert_eq!(message, "shader compile failed");
            assert_eq!(kind, NativeErrorKind::Validation);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn test_payload_unpacked_with_response_layout() {
    let mock = MockNative::new();
    let bridge = bridge(&mock, BridgeConfig::default());
    let response = Arc::new(
        StructLayoutBuilder::new("Mapped")
            .field("status", PrimitiveKind::U32)
            .string_field("label")
            .build()
            .unwrap(),
    );
    let op = bridge.operation(
        OperationSpec::new("map", "asyncOp").with_response(Arc::clone(&response)),
    );

    let call = op.call(&Record::new()).unwrap();
    let payload = response
        .pack(
            &Record::new().with("status", 7u32).with("label", "staging"),
            &PackOptions::default(),
        )
        .unwrap();
    unsafe { mock.take().fire(STATUS_SUCCESS, 0, payload.as_ptr().cast(), Some("")) };
    drop(payload);

    let completion = call.await.unwrap();
    assert_eq!(completion.payload.get("status"), Some(&Value::U32(7)));
    assert_eq!(
        completion.payload.get("label"),
        Some(&Value::Text("staging".into()))
    );
}

#[tokio::test]
async fn test_inline_callback_is_ready_immediately() {
    let mock = MockNative::inline();
    let bridge = bridge(&mock, BridgeConfig::default());
    let op = bridge.operation(OperationSpec::new("thing", "asyncOp"));
    let call = op.call(&Record::new()).unwrap();
    assert_eq!(bridge.pending_count(), 0);
    assert_eq!(call.await.unwrap().message, "inline");
}

#[test]
fn test_pool_exhaustion_is_synchronous() {
    let mock = MockNative::new();
    let config = BridgeConfig {
        token_pool_initial: 1,
        token_pool_max: 1,
        ..BridgeConfig::default()
    };
    let bridge = bridge(&mock, config);
    let op = bridge.operation(OperationSpec::new("thing", "asyncOp"));
    let _first = op.call(&Record::new()).unwrap();
    assert_eq!(
        op.call(&Record::new()).unwrap_err(),
        AbiError::PoolExhausted { cap: 1 }
    );
    assert_eq!(bridge.pending_count(), 1);

    // Settling the first call frees the token for the next one.
    assert!(!bridge.tick().unwrap());
    assert!(op.call(&Record::new()).is_ok());
}

#[tokio::test]
async fn test_stale_callback_after_slot_reuse_is_dropped() {
    let mock = MockNative::new();
    let config = BridgeConfig {
        token_pool_initial: 1,
        token_pool_max: 1,
        ..BridgeConfig::default()
    };
    let bridge = bridge(&mock, config);
    let first_op = bridge.operation(OperationSpec::new("first", "asyncOp"));
    let second_op = bridge.operation(OperationSpec::new("second", "asyncOp"));

    let first = first_op.call(&Record::new()).unwrap();
    let stale = mock.take();
    unsafe { stale.fire(STATUS_SUCCESS, 0, std::ptr::null(), Some("first")) };
    assert_eq!(first.await.unwrap().message, "first");

    // Same token block and same request id, in another family.
    let second = second_op.call(&Record::new()).unwrap();
    assert_eq!(second.id(), 1);
    unsafe { stale.fire(2, 2, std::ptr::null(), Some("stale")) };
    assert_eq!(bridge.pending_count(), 1);
    assert_eq!(bridge.in_use_tokens(), 1);

    assert!(!bridge.tick().unwrap());
    assert_eq!(second.await.unwrap().message, "ok");
    assert_eq!(bridge.in_use_tokens(), 0);
    assert_eq!(bridge.outstanding_pumps(), 0);
}

#[tokio::test]
async fn test_local_task_pump_without_local_set_fails_cleanly() {
    let mock = MockNative::new();
    let config = BridgeConfig {
        pump: PumpScheduler::LocalTask { interval_ms: 2 },
        ..BridgeConfig::default()
    };
    let bridge = bridge(&mock, config);
    let op = bridge.operation(OperationSpec::new("thing", "asyncOp"));

    let err = op.call(&Record::new()).unwrap_err();
    assert!(matches!(err, AbiError::PumpUnavailable(_)));
    assert_eq!(err.category(), "ConfigError");
    assert!(mock.queue.borrow().is_empty());
    assert_eq!(bridge.pending_count(), 0);
    assert_eq!(bridge.in_use_tokens(), 0);
    assert_eq!(bridge.outstanding_pumps(), 0);
    assert!(!bridge.is_pump_ticking());

    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let call = op.call(&Record::new()).unwrap();
            assert!(bridge.is_pump_ticking());
            assert_eq!(call.await.unwrap().message, "ok");
        })
        .await;
}

#[test]
fn test_argument_mismatch_rejected_before_native_runs() {
    let mock = MockNative::new();
    let bridge = bridge(&mock, BridgeConfig::default());
    let request = Arc::new(
        StructLayoutBuilder::new("Req")
            .field("value", PrimitiveKind::U32)
            .build()
            .unwrap(),
    );
    // asyncOp takes no request pointer.
    let op = bridge.operation(OperationSpec::new("thing", "asyncOp").with_request(request));
    let err = op
        .call(&Record::new().with("value", 1u32))
        .unwrap_err();
    assert!(matches!(err, AbiError::SignatureMismatch { .. }));
    assert!(mock.queue.borrow().is_empty());
    assert_eq!(bridge.pending_count(), 0);
    assert_eq!(bridge.in_use_tokens(), 0);
    assert_eq!(bridge.outstanding_pumps(), 0);
}

#[test]
fn test_bad_return_keeps_token_until_callback() {
    let mock = MockNative::bad_return();
    let config = BridgeConfig {
        token_pool_initial: 1,
        token_pool_max: 1,
        ..BridgeConfig::default()
    };
    let bridge = bridge(&mock, config);
    let op = bridge.operation(OperationSpec::new("thing", "asyncOp"));

    let err = op.call(&Record::new()).unwrap_err();
    assert!(matches!(err, AbiError::SignatureMismatch { .. }));
    assert_eq!(bridge.pending_count(), 0);
    assert_eq!(bridge.abandoned_count(), 1);
    assert_eq!(bridge.outstanding_pumps(), 0);
    // The native side ran and still holds the token.
    assert_eq!(bridge.in_use_tokens(), 1);
    assert_eq!(
        op.call(&Record::new()).unwrap_err(),
        AbiError::PoolExhausted { cap: 1 }
    );

    unsafe { mock.take().fire(STATUS_SUCCESS, 0, std::ptr::null(), None) };
    assert_eq!(bridge.abandoned_count(), 0);
    assert_eq!(bridge.in_use_tokens(), 0);
}

#[test]
fn test_callback_after_bridge_drop_is_ignored() {
    let mock = MockNative::new();
    let bridge = bridge(&mock, BridgeConfig::default());
    let op = bridge.operation(OperationSpec::new("thing", "asyncOp"));
    let call = op.call(&Record::new()).unwrap();
    drop(op);
    drop(bridge);
    drop(call);

    // The route is gone, so the token is never looked at.
    unsafe { mock.take().fire(STATUS_SUCCESS, 0, std::ptr::null(), None) };
}

#[test]
fn test_two_bridges_route_independently() {
    let mock_a = MockNative::new();
    let mock_b = MockNative::new();
    let a = bridge(&mock_a, BridgeConfig::default());
    let b = bridge(&mock_b, BridgeConfig::default());
    let op_a = a.operation(OperationSpec::new("thing", "asyncOp"));
    let op_b = b.operation(OperationSpec::new("thing", "asyncOp"));
    let _call_a = op_a.call(&Record::new()).unwrap();
    let _call_b = op_b.call(&Record::new()).unwrap();

    unsafe { mock_b.take().fire(STATUS_SUCCESS, 0, std::ptr::null(), None) };
    assert_eq!(a.pending_count(), 1);
    assert_eq!(b.pending_count(), 0);
}
