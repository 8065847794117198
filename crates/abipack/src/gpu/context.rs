// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! GPU context: the four async operation families plus the synchronous
//! queries they depend on.
//!
//! Futures returned here only make progress while native events are
//! pumped, either by [`GpuContext::tick`] or by a
//! [`PumpScheduler::LocalTask`](crate::bridge::PumpScheduler) loop.

use super::{enums, GpuCatalog};
use crate::bridge::{AsyncOperation, CallbackBridge, OperationSpec, STATUS_SUCCESS};
use crate::buffer::AlignedBytes;
use crate::config::BridgeConfig;
use crate::error::{AbiError, AbiResult, NativeErrorKind};
use crate::layout::{LimitsTable, PackOptions, StructLayout};
use crate::native::{LibraryLoader, NativeArg, NativeHandle, NativeTable};
use crate::value::{sym, EnumTag, Record, Value};
use std::sync::Arc;

/// Native entry point names.
pub mod symbols {
    pub const CREATE_INSTANCE: &str = "wgpuCreateInstance";
    pub const INSTANCE_REQUEST_ADAPTER: &str = "wgpuInstanceRequestAdapter";
    pub const ADAPTER_GET_INFO: &str = "wgpuAdapterGetInfo";
    pub const ADAPTER_GET_LIMITS: &str = "wgpuAdapterGetLimits";
    pub const ADAPTER_REQUEST_DEVICE: &str = "wgpuAdapterRequestDevice";
    pub const DEVICE_CREATE_BUFFER: &str = "wgpuDeviceCreateBuffer";
    pub const DEVICE_PUSH_ERROR_SCOPE: &str = "wgpuDevicePushErrorScope";
    pub const DEVICE_POP_ERROR_SCOPE: &str = "wgpuDevicePopErrorScope";
    pub const BUFFER_MAP_ASYNC: &str = "wgpuBufferMapAsync";
}

/// Error captured by an error scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpuError {
    pub kind: NativeErrorKind,
    pub message: String,
}

pub struct GpuContext {
    bridge: CallbackBridge,
    catalog: GpuCatalog,
    request_adapter: AsyncOperation,
    request_device: AsyncOperation,
    map_buffer: AsyncOperation,
    pop_error_scope: AsyncOperation,
}

impl std::fmt::Debug for GpuContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuContext")
            .field("bridge", &self.bridge)
            .field("layouts", &self.catalog.registry().names())
            .finish()
    }
}

fn missing_handle(family: &str, what: &str) -> AbiError {
    AbiError::NativeCallFailed {
        family: family.to_string(),
        status: STATUS_SUCCESS,
        kind: NativeErrorKind::Internal,
        message: format!("native side reported success without a {}", what),
    }
}

fn handle_of(payload: &Record, field: &str, family: &str) -> AbiResult<NativeHandle> {
    payload
        .get(field)
        .and_then(Value::as_handle)
        .filter(|h| !h.is_null())
        .ok_or_else(|| missing_handle(family, field))
}

fn query_status(symbol: &str, ret: NativeArg) -> AbiResult<()> {
    match ret.as_u32() {
        Some(STATUS_SUCCESS) => Ok(()),
        status => Err(AbiError::NativeCallFailed {
            family: symbol.to_string(),
            status: status.unwrap_or(0),
            kind: NativeErrorKind::Unknown,
            message: format!("{} failed", symbol),
        }),
    }
}

impl GpuContext {
    /// Context over an already created native instance.
    pub fn new(table: NativeTable, instance: NativeHandle, config: BridgeConfig) -> AbiResult<Self> {
        let catalog = GpuCatalog::host();
        let bridge = CallbackBridge::new(table, instance, config)?;

        let request_adapter = bridge.operation(
            OperationSpec::new("request_adapter", symbols::INSTANCE_REQUEST_ADAPTER)
                .with_request(catalog.request_adapter_options()?)
                .with_response(catalog.adapter_response()?),
        );
        let request_device = bridge.operation(
            OperationSpec::new("request_device", symbols::ADAPTER_REQUEST_DEVICE)
                .with_request(catalog.device_descriptor()?)
                .with_response(catalog.device_response()?),
        );
        let map_buffer = bridge.operation(
            OperationSpec::new("map_buffer", symbols::BUFFER_MAP_ASYNC)
                .with_request(catalog.map_range()?),
        );
        let pop_error_scope = bridge.operation(
            OperationSpec::new("pop_error_scope", symbols::DEVICE_POP_ERROR_SCOPE)
                .with_response(catalog.error_scope_result()?),
        );

        Ok(Self {
            bridge,
            catalog,
            request_adapter,
            request_device,
            map_buffer,
            pop_error_scope,
        })
    }

    /// Load the native table and create an instance.
    pub fn from_loader(loader: &dyn LibraryLoader, config: BridgeConfig) -> AbiResult<Self> {
        let table = loader.load()?;
        let instance = table
            .call(symbols::CREATE_INSTANCE, &[NativeArg::Pointer(0)])?
            .as_pointer()
            .map(NativeHandle::from_address)
            .filter(|h| !h.is_null())
            .ok_or_else(|| missing_handle(symbols::CREATE_INSTANCE, "instance"))?;
        log::info!("native instance {:#x} created", instance.address());
        Self::new(table, instance, config)
    }

    pub fn bridge(&self) -> &CallbackBridge {
        &self.bridge
    }

    pub fn catalog(&self) -> &GpuCatalog {
        &self.catalog
    }

    /// Pump native events once.
    pub fn tick(&self) -> AbiResult<bool> {
        self.bridge.tick()
    }

    pub async fn request_adapter(&self, options: &Record) -> AbiResult<NativeHandle> {
        let completion = self.request_adapter.call(options)?.await?;
        handle_of(&completion.payload, "adapter", "request_adapter")
    }

    /// Fill a native out-struct through `symbol(target, out)` and unpack it.
    fn query(
        &self,
        symbol: &str,
        target: NativeHandle,
        layout: &StructLayout,
    ) -> AbiResult<Record> {
        let mut out = AlignedBytes::zeroed(layout.size());
        let ret = self.bridge.table().call(
            symbol,
            &[
                NativeArg::Pointer(target.address()),
                NativeArg::Pointer(out.as_mut_slice().as_mut_ptr() as usize),
            ],
        )?;
        query_status(symbol, ret)?;
        // SAFETY: the native side filled `out` as `layout`; string members
        // point at memory the adapter owns for its lifetime.
        unsafe { layout.unpack_raw(out.as_ptr()) }
    }

    pub fn adapter_info(&self, adapter: NativeHandle) -> AbiResult<Record> {
        let layout = self.catalog.adapter_info()?;
        self.query(symbols::ADAPTER_GET_INFO, adapter, &layout)
    }

    /// Read the adapter limits and use them for later request validation.
    pub fn adapter_limits(&self, adapter: NativeHandle) -> AbiResult<Arc<LimitsTable>> {
        let layout = self.catalog.limits()?;
        let record = self.query(symbols::ADAPTER_GET_LIMITS, adapter, &layout)?;
        let limits = Arc::new(LimitsTable::from_record(&record));
        log::debug!("adapter limits: {} entries", limits.len());
        self.bridge.set_limits(Some(Arc::clone(&limits)));
        Ok(limits)
    }

    pub async fn request_device(
        &self,
        adapter: NativeHandle,
        descriptor: &Record,
    ) -> AbiResult<NativeHandle> {
        let completion = self.request_device.call_on(adapter, descriptor)?.await?;
        handle_of(&completion.payload, "device", "request_device")
    }

    /// Create a buffer. The descriptor is validated against the installed
    /// limits before it reaches the native side.
    pub fn create_buffer(&self, device: NativeHandle, descriptor: &Record) -> AbiResult<NativeHandle> {
        let layout = self.catalog.buffer_descriptor()?;
        let options = PackOptions {
            limits: self.bridge.limits(),
        };
        let packed = layout.pack(descriptor, &options)?;
        let ret = self.bridge.table().call(
            symbols::DEVICE_CREATE_BUFFER,
            &[
                NativeArg::Pointer(device.address()),
                NativeArg::ptr(packed.as_ptr()),
            ],
        )?;
        ret.as_pointer()
            .map(NativeHandle::from_address)
            .filter(|h| !h.is_null())
            .ok_or_else(|| missing_handle("create_buffer", "buffer"))
    }

    pub async fn map_buffer(
        &self,
        buffer: NativeHandle,
        mode: &str,
        offset: u64,
        size: u64,
    ) -> AbiResult<()> {
        let range = Record::new()
            .with("mode", sym(mode))
            .with("offset", offset)
            .with("size", size);
        self.map_buffer.call_on(buffer, &range)?.await?;
        Ok(())
    }

    pub fn push_error_scope(&self, device: NativeHandle, filter: &str) -> AbiResult<()> {
        let code = enums::error_filter().to_int(&EnumTag::from(filter))?;
        self.bridge.table().call(
            symbols::DEVICE_PUSH_ERROR_SCOPE,
            &[NativeArg::Pointer(device.address()), NativeArg::U32(code as u32)],
        )?;
        Ok(())
    }

    /// Pop the innermost error scope. `None` means no error was captured.
    pub async fn pop_error_scope(&self, device: NativeHandle) -> AbiResult<Option<GpuError>> {
        let completion = self.pop_error_scope.call_on(device, &Record::new())?.await?;
        let kind = match completion.payload.get("error_type") {
            Some(Value::Enum(EnumTag::Symbol(tag))) if tag == "no-error" => return Ok(None),
            Some(Value::Enum(tag)) => {
                NativeErrorKind::from_code(enums::error_type().to_int(tag)? as u32)
            }
            _ => NativeErrorKind::Unknown,
        };
        Ok(Some(GpuError {
            kind,
            message: completion.message,
        }))
    }
}
