// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # abipack - native struct marshalling and async callback bridging
//!
//! Two layers for talking to a C-ABI native library without generated
//! bindings:
//!
//! - **Struct layouts.** Describe a C struct as an ordered field list, then
//!   pack dynamic [`Record`]s into byte-exact buffers (strings, arrays and
//!   nested structs go into owned side buffers) and unpack them back.
//! - **Callback bridge.** Turn "call with a callback-info struct, get called
//!   back later" entry points into futures, with single-use correlation
//!   tokens and an event pump.
//!
//! ## Quick Start
//!
//! ```rust
//! use abipack::codec::PrimitiveKind;
//! use abipack::layout::{PackOptions, StructLayoutBuilder};
//! use abipack::{Record, Result};
//!
//! fn main() -> Result<()> {
//!     let extent = StructLayoutBuilder::new("Extent3D")
//!         .field("width", PrimitiveKind::U32)
//!         .field("height", PrimitiveKind::U32)
//!         .field("depth_or_array_layers", PrimitiveKind::U32)
//!         .default_value(1u32)
//!         .build()?;
//!
//!     let packed = extent.pack(
//!         &Record::new().with("width", 640u32).with("height", 480u32),
//!         &PackOptions::default(),
//!     )?;
//!     assert_eq!(packed.as_bytes().len(), 12);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------+
//! |  gpu::GpuContext      request_adapter / request_device / ...  |
//! +---------------------------------------------------------------+
//! |  bridge                CallbackBridge -> PendingCall (Future) |
//! |                        TokenPool | EventPump | trampoline     |
//! +---------------------------------------------------------------+
//! |  layout                StructLayout pack / unpack / describe  |
//! |                        arrays | validators | registry         |
//! +---------------------------------------------------------------+
//! |  codec                 primitives | enums | string views      |
//! +---------------------------------------------------------------+
//! |  native                NativeTable (from a LibraryLoader)     |
//! +---------------------------------------------------------------+
//! ```
//!
//! ## Modules Overview
//!
//! - [`layout`] - struct layouts (start here)
//! - [`bridge`] - async callback bridge
//! - [`gpu`] - WebGPU-style struct catalog and context
//! - [`codec`] - leaf codecs
//! - [`config`] - bridge configuration (YAML with `config-loaders`)

/// Aligned main regions and owned side buffers.
pub mod buffer;
/// Async callback bridge.
pub mod bridge;
/// Primitive, enum and string-view codecs.
pub mod codec;
/// Bridge configuration.
pub mod config;
/// Error taxonomy.
pub mod error;
/// WebGPU-style structs and async operations.
pub mod gpu;
/// Struct layout builder and packer.
pub mod layout;
/// `env_logger` initialization helpers.
pub mod logging;
/// Native symbol table and loader seam.
pub mod native;
/// Single-use userdata tokens.
pub mod token_pool;
/// Dynamic values.
pub mod value;

pub use bridge::{
    AsyncOperation, CallbackBridge, CallbackMode, Completion, OperationSpec, PendingCall,
    PumpScheduler,
};
pub use buffer::PackedBuffer;
pub use config::BridgeConfig;
pub use error::{AbiError, AbiResult, NativeErrorKind};
pub use layout::{LayoutOptions, PackOptions, StructLayout, StructLayoutBuilder};
pub use native::{LibraryLoader, NativeArg, NativeHandle, NativeSignature, NativeTable, NativeType};
pub use token_pool::TokenPool;
pub use value::{sym, EnumTag, Record, Value};

/// Crate-wide result alias.
pub type Result<T> = AbiResult<T>;
