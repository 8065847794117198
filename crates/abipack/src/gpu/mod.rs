// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! WebGPU-style struct catalog and async operation context.

pub mod context;
pub mod enums;
pub mod structs;

pub use context::{symbols, GpuContext, GpuError};

use crate::error::AbiResult;
use crate::layout::{LayoutOptions, LayoutRegistry, StructLayout};
use std::sync::Arc;

/// Lazily built, shared GPU struct layouts for one target.
#[derive(Debug, Default)]
pub struct GpuCatalog {
    options: LayoutOptions,
    registry: LayoutRegistry,
}

macro_rules! catalog_entry {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        pub fn $name(&self) -> AbiResult<Arc<StructLayout>> {
            self.registry
                .get_or_build($label, || structs::$name(self.options))
        }
    };
}

impl GpuCatalog {
    pub fn new(options: LayoutOptions) -> Self {
        Self {
            options,
            registry: LayoutRegistry::new(),
        }
    }

    /// Catalog for the running process.
    pub fn host() -> Self {
        Self::new(LayoutOptions::host())
    }

    pub fn options(&self) -> LayoutOptions {
        self.options
    }

    /// Layouts built so far.
    pub fn registry(&self) -> &LayoutRegistry {
        &self.registry
    }

    catalog_entry!(limits, "Limits");
    catalog_entry!(request_adapter_options, "RequestAdapterOptions");
    catalog_entry!(adapter_response, "AdapterResponse");
    catalog_entry!(
        /// Platform dependent: see [`structs::adapter_info`].
        adapter_info,
        "AdapterInfo"
    );
    catalog_entry!(device_response, "DeviceResponse");
    catalog_entry!(buffer_descriptor, "BufferDescriptor");
    catalog_entry!(map_range, "MapRange");
    catalog_entry!(error_scope_result, "ErrorScopeResult");

    pub fn device_descriptor(&self) -> AbiResult<Arc<StructLayout>> {
        let limits = self.limits()?;
        self.registry.get_or_build("DeviceDescriptor", || {
            structs::device_descriptor(self.options, limits)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_builds_once() {
        let catalog = GpuCatalog::host();
        let a = catalog.device_descriptor().unwrap();
        let b = catalog.device_descriptor().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(
            catalog.registry().names(),
            vec!["DeviceDescriptor".to_string(), "Limits".to_string()]
        );
    }

    #[test]
    fn test_catalog_describes_foreign_target() {
        use crate::codec::PointerWidth;
        use crate::layout::TargetPlatform;

        let catalog = GpuCatalog::new(LayoutOptions {
            pointer_width: PointerWidth::Four,
            platform: TargetPlatform::Windows,
        });
        let info = catalog.buffer_descriptor().unwrap();
        // ptr(4) + view(8) + usage(8, at 16) + size(8) + bool(4) -> 40
        assert_eq!(info.describe().fields[2].offset, 16);
        assert_eq!(info.size(), 40);
    }
}
