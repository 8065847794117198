// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! WebGPU-style struct layouts.
//!
//! Every builder takes the target [`LayoutOptions`] so the same catalog
//! can describe foreign targets. Field names are snake_case; limit names
//! double as [`LimitsTable`](crate::layout::LimitsTable) keys.

use super::enums;
use crate::codec::PrimitiveKind;
use crate::error::AbiResult;
use crate::layout::validate::{max_limit, multiple_of, non_zero};
use crate::layout::{Condition, ElementKind, LayoutOptions, StructLayout, StructLayoutBuilder};
use crate::value::{sym, Record};
use std::sync::Arc;

/// Adapter and device limits.
pub fn limits(options: LayoutOptions) -> AbiResult<StructLayout> {
    use PrimitiveKind::{U32, U64};

    let u32_limits = [
        "max_texture_dimension_1d",
        "max_texture_dimension_2d",
        "max_texture_dimension_3d",
        "max_texture_array_layers",
        "max_bind_groups",
        "max_bindings_per_bind_group",
        "max_dynamic_uniform_buffers_per_pipeline_layout",
        "max_dynamic_storage_buffers_per_pipeline_layout",
        "max_sampled_textures_per_shader_stage",
        "max_samplers_per_shader_stage",
        "max_storage_buffers_per_shader_stage",
        "max_storage_textures_per_shader_stage",
        "max_uniform_buffers_per_shader_stage",
    ];
    let mut builder = StructLayoutBuilder::new("Limits").pointer_field("next_in_chain").optional();
    for name in u32_limits {
        builder = builder.field(name, U32);
    }
    builder
        .field("max_uniform_buffer_binding_size", U64)
        .field("max_storage_buffer_binding_size", U64)
        .field("min_uniform_buffer_offset_alignment", U32)
        .field("min_storage_buffer_offset_alignment", U32)
        .field("max_vertex_buffers", U32)
        .field("max_buffer_size", U64)
        .field("max_vertex_attributes", U32)
        .field("max_vertex_buffer_array_stride", U32)
        .field("max_compute_workgroup_storage_size", U32)
        .field("max_compute_invocations_per_workgroup", U32)
        .field("max_compute_workgroup_size_x", U32)
        .field("max_compute_workgroup_size_y", U32)
        .field("max_compute_workgroup_size_z", U32)
        .field("max_compute_workgroups_per_dimension", U32)
        .options(options)
        .build()
}

pub fn request_adapter_options(options: LayoutOptions) -> AbiResult<StructLayout> {
    StructLayoutBuilder::new("RequestAdapterOptions")
        .pointer_field("next_in_chain")
        .optional()
        .handle_field("compatible_surface")
        .optional()
        .enum_field("power_preference", Arc::new(enums::power_preference()))
        .default_value(sym("undefined"))
        .enum_field("backend_type", Arc::new(enums::backend_type()))
        .default_value(sym("undefined"))
        .field("force_fallback_adapter", PrimitiveKind::BoolU32)
        .default_value(false)
        .options(options)
        .build()
}

/// Payload of the request-adapter callback.
pub fn adapter_response(options: LayoutOptions) -> AbiResult<StructLayout> {
    StructLayoutBuilder::new("AdapterResponse")
        .handle_field("adapter")
        .options(options)
        .build()
}

/// Adapter identification strings and ids.
///
/// The `_pad` word exists only in non-Windows builds of the native
/// library, which shifts the subgroup fields by four bytes.
pub fn adapter_info(options: LayoutOptions) -> AbiResult<StructLayout> {
    StructLayoutBuilder::new("AdapterInfo")
        .pointer_field("next_in_chain")
        .optional()
        .string_field("vendor")
        .optional()
        .string_field("architecture")
        .optional()
        .string_field("device")
        .optional()
        .string_field("description")
        .optional()
        .enum_field("backend_type", Arc::new(enums::backend_type()))
        .enum_field("adapter_type", Arc::new(enums::adapter_type()))
        .field("vendor_id", PrimitiveKind::U32)
        .field("device_id", PrimitiveKind::U32)
        .padding("_pad", PrimitiveKind::U32)
        .when(Condition::not_windows())
        .field("subgroup_min_size", PrimitiveKind::U32)
        .optional()
        .field("subgroup_max_size", PrimitiveKind::U32)
        .optional()
        .options(options)
        .build()
}

pub fn device_descriptor(
    options: LayoutOptions,
    limits: Arc<StructLayout>,
) -> AbiResult<StructLayout> {
    StructLayoutBuilder::new("DeviceDescriptor")
        .pointer_field("next_in_chain")
        .optional()
        .string_field("label")
        .optional()
        .field("required_feature_count", PrimitiveKind::Usize)
        .length_of("required_features")
        .array_field("required_features", ElementKind::Enum(Arc::new(enums::feature_name())))
        .struct_ptr_field("required_limits", limits)
        .optional()
        .defaults(Record::new().with("label", ""))
        .options(options)
        .build()
}

/// Payload of the request-device callback.
pub fn device_response(options: LayoutOptions) -> AbiResult<StructLayout> {
    StructLayoutBuilder::new("DeviceResponse")
        .handle_field("device")
        .options(options)
        .build()
}

/// Buffer creation descriptor. `size` is checked against the
/// `max_buffer_size` limit when one is known.
pub fn buffer_descriptor(options: LayoutOptions) -> AbiResult<StructLayout> {
    StructLayoutBuilder::new("BufferDescriptor")
        .pointer_field("next_in_chain")
        .optional()
        .string_field("label")
        .optional()
        .field("usage", PrimitiveKind::U64)
        .validate(non_zero())
        .field("size", PrimitiveKind::U64)
        .validate(non_zero())
        .validate(multiple_of(4))
        .validate(max_limit("max_buffer_size"))
        .field("mapped_at_creation", PrimitiveKind::BoolU32)
        .default_value(false)
        .options(options)
        .build()
}

/// Range handed to the map-buffer entry point.
pub fn map_range(options: LayoutOptions) -> AbiResult<StructLayout> {
    StructLayoutBuilder::new("MapRange")
        .enum_field("mode", Arc::new(enums::map_mode()))
        .field("offset", PrimitiveKind::Usize)
        .default_value(0u64)
        .validate(multiple_of(8))
        .field("size", PrimitiveKind::Usize)
        .validate(multiple_of(4))
        .options(options)
        .build()
}

/// Payload of the pop-error-scope callback.
pub fn error_scope_result(options: LayoutOptions) -> AbiResult<StructLayout> {
    StructLayoutBuilder::new("ErrorScopeResult")
        .enum_field("error_type", Arc::new(enums::error_type()))
        .options(options)
        .build()
}
