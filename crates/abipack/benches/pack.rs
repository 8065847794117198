// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Bench readability over pedantic
#![allow(clippy::cast_precision_loss)] // Sample data conversions
#![allow(clippy::missing_panics_doc)] // Benches panic on failure

use abipack::gpu::GpuCatalog;
use abipack::token_pool::TokenPool;
use abipack::{sym, PackOptions, Record};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

// ============================================================================
// Struct packing
// ============================================================================

/// Benchmark: pack a flat buffer descriptor (label + scalars)
fn bench_pack_buffer_descriptor(c: &mut Criterion) {
    let catalog = GpuCatalog::host();
    let layout = catalog.buffer_descriptor().unwrap();
    let record = Record::new()
        .with("label", "vertices")
        .with("usage", 0x0028u64)
        .with("size", 65_536u64);
    let options = PackOptions::default();

    c.bench_function("pack_buffer_descriptor", |b| {
        b.iter(|| layout.pack(black_box(&record), &options).unwrap())
    });
}

/// Benchmark: pack a device descriptor with N required features
fn bench_pack_feature_array(c: &mut Criterion) {
    let catalog = GpuCatalog::host();
    let layout = catalog.device_descriptor().unwrap();
    let all = [
        "depth-clip-control",
        "timestamp-query",
        "texture-compression-bc",
        "shader-f16",
        "push-constants",
        "multi-draw-indirect",
        "texture-binding-array",
    ];
    let options = PackOptions::default();

    let mut group = c.benchmark_group("pack_device_descriptor");
    for n in [1usize, 4, 7] {
        let record = Record::new()
            .with("label", "bench")
            .with("required_features", all[..n].iter().map(|f| sym(f)).collect::<Vec<_>>());
        group.bench_with_input(BenchmarkId::from_parameter(n), &record, |b, record| {
            b.iter(|| layout.pack(black_box(record), &options).unwrap())
        });
    }
    group.finish();
}

/// Benchmark: pack + unpack round trip of adapter info (four strings)
fn bench_adapter_info_round_trip(c: &mut Criterion) {
    let catalog = GpuCatalog::host();
    let layout = catalog.adapter_info().unwrap();
    let record = Record::new()
        .with("vendor", "vendor")
        .with("architecture", "arch")
        .with("device", "device")
        .with("description", "description")
        .with("backend_type", sym("vulkan"))
        .with("adapter_type", sym("discrete-gpu"))
        .with("vendor_id", 0x1002u32)
        .with("device_id", 0x73bfu32);
    let options = PackOptions::default();

    c.bench_function("adapter_info_round_trip", |b| {
        b.iter(|| {
            let packed = layout.pack(black_box(&record), &options).unwrap();
            layout.unpack(&packed).unwrap()
        })
    });
}

// ============================================================================
// Token pool
// ============================================================================

/// Benchmark: request + pack + unpack one token
fn bench_token_cycle(c: &mut Criterion) {
    let mut pool = TokenPool::new(64, 64);
    let mut id = 0u32;
    c.bench_function("token_request_pack_unpack", |b| {
        b.iter(|| {
            id = id.wrapping_add(1);
            let slot = pool.request().unwrap();
            let ptr = pool.pack(slot, black_box(id)).unwrap();
            pool.unpack(ptr).unwrap()
        })
    });
}

criterion_group!(
    benches,
    bench_pack_buffer_descriptor,
    bench_pack_feature_array,
    bench_adapter_info_round_trip,
    bench_token_cycle
);
criterion_main!(benches);
