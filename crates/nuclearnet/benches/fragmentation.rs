// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fragmentation Benchmark
//!
//! Measures the hot paths of unreliable sends and receives:
//! - splitting a payload into MTU-sized DATA packets and encoding them
//! - decoding the datagrams and reassembling the payload
//! - type name hashing

#![allow(clippy::uninlined_format_args)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use nuclearnet::fragment::{Fragmenter, Reassembler, ReassemblerConfig};
use nuclearnet::protocol::{TypeHash, WirePacket};
use nuclearnet::NetworkConfig;
use std::time::Instant;

const SIZES: [usize; 4] = [64, 1440, 16 * 1024, 65535];

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|_| fastrand::u8(..)).collect()
}

fn bench_fragment_encode(c: &mut Criterion) {
    let fragmenter = Fragmenter::new(NetworkConfig::default().udp_fragment_capacity());
    let hash = TypeHash::of("bench.Payload");

    let mut group = c.benchmark_group("fragment_encode");
    for size in SIZES {
        let data = payload(size);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &data, |b, data| {
            b.iter(|| {
                let packets = fragmenter
                    .fragment(1, hash, black_box(data), true)
                    .expect("fragment");
                let bytes: usize = packets.iter().map(|p| p.encode().len()).sum();
                black_box(bytes)
            });
        });
    }
    group.finish();
}

fn bench_decode_reassemble(c: &mut Criterion) {
    let fragmenter = Fragmenter::new(NetworkConfig::default().udp_fragment_capacity());
    let hash = TypeHash::of("bench.Payload");

    let mut group = c.benchmark_group("decode_reassemble");
    for size in SIZES {
        let datagrams: Vec<Vec<u8>> = fragmenter
            .fragment(7, hash, &payload(size), true)
            .expect("fragment")
            .iter()
            .map(|p| p.encode())
            .collect();

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &datagrams, |b, datagrams| {
            let mut reassembler: Reassembler<u32> = Reassembler::new(ReassemblerConfig::default());
            b.iter(|| {
                let now = Instant::now();
                let mut complete = None;
                for datagram in datagrams {
                    if let Ok(WirePacket::Data(data)) = WirePacket::decode(datagram) {
                        complete = reassembler.on_fragment(&1, data, now);
                    }
                }
                black_box(complete.expect("payload complete").len())
            });
        });
    }
    group.finish();
}

fn bench_type_hash(c: &mut Criterion) {
    c.bench_function("type_hash_short", |b| {
        b.iter(|| TypeHash::of(black_box("message.input.Sensors")))
    });
    let long = "message.".repeat(32);
    c.bench_function("type_hash_long", |b| {
        b.iter(|| TypeHash::of(black_box(&long)))
    });
}

criterion_group!(
    benches,
    bench_fragment_encode,
    bench_decode_reassemble,
    bench_type_hash
);
criterion_main!(benches);
