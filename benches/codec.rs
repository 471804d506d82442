//! Wire Codec Benchmark for mcrelay
//!
//! Measures request serialization and VALUE header framing, the two
//! per-exchange costs that sit on the proxy's hot path.

use bytes::BytesMut;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use mcrelay::protocol::{codec, McRequest};

/// Benchmark request encoding
fn bench_encode(c: &mut Criterion) {
    let get = McRequest::get("user:1234567890").unwrap();
    let small_set = McRequest::set("user:1234567890", 0, 0, b"small_value").unwrap();
    let large_set = McRequest::set("user:1234567890", 0, 0, &vec![b'x'; 16 * 1024]).unwrap();

    let mut group = c.benchmark_group("encode");
    group.throughput(Throughput::Elements(1));

    group.bench_function("get", |b| {
        let mut buf = BytesMut::with_capacity(8 * 1024);
        b.iter(|| {
            buf.clear();
            codec::encode_request(black_box(&get), &mut buf);
        });
    });

    group.bench_function("set_small", |b| {
        let mut buf = BytesMut::with_capacity(8 * 1024);
        b.iter(|| {
            buf.clear();
            codec::encode_request(black_box(&small_set), &mut buf);
        });
    });

    group.bench_function("set_16k", |b| {
        let mut buf = BytesMut::with_capacity(32 * 1024);
        b.iter(|| {
            buf.clear();
            codec::encode_request(black_box(&large_set), &mut buf);
        });
    });

    group.finish();
}

/// Benchmark VALUE header framing
fn bench_value_header(c: &mut Criterion) {
    let mut group = c.benchmark_group("value_header");
    group.throughput(Throughput::Elements(1));

    group.bench_function("get_shape", |b| {
        b.iter(|| codec::value_body_len(black_box(b"VALUE user:1234567890 0 1024\r\n")));
    });

    group.bench_function("gets_shape", |b| {
        b.iter(|| {
            codec::value_body_len(black_box(b"VALUE user:1234567890 0 1024 8491046137\r\n"))
        });
    });

    group.finish();
}

criterion_group!(benches, bench_encode, bench_value_header);
criterion_main!(benches);
