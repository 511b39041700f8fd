//! Key and envelope codec benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use schemastore_bench::random_string;
use schemastore_codec::{decode_envelope, encode_envelope, KeyCodec, VersionChain};
use schemastore_testkit::{Profile, ProfileV1};

fn bench_keys(c: &mut Criterion) {
    let keys = KeyCodec::new("SchemaIndexedPlayer");

    c.bench_function("data_key", |b| {
        b.iter(|| black_box(keys.data_key(black_box("player/00001234"))));
    });

    c.bench_function("index_key", |b| {
        b.iter(|| black_box(keys.index_key(black_box("name"), black_box("Alice"), black_box("00001234"))));
    });
}

fn bench_encode_size(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_envelope");

    for len in [16, 256, 4096].iter() {
        let value = random_string(*len);
        group.throughput(Throughput::Bytes(*len as u64));
        group.bench_with_input(BenchmarkId::from_parameter(len), &value, |b, value| {
            b.iter(|| black_box(encode_envelope(1, black_box(value)).unwrap()));
        });
    }

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_envelope");

    let current = Profile {
        display_name: random_string(16),
        level: 12,
        tags: (0..4).map(|_| random_string(8)).collect(),
    };
    let current_bytes = encode_envelope(3, &current).unwrap();
    let old_bytes = encode_envelope(1, &ProfileV1 { name: random_string(16) }).unwrap();
    let chain = VersionChain::<Profile>::new()
        .historical::<ProfileV1>()
        .historical::<schemastore_testkit::ProfileV2>();

    group.bench_function("current", |b| {
        b.iter(|| black_box(decode_envelope(black_box(&current_bytes), &chain).unwrap()));
    });

    group.bench_function("upgrade_from_v1", |b| {
        b.iter(|| black_box(decode_envelope(black_box(&old_bytes), &chain).unwrap()));
    });

    group.finish();
}

criterion_group!(benches, bench_keys, bench_encode_size, bench_decode);

criterion_main!(benches);
