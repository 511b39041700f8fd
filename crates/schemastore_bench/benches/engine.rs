//! Engine benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use schemastore_bench::random_data;
use schemastore_engine::{Engine, EngineConfig, LogOp};
use tempfile::TempDir;

fn bench_memory_put(c: &mut Criterion) {
    let mut group = c.benchmark_group("memory_put");

    for size in [64, 1024, 4096].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let engine = Engine::in_memory();
            let value = random_data(size);
            let mut i = 0u64;

            b.iter(|| {
                i += 1;
                engine.put(&i.to_be_bytes(), black_box(&value)).unwrap();
            });
        });
    }

    group.finish();
}

fn bench_file_put(c: &mut Criterion) {
    let mut group = c.benchmark_group("file_put");
    group.sample_size(30);

    for sync in [true, false] {
        group.bench_with_input(BenchmarkId::new("sync_on_commit", sync), &sync, |b, &sync| {
            let temp_dir = TempDir::new().unwrap();
            let config = EngineConfig::at(temp_dir.path().join("db")).sync_on_commit(sync);
            let engine = Engine::open(config).unwrap();
            let value = random_data(256);
            let mut i = 0u64;

            b.iter(|| {
                i += 1;
                engine.put(&i.to_be_bytes(), black_box(&value)).unwrap();
            });
        });
    }

    group.finish();
}

fn bench_write_batch(c: &mut Criterion) {
    let engine = Engine::in_memory();
    let value = random_data(128);
    let mut round = 0u64;

    c.bench_function("write_batch_100", |b| {
        b.iter(|| {
            round += 1;
            let ops = (0..100u64)
                .map(|i| LogOp::Put {
                    key: format!("{round}/{i}").into_bytes(),
                    value: value.clone(),
                })
                .collect();
            black_box(engine.write_batch(ops).unwrap());
        });
    });
}

fn bench_seek(c: &mut Criterion) {
    let engine = Engine::in_memory();
    for i in 0..10_000u32 {
        engine
            .put(format!("bucket{}/{i:05}", i % 10).as_bytes(), &i.to_le_bytes())
            .unwrap();
    }

    c.bench_function("seek_1000", |b| {
        b.iter(|| {
            let mut iter = engine.seek(black_box(b"bucket3/"), None).unwrap();
            let mut n = 0;
            while iter.next() {
                n += iter.value().len();
            }
            black_box(n);
        });
    });
}

fn bench_transaction(c: &mut Criterion) {
    let engine = Engine::in_memory();
    engine.put(b"counter", &0u64.to_le_bytes()).unwrap();

    c.bench_function("txn_read_modify_write", |b| {
        b.iter(|| {
            let txn = engine.begin().unwrap();
            let bytes = txn.get_for_update(b"counter").unwrap().unwrap();
            let n = u64::from_le_bytes(bytes.try_into().unwrap());
            txn.put(b"counter", &(n + 1).to_le_bytes()).unwrap();
            black_box(txn.commit().unwrap());
        });
    });
}

criterion_group!(
    benches,
    bench_memory_put,
    bench_file_put,
    bench_write_batch,
    bench_seek,
    bench_transaction,
);

criterion_main!(benches);
