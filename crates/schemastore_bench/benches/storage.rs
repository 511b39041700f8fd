//! Typed storage benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use schemastore_bench::{generate_indexed_players, generate_players};
use schemastore_core::Storage;
use schemastore_testkit::{Counter, IndexedPlayer, Player};

fn bench_put(c: &mut Criterion) {
    let mut group = c.benchmark_group("put");

    group.bench_function("plain", |b| {
        let storage = Storage::in_memory();
        let players = generate_players(1_000);
        let mut i = 0;
        b.iter(|| {
            let (key, player) = &players[i % players.len()];
            i += 1;
            storage.put(key, black_box(player)).unwrap();
        });
    });

    group.bench_function("indexed", |b| {
        let storage = Storage::in_memory();
        let players = generate_indexed_players(1_000, 50);
        let mut i = 0;
        b.iter(|| {
            let player = &players[i % players.len()];
            i += 1;
            storage.put(&player.uid, black_box(player)).unwrap();
        });
    });

    group.finish();
}

fn bench_find(c: &mut Criterion) {
    let storage = Storage::in_memory();
    let players = generate_players(1_000);
    for (key, player) in &players {
        storage.put(key, player).unwrap();
    }
    let mut i = 0;

    c.bench_function("find", |b| {
        b.iter(|| {
            let (key, _) = &players[i % players.len()];
            i += 1;
            black_box(storage.find::<Player>(black_box(key)).unwrap());
        });
    });
}

fn bench_get_by_index(c: &mut Criterion) {
    let storage = Storage::in_memory();
    for player in generate_indexed_players(5_000, 50) {
        storage.put(&player.uid.clone(), &player).unwrap();
    }

    c.bench_function("get_by_index", |b| {
        b.iter(|| {
            black_box(
                storage
                    .get_by_index::<IndexedPlayer>("name", black_box(&"name-7"))
                    .unwrap(),
            );
        });
    });
}

fn bench_pagination(c: &mut Criterion) {
    let storage = Storage::in_memory();
    for (key, player) in generate_players(5_000) {
        storage.put(&key, &player).unwrap();
    }

    c.bench_function("next_page_100", |b| {
        b.iter_batched(
            || None::<String>,
            |mut cursor| loop {
                let page = storage.next::<Player>("player/", cursor.as_deref(), 100).unwrap();
                match page.last_key {
                    Some(key) => cursor = Some(key),
                    None => break black_box(page.items.len()),
                }
            },
            BatchSize::SmallInput,
        );
    });
}

fn bench_update(c: &mut Criterion) {
    let storage = Storage::in_memory();

    c.bench_function("update_counter", |b| {
        b.iter(|| {
            black_box(
                storage
                    .update::<Counter, _>("hits", |current| Counter {
                        value: current.map_or(0, |c| c.value) + 1,
                    })
                    .unwrap(),
            );
        });
    });
}

criterion_group!(
    benches,
    bench_put,
    bench_find,
    bench_get_by_index,
    bench_pagination,
    bench_update,
);

criterion_main!(benches);
