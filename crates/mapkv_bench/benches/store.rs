//! Store benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use mapkv_bench::utils::{generate_entries, generate_keys, temp_store};
use mapkv_core::{Config, Store, StoreIdentity};

/// Benchmark single sets with and without per-write flushing.
fn bench_set(c: &mut Criterion) {
    let mut group = c.benchmark_group("set");

    group.bench_function("in_memory", |b| {
        let store = Store::open_in_memory("bench", None, Config::default()).unwrap();
        let mut i = 0u64;
        b.iter(|| {
            store.set_number(black_box("counter"), i as f64).unwrap();
            i += 1;
        });
    });

    group.bench_function("mmap_no_sync", |b| {
        let (_dir, store) = temp_store("bench", None, Config::new().sync_on_write(false));
        let mut i = 0u64;
        b.iter(|| {
            store.set_number(black_box("counter"), i as f64).unwrap();
            i += 1;
        });
    });

    group.sample_size(20);
    group.bench_function("mmap_sync", |b| {
        let (_dir, store) = temp_store("bench", None, Config::default());
        let mut i = 0u64;
        b.iter(|| {
            store.set_number(black_box("counter"), i as f64).unwrap();
            i += 1;
        });
    });

    group.bench_function("mmap_encrypted_no_sync", |b| {
        let (_dir, store) = temp_store(
            "bench",
            Some(b"bench-key"),
            Config::new().sync_on_write(false),
        );
        let mut i = 0u64;
        b.iter(|| {
            store.set_number(black_box("counter"), i as f64).unwrap();
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark point reads from a populated store.
fn bench_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("get");

    for count in [100, 10_000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let (_dir, store) = temp_store("bench", None, Config::new().sync_on_write(false));
            let entries = generate_entries(count, 64);
            for (key, value) in &entries {
                store.set(key, value.clone()).unwrap();
            }
            let keys = generate_keys(count);

            let mut idx = 0;
            b.iter(|| {
                let key = &keys[(idx * 7) % count];
                black_box(store.get(black_box(key)).unwrap());
                idx += 1;
            });
        });
    }

    group.finish();
}

/// Benchmark opening a store, which replays the whole log.
fn bench_open(c: &mut Criterion) {
    let mut group = c.benchmark_group("open_replay");
    group.sample_size(20);

    for count in [1000, 10_000].iter() {
        let (dir, store) = temp_store("bench", None, Config::new().sync_on_write(false));
        for (key, value) in generate_entries(*count, 32) {
            store.set(&key, value).unwrap();
        }
        store.sync().unwrap();
        drop(store);

        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, _| {
            b.iter(|| {
                let store =
                    Store::open(&StoreIdentity::new("bench"), dir.path(), Config::default())
                        .unwrap();
                black_box(store.count().unwrap());
            });
        });
    }

    group.finish();
}

/// Benchmark trimming a log that is mostly garbage.
fn bench_trim(c: &mut Criterion) {
    let mut group = c.benchmark_group("trim");
    group.sample_size(20);

    group.bench_function("1000_keys_10x_overwritten", |b| {
        let keys = generate_keys(1000);
        b.iter_batched(
            || {
                let (dir, store) = temp_store(
                    "bench",
                    None,
                    Config::new().sync_on_write(false).auto_compact(false),
                );
                for round in 0..10 {
                    for key in &keys {
                        store.set_number(key, f64::from(round)).unwrap();
                    }
                }
                (dir, store)
            },
            |(_dir, store)| {
                store.trim().unwrap();
                black_box(store.actual_size().unwrap());
            },
            criterion::BatchSize::PerIteration,
        );
    });

    group.finish();
}

criterion_group!(benches, bench_set, bench_get, bench_open, bench_trim);

criterion_main!(benches);
