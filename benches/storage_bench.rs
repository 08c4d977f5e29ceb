//! Benchmarks for PlugKV storage operations

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use plugkv::config::WalSyncStrategy;
use plugkv::kvdb::{
    GetItemRequest, KeyValueStore, PutItemRequest, Registry, LOGDB_DRIVER, MEMORY_DRIVER,
};
use plugkv::{Context, Engine, Value};
use tempfile::TempDir;

fn driver_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("put_item");
    let ctx = Context::background();

    for driver in [MEMORY_DRIVER, LOGDB_DRIVER] {
        let temp = TempDir::new().unwrap();
        let store = Registry::with_builtin()
            .open(driver, temp.path().to_str().unwrap())
            .unwrap();
        let value = vec![0xab; 128];
        let mut i = 0u64;

        group.bench_with_input(BenchmarkId::from_parameter(driver), &store, |b, store| {
            b.iter(|| {
                i += 1;
                let key = format!("key{}", i % 10_000);
                store
                    .put_item(&ctx, PutItemRequest::new(key, value.clone()))
                    .unwrap();
            })
        });

        store.close(&ctx).unwrap();
    }
    group.finish();

    let mut group = c.benchmark_group("get_item");
    for driver in [MEMORY_DRIVER, LOGDB_DRIVER] {
        let temp = TempDir::new().unwrap();
        let store = Registry::with_builtin()
            .open(driver, temp.path().to_str().unwrap())
            .unwrap();
        for i in 0..10_000 {
            store
                .put_item(&ctx, PutItemRequest::new(format!("key{}", i), vec![0xcd; 128]))
                .unwrap();
        }
        let mut i = 0u64;

        group.bench_with_input(BenchmarkId::from_parameter(driver), &store, |b, store| {
            b.iter(|| {
                i += 1;
                let key = format!("key{}", i % 10_000);
                black_box(store.get_item(&ctx, GetItemRequest::new(key)).unwrap());
            })
        });

        store.close(&ctx).unwrap();
    }
    group.finish();
}

fn wal_sync_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("logdb_sync");
    group.sample_size(20);
    let ctx = Context::background();

    for (name, strategy) in [
        ("every_write", WalSyncStrategy::EveryWrite),
        ("every_100", WalSyncStrategy::EveryNEntries { count: 100 }),
    ] {
        let temp = TempDir::new().unwrap();
        let engine = Engine::open(temp.path(), strategy).unwrap();
        let mut i = 0u64;

        group.bench_function(name, |b| {
            b.iter(|| {
                i += 1;
                engine.put(&ctx, &format!("key{}", i), vec![1; 64]).unwrap();
            })
        });
    }
    group.finish();
}

fn value_benchmarks(c: &mut Criterion) {
    let value = Value::from(serde_json::json!({
        "id": 12345,
        "name": "benchmark",
        "tags": ["a", "b", "c"],
        "nested": {"ok": true, "score": 0.5}
    }));
    let bytes = value.encode().unwrap();

    c.bench_function("value_encode", |b| b.iter(|| black_box(value.encode().unwrap())));
    c.bench_function("value_decode", |b| {
        b.iter(|| black_box(Value::decode(&bytes).unwrap()))
    });
}

criterion_group!(benches, driver_benchmarks, wal_sync_benchmarks, value_benchmarks);
criterion_main!(benches);
