//! Performance benchmarks for the Memcached store
//!
//! This benchmark suite measures:
//! - Memcached store operations (set, get, increment)
//! - Batch reads (mget) across batch sizes
//! - Namespace batch fetches through the expander
//!
//! Prerequisites:
//! - Memcached running on localhost:11211
//! - Run with: cargo bench --bench memcached_benchmark --features memcached
//! - View results: open target/criterion/report/index.html

#![cfg(feature = "memcached")]

use cluster_cache::backend::{CacheStore, MemcachedStore};
use cluster_cache::batch::{Backfill, BatchExpander, BatchRequest};
use cluster_cache::{NamespaceCache, NamespaceConfig};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;

/// Create a Memcached store for benchmarking.
///
/// Pool size can be configured via `MEMCACHED_POOL_SIZE` environment variable.
///
/// Example: MEMCACHED_POOL_SIZE=32 cargo bench --bench memcached_benchmark --features memcached
async fn setup_memcached() -> MemcachedStore {
    MemcachedStore::from_server("localhost:11211".to_string())
        .await
        .expect(
            "Failed to connect to Memcached at localhost:11211. Make sure Memcached is running.",
        )
}

fn memcached_basic_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("memcached_store");
    group.sample_size(50); // Fewer samples due to network latency

    let rt = tokio::runtime::Runtime::new().expect("Failed to create Tokio runtime");
    let store = rt.block_on(async { setup_memcached().await });

    for size in [100, 1_000, 10_000].iter() {
        group
            .throughput(Throughput::Bytes(*size as u64))
            .bench_with_input(BenchmarkId::new("set", size), size, |b, &size| {
                let value = vec![1u8; size];

                b.to_async(&rt).iter(|| async {
                    store
                        .set(
                            black_box("memcached_bench_key"),
                            black_box(value.clone()),
                            Some(Duration::from_secs(60)),
                        )
                        .await
                        .expect("Failed to set")
                });
            });

        group
            .throughput(Throughput::Bytes(*size as u64))
            .bench_with_input(BenchmarkId::new("get_hit", size), size, |b, &size| {
                rt.block_on(async {
                    store
                        .set("memcached_bench_hit", vec![1u8; size], None)
                        .await
                        .expect("Failed to set");
                });

                b.to_async(&rt)
                    .iter(|| async { store.get(black_box("memcached_bench_hit")).await });
            });
    }

    group.bench_function("get_miss", |b| {
        b.to_async(&rt)
            .iter(|| async { store.get(black_box("memcached_bench_missing")).await });
    });

    group.bench_function("increment", |b| {
        b.to_async(&rt).iter(|| async {
            store
                .increment(black_box("memcached_bench_counter"), 1, 1)
                .await
        });
    });

    group.finish();
}

fn memcached_batch_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("memcached_batch_ops");
    group.sample_size(50);

    let rt = tokio::runtime::Runtime::new().expect("Failed to create Tokio runtime");
    let store = rt.block_on(async { setup_memcached().await });

    for batch_size in [10usize, 50, 100].iter() {
        let keys: Vec<String> = (0..*batch_size)
            .map(|i| format!("memcached_bench_batch_{}", i))
            .collect();
        rt.block_on(async {
            let entries = keys.iter().map(|k| (k.clone(), vec![1u8; 256])).collect();
            store.mset(entries, None).await.expect("Failed to mset");
        });

        group
            .throughput(Throughput::Elements(*batch_size as u64))
            .bench_with_input(BenchmarkId::new("mget", batch_size), &keys, |b, keys| {
                let refs: Vec<&str> = keys.iter().map(String::as_str).collect();
                b.to_async(&rt)
                    .iter(|| async { store.mget(black_box(&refs)).await });
            });

        group
            .throughput(Throughput::Elements(*batch_size as u64))
            .bench_with_input(
                BenchmarkId::new("expander_all_hit", batch_size),
                batch_size,
                |b, &batch_size| {
                    let namespace = Arc::new(NamespaceCache::new(
                        "bench",
                        store.clone(),
                        NamespaceConfig::default(),
                    ));
                    let expander = BatchExpander::new(namespace);
                    let request = || {
                        BatchRequest::new(0..batch_size)
                            .with_key_extractor(|v: &u64| Some(v.to_string()))
                            .with_backfill(Backfill::Sync)
                    };
                    let load = |ids: Vec<String>| async move {
                        Ok(ids.iter().filter_map(|id| id.parse::<u64>().ok()).collect::<Vec<_>>())
                    };

                    rt.block_on(async {
                        let _: Vec<u64> = expander
                            .fetch(request(), load)
                            .await
                            .expect("Failed to populate cache");
                    });

                    b.to_async(&rt).iter(|| async {
                        let values: Vec<u64> = expander
                            .fetch(black_box(request()), load)
                            .await
                            .expect("Failed to fetch");
                        values
                    });
                },
            );
    }

    group.finish();
}

criterion_group!(
    benches,
    memcached_basic_benchmarks,
    memcached_batch_benchmarks
);
criterion_main!(benches);
