//! Performance benchmarks for cluster-cache
//!
//! This benchmark suite measures:
//! - InMemory store operations (set, get, increment)
//! - Key derivation for short and digested keys
//! - Namespace lookups under both version policies
//! - Batch expander fetches (all hit, partial miss)
//! - Value encoding across payload sizes
//!
//! Run with: cargo bench
//! View results: open target/criterion/report/index.html

use cluster_cache::backend::{CacheStore, InMemoryStore};
use cluster_cache::batch::{Backfill, BatchExpander, BatchRequest};
use cluster_cache::key::KeyCodec;
use cluster_cache::namespace::VersionPolicy;
use cluster_cache::serialization::SerialFormat;
use cluster_cache::{NamespaceCache, NamespaceConfig};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde::{Deserialize, Serialize};
use std::hint::black_box;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Benchmark value with configurable data size
#[derive(Clone, Serialize, Deserialize)]
struct BenchEntity {
    id: String,
    data: Vec<u8>,
}

impl BenchEntity {
    fn new(id: String, size: usize) -> Self {
        BenchEntity {
            id,
            data: vec![0u8; size],
        }
    }
}

fn namespace(policy: VersionPolicy) -> Arc<NamespaceCache<InMemoryStore>> {
    let config = NamespaceConfig::default()
        .with_prefix("bench")
        .with_version_policy(policy);
    Arc::new(NamespaceCache::new("entities", InMemoryStore::new(), config))
}

fn load_entities(ids: Vec<String>) -> Vec<BenchEntity> {
    ids.into_iter().map(|id| BenchEntity::new(id, 256)).collect()
}

// ============================================================================
// Group 1: InMemory Store Benchmarks
// ============================================================================

fn inmemory_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("inmemory_store");
    let rt = tokio::runtime::Runtime::new().expect("Failed to create Tokio runtime");

    for size in [100, 1_000, 10_000].iter() {
        group
            .throughput(Throughput::Bytes(*size as u64))
            .bench_with_input(BenchmarkId::new("set", size), size, |b, &size| {
                let store = InMemoryStore::new();
                let value = vec![1u8; size];

                b.to_async(&rt).iter(|| async {
                    store
                        .set(black_box("test_key"), black_box(value.clone()), None)
                        .await
                        .expect("Failed to set")
                });
            });

        group
            .throughput(Throughput::Bytes(*size as u64))
            .bench_with_input(BenchmarkId::new("get_hit", size), size, |b, &size| {
                let store = InMemoryStore::new();
                rt.block_on(async {
                    store
                        .set("test_key", vec![1u8; size], None)
                        .await
                        .expect("Failed to set");
                });

                b.to_async(&rt)
                    .iter(|| async { store.get(black_box("test_key")).await });
            });
    }

    group.bench_function("get_miss", |b| {
        let store = InMemoryStore::new();
        b.to_async(&rt)
            .iter(|| async { store.get(black_box("nonexistent_key")).await });
    });

    group.bench_function("increment", |b| {
        let store = InMemoryStore::new();
        b.to_async(&rt)
            .iter(|| async { store.increment(black_box("counter"), 1, 1).await });
    });

    group.finish();
}

// ============================================================================
// Group 2: Key Derivation
// ============================================================================

fn key_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("key_codec");
    let codec = KeyCodec::new(Some("app"), "users", ":");
    let short = "user:12345".to_string();
    let long = "x".repeat(200);

    group.bench_function("short", |b| {
        b.iter(|| codec.build_key(black_box(7), &black_box(&short)))
    });
    group.bench_function("digested", |b| {
        b.iter(|| codec.build_key(black_box(7), &black_box(&long)))
    });

    group.finish();
}

// ============================================================================
// Group 3: Namespace Lookups
// ============================================================================

fn namespace_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("namespace");
    let rt = tokio::runtime::Runtime::new().expect("Failed to create Tokio runtime");

    let policies = [
        ("per_call", VersionPolicy::PerCall),
        (
            "cached_version",
            VersionPolicy::Cached {
                refresh: Duration::from_secs(1),
            },
        ),
    ];

    for (label, policy) in policies {
        group.bench_function(BenchmarkId::new("get_hit", label), |b| {
            let cache = namespace(policy);
            rt.block_on(async {
                cache
                    .put("hot", Some(&BenchEntity::new("hot".to_string(), 256)))
                    .await
                    .expect("Failed to populate cache");
            });

            b.to_async(&rt)
                .iter(|| async { cache.get::<BenchEntity>(black_box("hot")).await });
        });
    }

    group.finish();
}

// ============================================================================
// Group 4: Batch Expander
// ============================================================================

fn batch_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_expander");
    let rt = tokio::runtime::Runtime::new().expect("Failed to create Tokio runtime");

    for batch in [10usize, 100].iter() {
        group
            .throughput(Throughput::Elements(*batch as u64))
            .bench_with_input(BenchmarkId::new("all_hit", batch), batch, |b, &batch| {
                let expander = BatchExpander::new(namespace(VersionPolicy::PerCall));
                let ids: Vec<String> = (0..batch).map(|i| i.to_string()).collect();
                let request = || {
                    BatchRequest::new(ids.clone())
                        .with_key_extractor(|e: &BenchEntity| Some(e.id.clone()))
                        .with_backfill(Backfill::Sync)
                };

                rt.block_on(async {
                    let _: Vec<BenchEntity> = expander
                        .fetch(request(), |ids: Vec<String>| async move {
                            Ok(load_entities(ids))
                        })
                        .await
                        .expect("Failed to populate cache");
                });

                b.to_async(&rt).iter(|| async {
                    let values: Vec<BenchEntity> = expander
                        .fetch(black_box(request()), |ids: Vec<String>| async move {
                            Ok(load_entities(ids))
                        })
                        .await
                        .expect("Failed to fetch");
                    values
                });
            });

        // Half of every batch is new, forcing a loader call and a backfill.
        group
            .throughput(Throughput::Elements(*batch as u64))
            .bench_with_input(BenchmarkId::new("half_miss", batch), batch, |b, &batch| {
                let expander = Arc::new(BatchExpander::new(namespace(VersionPolicy::PerCall)));
                let counter = Arc::new(AtomicU64::new(0));

                b.to_async(&rt).iter(|| {
                    let expander = Arc::clone(&expander);
                    let round = counter.fetch_add(1, Ordering::Relaxed);
                    async move {
                        let ids = (0..batch).map(move |i| {
                            if i % 2 == 0 {
                                format!("stable-{}", i)
                            } else {
                                format!("round-{}-{}", round, i)
                            }
                        });
                        let request = BatchRequest::new(ids)
                            .with_key_extractor(|e: &BenchEntity| Some(e.id.clone()))
                            .with_backfill(Backfill::Sync);

                        let values: Vec<BenchEntity> = expander
                            .fetch(request, |ids: Vec<String>| async move {
                                Ok(load_entities(ids))
                            })
                            .await
                            .expect("Failed to fetch");
                        values
                    }
                });
            });
    }

    group.finish();
}

// ============================================================================
// Group 5: Value Encoding
// ============================================================================

fn serialization_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("serialization");

    for size in [100, 1_000, 10_000].iter() {
        let entity = BenchEntity::new("test_id".to_string(), *size);

        for (label, format) in [("json", SerialFormat::Json), ("typed_json", SerialFormat::TypedJson)] {
            group
                .throughput(Throughput::Bytes(*size as u64))
                .bench_with_input(
                    BenchmarkId::new(format!("encode_{}", label), size),
                    &entity,
                    |b, entity| b.iter(|| format.encode(black_box(entity))),
                );

            let encoded = format.encode(&entity).expect("Failed to encode");
            group
                .throughput(Throughput::Bytes(*size as u64))
                .bench_with_input(
                    BenchmarkId::new(format!("decode_{}", label), size),
                    &encoded,
                    |b, encoded| {
                        b.iter(|| format.decode::<BenchEntity>(black_box(encoded)))
                    },
                );
        }
    }

    group.finish();
}

criterion_group!(
    benches,
    inmemory_benchmarks,
    key_benchmarks,
    namespace_benchmarks,
    batch_benchmarks,
    serialization_benchmarks
);
criterion_main!(benches);
