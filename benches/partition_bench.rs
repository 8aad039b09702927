//! Criterion micro-benchmarks for the check/add hot path.
//!
//! These benchmarks measure:
//! - Routing (domain validation + SHA-256 partition key)
//! - Check/Add against a resident actor
//! - Checkpoint record encoding for growing partitions
//!
//! Run with: `cargo bench --bench partition_bench`

use std::sync::Arc;

use breachcache::email;
use breachcache::partition::{ActorRegistry, CheckpointRecord, MemoryStore, PartitionConfig};
use breachcache::types::PartitionKey;
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
}

/// Benchmark email validation and partition key hashing.
fn bench_route(c: &mut Criterion) {
    c.bench_function("route_email", |b| {
        b.iter(|| email::route(black_box("Someone.Else@Mail.Example.com")));
    });
}

/// Benchmark check and add on an already-active partition.
fn bench_actor_ops(c: &mut Criterion) {
    let rt = runtime();
    let registry = ActorRegistry::new(PartitionConfig::default(), Arc::new(MemoryStore::new()));
    let key = PartitionKey::from("bench");

    rt.block_on(async {
        for i in 0..10_000 {
            let _ = registry.add(&key, &format!("user{}@example.com", i)).await;
        }
    });

    let mut group = c.benchmark_group("actor_ops");

    group.bench_function("check_hit", |b| {
        b.to_async(&rt)
            .iter(|| registry.check(&key, black_box("user42@example.com")));
    });

    group.bench_function("check_miss", |b| {
        b.to_async(&rt)
            .iter(|| registry.check(&key, black_box("nobody@example.com")));
    });

    group.bench_function("add_duplicate", |b| {
        b.to_async(&rt)
            .iter(|| registry.add(&key, black_box("user42@example.com")));
    });

    group.finish();
    rt.block_on(registry.shutdown());
}

/// Benchmark checkpoint encoding for different partition sizes.
fn bench_checkpoint_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("checkpoint_encode");
    let key = PartitionKey::from("bench");

    for size in [100, 1_000, 10_000].iter() {
        let emails: Vec<String> = (0..*size).map(|i| format!("user{}@example.com", i)).collect();
        group.throughput(Throughput::Elements(*size as u64));

        group.bench_with_input(BenchmarkId::new("json", size), size, |b, _| {
            b.iter(|| CheckpointRecord::new(&key, black_box(&emails)).encode());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_route, bench_actor_ops, bench_checkpoint_encode);
criterion_main!(benches);
