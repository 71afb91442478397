//! Access check benchmarks: hierarchy depth and snapshot cache impact

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use scoped_rbac::{CheckParams, InMemoryPolicyStore, Item, RbacManager};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::runtime::Runtime;

/// Chain of roles ending in one permission: role-0 -> ... -> role-(n-1) -> leaf
async fn chain_manager(depth: usize, cached: bool) -> RbacManager {
    let store = Arc::new(InMemoryPolicyStore::default());
    let builder = RbacManager::builder(store, "bench");
    let builder = if cached {
        builder
    } else {
        builder.without_snapshot_cache()
    };
    let manager = builder.build().unwrap();

    for i in 0..depth {
        manager.add_item(Item::role(format!("role-{i}"))).await.unwrap();
        if i > 0 {
            manager
                .add_child(&format!("role-{}", i - 1), &format!("role-{i}"))
                .await
                .unwrap();
        }
    }
    manager.add_item(Item::permission("leaf")).await.unwrap();
    manager
        .add_child(&format!("role-{}", depth - 1), "leaf")
        .await
        .unwrap();
    manager.assign("role-0", "bench-user").await.unwrap();

    manager
}

fn bench_check_access(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let params: CheckParams = HashMap::new();

    let mut group = c.benchmark_group("check_access");

    for depth in [2usize, 8, 32].iter() {
        group.bench_with_input(BenchmarkId::new("depth", depth), depth, |b, &depth| {
            let manager = rt.block_on(chain_manager(depth, true));
            // Warm the snapshot so the loop measures pure traversal
            rt.block_on(manager.check_access("bench-user", "leaf", &params))
                .unwrap();

            b.to_async(&rt).iter(|| async {
                let allowed = manager
                    .check_access(black_box("bench-user"), black_box("leaf"), &params)
                    .await
                    .unwrap();
                black_box(allowed);
            });
        });
    }

    group.bench_function("depth_8_uncached", |b| {
        let manager = rt.block_on(chain_manager(8, false));
        b.to_async(&rt).iter(|| async {
            let allowed = manager
                .check_access(black_box("bench-user"), black_box("leaf"), &params)
                .await
                .unwrap();
            black_box(allowed);
        });
    });

    group.finish();
}

criterion_group!(benches, bench_check_access);
criterion_main!(benches);
