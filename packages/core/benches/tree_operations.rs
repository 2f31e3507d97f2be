//! Performance benchmarks for save & restore tree operations
//!
//! Run with: `cargo bench -p saverestore-core`
//!
//! - Child creation under a single parent (sibling uniqueness check included)
//! - Path resolution through a deep folder chain
//! - Copying a configuration that holds snapshots

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use saverestore_core::db::DatabaseService;
use saverestore_core::models::{ConfigPv, Node, PvValue, SnapshotItem, ROOT_NODE_UNIQUE_ID};
use saverestore_core::services::{ConfigurationService, NodeService, SnapshotService};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::runtime::Runtime;

async fn setup_test_db() -> (Arc<DatabaseService>, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db = Arc::new(
        DatabaseService::new(temp_dir.path().join("bench.db"))
            .await
            .unwrap(),
    );
    (db, temp_dir)
}

fn bench_create_node(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    c.bench_function("create_node", |b| {
        b.iter_custom(|iters| {
            rt.block_on(async {
                let (db, _temp) = setup_test_db().await;
                let nodes = NodeService::new(db);
                let parent = nodes
                    .create_node(ROOT_NODE_UNIQUE_ID, Node::folder("parent"))
                    .await
                    .unwrap();

                let start = std::time::Instant::now();
                for i in 0..iters {
                    nodes
                        .create_node(&parent.unique_id, Node::folder(format!("child{}", i)))
                        .await
                        .unwrap();
                }
                start.elapsed()
            })
        });
    });
}

/// Resolution of a 10-level path with a few siblings per level
fn bench_resolve_path(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    c.bench_function("resolve_path_depth_10", |b| {
        b.iter_custom(|iters| {
            rt.block_on(async {
                let (db, _temp) = setup_test_db().await;
                let nodes = NodeService::new(db);

                let segments: Vec<String> = (0..10).map(|i| format!("level{}", i)).collect();
                let path = format!("/{}", segments.join("/"));
                let leaf = nodes.create_path(&path, "bench").await.unwrap();
                let mut parent = leaf.parent_unique_id.clone().unwrap();
                for i in 0..5 {
                    nodes
                        .create_node(&parent, Node::configuration(format!("decoy{}", i)))
                        .await
                        .unwrap();
                    parent = nodes.get_parent_node(&parent).await.unwrap().unwrap().unique_id;
                }

                let start = std::time::Instant::now();
                for _ in 0..iters {
                    black_box(nodes.resolve_path(&path).await.unwrap().unwrap());
                }
                start.elapsed()
            })
        });
    });
}

/// Copy of a configuration with 50 PVs and 5 snapshots
fn bench_copy_configuration(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let mut group = c.benchmark_group("copy_nodes");
    group.sample_size(10);

    group.bench_function("configuration_with_snapshots", |b| {
        b.iter_custom(|iters| {
            rt.block_on(async {
                let (db, _temp) = setup_test_db().await;
                let nodes = NodeService::new(db.clone());
                let configs = ConfigurationService::new(db.clone());
                let snapshots = SnapshotService::new(db);

                let source = nodes.create_path("/source", "bench").await.unwrap();
                let config = nodes
                    .create_node(&source.unique_id, Node::configuration("cfg"))
                    .await
                    .unwrap();
                let pvs: Vec<ConfigPv> = (0..50).map(|i| ConfigPv::new(format!("PV:{}", i))).collect();
                configs.update_configuration(&config, pvs.clone()).await.unwrap();
                for s in 0..5 {
                    let items = pvs
                        .iter()
                        .enumerate()
                        .map(|(i, pv)| SnapshotItem::new(pv.clone()).with_value(PvValue::double(i as f64)))
                        .collect();
                    snapshots
                        .save_snapshot(&config.unique_id, items, &format!("snap{}", s), "", "bench")
                        .await
                        .unwrap();
                }

                let mut total = std::time::Duration::ZERO;
                for i in 0..iters {
                    let target = nodes
                        .create_path(&format!("/target{}", i), "bench")
                        .await
                        .unwrap();
                    let start = std::time::Instant::now();
                    let copied = nodes
                        .copy_nodes(&[config.unique_id.clone()], &target.unique_id, "bench")
                        .await;
                    total += start.elapsed();
                    black_box(copied.unwrap());
                }
                total
            })
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_create_node,
    bench_resolve_path,
    bench_copy_configuration
);
criterion_main!(benches);
