//! Load tests with 1000+ nodes.
//!
//! Run with: `cargo test --package switchyard-integration-tests load_tests -- --nocapture`

use std::sync::Arc;
use std::time::Instant;

use switchyard::prelude::*;
use switchyard::store::notify;

async fn distributor_with(clusters: usize) -> (Distributor, Arc<ShardedCache>) {
    let store = Arc::new(MemoryStore::new());
    store.upsert(Listener::new("public", 80, vec!["example.com".into()], "web"));
    for i in 0..clusters {
        let name = format!("cluster-{i}");
        store.upsert(
            Route::new(format!("route-{i}"), "web", format!("/svc/{i}"), PathType::Prefix)
                .with_attributes(Attributes::from(vec![Attribute::new("Cluster", &name)])),
        );
        store.upsert(Cluster::new(name, "backend", 8080));
    }

    let (notifier, _rx) = notify::channel(8);
    let entities = Arc::new(EntityCache::new(store, EntityCacheConfig::default(), notifier));
    entities.refresh_all().await;

    let cache = Arc::new(ShardedCache::new());
    let distributor = Distributor::new(entities, cache.clone(), ControlPlaneMetrics::new());
    (distributor, cache)
}

#[tokio::test]
async fn test_1000_nodes_share_one_snapshot() {
    let (mut distributor, cache) = distributor_with(50).await;
    let num_nodes = 1000;

    let nodes: Vec<NodeId> = (0..num_nodes)
        .map(|i| NodeId::new(format!("envoy-sidecar-{i}")))
        .collect();
    for node in &nodes {
        distributor.on_node_registered(node.clone());
    }

    let start = Instant::now();
    let snapshot = distributor.create_snapshot(ResourceKind::Cluster).await;
    println!(
        "Compiled and assigned {} resources to {} nodes in {:?}",
        snapshot.total_resources(),
        num_nodes,
        start.elapsed()
    );

    assert_eq!(cache.snapshot_count(), num_nodes);
    for node in &nodes {
        let assigned = cache.get_snapshot(node.hash()).unwrap();
        assert!(Arc::ptr_eq(&assigned, &snapshot));
    }
    assert_eq!(snapshot.clusters().unwrap().len(), 50);
}

#[tokio::test]
async fn test_node_churn() {
    let (mut distributor, cache) = distributor_with(5).await;
    distributor.create_snapshot(ResourceKind::Route).await;

    for round in 0..10 {
        let nodes: Vec<NodeId> = (0..100)
            .map(|i| NodeId::new(format!("round-{round}-node-{i}")))
            .collect();
        for node in &nodes {
            assert!(distributor.on_node_registered(node.clone()));
        }
        for node in &nodes {
            distributor.on_node_stream_closed(node);
        }
    }

    assert_eq!(distributor.tracked_nodes(), 0);
    assert_eq!(cache.snapshot_count(), 0);
}
