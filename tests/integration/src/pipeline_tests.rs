//! Full control plane runs: store, entity cache, distributor and node callbacks.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use switchyard::compiler::CompiledListener;
use switchyard::prelude::*;

const WAIT: Duration = Duration::from_secs(10);

fn local_config() -> ControlPlaneConfig {
    ControlPlaneConfig {
        poll_interval: Duration::from_secs(1),
        store_timeout: Duration::from_millis(500),
        discovery_listen: "127.0.0.1:0".parse().unwrap(),
        ..Default::default()
    }
}

fn seed(store: &MemoryStore) {
    store.upsert(Listener::new("public", 8080, vec!["example.com".into()], "web"));
    store.upsert(
        Route::new("home", "web", "/", PathType::Prefix)
            .with_attributes(Attributes::from(vec![Attribute::new("Cluster", "c1")])),
    );
    store.upsert(Cluster::new("c1", "backend", 9000));
}

/// Next snapshot on `watch` that satisfies `accept`.
async fn wait_for(watch: &mut Watch, accept: impl Fn(&Snapshot) -> bool) -> Arc<Snapshot> {
    tokio::time::timeout(WAIT, async {
        loop {
            let snapshot = watch.recv().await.expect("watch closed");
            if accept(&snapshot) {
                return snapshot;
            }
        }
    })
    .await
    .expect("no matching snapshot")
}

fn cluster_count(snapshot: &Snapshot) -> usize {
    snapshot.clusters().map_or(0, |c| c.len())
}

#[tokio::test]
async fn store_changes_reach_connected_node() {
    let store = Arc::new(MemoryStore::new());
    seed(&store);

    let plane = ControlPlane::new(local_config(), store.clone()).unwrap();
    let controller = plane.shutdown_controller().clone();
    let callbacks = plane.callbacks().clone();
    let cache = Arc::clone(plane.cache());
    let metrics = plane.metrics().clone();
    let handle = tokio::spawn(plane.run());

    let node = NodeId::new("envoy-edge");
    let mut watch = cache.create_watch(node.hash());
    callbacks
        .on_stream_request(&node, TypeUrl::LISTENER)
        .await
        .unwrap();

    let first = match cache.get_snapshot(node.hash()) {
        Some(snapshot) if cluster_count(&snapshot) == 1 => snapshot,
        _ => wait_for(&mut watch, |s| cluster_count(s) == 1).await,
    };
    let listener = first
        .listeners()
        .unwrap()
        .get("public")
        .unwrap()
        .as_any()
        .downcast_ref::<CompiledListener>()
        .unwrap();
    assert_eq!(listener.address.port, 8080);
    assert!(first.routes().unwrap().get("web").is_some());

    store.upsert(Cluster::new("c2", "backend", 9001));
    let second = wait_for(&mut watch, |s| cluster_count(s) == 2).await;
    assert_ne!(first.version(), second.version());

    callbacks.on_stream_closed(&node).await.unwrap();
    tokio::time::timeout(WAIT, async {
        while cache.has_snapshot(node.hash()) {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap();

    assert!(metrics.snapshots() >= 2);
    assert_eq!(metrics.discovery_requests(), 1);

    assert!(controller.shutdown(Duration::from_secs(5)).await);
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn nodes_share_the_same_version() {
    let store = Arc::new(MemoryStore::new());
    seed(&store);

    let plane = ControlPlane::new(local_config(), store).unwrap();
    let controller = plane.shutdown_controller().clone();
    let callbacks = plane.callbacks().clone();
    let cache = Arc::clone(plane.cache());
    let handle = tokio::spawn(plane.run());

    let nodes: Vec<NodeId> = (0..5).map(|i| NodeId::new(format!("envoy-{i}"))).collect();
    for node in &nodes {
        callbacks
            .on_stream_request(node, TypeUrl::CLUSTER)
            .await
            .unwrap();
    }

    let versions = tokio::time::timeout(WAIT, async {
        loop {
            let versions: Vec<String> = nodes
                .iter()
                .filter_map(|n| cache.get_snapshot(n.hash()))
                .map(|s| s.version().to_string())
                .collect();
            if versions.len() == nodes.len() && versions.iter().all(|v| v == &versions[0]) {
                return versions;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap();
    assert!(versions[0].contains("-V"));

    controller.shutdown(Duration::from_secs(5)).await;
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn file_store_drives_the_pipeline() {
    let path: PathBuf = std::env::temp_dir().join(format!(
        "switchyard-pipeline-{}.json",
        std::process::id()
    ));
    let document = serde_json::json!({
        "listeners": [{"name": "public", "port": 80, "virtualHosts": ["example.com"], "routeGroup": "web"}],
        "routes": [{"name": "home", "routeGroup": "web", "path": "/", "pathType": "prefix",
                    "attributes": [{"name": "Cluster", "value": "c1"}]}],
        "clusters": [{"name": "c1", "host": "backend", "port": 8080}]
    });
    std::fs::write(&path, document.to_string()).unwrap();

    let plane = ControlPlane::new(local_config(), Arc::new(FileStore::new(&path))).unwrap();
    let controller = plane.shutdown_controller().clone();
    let callbacks = plane.callbacks().clone();
    let cache = Arc::clone(plane.cache());
    let handle = tokio::spawn(plane.run());

    let node = NodeId::new("envoy-file");
    let mut watch = cache.create_watch(node.hash());
    callbacks
        .on_stream_request(&node, TypeUrl::CLUSTER)
        .await
        .unwrap();

    let snapshot = match cache.get_snapshot(node.hash()) {
        Some(snapshot) if cluster_count(&snapshot) == 1 => snapshot,
        _ => wait_for(&mut watch, |s| cluster_count(s) == 1).await,
    };
    assert!(snapshot.clusters().unwrap().get("c1").is_some());
    assert!(snapshot.listeners().unwrap().get("public").is_some());

    controller.shutdown(Duration::from_secs(5)).await;
    handle.await.unwrap().unwrap();
    let _ = std::fs::remove_file(&path);
}
