//! Reference scenarios, one per pipeline stage.

use std::sync::Arc;

use switchyard::compiler::{compile_routes, AuthzOverride, PathMatch, RouteAction, Upstream};
use switchyard::prelude::*;
use switchyard::store::{notify, Notification};
use tokio::sync::mpsc;

fn entity_cache(store: Arc<MemoryStore>) -> (Arc<EntityCache>, mpsc::Receiver<Notification>) {
    let (notifier, rx) = notify::channel(8);
    let cache = EntityCache::new(store, EntityCacheConfig::default(), notifier);
    (Arc::new(cache), rx)
}

fn drain(rx: &mut mpsc::Receiver<Notification>) -> Vec<ResourceKind> {
    let mut kinds = Vec::new();
    while let Ok(notification) = rx.try_recv() {
        kinds.push(notification.resource);
    }
    kinds
}

#[test]
fn single_prefix_route_forwards_to_cluster() {
    let routes = vec![Route::new("r1", "g", "/x", PathType::Prefix)
        .with_attributes(Attributes::from(vec![Attribute::new("Cluster", "c1")]))];

    let compiled = compile_routes("g", &routes);

    assert_eq!(compiled.len(), 1);
    let route = &compiled[0];
    assert_eq!(route.name, "r1");
    assert_eq!(route.path_match, PathMatch::Prefix("/x".to_string()));
    match &route.action {
        RouteAction::Route(forward) => {
            assert_eq!(forward.upstream, Upstream::Cluster("c1".to_string()));
        }
        other => panic!("expected a forwarding action, got {other:?}"),
    }
    assert_eq!(route.authz, Some(AuthzOverride::Disabled));
    assert!(compile_routes("other", &routes).is_empty());
}

#[tokio::test]
async fn cluster_shrink_notifies_once() {
    let store = Arc::new(MemoryStore::new());
    for name in ["c1", "c2", "c3"] {
        store.upsert(Cluster::new(name, "backend", 8080));
    }
    let (entities, mut rx) = entity_cache(store.clone());

    assert!(entities.refresh_clusters().await);
    assert_eq!(drain(&mut rx), vec![ResourceKind::Cluster]);

    assert!(store.delete::<Cluster>("c2"));
    entities.refresh_all().await;
    assert_eq!(drain(&mut rx), vec![ResourceKind::Cluster]);

    let cache = Arc::new(ShardedCache::new());
    let mut distributor = Distributor::new(entities, cache, ControlPlaneMetrics::new());
    let snapshot = distributor.create_snapshot(ResourceKind::Cluster).await;

    let clusters = snapshot.clusters().unwrap();
    assert_eq!(clusters.len(), 2);
    assert!(clusters.get("c2").is_none());
}

#[tokio::test]
async fn late_client_receives_current_version() {
    let store = Arc::new(MemoryStore::new());
    store.upsert(Cluster::new("c1", "backend", 8080));
    let (entities, _rx) = entity_cache(store);
    entities.refresh_all().await;

    let cache = Arc::new(ShardedCache::new());
    let mut distributor = Distributor::new(entities, cache.clone(), ControlPlaneMetrics::new());
    for _ in 0..5 {
        distributor.create_snapshot(ResourceKind::Cluster).await;
    }

    let node = NodeId::new("late-envoy");
    assert!(distributor.on_node_registered(node.clone()));

    let snapshot = cache.get_snapshot(node.hash()).unwrap();
    assert!(snapshot.version().ends_with("-V5"));
    assert_eq!(distributor.version(), 5);
}
