//! Snapshot distributor.
//!
//! The [`Distributor`] owns the version counter, the latest snapshot and the
//! index of tracked nodes. It runs as a single task: change notifications
//! trigger a full recompile, node events update the index, and every
//! snapshot write goes through the [`Cache`] trait.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use switchyard_cache::{Cache, Snapshot};
use switchyard_compiler::compile;
use switchyard_core::{NodeHash, NodeId, ResourceKind, SnapshotVersion, TypeUrl};
use switchyard_store::{EntityCache, Notification};
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::callbacks::NodeEvent;
use crate::health::HealthService;
use crate::metrics::ControlPlaneMetrics;
use crate::shutdown::ShutdownSignal;

/// Builds versioned snapshots and hands them to tracked nodes.
pub struct Distributor {
    entities: Arc<EntityCache>,
    cache: Arc<dyn Cache>,
    metrics: ControlPlaneMetrics,
    health: Option<HealthService>,
    tick: Duration,
    version: u64,
    latest: Option<Arc<Snapshot>>,
    nodes: HashMap<NodeHash, NodeId>,
}

impl std::fmt::Debug for Distributor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Distributor")
            .field("version", &self.version)
            .field("tracked_nodes", &self.nodes.len())
            .finish_non_exhaustive()
    }
}

impl Distributor {
    /// Create a distributor reading from `entities` and writing to `cache`.
    ///
    /// No snapshot exists until the first [`create_snapshot`](Self::create_snapshot).
    pub fn new(
        entities: Arc<EntityCache>,
        cache: Arc<dyn Cache>,
        metrics: ControlPlaneMetrics,
    ) -> Self {
        let tick = entities.config().poll_interval;
        Self {
            entities,
            cache,
            metrics,
            health: None,
            tick,
            version: 0,
            latest: None,
            nodes: HashMap::new(),
        }
    }

    /// Report `SERVING` on `health` once the first snapshot is built.
    pub fn with_health(mut self, health: HealthService) -> Self {
        self.health = Some(health);
        self
    }

    /// Number of snapshots built so far.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// The most recent snapshot.
    pub fn latest(&self) -> Option<Arc<Snapshot>> {
        self.latest.clone()
    }

    /// Number of tracked nodes.
    pub fn tracked_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Whether `node_id` is tracked.
    pub fn is_tracked(&self, node_id: &NodeId) -> bool {
        self.nodes.contains_key(&node_id.hash())
    }

    /// Compile the cached entities into a new snapshot and assign it to every
    /// tracked node.
    ///
    /// `trigger` is the collection whose change caused the rebuild. Nodes
    /// that reject the snapshot are logged and skipped.
    pub async fn create_snapshot(&mut self, trigger: ResourceKind) -> Arc<Snapshot> {
        self.metrics.set_entity_counts(self.entities.counts());
        self.metrics.snapshot_created(trigger.as_str());

        self.version += 1;
        let version = SnapshotVersion::new(self.version);

        let listeners = self.entities.listeners();
        let routes = self.entities.routes();
        let clusters = self.entities.clusters();
        let compiled = compile(&listeners, &routes, &clusters);

        let snapshot = Arc::new(
            Snapshot::builder()
                .version(version.as_str())
                .resources(TypeUrl::of(ResourceKind::Cluster), compiled.cluster_resources())
                .resources(TypeUrl::of(ResourceKind::Route), compiled.route_resources())
                .resources(TypeUrl::of(ResourceKind::Listener), compiled.listener_resources())
                .build(),
        );

        let first = self.latest.is_none();
        self.latest = Some(Arc::clone(&snapshot));

        let failed = self
            .nodes
            .iter()
            .filter(|(hash, node_id)| !self.assign(&snapshot, **hash, node_id))
            .count();

        info!(
            version = %version,
            trigger = trigger.as_str(),
            clusters = compiled.clusters.len(),
            route_configurations = compiled.route_configurations.len(),
            listeners = compiled.listeners.len(),
            nodes = self.nodes.len(),
            failed,
            "snapshot created"
        );

        if first {
            if let Some(health) = &self.health {
                health.set_serving().await;
            }
        }
        snapshot
    }

    /// Track `node_id` and hand it the latest snapshot, if any.
    ///
    /// Returns whether a snapshot was assigned.
    pub fn on_node_registered(&mut self, node_id: NodeId) -> bool {
        let hash = node_id.hash();
        self.nodes.insert(hash, node_id.clone());
        self.metrics.set_tracked_nodes(self.nodes.len());

        match &self.latest {
            Some(snapshot) => self.assign(snapshot, hash, &node_id),
            None => {
                debug!(node = %node_id, "node registered before first snapshot");
                false
            }
        }
    }

    /// Stop tracking `node_id` and drop its cached snapshot.
    pub fn on_node_stream_closed(&mut self, node_id: &NodeId) {
        let hash = node_id.hash();
        if self.nodes.remove(&hash).is_some() {
            self.cache.clear_snapshot(hash);
            self.metrics.set_tracked_nodes(self.nodes.len());
            debug!(node = %node_id, "node untracked");
        }
    }

    fn assign(&self, snapshot: &Arc<Snapshot>, hash: NodeHash, node_id: &NodeId) -> bool {
        match self.cache.set_snapshot(hash, Arc::clone(snapshot)) {
            Ok(()) => {
                debug!(node = %node_id, version = snapshot.version(), "snapshot assigned");
                true
            }
            Err(err) => {
                self.metrics.assignment_failed();
                warn!(
                    node = %node_id,
                    version = snapshot.version(),
                    error = %err,
                    "snapshot assignment failed"
                );
                false
            }
        }
    }

    fn handle_event(&mut self, event: NodeEvent) {
        match event {
            NodeEvent::Registered(node_id) => {
                self.on_node_registered(node_id);
            }
            NodeEvent::StreamClosed(node_id) => self.on_node_stream_closed(&node_id),
        }
    }

    /// Process notifications and node events until `shutdown` resolves.
    ///
    /// The tick only keeps the loop observable; it never recompiles.
    pub async fn run(
        &mut self,
        mut notifications: mpsc::Receiver<Notification>,
        mut node_events: mpsc::Receiver<NodeEvent>,
        shutdown: ShutdownSignal,
    ) {
        let mut ticker = interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let shutdown = shutdown.wait();
        tokio::pin!(shutdown);

        info!(tick_ms = self.tick.as_millis() as u64, "distributor started");

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!(version = self.version, "distributor stopped");
                    return;
                }
                Some(notification) = notifications.recv() => {
                    debug!(kind = %notification.resource, "change notification");
                    self.create_snapshot(notification.resource).await;
                }
                Some(event) = node_events.recv() => self.handle_event(event),
                _ = ticker.tick() => {
                    trace!(version = self.version, nodes = self.nodes.len(), "distributor tick");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shutdown::ShutdownController;
    use switchyard_cache::ShardedCache;
    use switchyard_core::{
        Attribute, Attributes, Cluster, ControlPlaneError, Listener, PathType, Resource, Result,
        Route,
    };
    use switchyard_store::{notify, EntityCacheConfig, MemoryStore};

    struct Fixture {
        store: Arc<MemoryStore>,
        entities: Arc<EntityCache>,
        cache: Arc<ShardedCache>,
        metrics: ControlPlaneMetrics,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        store.upsert(Listener::new("public", 80, vec!["example.com".into()], "web"));
        store.upsert(
            Route::new("home", "web", "/", PathType::Prefix)
                .with_attributes(Attributes::from(vec![Attribute::new("Cluster", "c1")])),
        );
        store.upsert(Cluster::new("c1", "backend", 8080));

        let (notifier, _rx) = notify::channel(8);
        let entities = Arc::new(EntityCache::new(
            store.clone(),
            EntityCacheConfig::default(),
            notifier,
        ));
        entities.refresh_all().await;

        Fixture {
            store,
            entities,
            cache: Arc::new(ShardedCache::new()),
            metrics: ControlPlaneMetrics::new(),
        }
    }

    impl Fixture {
        fn distributor(&self) -> Distributor {
            Distributor::new(
                Arc::clone(&self.entities),
                self.cache.clone(),
                self.metrics.clone(),
            )
        }
    }

    /// Rejects one node, accepts the rest.
    struct RejectingCache {
        inner: ShardedCache,
        rejected: NodeHash,
    }

    impl Cache for RejectingCache {
        fn get_snapshot(&self, node: NodeHash) -> Option<Arc<Snapshot>> {
            self.inner.get_snapshot(node)
        }

        fn set_snapshot(&self, node: NodeHash, snapshot: Arc<Snapshot>) -> Result<()> {
            if node == self.rejected {
                return Err(ControlPlaneError::SnapshotAssignment {
                    node_id: node.to_string(),
                    version: snapshot.version().to_string(),
                    reason: "stream gone".to_string(),
                });
            }
            self.inner.set_snapshot(node, snapshot)
        }

        fn clear_snapshot(&self, node: NodeHash) {
            self.inner.clear_snapshot(node)
        }

        fn snapshot_count(&self) -> usize {
            self.inner.snapshot_count()
        }
    }

    fn encoded(snapshot: &Snapshot) -> Vec<Vec<u8>> {
        [snapshot.clusters(), snapshot.routes(), snapshot.listeners()]
            .into_iter()
            .flatten()
            .flat_map(|resources| resources.to_vec())
            .map(|resource| resource.encode().unwrap().value)
            .collect()
    }

    #[tokio::test]
    async fn snapshot_holds_compiled_resources() {
        let f = fixture().await;
        let mut distributor = f.distributor();

        let snapshot = distributor.create_snapshot(ResourceKind::Cluster).await;

        assert!(snapshot.version().ends_with("-V1"));
        assert_eq!(snapshot.clusters().unwrap().len(), 1);
        assert!(snapshot.clusters().unwrap().get("c1").is_some());
        assert!(snapshot.routes().unwrap().get("web").is_some());
        assert!(snapshot.listeners().unwrap().get("public").is_some());
        assert_eq!(distributor.version(), 1);
        assert_eq!(f.metrics.snapshots(), 1);
    }

    #[tokio::test]
    async fn late_node_receives_latest_snapshot() {
        let f = fixture().await;
        let mut distributor = f.distributor();

        for _ in 0..5 {
            distributor.create_snapshot(ResourceKind::Route).await;
        }

        let node = NodeId::new("envoy-late");
        assert!(distributor.on_node_registered(node.clone()));

        let assigned = f.cache.get_snapshot(node.hash()).unwrap();
        assert!(assigned.version().ends_with("-V5"));
        assert_eq!(
            assigned.version(),
            distributor.latest().unwrap().version()
        );
    }

    #[tokio::test]
    async fn early_node_waits_for_first_snapshot() {
        let f = fixture().await;
        let mut distributor = f.distributor();
        let node = NodeId::new("envoy-early");

        assert!(!distributor.on_node_registered(node.clone()));
        assert!(distributor.is_tracked(&node));
        assert!(f.cache.get_snapshot(node.hash()).is_none());

        distributor.create_snapshot(ResourceKind::Listener).await;
        assert!(f.cache.get_snapshot(node.hash()).unwrap().version().ends_with("-V1"));
    }

    #[tokio::test]
    async fn failed_assignment_skips_only_that_node() {
        let f = fixture().await;
        let rejected = NodeId::new("envoy-gone");
        let accepted = NodeId::new("envoy-ok");
        let cache = Arc::new(RejectingCache {
            inner: ShardedCache::new(),
            rejected: rejected.hash(),
        });
        let mut distributor =
            Distributor::new(Arc::clone(&f.entities), cache.clone(), f.metrics.clone());

        distributor.on_node_registered(rejected.clone());
        distributor.on_node_registered(accepted.clone());
        distributor.create_snapshot(ResourceKind::Cluster).await;

        assert_eq!(f.metrics.assign_failures(), 1);
        assert!(cache.get_snapshot(rejected.hash()).is_none());
        assert!(cache.get_snapshot(accepted.hash()).is_some());
        assert_eq!(distributor.tracked_nodes(), 2);
    }

    #[tokio::test]
    async fn stream_close_untracks_and_clears() {
        let f = fixture().await;
        let mut distributor = f.distributor();
        let node = NodeId::new("envoy-1");

        distributor.create_snapshot(ResourceKind::Cluster).await;
        distributor.on_node_registered(node.clone());
        assert!(f.cache.has_snapshot(node.hash()));

        distributor.on_node_stream_closed(&node);
        assert!(!distributor.is_tracked(&node));
        assert!(!f.cache.has_snapshot(node.hash()));

        distributor.create_snapshot(ResourceKind::Cluster).await;
        assert!(!f.cache.has_snapshot(node.hash()));
    }

    #[tokio::test]
    async fn recompile_changes_version_not_content() {
        let f = fixture().await;
        let mut distributor = f.distributor();

        let first = distributor.create_snapshot(ResourceKind::Route).await;
        let second = distributor.create_snapshot(ResourceKind::Route).await;

        assert_ne!(first.version(), second.version());
        assert_eq!(encoded(&first), encoded(&second));
    }

    #[tokio::test]
    async fn first_snapshot_reports_serving() {
        let f = fixture().await;
        let (health, _server) = HealthService::new();
        let mut distributor = f.distributor().with_health(health.clone());

        assert!(!health.is_serving());
        distributor.create_snapshot(ResourceKind::Cluster).await;
        assert!(health.is_serving());
    }

    #[tokio::test]
    async fn run_reacts_to_notifications_and_events() {
        let f = fixture().await;
        let distributor = f.distributor();
        let controller = ShutdownController::new();
        let (notify_tx, notify_rx) = mpsc::channel(8);
        let (event_tx, event_rx) = mpsc::channel(8);
        let signal = controller.shutdown_signal();

        let handle = tokio::spawn(async move {
            let mut distributor = distributor;
            distributor.run(notify_rx, event_rx, signal).await;
            distributor
        });

        let node = NodeId::new("envoy-1");
        event_tx
            .send(NodeEvent::Registered(node.clone()))
            .await
            .unwrap();
        notify_tx
            .send(Notification {
                resource: ResourceKind::Cluster,
            })
            .await
            .unwrap();

        let mut watch = f.cache.create_watch(node.hash());
        f.store.upsert(Cluster::new("c2", "backend", 9090));
        f.entities.refresh_clusters().await;
        notify_tx
            .send(Notification {
                resource: ResourceKind::Cluster,
            })
            .await
            .unwrap();

        let snapshot = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match watch.recv().await {
                    Some(snapshot) if snapshot.clusters().map_or(0, |c| c.len()) == 2 => {
                        return snapshot
                    }
                    Some(_) => continue,
                    None => panic!("watch closed"),
                }
            }
        })
        .await
        .unwrap();
        assert!(snapshot.clusters().unwrap().get("c2").is_some());

        controller.shutdown(Duration::from_secs(1)).await;
        let distributor = handle.await.unwrap();
        assert!(distributor.is_tracked(&node));
        assert!(distributor.version() >= 1);
    }
}
