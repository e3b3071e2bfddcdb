//! Control plane metrics.
//!
//! Metrics are recorded through the `metrics` facade; installing an exporter
//! (the binary uses Prometheus) is up to the application.
//!
//! | Metric | Type | Labels |
//! |---|---|---|
//! | `switchyard_entities_total` | gauge | `kind` |
//! | `switchyard_snapshots_total` | counter | `resource` |
//! | `switchyard_discovery_requests_total` | counter | `type_url` |
//! | `switchyard_store_errors_total` | counter | `kind` |
//! | `switchyard_snapshot_assign_failures_total` | counter | |
//! | `switchyard_tracked_nodes` | gauge | |

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use metrics::{counter, gauge};
use switchyard_core::ResourceKind;
use switchyard_store::{EntityCounts, ENTITIES_TOTAL};

/// Snapshots built, by triggering resource.
pub const SNAPSHOTS_TOTAL: &str = "switchyard_snapshots_total";
/// Discovery requests seen, by type URL.
pub const DISCOVERY_REQUESTS_TOTAL: &str = "switchyard_discovery_requests_total";
/// Snapshot assignments that failed.
pub const SNAPSHOT_ASSIGN_FAILURES_TOTAL: &str = "switchyard_snapshot_assign_failures_total";
/// Nodes currently tracked by the distributor.
pub const TRACKED_NODES: &str = "switchyard_tracked_nodes";

/// Metrics handle shared by the distributor and the node callbacks.
///
/// Clones share the same local counters.
#[derive(Debug, Clone, Default)]
pub struct ControlPlaneMetrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    snapshots: AtomicU64,
    discovery_requests: AtomicU64,
    assign_failures: AtomicU64,
}

impl ControlPlaneMetrics {
    /// Create a new metrics handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish the number of cached entities per kind.
    pub fn set_entity_counts(&self, counts: EntityCounts) {
        for (kind, count) in [
            (ResourceKind::Listener, counts.listeners),
            (ResourceKind::Route, counts.routes),
            (ResourceKind::Cluster, counts.clusters),
        ] {
            gauge!(ENTITIES_TOTAL, "kind" => kind.as_str()).set(count as f64);
        }
    }

    /// Record a snapshot built because `resource` changed.
    pub fn snapshot_created(&self, resource: &'static str) {
        self.inner.snapshots.fetch_add(1, Ordering::Relaxed);
        counter!(SNAPSHOTS_TOTAL, "resource" => resource).increment(1);
    }

    /// Record a discovery request.
    pub fn discovery_request(&self, type_url: &str) {
        self.inner.discovery_requests.fetch_add(1, Ordering::Relaxed);
        counter!(DISCOVERY_REQUESTS_TOTAL, "type_url" => type_url.to_string()).increment(1);
    }

    /// Record a snapshot that could not be assigned to a node.
    pub fn assignment_failed(&self) {
        self.inner.assign_failures.fetch_add(1, Ordering::Relaxed);
        counter!(SNAPSHOT_ASSIGN_FAILURES_TOTAL).increment(1);
    }

    /// Publish the number of tracked nodes.
    pub fn set_tracked_nodes(&self, count: usize) {
        gauge!(TRACKED_NODES).set(count as f64);
    }

    /// Snapshots built so far.
    pub fn snapshots(&self) -> u64 {
        self.inner.snapshots.load(Ordering::Relaxed)
    }

    /// Discovery requests seen so far.
    pub fn discovery_requests(&self) -> u64 {
        self.inner.discovery_requests.load(Ordering::Relaxed)
    }

    /// Failed assignments so far.
    pub fn assign_failures(&self) -> u64 {
        self.inner.assign_failures.load(Ordering::Relaxed)
    }
}
