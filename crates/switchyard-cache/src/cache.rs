//! Cache trait and ShardedCache implementation.
//!
//! The cache stores one snapshot per node, keyed by node hash. The
//! [`ShardedCache`] implementation uses `DashMap` for concurrent access.

use std::sync::Arc;

use dashmap::DashMap;
use switchyard_core::{NodeHash, Result};
use tracing::{debug, trace};

use crate::snapshot::Snapshot;
use crate::stats::{CacheEvent, CacheStats};
use crate::watch::{Watch, WatchId, WatchManager};

/// Per-node snapshot store written by the distributor.
///
/// `set_snapshot` is fallible so runtimes that track live streams can reject
/// a node that went away; the distributor logs and skips such nodes.
pub trait Cache: Send + Sync {
    /// Get the snapshot for a node.
    fn get_snapshot(&self, node: NodeHash) -> Option<Arc<Snapshot>>;

    /// Set the snapshot for a node and notify its watches.
    fn set_snapshot(&self, node: NodeHash, snapshot: Arc<Snapshot>) -> Result<()>;

    /// Clear the snapshot for a node.
    fn clear_snapshot(&self, node: NodeHash);

    /// Number of cached snapshots.
    fn snapshot_count(&self) -> usize;
}

/// A sharded cache using DashMap.
///
/// ## Important
///
/// `DashMap` references are never held while watches are notified.
#[derive(Debug)]
pub struct ShardedCache {
    snapshots: DashMap<NodeHash, Arc<Snapshot>>,
    watches: WatchManager,
    stats: CacheStats,
}

impl Default for ShardedCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ShardedCache {
    /// Create a new sharded cache with default settings.
    pub fn new() -> Self {
        Self::with_capacity(64)
    }

    /// Create a new sharded cache with a specific initial capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            snapshots: DashMap::with_capacity(capacity),
            watches: WatchManager::new(),
            stats: CacheStats::new(),
        }
    }

    /// Cache statistics.
    #[inline]
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Watch manager.
    #[inline]
    pub fn watches(&self) -> &WatchManager {
        &self.watches
    }

    /// Subscribe to snapshot updates for a node.
    ///
    /// A snapshot that already exists is not replayed; check
    /// [`Cache::get_snapshot`] first.
    #[inline]
    pub fn create_watch(&self, node: NodeHash) -> Watch {
        self.watches.create_watch(node)
    }

    /// Cancel a watch.
    #[inline]
    pub fn cancel_watch(&self, watch_id: WatchId) {
        self.watches.cancel_watch(watch_id)
    }

    /// All node hashes that hold a snapshot.
    pub fn nodes(&self) -> Vec<NodeHash> {
        self.snapshots.iter().map(|r| *r.key()).collect()
    }

    /// Whether a node holds a snapshot.
    pub fn has_snapshot(&self, node: NodeHash) -> bool {
        self.snapshots.contains_key(&node)
    }
}

impl Cache for ShardedCache {
    fn get_snapshot(&self, node: NodeHash) -> Option<Arc<Snapshot>> {
        let result = self.snapshots.get(&node).map(|r| Arc::clone(&*r));

        if result.is_some() {
            self.stats.record(CacheEvent::Hit);
            trace!(node = %node, "cache hit");
        } else {
            self.stats.record(CacheEvent::Miss);
            trace!(node = %node, "cache miss");
        }

        result
    }

    fn set_snapshot(&self, node: NodeHash, snapshot: Arc<Snapshot>) -> Result<()> {
        self.snapshots.insert(node, Arc::clone(&snapshot));
        self.stats.record(CacheEvent::Assigned);

        debug!(
            node = %node,
            version = %snapshot.version(),
            resources = snapshot.total_resources(),
            "set snapshot"
        );

        let notified = self.watches.notify(node, snapshot);
        self.stats.record_many(CacheEvent::WatchNotified, notified as u64);
        Ok(())
    }

    fn clear_snapshot(&self, node: NodeHash) {
        if self.snapshots.remove(&node).is_some() {
            self.stats.record(CacheEvent::Cleared);
            debug!(node = %node, "cleared snapshot");
        }
    }

    fn snapshot_count(&self) -> usize {
        self.snapshots.len()
    }
}
