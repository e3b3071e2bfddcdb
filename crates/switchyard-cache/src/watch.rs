//! Watch subscriptions for snapshot updates.
//!
//! A protocol stream subscribes to its node with a [`Watch`] and receives
//! every snapshot assigned to that node afterwards.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use switchyard_core::{ControlPlaneError, NodeHash, Result};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::Snapshot;

/// Unique identifier for a watch subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchId(u64);

impl WatchId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Numeric value of this id.
    #[inline]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for WatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "watch-{}", self.0)
    }
}

/// Receiving end of a subscription.
#[derive(Debug)]
pub struct Watch {
    id: WatchId,
    node_hash: NodeHash,
    receiver: mpsc::Receiver<Arc<Snapshot>>,
}

impl Watch {
    /// Subscription id.
    #[inline]
    pub fn id(&self) -> WatchId {
        self.id
    }

    /// Node this watch follows.
    #[inline]
    pub fn node_hash(&self) -> NodeHash {
        self.node_hash
    }

    /// Next snapshot, `None` once the watch is cancelled.
    pub async fn recv(&mut self) -> Option<Arc<Snapshot>> {
        self.receiver.recv().await
    }

    /// Next snapshot if one is already queued.
    pub fn try_recv(&mut self) -> std::result::Result<Arc<Snapshot>, mpsc::error::TryRecvError> {
        self.receiver.try_recv()
    }
}

#[derive(Debug, Clone)]
struct WatchSender {
    id: WatchId,
    sender: mpsc::Sender<Arc<Snapshot>>,
}

impl WatchSender {
    /// Returns whether the snapshot was queued. A full channel drops the
    /// update; the receiver will see the next one.
    fn try_send(&self, snapshot: Arc<Snapshot>) -> Result<bool> {
        match self.sender.try_send(snapshot) {
            Ok(()) => Ok(true),
            Err(mpsc::error::TrySendError::Full(_)) => {
                trace!(watch_id = %self.id, "watch channel full, skipping update");
                Ok(false)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(ControlPlaneError::WatchClosed {
                watch_id: self.id.0,
            }),
        }
    }
}

/// Registry of active watches.
///
/// Uses a `Mutex` held only for map updates, never across sends.
#[derive(Debug)]
pub struct WatchManager {
    watches: Mutex<HashMap<NodeHash, Vec<WatchSender>>>,
    channel_buffer: usize,
}

impl Default for WatchManager {
    fn default() -> Self {
        Self::new()
    }
}

impl WatchManager {
    /// Create a manager with the default channel buffer.
    pub fn new() -> Self {
        Self::with_buffer_size(16)
    }

    /// Create a manager with a custom channel buffer.
    pub fn with_buffer_size(buffer_size: usize) -> Self {
        Self {
            watches: Mutex::new(HashMap::new()),
            channel_buffer: buffer_size.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<NodeHash, Vec<WatchSender>>> {
        self.watches.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscribe to a node.
    pub fn create_watch(&self, node_hash: NodeHash) -> Watch {
        let id = WatchId::next();
        let (sender, receiver) = mpsc::channel(self.channel_buffer);

        self.lock()
            .entry(node_hash)
            .or_default()
            .push(WatchSender { id, sender });

        debug!(watch_id = %id, node = %node_hash, "created watch");

        Watch {
            id,
            node_hash,
            receiver,
        }
    }

    /// Cancel a subscription.
    pub fn cancel_watch(&self, watch_id: WatchId) {
        let mut watches = self.lock();
        for senders in watches.values_mut() {
            if let Some(pos) = senders.iter().position(|s| s.id == watch_id) {
                senders.swap_remove(pos);
                debug!(watch_id = %watch_id, "cancelled watch");
                return;
            }
        }
        warn!(watch_id = %watch_id, "attempted to cancel unknown watch");
    }

    /// Deliver a snapshot to every watch of a node.
    ///
    /// Closed watches are pruned. Returns how many watches received it.
    pub fn notify(&self, node_hash: NodeHash, snapshot: Arc<Snapshot>) -> usize {
        let senders: Vec<WatchSender> = self.lock().get(&node_hash).cloned().unwrap_or_default();
        if senders.is_empty() {
            return 0;
        }

        let mut delivered = 0;
        let mut closed_ids = Vec::new();
        for sender in &senders {
            match sender.try_send(Arc::clone(&snapshot)) {
                Ok(true) => delivered += 1,
                Ok(false) => {}
                Err(_) => closed_ids.push(sender.id),
            }
        }

        if !closed_ids.is_empty() {
            let mut watches = self.lock();
            if let Some(senders) = watches.get_mut(&node_hash) {
                senders.retain(|s| !closed_ids.contains(&s.id));
                if senders.is_empty() {
                    watches.remove(&node_hash);
                }
            }
            debug!(node = %node_hash, count = closed_ids.len(), "removed closed watches");
        }

        delivered
    }

    /// Active watches for a node.
    pub fn watch_count(&self, node_hash: NodeHash) -> usize {
        self.lock().get(&node_hash).map(Vec::len).unwrap_or(0)
    }

    /// Active watches across all nodes.
    pub fn total_watch_count(&self) -> usize {
        self.lock().values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watch_id_unique() {
        assert_ne!(WatchId::next(), WatchId::next());
    }

    #[tokio::test]
    async fn watch_manager_create_and_notify() {
        let manager = WatchManager::new();
        let node = NodeHash::from_id("test-node");

        let mut watch = manager.create_watch(node);
        assert_eq!(manager.watch_count(node), 1);

        let snapshot = Arc::new(Snapshot::builder().version("v1").build());
        assert_eq!(manager.notify(node, snapshot), 1);

        let received = watch.recv().await.unwrap();
        assert_eq!(received.version(), "v1");
    }

    #[test]
    fn watch_manager_cancel() {
        let manager = WatchManager::new();
        let node = NodeHash::from_id("test-node");

        let watch = manager.create_watch(node);
        manager.cancel_watch(watch.id());
        assert_eq!(manager.watch_count(node), 0);
    }

    #[test]
    fn dropped_watch_is_pruned() {
        let manager = WatchManager::new();
        let node = NodeHash::from_id("test-node");
        drop(manager.create_watch(node));

        let snapshot = Arc::new(Snapshot::builder().version("v1").build());
        assert_eq!(manager.notify(node, snapshot), 0);
        assert_eq!(manager.total_watch_count(), 0);
    }

    #[test]
    fn full_channel_drops_update() {
        let manager = WatchManager::with_buffer_size(1);
        let node = NodeHash::from_id("slow-node");
        let mut watch = manager.create_watch(node);

        let v1 = Arc::new(Snapshot::builder().version("v1").build());
        let v2 = Arc::new(Snapshot::builder().version("v2").build());
        assert_eq!(manager.notify(node, v1), 1);
        assert_eq!(manager.notify(node, v2), 0);

        assert_eq!(watch.try_recv().unwrap().version(), "v1");
        assert!(watch.try_recv().is_err());
        assert_eq!(manager.watch_count(node), 1);
    }
}
