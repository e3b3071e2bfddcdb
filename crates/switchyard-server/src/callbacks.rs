//! Node lifecycle callbacks.
//!
//! The discovery protocol layer reports stream activity through
//! [`NodeCallbacks`]. The handle only forwards [`NodeEvent`]s to the
//! distributor task, which owns the node index.
//!
//! A node may hold several streams at once, one per resource type when it
//! does not use aggregated discovery. Open streams are counted per node:
//! the first one registers the node and only closing the last one
//! untracks it.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use switchyard_core::{ControlPlaneError, NodeId, Result};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::metrics::ControlPlaneMetrics;

/// Node lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    /// First request seen from a node.
    Registered(NodeId),
    /// The node's last open stream closed.
    StreamClosed(NodeId),
}

/// Cloneable handle for the protocol layer.
#[derive(Debug, Clone)]
pub struct NodeCallbacks {
    events: mpsc::Sender<NodeEvent>,
    open_streams: Arc<DashMap<NodeId, usize>>,
    metrics: ControlPlaneMetrics,
}

/// Create a callbacks handle and the receiving end for the distributor.
pub fn channel(
    buffer: usize,
    metrics: ControlPlaneMetrics,
) -> (NodeCallbacks, mpsc::Receiver<NodeEvent>) {
    let (events, rx) = mpsc::channel(buffer);
    let callbacks = NodeCallbacks {
        events,
        open_streams: Arc::new(DashMap::new()),
        metrics,
    };
    (callbacks, rx)
}

impl NodeCallbacks {
    /// A new stream of `node_id` opened.
    pub async fn on_stream_open(&self, node_id: &NodeId) -> Result<()> {
        let streams = {
            let mut count = self.open_streams.entry(node_id.clone()).or_insert(0);
            *count += 1;
            *count
        };
        debug!(node = %node_id, streams, "stream opened");
        if streams > 1 {
            return Ok(());
        }
        info!(node = %node_id, "node connected");
        self.send(NodeEvent::Registered(node_id.clone())).await
    }

    /// A discovery request arrived on a stream of `node_id`.
    ///
    /// A request from a node with no open stream opens one.
    pub async fn on_stream_request(&self, node_id: &NodeId, type_url: &str) -> Result<()> {
        self.metrics.discovery_request(type_url);
        debug!(node = %node_id, type_url, "discovery request");

        if self.open_streams.contains_key(node_id) {
            return Ok(());
        }
        self.on_stream_open(node_id).await
    }

    /// A stream of `node_id` closed.
    pub async fn on_stream_closed(&self, node_id: &NodeId) -> Result<()> {
        let last = match self.open_streams.entry(node_id.clone()) {
            Entry::Vacant(_) => return Ok(()),
            Entry::Occupied(mut entry) => {
                *entry.get_mut() -= 1;
                if *entry.get() == 0 {
                    entry.remove();
                    true
                } else {
                    false
                }
            }
        };
        if !last {
            debug!(node = %node_id, "stream closed, node still connected");
            return Ok(());
        }
        info!(node = %node_id, "node disconnected");
        self.send(NodeEvent::StreamClosed(node_id.clone())).await
    }

    /// Number of nodes with at least one open stream.
    pub fn connected(&self) -> usize {
        self.open_streams.len()
    }

    /// Open streams of `node_id`.
    pub fn open_streams(&self, node_id: &NodeId) -> usize {
        self.open_streams.get(node_id).map_or(0, |count| *count)
    }

    async fn send(&self, event: NodeEvent) -> Result<()> {
        self.events
            .send(event)
            .await
            .map_err(|_| ControlPlaneError::Shutdown)
    }
}
