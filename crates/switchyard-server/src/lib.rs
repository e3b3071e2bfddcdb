//! # switchyard-server
//!
//! Runtime wiring for the switchyard control plane:
//!
//! - [`ControlPlane`] - owns the entity cache, the snapshot cache and the
//!   channels between them, and runs every task
//! - [`Distributor`] - builds versioned snapshots and tracks nodes
//! - [`NodeCallbacks`] - node lifecycle hooks for the protocol layer
//! - [`HealthService`] - gRPC health checking, `SERVING` after the first snapshot
//! - [`ControlPlaneMetrics`] - counters and gauges via the `metrics` facade
//! - [`ShutdownController`] - graceful shutdown shared by all tasks
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use switchyard_server::{shutdown, ControlPlane, ControlPlaneConfig};
//! use switchyard_store::FileStore;
//!
//! # #[tokio::main]
//! # async fn main() -> switchyard_core::Result<()> {
//! let store = Arc::new(FileStore::new("entities.json"));
//! let plane = ControlPlane::new(ControlPlaneConfig::default(), store)?;
//!
//! let controller = plane.shutdown_controller().clone();
//! tokio::spawn(async move {
//!     shutdown::wait_for_signal().await;
//!     controller.shutdown(Duration::from_secs(5)).await;
//! });
//!
//! plane.run().await
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod callbacks;
mod config;
mod distributor;
pub mod health;
pub mod metrics;
pub mod shutdown;

pub use callbacks::{NodeCallbacks, NodeEvent};
pub use config::{ControlPlaneConfig, MIN_POLL_INTERVAL};
pub use distributor::Distributor;
pub use health::HealthService;
pub use metrics::ControlPlaneMetrics;
pub use shutdown::{OperationGuard, ShutdownController, ShutdownSignal};

use std::sync::Arc;

use switchyard_cache::{Cache, ShardedCache};
use switchyard_core::{ControlPlaneError, Result};
use switchyard_store::{notify, EntityCache, EntityStore, Notification};
use tokio::sync::mpsc;
use tonic::transport::Server;
use tracing::{error, info};

/// A control plane instance.
///
/// Build it with [`ControlPlane::new`], grab the handles you need
/// (callbacks, cache, shutdown controller), then [`run`](Self::run) it.
#[derive(Debug)]
pub struct ControlPlane {
    config: ControlPlaneConfig,
    entities: Arc<EntityCache>,
    cache: Arc<ShardedCache>,
    metrics: ControlPlaneMetrics,
    callbacks: NodeCallbacks,
    shutdown: ShutdownController,
    notifications: mpsc::Receiver<Notification>,
    node_events: mpsc::Receiver<NodeEvent>,
}

impl ControlPlane {
    /// Validate `config` and wire the components around `store`.
    pub fn new(config: ControlPlaneConfig, store: Arc<dyn EntityStore>) -> Result<Self> {
        config.validate()?;

        let (notifier, notifications) = notify::channel(config.notification_buffer);
        let metrics = ControlPlaneMetrics::new();
        let (callbacks, node_events) =
            callbacks::channel(config.node_event_buffer, metrics.clone());
        let entities = Arc::new(EntityCache::new(store, config.entity_cache(), notifier));

        Ok(Self {
            config,
            entities,
            cache: Arc::new(ShardedCache::new()),
            metrics,
            callbacks,
            shutdown: ShutdownController::new(),
            notifications,
            node_events,
        })
    }

    /// The active configuration.
    #[inline]
    pub fn config(&self) -> &ControlPlaneConfig {
        &self.config
    }

    /// The entity cache.
    #[inline]
    pub fn entities(&self) -> &Arc<EntityCache> {
        &self.entities
    }

    /// The per-node snapshot cache.
    #[inline]
    pub fn cache(&self) -> &Arc<ShardedCache> {
        &self.cache
    }

    /// The metrics handle.
    #[inline]
    pub fn metrics(&self) -> &ControlPlaneMetrics {
        &self.metrics
    }

    /// Node lifecycle hooks for the protocol layer.
    #[inline]
    pub fn callbacks(&self) -> &NodeCallbacks {
        &self.callbacks
    }

    /// The shutdown controller shared by every task.
    #[inline]
    pub fn shutdown_controller(&self) -> &ShutdownController {
        &self.shutdown
    }

    /// Run the entity cache, the distributor and the health endpoint until
    /// shutdown is initiated.
    ///
    /// A bind or transport failure initiates shutdown and is returned.
    pub async fn run(self) -> Result<()> {
        let Self {
            config,
            entities,
            cache,
            metrics,
            shutdown,
            notifications,
            node_events,
            ..
        } = self;

        let (health, health_server) = HealthService::new();
        health.set_not_serving().await;

        let poller = {
            let entities = Arc::clone(&entities);
            let signal = shutdown.shutdown_signal();
            let guard = shutdown.register_operation();
            tokio::spawn(async move {
                let _guard = guard;
                entities.run(signal.wait()).await;
            })
        };

        let distributor = {
            let cache: Arc<dyn Cache> = cache;
            let mut distributor =
                Distributor::new(entities, cache, metrics).with_health(health.clone());
            let signal = shutdown.shutdown_signal();
            let guard = shutdown.register_operation();
            tokio::spawn(async move {
                let _guard = guard;
                distributor.run(notifications, node_events, signal).await;
            })
        };

        let addr = config.discovery_listen;
        info!(addr = %addr, "control plane listening");
        let served = Server::builder()
            .add_service(health_server)
            .serve_with_shutdown(addr, shutdown.shutdown_signal().wait())
            .await;

        health.set_not_serving().await;
        if let Err(err) = &served {
            error!(addr = %addr, error = %err, "discovery listener failed");
            shutdown.shutdown(config.grace_period).await;
        }

        for (name, task) in [("entity cache", poller), ("distributor", distributor)] {
            task.await
                .map_err(|e| ControlPlaneError::internal(format!("{name} task failed"), e))?;
        }

        served.map_err(|e| ControlPlaneError::internal(format!("cannot serve on {addr}"), e))?;
        info!("control plane stopped");
        Ok(())
    }
}
