//! Polling entity cache.
//!
//! Holds the last-known-good copy of each collection and refreshes it from
//! the store on a fixed interval. A collection is replaced wholesale or not
//! at all, so readers always see a consistent, possibly stale, view.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use metrics::{counter, gauge};
use switchyard_core::{Cluster, ControlPlaneError, Listener, Route};
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::detector::{ChangeDetector, CollectionState, WatermarkDetector};
use crate::notify::Notifier;
use crate::store::{EntityStore, StoredEntity};

/// Gauge of cached entities, labelled by `kind`.
pub const ENTITIES_TOTAL: &str = "switchyard_entities_total";

/// Counter of failed or timed-out store fetches, labelled by `kind`.
pub const STORE_ERRORS_TOTAL: &str = "switchyard_store_errors_total";

/// Polling settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntityCacheConfig {
    /// Time between refreshes.
    pub poll_interval: Duration,
    /// Deadline for one collection fetch.
    pub store_timeout: Duration,
}

impl Default for EntityCacheConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            store_timeout: Duration::from_secs(1),
        }
    }
}

/// Number of cached entities per collection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EntityCounts {
    /// Cached listeners.
    pub listeners: usize,
    /// Cached routes.
    pub routes: usize,
    /// Cached clusters.
    pub clusters: usize,
}

#[derive(Debug)]
struct Slot<E> {
    entities: Arc<Vec<E>>,
    high_water_mark: i64,
}

impl<E> Default for Slot<E> {
    fn default() -> Self {
        Self {
            entities: Arc::new(Vec::new()),
            high_water_mark: 0,
        }
    }
}

/// In-memory source of truth for listeners, routes and clusters.
///
/// # Example
///
/// ```rust
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// use std::sync::Arc;
/// use switchyard_core::Cluster;
/// use switchyard_store::{notify, EntityCache, EntityCacheConfig, MemoryStore};
///
/// let store = Arc::new(MemoryStore::new());
/// store.upsert(Cluster::new("c1", "backend", 80));
///
/// let (notifier, mut rx) = notify::channel(8);
/// let cache = EntityCache::new(store, EntityCacheConfig::default(), notifier);
///
/// assert!(cache.refresh_clusters().await);
/// assert_eq!(cache.clusters().len(), 1);
/// assert!(rx.try_recv().is_ok());
/// # }
/// ```
pub struct EntityCache {
    store: Arc<dyn EntityStore>,
    detector: Arc<dyn ChangeDetector>,
    notifier: Notifier,
    config: EntityCacheConfig,
    listeners: Mutex<Slot<Listener>>,
    routes: Mutex<Slot<Route>>,
    clusters: Mutex<Slot<Cluster>>,
}

impl std::fmt::Debug for EntityCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityCache")
            .field("config", &self.config)
            .field("counts", &self.counts())
            .finish_non_exhaustive()
    }
}

/// Gives the cache access to the slot holding one entity type.
trait Cached: StoredEntity {
    fn slot(cache: &EntityCache) -> &Mutex<Slot<Self>>;
}

impl Cached for Listener {
    fn slot(cache: &EntityCache) -> &Mutex<Slot<Self>> {
        &cache.listeners
    }
}

impl Cached for Route {
    fn slot(cache: &EntityCache) -> &Mutex<Slot<Self>> {
        &cache.routes
    }
}

impl Cached for Cluster {
    fn slot(cache: &EntityCache) -> &Mutex<Slot<Self>> {
        &cache.clusters
    }
}

fn lock<E>(slot: &Mutex<Slot<E>>) -> MutexGuard<'_, Slot<E>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

impl EntityCache {
    /// Create an empty cache with the default watermark detector.
    pub fn new(
        store: Arc<dyn EntityStore>,
        config: EntityCacheConfig,
        notifier: Notifier,
    ) -> Self {
        Self::with_detector(store, config, notifier, Arc::new(WatermarkDetector::new()))
    }

    /// Create an empty cache with a custom change detector.
    pub fn with_detector(
        store: Arc<dyn EntityStore>,
        config: EntityCacheConfig,
        notifier: Notifier,
        detector: Arc<dyn ChangeDetector>,
    ) -> Self {
        Self {
            store,
            detector,
            notifier,
            config,
            listeners: Mutex::default(),
            routes: Mutex::default(),
            clusters: Mutex::default(),
        }
    }

    /// Polling settings.
    pub fn config(&self) -> &EntityCacheConfig {
        &self.config
    }

    /// Current listeners.
    pub fn listeners(&self) -> Arc<Vec<Listener>> {
        Arc::clone(&lock(&self.listeners).entities)
    }

    /// Current routes.
    pub fn routes(&self) -> Arc<Vec<Route>> {
        Arc::clone(&lock(&self.routes).entities)
    }

    /// Current clusters.
    pub fn clusters(&self) -> Arc<Vec<Cluster>> {
        Arc::clone(&lock(&self.clusters).entities)
    }

    /// Number of cached entities per collection.
    pub fn counts(&self) -> EntityCounts {
        EntityCounts {
            listeners: lock(&self.listeners).entities.len(),
            routes: lock(&self.routes).entities.len(),
            clusters: lock(&self.clusters).entities.len(),
        }
    }

    /// Refresh listeners. Returns whether they changed.
    pub async fn refresh_listeners(&self) -> bool {
        self.refresh::<Listener>().await
    }

    /// Refresh routes. Returns whether they changed.
    pub async fn refresh_routes(&self) -> bool {
        self.refresh::<Route>().await
    }

    /// Refresh clusters. Returns whether they changed.
    pub async fn refresh_clusters(&self) -> bool {
        self.refresh::<Cluster>().await
    }

    /// Refresh all three collections in turn.
    pub async fn refresh_all(&self) -> EntityCounts {
        self.refresh_listeners().await;
        self.refresh_routes().await;
        self.refresh_clusters().await;
        self.counts()
    }

    /// Refresh on every tick of the poll interval until `shutdown` resolves.
    ///
    /// The first refresh happens immediately.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "entity cache started"
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("entity cache stopped");
                    return;
                }
                _ = ticker.tick() => {
                    self.refresh_all().await;
                }
            }
        }
    }

    async fn refresh<E: Cached>(&self) -> bool {
        let kind = E::KIND;
        let fetched = match timeout(self.config.store_timeout, E::fetch_all(self.store.as_ref())).await
        {
            Ok(Ok(entities)) => entities,
            Ok(Err(err)) => {
                self.fetch_failed(err);
                return false;
            }
            Err(_) => {
                self.fetch_failed(ControlPlaneError::StoreTimeout {
                    kind,
                    timeout_ms: self.config.store_timeout.as_millis() as u64,
                });
                return false;
            }
        };

        let stamps: Vec<i64> = fetched.iter().map(|e| e.last_modified()).collect();
        let count = fetched.len();
        {
            let mut slot = lock(E::slot(self));
            let cached = CollectionState {
                len: slot.entities.len(),
                high_water_mark: slot.high_water_mark,
            };
            if !self.detector.has_changed(&cached, &stamps) {
                debug!(kind = %kind, count, "no change");
                return false;
            }
            slot.entities = Arc::new(fetched);
            slot.high_water_mark = self.detector.watermark();
        }

        gauge!(ENTITIES_TOTAL, "kind" => kind.as_str()).set(count as f64);
        info!(kind = %kind, count, "{} {}s reloaded", count, kind);
        self.notifier.notify(kind);
        true
    }

    fn fetch_failed(&self, err: ControlPlaneError) {
        let kind = match &err {
            ControlPlaneError::StoreUnavailable { kind, .. }
            | ControlPlaneError::StoreTimeout { kind, .. }
            | ControlPlaneError::InvalidEntity { kind, .. } => kind.as_str(),
            _ => "unknown",
        };
        counter!(STORE_ERRORS_TOTAL, "kind" => kind).increment(1);
        warn!(kind, error = %err, "store fetch failed, keeping cached collection");
    }
}
