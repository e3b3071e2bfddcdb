//! In-memory entity store.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use switchyard_core::{Cluster, ControlPlaneError, Listener, ResourceKind, Result, Route};
use tracing::debug;

use crate::detector::{system_clock, Clock};
use crate::store::{Collections, EntityStore, StoredEntity};

/// Thread-safe in-memory store.
///
/// Mutations stamp `last_modified` from the store clock, strictly increasing
/// even when the clock does not advance between calls. Failures and slow
/// fetches can be injected per collection.
///
/// # Example
///
/// ```rust
/// use switchyard_core::Cluster;
/// use switchyard_store::MemoryStore;
///
/// let store = MemoryStore::new();
/// let first = store.upsert(Cluster::new("c1", "backend", 80));
/// let second = store.upsert(Cluster::new("c1", "backend", 8080));
/// assert!(second > first);
/// assert_eq!(store.len::<Cluster>(), 1);
/// ```
pub struct MemoryStore {
    inner: Mutex<Inner>,
    clock: Clock,
}

#[derive(Default)]
struct Inner {
    collections: Collections,
    last_stamp: i64,
    failing: HashSet<ResourceKind>,
    delays: HashMap<ResourceKind, Duration>,
}

impl MemoryStore {
    /// Empty store stamping with the system clock.
    pub fn new() -> Self {
        Self::with_clock(system_clock())
    }

    /// Empty store stamping with a custom clock.
    pub fn with_clock(clock: Clock) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            clock,
        }
    }

    /// Store seeded with `collections`, keeping their stamps.
    pub fn from_collections(collections: Collections) -> Self {
        let store = Self::new();
        {
            let mut inner = store.lock();
            inner.last_stamp = collections
                .listeners
                .iter()
                .map(|e| e.last_modified)
                .chain(collections.routes.iter().map(|e| e.last_modified))
                .chain(collections.clusters.iter().map(|e| e.last_modified))
                .max()
                .unwrap_or(0);
            inner.collections = collections;
        }
        store
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace an entity by name, stamping it. Returns the stamp.
    pub fn upsert<E: StoredEntity>(&self, mut entity: E) -> i64 {
        let mut inner = self.lock();
        let stamp = (self.clock)().max(inner.last_stamp + 1);
        inner.last_stamp = stamp;
        entity.set_last_modified(stamp);
        debug!(kind = E::KIND.as_str(), name = entity.name(), stamp, "upsert");
        put(E::collection_mut(&mut inner.collections), entity);
        stamp
    }

    /// Insert or replace an entity keeping its own `last_modified`.
    pub fn put_raw<E: StoredEntity>(&self, entity: E) {
        let mut inner = self.lock();
        inner.last_stamp = inner.last_stamp.max(entity.last_modified());
        put(E::collection_mut(&mut inner.collections), entity);
    }

    /// Delete an entity by name. Returns whether it existed.
    pub fn delete<E: StoredEntity>(&self, name: &str) -> bool {
        let mut inner = self.lock();
        let collection = E::collection_mut(&mut inner.collections);
        let before = collection.len();
        collection.retain(|e| e.name() != name);
        let deleted = collection.len() < before;
        if deleted {
            debug!(kind = E::KIND.as_str(), name, "delete");
        }
        deleted
    }

    /// Current copy of one entity.
    pub fn get<E: StoredEntity>(&self, name: &str) -> Option<E> {
        E::collection(&self.lock().collections)
            .iter()
            .find(|e| e.name() == name)
            .cloned()
    }

    /// Number of entities of one type.
    pub fn len<E: StoredEntity>(&self) -> usize {
        E::collection(&self.lock().collections).len()
    }

    /// Make fetches of `kind` fail until cleared.
    pub fn set_failing(&self, kind: ResourceKind, failing: bool) {
        let mut inner = self.lock();
        if failing {
            inner.failing.insert(kind);
        } else {
            inner.failing.remove(&kind);
        }
    }

    /// Delay fetches of `kind`; `None` removes the delay.
    pub fn set_delay(&self, kind: ResourceKind, delay: Option<Duration>) {
        let mut inner = self.lock();
        match delay {
            Some(delay) => inner.delays.insert(kind, delay),
            None => inner.delays.remove(&kind),
        };
    }

    async fn fetch<E: StoredEntity>(&self) -> Result<Vec<E>> {
        let delay = self.lock().delays.get(&E::KIND).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let inner = self.lock();
        if inner.failing.contains(&E::KIND) {
            return Err(ControlPlaneError::StoreUnavailable {
                kind: E::KIND,
                message: "injected failure".to_string(),
                source: None,
            });
        }
        Ok(E::collection(&inner.collections).clone())
    }
}

fn put<E: StoredEntity>(collection: &mut Vec<E>, entity: E) {
    match collection.iter_mut().find(|e| e.name() == entity.name()) {
        Some(existing) => *existing = entity,
        None => collection.push(entity),
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("MemoryStore")
            .field("listeners", &inner.collections.listeners.len())
            .field("routes", &inner.collections.routes.len())
            .field("clusters", &inner.collections.clusters.len())
            .finish()
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn get_all_listeners(&self) -> Result<Vec<Listener>> {
        self.fetch().await
    }

    async fn get_all_routes(&self) -> Result<Vec<Route>> {
        self.fetch().await
    }

    async fn get_all_clusters(&self) -> Result<Vec<Cluster>> {
        self.fetch().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use switchyard_core::{Entity, PathType};

    #[test]
    fn stamps_strictly_increase_with_a_frozen_clock() {
        let store = MemoryStore::with_clock(Arc::new(|| 1_000));
        let a = store.upsert(Cluster::new("a", "h", 80));
        let b = store.upsert(Cluster::new("b", "h", 80));
        let a2 = store.upsert(Cluster::new("a", "h", 81));
        assert_eq!((a, b, a2), (1_000, 1_001, 1_002));
        assert_eq!(store.len::<Cluster>(), 2);
        assert_eq!(store.get::<Cluster>("a").unwrap().port, 81);
    }

    #[test]
    fn delete_reports_existence() {
        let store = MemoryStore::new();
        store.upsert(Route::new("r1", "g", "/", PathType::Prefix));
        assert!(store.delete::<Route>("r1"));
        assert!(!store.delete::<Route>("r1"));
    }

    #[test]
    fn put_raw_keeps_stamp() {
        let store = MemoryStore::new();
        let mut listener = Listener::new("l", 80, vec![], "g");
        listener.set_last_modified(5);
        store.put_raw(listener);
        assert_eq!(store.get::<Listener>("l").unwrap().last_modified(), 5);
    }

    #[tokio::test]
    async fn injected_failure() {
        let store = MemoryStore::new();
        store.upsert(Cluster::new("c1", "h", 80));
        store.set_failing(ResourceKind::Cluster, true);
        let err = store.get_all_clusters().await.unwrap_err();
        assert!(matches!(err, ControlPlaneError::StoreUnavailable { .. }));
        assert!(store.get_all_routes().await.is_ok());

        store.set_failing(ResourceKind::Cluster, false);
        assert_eq!(store.get_all_clusters().await.unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn injected_delay() {
        let store = MemoryStore::new();
        store.set_delay(ResourceKind::Route, Some(Duration::from_secs(3)));
        let started = tokio::time::Instant::now();
        store.get_all_routes().await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(3));
    }
}
