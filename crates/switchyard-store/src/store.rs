//! The entity store contract.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use switchyard_core::{Cluster, Entity, Listener, Result, Route};

/// Backing store holding the three entity collections.
///
/// The store has no change feed. Every call returns the complete collection;
/// the entity cache works out what changed. Errors are treated as transient
/// and retried on the next poll.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// All listeners.
    async fn get_all_listeners(&self) -> Result<Vec<Listener>>;

    /// All routes.
    async fn get_all_routes(&self) -> Result<Vec<Route>>;

    /// All clusters.
    async fn get_all_clusters(&self) -> Result<Vec<Cluster>>;
}

#[async_trait]
impl<S: EntityStore + ?Sized> EntityStore for Arc<S> {
    async fn get_all_listeners(&self) -> Result<Vec<Listener>> {
        (**self).get_all_listeners().await
    }

    async fn get_all_routes(&self) -> Result<Vec<Route>> {
        (**self).get_all_routes().await
    }

    async fn get_all_clusters(&self) -> Result<Vec<Cluster>> {
        (**self).get_all_clusters().await
    }
}

/// The three collections as one document.
///
/// This is the on-disk format of [`FileStore`](crate::FileStore) and the
/// backing state of [`MemoryStore`](crate::MemoryStore).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Collections {
    /// Listener entities.
    pub listeners: Vec<Listener>,
    /// Route entities.
    pub routes: Vec<Route>,
    /// Cluster entities.
    pub clusters: Vec<Cluster>,
}

impl Collections {
    /// Normalize the attribute bags of every entity.
    #[must_use]
    pub fn tidy(self) -> Self {
        Self {
            listeners: self.listeners.into_iter().map(Entity::tidy).collect(),
            routes: self.routes.into_iter().map(Entity::tidy).collect(),
            clusters: self.clusters.into_iter().map(Entity::tidy).collect(),
        }
    }
}

/// An entity type kept as a whole collection in an [`EntityStore`].
pub trait StoredEntity: Entity {
    /// Fetch every entity of this type.
    fn fetch_all(store: &dyn EntityStore) -> BoxFuture<'_, Result<Vec<Self>>>;

    /// This type's collection within a document.
    fn collection(collections: &Collections) -> &Vec<Self>;

    /// Mutable access to this type's collection within a document.
    fn collection_mut(collections: &mut Collections) -> &mut Vec<Self>;
}

impl StoredEntity for Listener {
    fn fetch_all(store: &dyn EntityStore) -> BoxFuture<'_, Result<Vec<Self>>> {
        store.get_all_listeners()
    }

    fn collection(collections: &Collections) -> &Vec<Self> {
        &collections.listeners
    }

    fn collection_mut(collections: &mut Collections) -> &mut Vec<Self> {
        &mut collections.listeners
    }
}

impl StoredEntity for Route {
    fn fetch_all(store: &dyn EntityStore) -> BoxFuture<'_, Result<Vec<Self>>> {
        store.get_all_routes()
    }

    fn collection(collections: &Collections) -> &Vec<Self> {
        &collections.routes
    }

    fn collection_mut(collections: &mut Collections) -> &mut Vec<Self> {
        &mut collections.routes
    }
}

impl StoredEntity for Cluster {
    fn fetch_all(store: &dyn EntityStore) -> BoxFuture<'_, Result<Vec<Self>>> {
        store.get_all_clusters()
    }

    fn collection(collections: &Collections) -> &Vec<Self> {
        &collections.clusters
    }

    fn collection_mut(collections: &mut Collections) -> &mut Vec<Self> {
        &mut collections.clusters
    }
}
