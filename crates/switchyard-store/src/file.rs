//! JSON file backed entity store.

use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use switchyard_core::{Cluster, ControlPlaneError, Listener, ResourceKind, Result, Route};
use tracing::trace;

use crate::store::{Collections, EntityStore, StoredEntity};

/// Store reading a [`Collections`] JSON document on every fetch.
///
/// Entities without a `lastModified` field take the file's modification
/// time, so editing the file is picked up by the change detector.
///
/// ```json
/// {
///   "listeners": [{"name": "public", "port": 80, "virtualHosts": ["www.example.com"], "routeGroup": "default"}],
///   "routes": [{"name": "r1", "routeGroup": "default", "path": "/", "pathType": "prefix",
///               "attributes": [{"name": "Cluster", "value": "c1"}]}],
///   "clusters": [{"name": "c1", "host": "backend.internal", "port": 8080}]
/// }
/// ```
#[derive(Clone, Debug)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Store backed by the document at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and parse the whole document.
    pub async fn load(&self, kind: ResourceKind) -> Result<Collections> {
        let bytes = tokio::fs::read(&self.path).await.map_err(|err| {
            ControlPlaneError::store(kind, format!("cannot read {}", self.path.display()), err)
        })?;
        let modified = tokio::fs::metadata(&self.path)
            .await
            .ok()
            .and_then(|m| m.modified().ok())
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);

        let collections: Collections = serde_json::from_slice(&bytes).map_err(|err| {
            ControlPlaneError::store(kind, format!("cannot parse {}", self.path.display()), err)
        })?;
        trace!(path = %self.path.display(), modified, "loaded entity document");

        let mut collections = collections.tidy();
        stamp_missing(&mut collections.listeners, modified);
        stamp_missing(&mut collections.routes, modified);
        stamp_missing(&mut collections.clusters, modified);
        Ok(collections)
    }

    async fn fetch<E: StoredEntity>(&self) -> Result<Vec<E>> {
        let mut collections = self.load(E::KIND).await?;
        Ok(std::mem::take(E::collection_mut(&mut collections)))
    }
}

fn stamp_missing<E: StoredEntity>(entities: &mut [E], modified: i64) {
    for entity in entities.iter_mut().filter(|e| e.last_modified() == 0) {
        entity.set_last_modified(modified);
    }
}

#[async_trait]
impl EntityStore for FileStore {
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
    use std::sync::atomic::{AtomicUsize, Ordering};
    use switchyard_core::Entity;

    fn temp_path(tag: &str) -> PathBuf {
        static SEQ: AtomicUsize = AtomicUsize::new(0);
        std::env::temp_dir().join(format!(
            "switchyard-{tag}-{}-{}.json",
            std::process::id(),
            SEQ.fetch_add(1, Ordering::Relaxed)
        ))
    }

    #[tokio::test]
    async fn reads_and_tidies_document() {
        let path = temp_path("doc");
        std::fs::write(
            &path,
            r#"{
                "routes": [{"name": "r1", "routeGroup": "g", "path": "/", "pathType": "prefix",
                            "attributes": [{"name": " Cluster ", "value": " c1 "}]}],
                "clusters": [{"name": "c1", "host": "backend", "port": 80, "lastModified": 7}]
            }"#,
        )
        .unwrap();

        let store = FileStore::new(&path);
        let routes = store.get_all_routes().await.unwrap();
        assert_eq!(routes[0].attributes.get("Cluster"), Some("c1"));
        assert!(routes[0].last_modified() > 0);

        let clusters = store.get_all_clusters().await.unwrap();
        assert_eq!(clusters[0].last_modified(), 7);
        assert!(store.get_all_listeners().await.unwrap().is_empty());

        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn missing_file_is_a_store_error() {
        let store = FileStore::new(temp_path("missing"));
        let err = store.get_all_clusters().await.unwrap_err();
        assert!(matches!(
            err,
            ControlPlaneError::StoreUnavailable {
                kind: ResourceKind::Cluster,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn malformed_file_is_a_store_error() {
        let path = temp_path("bad");
        std::fs::write(&path, "{ not json").unwrap();
        let err = FileStore::new(&path).get_all_routes().await.unwrap_err();
        assert!(err.is_transient());
        std::fs::remove_file(&path).unwrap();
    }
}
