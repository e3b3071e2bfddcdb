//! # switchyard-store
//!
//! The entity side of the control plane: the store contract, change
//! detection, and the [`EntityCache`] that polls the store and announces
//! which collections changed.
//!
//! - [`EntityStore`] - Full-collection fetches for listeners, routes and clusters
//! - [`MemoryStore`] / [`FileStore`] - In-memory and JSON document stores
//! - [`ChangeDetector`] / [`WatermarkDetector`] - Decides when a fetch replaces the cache
//! - [`EntityCache`] - Last-known-good collections plus the poll loop
//! - [`notify`] - Bounded, non-blocking change notifications
//!
//! ## Example
//!
//! ```rust
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! use std::sync::Arc;
//! use switchyard_core::{PathType, ResourceKind, Route};
//! use switchyard_store::{notify, EntityCache, EntityCacheConfig, MemoryStore};
//!
//! let store = Arc::new(MemoryStore::new());
//! store.upsert(Route::new("r1", "default", "/", PathType::Prefix));
//!
//! let (notifier, mut changes) = notify::channel(8);
//! let cache = EntityCache::new(store, EntityCacheConfig::default(), notifier);
//! cache.refresh_all().await;
//!
//! assert_eq!(changes.recv().await.unwrap().resource, ResourceKind::Route);
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod detector;
mod entity_cache;
mod file;
mod memory;
pub mod notify;
mod store;

pub use detector::{system_clock, ChangeDetector, Clock, CollectionState, WatermarkDetector};
pub use entity_cache::{
    EntityCache, EntityCacheConfig, EntityCounts, ENTITIES_TOTAL, STORE_ERRORS_TOTAL,
};
pub use file::FileStore;
pub use memory::MemoryStore;
pub use notify::{Notification, Notifier};
pub use store::{Collections, EntityStore, StoredEntity};
