//! # switchyard-cache
//!
//! Per-node snapshot cache.
//!
//! This is the cache the discovery protocol layer serves from. The
//! distributor writes to it through [`Cache::set_snapshot`]; streams read from
//! it and subscribe to updates with watches.
//!
//! - [`ShardedCache`] - DashMap-based concurrent cache for snapshots
//! - [`Snapshot`] - Immutable, versioned bundle of compiled resources
//! - [`Watch`] - Subscription for snapshot updates of one node
//!
//! ## Key Design Decisions
//!
//! - Uses `DashMap` for fine-grained concurrent access
//! - All `DashMap` references are dropped before watches are notified
//! - Snapshots are immutable and shared as `Arc<Snapshot>` between nodes
//! - Watch notifications never block the writer
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use switchyard_cache::{Cache, ShardedCache, Snapshot};
//! use switchyard_core::NodeHash;
//!
//! let cache = ShardedCache::new();
//! let snapshot = Arc::new(Snapshot::builder().version("v1").build());
//!
//! cache.set_snapshot(NodeHash::from_id("node-1"), snapshot).unwrap();
//! assert_eq!(cache.snapshot_count(), 1);
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod snapshot;
mod stats;
mod watch;

pub use cache::{Cache, ShardedCache};
pub use snapshot::{Snapshot, SnapshotBuilder, SnapshotResources};
pub use stats::{CacheEvent, CacheStats, CACHE_EVENTS_TOTAL};
pub use watch::{Watch, WatchId, WatchManager};
