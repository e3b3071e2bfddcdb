//! # switchyard
//!
//! Envoy control plane that turns stored listeners, routes and clusters into
//! versioned configuration snapshots.
//!
//! The pipeline has three stages:
//!
//! 1. the entity cache polls an [`EntityStore`](store::EntityStore) and
//!    detects changes with a per-collection high-water mark,
//! 2. the compiler turns attribute bags into typed listener, route and
//!    cluster configuration,
//! 3. the distributor versions every compile as a snapshot and hands it to
//!    each connected node.
//!
//! ## Quick Start
//!
//! ```rust
//! use switchyard::prelude::*;
//!
//! let listeners = vec![Listener::new("public", 80, vec!["example.com".into()], "web")];
//! let routes = vec![Route::new("home", "web", "/", PathType::Prefix)
//!     .with_attributes(Attributes::from(vec![Attribute::new("Cluster", "c1")]))];
//! let clusters = vec![Cluster::new("c1", "backend", 8080)];
//!
//! let compiled = compile(&listeners, &routes, &clusters);
//! assert_eq!(compiled.route_configurations[0].name, "web");
//! ```
//!
//! ## Architecture
//!
//! - `switchyard-core` - entities, attributes, errors and resource traits
//! - `switchyard-store` - entity stores and the polling entity cache
//! - `switchyard-compiler` - attribute bags to typed configuration
//! - `switchyard-cache` - per-node snapshot cache with watches
//! - `switchyard-server` - distributor, node callbacks, health and shutdown
//!
//! This crate re-exports all of them and ships the `switchyard` binary.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub use switchyard_cache as cache;
pub use switchyard_compiler as compiler;
pub use switchyard_core as core;
pub use switchyard_server as server;
pub use switchyard_store as store;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use switchyard_core::{
        Attribute, Attributes, BoxResource, Cluster, ControlPlaneError, Listener, NodeHash,
        NodeId, PathType, Resource, ResourceKind, Result, Route, SnapshotVersion, TypeUrl,
    };

    pub use switchyard_cache::{Cache, ShardedCache, Snapshot, SnapshotBuilder, Watch};

    pub use switchyard_compiler::{compile, CompiledConfig};

    pub use switchyard_store::{EntityCache, EntityCacheConfig, EntityStore, FileStore, MemoryStore};

    pub use switchyard_server::{
        ControlPlane, ControlPlaneConfig, ControlPlaneMetrics, Distributor, NodeCallbacks,
        ShutdownController,
    };
}

/// Version information for this crate.
pub mod version {
    /// Crate version.
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");

    /// Minimum supported Rust version.
    pub const MSRV: &str = "1.75";

    /// Get version info as a string.
    pub fn version_string() -> String {
        format!("switchyard {} (MSRV {})", VERSION, MSRV)
    }
}

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use std::sync::Arc;

    #[test]
    fn prelude_imports_work() {
        let cache = ShardedCache::new();
        let node = NodeId::new("test-node");

        let snapshot = Snapshot::builder().version("v1").build();
        cache.set_snapshot(node.hash(), Arc::new(snapshot)).unwrap();

        let retrieved = cache.get_snapshot(node.hash()).unwrap();
        assert_eq!(retrieved.version(), "v1");
    }

    #[test]
    fn control_plane_builds_with_defaults() {
        let plane = ControlPlane::new(ControlPlaneConfig::default(), Arc::new(MemoryStore::new()))
            .unwrap();
        assert_eq!(plane.config().discovery_listen.port(), 9901);
    }

    #[test]
    fn version_string_names_crate() {
        assert!(super::version::version_string().starts_with("switchyard "));
    }
}
