//! # switchyard-core
//!
//! Core types, traits, and error handling for the switchyard control plane.
//!
//! This crate provides the foundational types used across all other switchyard crates:
//!
//! - [`Listener`], [`Route`], [`Cluster`] - Stored configuration entities
//! - [`Attributes`] - The name/value bag every entity carries
//! - [`ControlPlaneError`] - Error type with gRPC status code mapping
//! - [`SnapshotVersion`] - Timestamped, counter-based snapshot versions
//! - [`NodeId`] / [`NodeHash`] - Proxy node identification using FNV-1a hashing
//! - [`Resource`] - Trait for compiled configuration stored in snapshots
//! - [`TypeUrl`] - Type URL constants for the three resource kinds
//!
//! ## Example
//!
//! ```rust
//! use switchyard_core::{Attribute, Attributes, NodeId, Route, PathType};
//!
//! let route = Route::new("r1", "default", "/x", PathType::Prefix)
//!     .with_attributes(Attributes::from(vec![Attribute::new("Cluster", "c1")]));
//! assert_eq!(route.attributes.get("Cluster"), Some("c1"));
//!
//! let node = NodeId::new("envoy-1");
//! assert_eq!(node.hash(), NodeId::new("envoy-1").hash());
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod attribute;
mod entity;
mod error;
mod node;
mod resource;
mod type_url;
mod version;

pub use attribute::{parse_duration, Attribute, Attributes, VALUE_FALSE, VALUE_TRUE};
pub use entity::{now_millis, Cluster, Entity, Listener, PathType, ResourceKind, Route};
pub use error::ControlPlaneError;
pub use node::{NodeHash, NodeId};
pub use resource::{encode_json, BoxResource, Resource};
pub use type_url::TypeUrl;
pub use version::SnapshotVersion;

/// Result type alias using [`ControlPlaneError`].
pub type Result<T> = std::result::Result<T, ControlPlaneError>;
