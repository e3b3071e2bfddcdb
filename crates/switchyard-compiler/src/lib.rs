//! # switchyard-compiler
//!
//! Turns stored entities and their attribute bags into typed proxy
//! configuration. Compilation is pure: the same collections always produce
//! the same output, and a malformed attribute only disables the feature it
//! configures.
//!
//! - [`compile_routes`] - Routes of one route group, with match, action and policies
//! - [`compile_route_configurations`] - One route configuration per route group
//! - [`compile_virtual_clusters`] - Per-route stats buckets
//! - [`compile_clusters`] - Upstream clusters
//! - [`compile_listeners`] - Listeners with their HTTP filter chain
//! - [`compile`] - All of the above as a [`CompiledConfig`]
//!
//! ## Example
//!
//! ```rust
//! use switchyard_compiler::{compile_routes, RouteAction, Upstream};
//! use switchyard_core::{Attribute, Attributes, PathType, Route};
//!
//! let routes = vec![Route::new("r1", "default", "/", PathType::Prefix)
//!     .with_attributes(Attributes::from(vec![Attribute::new("Cluster", "c1")]))];
//!
//! let compiled = compile_routes("default", &routes);
//! let RouteAction::Route(forward) = &compiled[0].action else {
//!     panic!("expected a forward action");
//! };
//! assert_eq!(forward.upstream, Upstream::Cluster("c1".into()));
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod attributes;
pub mod cluster;
mod common;
pub mod listener;
mod resources;
pub mod route;
mod route_config;

pub use attributes::{
    AttributeKey, ClusterAttribute, ListenerAttribute, RouteAttribute, TypedAttributes,
};
pub use cluster::{compile_cluster, compile_clusters, CompiledCluster};
pub use common::{
    CommonTlsContext, GrpcService, RegexEngine, RegexMatcher, SocketAddress, TlsCertificate,
    TlsParameters, TlsVersion, REGEX_MAX_PROGRAM_SIZE,
};
pub use listener::{compile_listener, compile_listeners, CompiledListener, HttpFilter};
pub use resources::{compile, CompiledConfig};
pub use route::{
    compile_route, compile_routes, parse_status_codes, AuthzOverride, CompiledRoute, PathMatch,
    RouteAction, Upstream, WeightedClusters,
};
pub use route_config::{
    compile_route_configuration, compile_route_configurations, compile_virtual_clusters,
    HeaderMatchSpecifier, HeaderMatcher, RouteConfiguration, VirtualCluster, VirtualHost,
};
