//! Route configurations: one per route group, served to listeners by name.

use std::collections::BTreeMap;

use serde::Serialize;
use switchyard_core::{Listener, PathType, Route};

use crate::common::RegexMatcher;
use crate::route::{compile_routes, CompiledRoute};

/// Pseudo-header the observability index matches on.
pub const PATH_HEADER: &str = ":path";

/// Routes of one route group behind a single virtual host.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RouteConfiguration {
    /// Route group name.
    pub name: String,
    /// Virtual hosts; always exactly one.
    pub virtual_hosts: Vec<VirtualHost>,
}

/// A named set of domains and their routes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VirtualHost {
    /// Route group name.
    pub name: String,
    /// Domains served, from every listener in the group.
    pub domains: Vec<String>,
    /// Compiled routes in input order.
    pub routes: Vec<CompiledRoute>,
    /// Stats buckets per route.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub virtual_clusters: Vec<VirtualCluster>,
}

/// How a header value is matched.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderMatchSpecifier {
    /// Whole value equals.
    ExactMatch(String),
    /// Value starts with.
    PrefixMatch(String),
    /// Value matches a regular expression.
    SafeRegexMatch(RegexMatcher),
}

/// A header matcher.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HeaderMatcher {
    /// Header name.
    pub name: String,
    /// Match rule.
    #[serde(flatten)]
    pub specifier: HeaderMatchSpecifier,
}

impl HeaderMatcher {
    /// `:path` matcher for a stored route, `None` for an unknown path type.
    pub fn path(route: &Route) -> Option<Self> {
        let specifier = match &route.path_type {
            PathType::Exact => HeaderMatchSpecifier::ExactMatch(route.path.clone()),
            PathType::Prefix => HeaderMatchSpecifier::PrefixMatch(route.path.clone()),
            PathType::Regex => {
                HeaderMatchSpecifier::SafeRegexMatch(RegexMatcher::plain(route.path.clone()))
            }
            PathType::Unknown(_) => return None,
        };
        Some(Self {
            name: PATH_HEADER.to_string(),
            specifier,
        })
    }
}

/// A stats bucket matching one route's path.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VirtualCluster {
    /// Route name.
    pub name: String,
    /// Request matchers.
    pub headers: Vec<HeaderMatcher>,
}

/// Build the observability index of `route_group`.
pub fn compile_virtual_clusters(route_group: &str, routes: &[Route]) -> Vec<VirtualCluster> {
    routes
        .iter()
        .filter(|route| route.route_group == route_group)
        .filter_map(|route| {
            Some(VirtualCluster {
                name: route.name.clone(),
                headers: vec![HeaderMatcher::path(route)?],
            })
        })
        .collect()
}

/// Build one route configuration per route group referenced by a listener,
/// sorted by group name.
pub fn compile_route_configurations(
    listeners: &[Listener],
    routes: &[Route],
) -> Vec<RouteConfiguration> {
    let mut domains: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for listener in listeners {
        let group = domains.entry(listener.route_group.as_str()).or_default();
        for host in &listener.virtual_hosts {
            if !group.contains(host) {
                group.push(host.clone());
            }
        }
    }

    domains
        .into_iter()
        .map(|(group, domains)| compile_route_configuration(group, domains, routes))
        .collect()
}

/// Build the route configuration of one group.
pub fn compile_route_configuration(
    route_group: &str,
    domains: Vec<String>,
    routes: &[Route],
) -> RouteConfiguration {
    RouteConfiguration {
        name: route_group.to_string(),
        virtual_hosts: vec![VirtualHost {
            name: route_group.to_string(),
            domains,
            routes: compile_routes(route_group, routes),
            virtual_clusters: compile_virtual_clusters(route_group, routes),
        }],
    }
}
