//! Stored configuration entities.
//!
//! Listeners, routes and clusters are owned by the entity store. The control
//! plane only ever holds read-only copies, refreshed wholesale.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Attributes;

/// Current wall-clock time in epoch milliseconds.
#[must_use]
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// The three entity collections.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// Listener entities.
    Listener,
    /// Route entities.
    Route,
    /// Cluster entities.
    Cluster,
}

impl ResourceKind {
    /// All kinds, in refresh order.
    pub const ALL: [ResourceKind; 3] = [Self::Listener, Self::Route, Self::Cluster];

    /// Lowercase name used in notifications and metric labels.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Listener => "listener",
            Self::Route => "route",
            Self::Cluster => "cluster",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a route's path is matched.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PathType {
    /// Exact path match (`path`).
    Exact,
    /// Prefix match (`prefix`).
    Prefix,
    /// Regular expression match (`regexp`).
    Regex,
    /// Anything else; kept so the compiler can skip the route.
    Unknown(String),
}

impl PathType {
    /// Stored representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Exact => "path",
            Self::Prefix => "prefix",
            Self::Regex => "regexp",
            Self::Unknown(other) => other,
        }
    }
}

impl From<String> for PathType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "path" => Self::Exact,
            "prefix" => Self::Prefix,
            "regexp" => Self::Regex,
            _ => Self::Unknown(s),
        }
    }
}

impl From<&str> for PathType {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

impl From<PathType> for String {
    fn from(p: PathType) -> Self {
        p.as_str().to_string()
    }
}

impl fmt::Display for PathType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Behavior shared by every entity type.
pub trait Entity: Clone + Send + Sync + fmt::Debug + 'static {
    /// Collection this entity lives in.
    const KIND: ResourceKind;

    /// Unique name within the collection.
    fn name(&self) -> &str;

    /// Last modification time in epoch milliseconds.
    fn last_modified(&self) -> i64;

    /// Stamp the modification time.
    fn set_last_modified(&mut self, at: i64);

    /// Normalize the attribute bag.
    #[must_use]
    fn tidy(self) -> Self;
}

/// Downstream listener with its virtual hosts.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Listener {
    /// Listener name.
    pub name: String,
    /// TCP port to listen on.
    pub port: u32,
    /// Host names served by this listener.
    pub virtual_hosts: Vec<String>,
    /// Route group whose routes this listener serves.
    pub route_group: String,
    /// Comma separated policy names.
    pub policies: String,
    /// Attribute bag.
    pub attributes: Attributes,
    /// Last modification time in epoch milliseconds.
    pub last_modified: i64,
}

impl Listener {
    /// Create a listener without attributes.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        port: u32,
        virtual_hosts: Vec<String>,
        route_group: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            port,
            virtual_hosts,
            route_group: route_group.into(),
            ..Self::default()
        }
    }

    /// Replace the attribute bag.
    #[must_use]
    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    /// Policy names, trimmed, empties dropped.
    pub fn policy_names(&self) -> impl Iterator<Item = &str> {
        self.policies
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }
}

impl Entity for Listener {
    const KIND: ResourceKind = ResourceKind::Listener;

    fn name(&self) -> &str {
        &self.name
    }

    fn last_modified(&self) -> i64 {
        self.last_modified
    }

    fn set_last_modified(&mut self, at: i64) {
        self.last_modified = at;
    }

    fn tidy(mut self) -> Self {
        self.attributes = self.attributes.tidy();
        self
    }
}

/// Path-matched route belonging to a route group.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    /// Route name.
    pub name: String,
    /// Route group tag.
    #[serde(default)]
    pub route_group: String,
    /// Path to match.
    #[serde(default)]
    pub path: String,
    /// How `path` is matched.
    pub path_type: PathType,
    /// Attribute bag.
    #[serde(default)]
    pub attributes: Attributes,
    /// Last modification time in epoch milliseconds.
    #[serde(default)]
    pub last_modified: i64,
}

impl Route {
    /// Create a route without attributes.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        route_group: impl Into<String>,
        path: impl Into<String>,
        path_type: PathType,
    ) -> Self {
        Self {
            name: name.into(),
            route_group: route_group.into(),
            path: path.into(),
            path_type,
            attributes: Attributes::new(),
            last_modified: 0,
        }
    }

    /// Replace the attribute bag.
    #[must_use]
    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }
}

impl Entity for Route {
    const KIND: ResourceKind = ResourceKind::Route;

    fn name(&self) -> &str {
        &self.name
    }

    fn last_modified(&self) -> i64 {
        self.last_modified
    }

    fn set_last_modified(&mut self, at: i64) {
        self.last_modified = at;
    }

    fn tidy(mut self) -> Self {
        self.attributes = self.attributes.tidy();
        self
    }
}

/// Upstream cluster.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Cluster {
    /// Cluster name.
    pub name: String,
    /// Upstream host name or address.
    pub host: String,
    /// Upstream port.
    pub port: u32,
    /// Attribute bag.
    pub attributes: Attributes,
    /// Last modification time in epoch milliseconds.
    pub last_modified: i64,
}

impl Cluster {
    /// Create a cluster without attributes.
    #[must_use]
    pub fn new(name: impl Into<String>, host: impl Into<String>, port: u32) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Replace the attribute bag.
    #[must_use]
    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }
}

impl Entity for Cluster {
    const KIND: ResourceKind = ResourceKind::Cluster;

    fn name(&self) -> &str {
        &self.name
    }

    fn last_modified(&self) -> i64 {
        self.last_modified
    }

    fn set_last_modified(&mut self, at: i64) {
        self.last_modified = at;
    }

    fn tidy(mut self) -> Self {
        self.attributes = self.attributes.tidy();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Attribute;

    #[test]
    fn path_type_parsing() {
        assert_eq!(PathType::from("path"), PathType::Exact);
        assert_eq!(PathType::from("prefix"), PathType::Prefix);
        assert_eq!(PathType::from("regexp"), PathType::Regex);
        assert_eq!(
            PathType::from("glob"),
            PathType::Unknown("glob".to_string())
        );
        assert_eq!(PathType::from("glob").as_str(), "glob");
    }

    #[test]
    fn route_from_json() {
        let json = r#"{
            "name": "r1",
            "routeGroup": "g",
            "path": "/x",
            "pathType": "prefix",
            "attributes": [{"name": "Cluster", "value": "c1"}],
            "lastModified": 1700000000000
        }"#;
        let route: Route = serde_json::from_str(json).unwrap();
        assert_eq!(route.path_type, PathType::Prefix);
        assert_eq!(route.attributes.get("Cluster"), Some("c1"));
        assert_eq!(route.last_modified(), 1_700_000_000_000);
    }

    #[test]
    fn listener_defaults_and_policies() {
        let json = r#"{"name": "public", "port": 443, "policies": "checkIP, , geoip"}"#;
        let listener: Listener = serde_json::from_str(json).unwrap();
        assert!(listener.virtual_hosts.is_empty());
        let policies: Vec<_> = listener.policy_names().collect();
        assert_eq!(policies, vec!["checkIP", "geoip"]);
    }

    #[test]
    fn entity_tidy_normalizes_attributes() {
        let cluster = Cluster::new("c1", "backend", 80)
            .with_attributes(Attributes::from(vec![
                Attribute::new("TLS ", "true"),
                Attribute::new("TLS", "false"),
            ]))
            .tidy();
        assert_eq!(cluster.attributes.len(), 1);
        assert!(cluster.attributes.is_true("TLS"));
    }

    #[test]
    fn resource_kind_labels() {
        assert_eq!(ResourceKind::Cluster.to_string(), "cluster");
        assert_eq!(
            serde_json::to_string(&ResourceKind::Listener).unwrap(),
            r#""listener""#
        );
    }
}
