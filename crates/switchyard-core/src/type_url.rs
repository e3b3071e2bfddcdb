//! Type URL handling for compiled resources.
//!
//! The control plane only produces the three resource types its entities
//! compile into: clusters, route configurations and listeners.

use std::fmt;

use crate::ResourceKind;

/// Type URL wrapper for compiled resource types.
///
/// # Example
///
/// ```rust
/// use switchyard_core::{ResourceKind, TypeUrl};
///
/// let route_type = TypeUrl::of(ResourceKind::Route);
/// assert_eq!(route_type.as_str(), TypeUrl::ROUTE);
/// assert_eq!(route_type.short_name(), "RouteConfiguration");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeUrl(String);

impl TypeUrl {
    /// Type URL for Cluster (CDS).
    pub const CLUSTER: &'static str = "type.googleapis.com/envoy.config.cluster.v3.Cluster";

    /// Type URL for Listener (LDS).
    pub const LISTENER: &'static str = "type.googleapis.com/envoy.config.listener.v3.Listener";

    /// Type URL for RouteConfiguration (RDS).
    pub const ROUTE: &'static str =
        "type.googleapis.com/envoy.config.route.v3.RouteConfiguration";

    /// Create a new type URL from a string.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    /// Type URL that entities of `kind` compile into.
    #[must_use]
    pub fn of(kind: ResourceKind) -> Self {
        match kind {
            ResourceKind::Listener => Self::new(Self::LISTENER),
            ResourceKind::Route => Self::new(Self::ROUTE),
            ResourceKind::Cluster => Self::new(Self::CLUSTER),
        }
    }

    /// Get the type URL as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Extract the short name from the type URL.
    ///
    /// For example, `type.googleapis.com/envoy.config.cluster.v3.Cluster`
    /// returns `Cluster`.
    #[must_use]
    pub fn short_name(&self) -> &str {
        self.0.rsplit('/').next().and_then(|s| s.rsplit('.').next()).unwrap_or(&self.0)
    }

    /// Resource kind served under this type URL, if any.
    #[must_use]
    pub fn kind(&self) -> Option<ResourceKind> {
        match self.0.as_str() {
            Self::LISTENER => Some(ResourceKind::Listener),
            Self::ROUTE => Some(ResourceKind::Route),
            Self::CLUSTER => Some(ResourceKind::Cluster),
            _ => None,
        }
    }
}

impl fmt::Display for TypeUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TypeUrl {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TypeUrl {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for TypeUrl {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
