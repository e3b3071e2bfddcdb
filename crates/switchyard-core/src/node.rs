//! Node identification for connected proxies.
//!
//! A proxy announces itself with a free-form node id. [`NodeId`] keeps the
//! original string for logging, [`NodeHash`] is the FNV-1a digest used as the
//! snapshot cache key.

use std::fmt;
use std::hash::{Hash, Hasher};

use fnv::FnvHasher;

/// Protocol-supplied identity of a connected proxy.
///
/// # Example
///
/// ```rust
/// use switchyard_core::NodeId;
///
/// let node = NodeId::new("edge-proxy-7");
/// assert_eq!(node.as_str(), "edge-proxy-7");
/// assert_eq!(node.hash(), NodeId::from("edge-proxy-7").hash());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(String);

impl NodeId {
    /// Create a node id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the node id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Cache key for this node.
    #[must_use]
    pub fn hash(&self) -> NodeHash {
        NodeHash::from_id(&self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Hash-based node key for snapshot cache lookups.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeHash(u64);

impl NodeHash {
    /// Create a node hash from a node id string.
    #[must_use]
    pub fn from_id(node_id: &str) -> Self {
        let mut hasher = FnvHasher::default();
        node_id.hash(&mut hasher);
        Self(hasher.finish())
    }

    /// Get the raw hash value.
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl From<&NodeId> for NodeHash {
    fn from(id: &NodeId) -> Self {
        id.hash()
    }
}
