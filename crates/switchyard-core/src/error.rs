//! Error types for control plane operations.
//!
//! This module provides [`ControlPlaneError`], the error type shared by the
//! entity cache, the compiler and the distributor. It converts into
//! [`tonic::Status`] so a protocol layer can surface it directly.

use crate::ResourceKind;

/// Error type for control plane operations.
///
/// Nothing in the control plane treats these as fatal on its own: store
/// errors keep the last-known-good collection, assignment errors skip one
/// node. Only startup paths hand them to the caller to decide on exit.
///
/// # Example
///
/// ```rust
/// use switchyard_core::{ControlPlaneError, ResourceKind};
///
/// let err = ControlPlaneError::StoreTimeout {
///     kind: ResourceKind::Route,
///     timeout_ms: 1000,
/// };
/// assert!(err.is_transient());
/// ```
#[derive(Debug, thiserror::Error)]
pub enum ControlPlaneError {
    /// The entity store could not return a collection.
    #[error("store unavailable while fetching {kind}s: {message}")]
    StoreUnavailable {
        /// Collection being fetched.
        kind: ResourceKind,
        /// Description of the failure.
        message: String,
        /// Optional underlying error.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A store fetch exceeded its deadline.
    #[error("store fetch of {kind}s timed out after {timeout_ms}ms")]
    StoreTimeout {
        /// Collection being fetched.
        kind: ResourceKind,
        /// Deadline that was exceeded.
        timeout_ms: u64,
    },

    /// An entity document could not be read.
    #[error("invalid {kind} entity {name:?}: {reason}")]
    InvalidEntity {
        /// Collection the entity belongs to.
        kind: ResourceKind,
        /// Entity name, empty when unknown.
        name: String,
        /// Reason the entity was rejected.
        reason: String,
    },

    /// A snapshot could not be handed to a node.
    #[error("cannot assign snapshot {version} to node {node_id}: {reason}")]
    SnapshotAssignment {
        /// Node the assignment was meant for.
        node_id: String,
        /// Version being assigned.
        version: String,
        /// Reason for the failure.
        reason: String,
    },

    /// A node is not tracked.
    #[error("node not found: {node_id}")]
    NodeNotFound {
        /// The unknown node id.
        node_id: String,
    },

    /// Compiled configuration could not be encoded.
    #[error("encoding error for {type_url}: {message}")]
    Encoding {
        /// Type URL being encoded.
        type_url: String,
        /// Error message.
        message: String,
    },

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The control plane is shutting down.
    #[error("control plane is shutting down")]
    Shutdown,

    /// Watch subscription was closed.
    #[error("watch closed: watch_id={watch_id}")]
    WatchClosed {
        /// ID of the closed watch.
        watch_id: u64,
    },

    /// Unexpected internal error.
    #[error("internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
        /// Optional underlying error.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl ControlPlaneError {
    /// Create a store error from any error type.
    pub fn store<E>(kind: ResourceKind, message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::StoreUnavailable {
            kind,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an internal error from any error type.
    pub fn internal<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Internal {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Whether retrying the same operation later may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::StoreUnavailable { .. }
                | Self::StoreTimeout { .. }
                | Self::SnapshotAssignment { .. }
        )
    }
}

/// Convert to tonic::Status for gRPC responses.
impl From<ControlPlaneError> for tonic::Status {
    fn from(err: ControlPlaneError) -> Self {
        match &err {
            ControlPlaneError::StoreUnavailable { .. } | ControlPlaneError::Shutdown => {
                tonic::Status::unavailable(err.to_string())
            }
            ControlPlaneError::StoreTimeout { .. } => {
                tonic::Status::deadline_exceeded(err.to_string())
            }
            ControlPlaneError::InvalidEntity { .. }
            | ControlPlaneError::Encoding { .. }
            | ControlPlaneError::Configuration(_) => {
                tonic::Status::invalid_argument(err.to_string())
            }
            ControlPlaneError::NodeNotFound { .. } => tonic::Status::not_found(err.to_string()),
            ControlPlaneError::SnapshotAssignment { .. } => {
                tonic::Status::failed_precondition(err.to_string())
            }
            ControlPlaneError::WatchClosed { .. } => tonic::Status::cancelled(err.to_string()),
            ControlPlaneError::Internal { .. } => tonic::Status::internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ControlPlaneError::StoreTimeout {
            kind: ResourceKind::Cluster,
            timeout_ms: 250,
        };
        assert_eq!(err.to_string(), "store fetch of clusters timed out after 250ms");
    }

    #[test]
    fn test_error_to_status() {
        let err = ControlPlaneError::NodeNotFound {
            node_id: "envoy-1".to_string(),
        };
        let status: tonic::Status = err.into();
        assert_eq!(status.code(), tonic::Code::NotFound);

        let status: tonic::Status = ControlPlaneError::Shutdown.into();
        assert_eq!(status.code(), tonic::Code::Unavailable);
    }

    #[test]
    fn test_store_error_helper() {
        let io_err = std::io::Error::other("connection refused");
        let err = ControlPlaneError::store(ResourceKind::Listener, "fetch failed", io_err);
        assert!(matches!(err, ControlPlaneError::StoreUnavailable { .. }));
        assert!(err.is_transient());
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_configuration_not_transient() {
        let err = ControlPlaneError::Configuration("bad interval".into());
        assert!(!err.is_transient());
    }
}
