//! Resource trait for compiled configuration.
//!
//! Everything the compiler emits implements [`Resource`] so snapshots can hold
//! clusters, route configurations and listeners behind one trait object.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

/// Trait for compiled resources stored in snapshots.
///
/// # Example
///
/// ```rust
/// use std::any::Any as StdAny;
/// use switchyard_core::{encode_json, Resource, TypeUrl};
///
/// #[derive(Debug, serde::Serialize)]
/// struct Placeholder {
///     name: String,
/// }
///
/// impl Resource for Placeholder {
///     fn type_url(&self) -> &str {
///         TypeUrl::CLUSTER
///     }
///
///     fn name(&self) -> &str {
///         &self.name
///     }
///
///     fn encode(&self) -> Result<prost_types::Any, Box<dyn std::error::Error + Send + Sync>> {
///         encode_json(self.type_url(), self)
///     }
///
///     fn as_any(&self) -> &dyn StdAny {
///         self
///     }
/// }
///
/// let any = Placeholder { name: "c1".into() }.encode().unwrap();
/// assert_eq!(any.type_url, TypeUrl::CLUSTER);
/// ```
pub trait Resource: Send + Sync + fmt::Debug {
    /// Get the type URL for this resource.
    fn type_url(&self) -> &str;

    /// Get the resource name.
    fn name(&self) -> &str;

    /// Encode the resource to a protobuf Any message.
    fn encode(&self) -> Result<prost_types::Any, Box<dyn std::error::Error + Send + Sync>>;

    /// Convert to Any for downcasting.
    fn as_any(&self) -> &dyn Any;
}

/// Shared, type-erased resource.
pub type BoxResource = Arc<dyn Resource>;

/// Wrap the JSON form of `value` in a protobuf `Any` tagged with `type_url`.
pub fn encode_json<T: Serialize + ?Sized>(
    type_url: &str,
    value: &T,
) -> Result<prost_types::Any, Box<dyn std::error::Error + Send + Sync>> {
    let value = serde_json::to_vec(value)?;
    Ok(prost_types::Any {
        type_url: type_url.to_string(),
        value,
    })
}
