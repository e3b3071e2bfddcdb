//! Snapshot: immutable, versioned bundle of compiled resources.
//!
//! One snapshot is built per compile and shared by every node, so it is
//! handed around as `Arc<Snapshot>`. Resources are grouped by type URL and
//! kept sorted by name, which makes two compiles of the same entities
//! directly comparable.

use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use switchyard_core::{BoxResource, TypeUrl};

/// Resources of one type within a snapshot.
#[derive(Debug, Clone, Default)]
pub struct SnapshotResources {
    resources: BTreeMap<String, BoxResource>,
}

impl SnapshotResources {
    /// Number of resources.
    #[inline]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Whether there are no resources of this type.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Get a resource by name.
    #[inline]
    pub fn get(&self, name: &str) -> Option<&BoxResource> {
        self.resources.get(name)
    }

    /// Iterate over resources in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &BoxResource)> {
        self.resources.iter()
    }

    /// Resource names in order.
    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.resources.keys()
    }

    /// Clone the resources into a vector.
    pub fn to_vec(&self) -> Vec<BoxResource> {
        self.resources.values().cloned().collect()
    }
}

/// Immutable, versioned collection of compiled resources.
#[derive(Debug, Clone)]
pub struct Snapshot {
    version: String,
    resources: HashMap<TypeUrl, SnapshotResources>,
    created_at: Instant,
}

impl Snapshot {
    /// Create a new snapshot builder.
    pub fn builder() -> SnapshotBuilder {
        SnapshotBuilder::new()
    }

    /// Snapshot version.
    #[inline]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// When the snapshot was built.
    #[inline]
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Resources of one type.
    #[inline]
    pub fn get_resources(&self, type_url: &TypeUrl) -> Option<&SnapshotResources> {
        self.resources.get(type_url)
    }

    /// Compiled clusters.
    pub fn clusters(&self) -> Option<&SnapshotResources> {
        self.get_resources(&TypeUrl::new(TypeUrl::CLUSTER))
    }

    /// Compiled route configurations.
    pub fn routes(&self) -> Option<&SnapshotResources> {
        self.get_resources(&TypeUrl::new(TypeUrl::ROUTE))
    }

    /// Compiled listeners.
    pub fn listeners(&self) -> Option<&SnapshotResources> {
        self.get_resources(&TypeUrl::new(TypeUrl::LISTENER))
    }

    /// Whether resources of a type are present.
    #[inline]
    pub fn contains_type(&self, type_url: &TypeUrl) -> bool {
        self.resources.contains_key(type_url)
    }

    /// Type URLs present in this snapshot.
    pub fn type_urls(&self) -> impl Iterator<Item = &TypeUrl> {
        self.resources.keys()
    }

    /// Total number of resources across all types.
    pub fn total_resources(&self) -> usize {
        self.resources.values().map(|r| r.len()).sum()
    }

    /// Whether the snapshot holds no resources.
    pub fn is_empty(&self) -> bool {
        self.resources.values().all(|r| r.is_empty())
    }
}

/// Builder for [`Snapshot`].
#[derive(Debug, Default)]
pub struct SnapshotBuilder {
    version: String,
    resources: HashMap<TypeUrl, SnapshotResources>,
}

impl SnapshotBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the version.
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Set all resources of a type, replacing earlier ones.
    pub fn resources(
        mut self,
        type_url: TypeUrl,
        resources: impl IntoIterator<Item = BoxResource>,
    ) -> Self {
        let mut entry = SnapshotResources::default();
        for resource in resources {
            entry
                .resources
                .insert(resource.name().to_string(), resource);
        }
        self.resources.insert(type_url, entry);
        self
    }

    /// Add a single resource.
    pub fn resource(mut self, resource: BoxResource) -> Self {
        self.resources
            .entry(TypeUrl::new(resource.type_url()))
            .or_default()
            .resources
            .insert(resource.name().to_string(), resource);
        self
    }

    /// Build the snapshot.
    pub fn build(self) -> Snapshot {
        Snapshot {
            version: self.version,
            resources: self.resources,
            created_at: Instant::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::any::Any;
    use std::sync::Arc;
    use switchyard_core::{encode_json, Resource};

    #[derive(Debug, serde::Serialize)]
    struct Stub {
        name: String,
        type_url: &'static str,
    }

    impl Resource for Stub {
        fn type_url(&self) -> &str {
            self.type_url
        }

        fn name(&self) -> &str {
            &self.name
        }

        fn encode(&self) -> Result<prost_types::Any, Box<dyn std::error::Error + Send + Sync>> {
            encode_json(self.type_url, self)
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn stub(name: &str, type_url: &'static str) -> BoxResource {
        Arc::new(Stub {
            name: name.to_string(),
            type_url,
        })
    }

    #[test]
    fn snapshot_builder_basic() {
        let snapshot = Snapshot::builder().version("v1").build();
        assert_eq!(snapshot.version(), "v1");
        assert!(snapshot.is_empty());
    }

    #[test]
    fn snapshot_typed_accessors() {
        let snapshot = Snapshot::builder()
            .version("v2")
            .resources(
                TypeUrl::new(TypeUrl::CLUSTER),
                vec![stub("b", TypeUrl::CLUSTER), stub("a", TypeUrl::CLUSTER)],
            )
            .resource(stub("public", TypeUrl::LISTENER))
            .build();

        let clusters = snapshot.clusters().unwrap();
        let names: Vec<_> = clusters.names().cloned().collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(snapshot.listeners().unwrap().len(), 1);
        assert!(snapshot.routes().is_none());
        assert_eq!(snapshot.total_resources(), 3);
    }

    #[test]
    fn snapshot_resources_replace() {
        let snapshot = Snapshot::builder()
            .resources(TypeUrl::new(TypeUrl::CLUSTER), vec![stub("a", TypeUrl::CLUSTER)])
            .resources(TypeUrl::new(TypeUrl::CLUSTER), vec![])
            .build();
        assert!(snapshot.contains_type(&TypeUrl::new(TypeUrl::CLUSTER)));
        assert!(snapshot.is_empty());
    }
}
