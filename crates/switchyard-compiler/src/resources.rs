//! Snapshot resources and the full compile pass.

use std::any::Any;
use std::sync::Arc;

use switchyard_core::{encode_json, BoxResource, Cluster, Listener, Resource, Route, TypeUrl};

use crate::cluster::{compile_clusters, CompiledCluster};
use crate::listener::{compile_listeners, CompiledListener};
use crate::route_config::{compile_route_configurations, RouteConfiguration};

macro_rules! impl_resource {
    ($ty:ty, $type_url:expr) => {
        impl Resource for $ty {
            fn type_url(&self) -> &str {
                $type_url
            }

            fn name(&self) -> &str {
                &self.name
            }

            fn encode(
                &self,
            ) -> Result<prost_types::Any, Box<dyn std::error::Error + Send + Sync>> {
                encode_json(self.type_url(), self)
            }

            fn as_any(&self) -> &dyn Any {
                self
            }
        }
    };
}

impl_resource!(CompiledCluster, TypeUrl::CLUSTER);
impl_resource!(RouteConfiguration, TypeUrl::ROUTE);
impl_resource!(CompiledListener, TypeUrl::LISTENER);

/// Everything compiled from one view of the entity collections.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompiledConfig {
    /// One per stored cluster.
    pub clusters: Vec<CompiledCluster>,
    /// One per route group served by a listener.
    pub route_configurations: Vec<RouteConfiguration>,
    /// One per stored listener.
    pub listeners: Vec<CompiledListener>,
}

impl CompiledConfig {
    /// Clusters as snapshot resources.
    pub fn cluster_resources(&self) -> Vec<BoxResource> {
        boxed(&self.clusters)
    }

    /// Route configurations as snapshot resources.
    pub fn route_resources(&self) -> Vec<BoxResource> {
        boxed(&self.route_configurations)
    }

    /// Listeners as snapshot resources.
    pub fn listener_resources(&self) -> Vec<BoxResource> {
        boxed(&self.listeners)
    }

    /// Total number of compiled resources.
    pub fn len(&self) -> usize {
        self.clusters.len() + self.route_configurations.len() + self.listeners.len()
    }

    /// Whether nothing was compiled.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn boxed<T: Resource + Clone + 'static>(items: &[T]) -> Vec<BoxResource> {
    items
        .iter()
        .map(|item| Arc::new(item.clone()) as BoxResource)
        .collect()
}

/// Compile clusters, route configurations and listeners.
pub fn compile(listeners: &[Listener], routes: &[Route], clusters: &[Cluster]) -> CompiledConfig {
    CompiledConfig {
        clusters: compile_clusters(clusters),
        route_configurations: compile_route_configurations(listeners, routes),
        listeners: compile_listeners(listeners, routes),
    }
}
