//! gRPC health checking (`grpc.health.v1.Health`) backed by `tonic-health`.
//!
//! The control plane reports `NOT_SERVING` until the first snapshot exists.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tonic_health::pb::health_server::{Health, HealthServer};
use tonic_health::server::HealthReporter;
use tonic_health::ServingStatus;

/// Service name reported alongside the overall (`""`) status.
pub const SERVICE_NAME: &str = "switchyard";

/// Health status handle.
#[derive(Clone)]
pub struct HealthService {
    reporter: Arc<Mutex<HealthReporter>>,
    serving: Arc<AtomicBool>,
}

impl std::fmt::Debug for HealthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthService")
            .field("serving", &self.is_serving())
            .finish()
    }
}

impl HealthService {
    /// Create the handle and the tonic service to mount on a router.
    pub fn new() -> (Self, HealthServer<impl Health>) {
        let (reporter, service) = tonic_health::server::health_reporter();
        let wrapper = Self {
            reporter: Arc::new(Mutex::new(reporter)),
            serving: Arc::new(AtomicBool::new(false)),
        };
        (wrapper, service)
    }

    /// Report the control plane as serving.
    pub async fn set_serving(&self) {
        self.set_status(ServingStatus::Serving).await;
    }

    /// Report the control plane as not serving.
    pub async fn set_not_serving(&self) {
        self.set_status(ServingStatus::NotServing).await;
    }

    /// Whether the last reported status was `SERVING`.
    pub fn is_serving(&self) -> bool {
        self.serving.load(Ordering::SeqCst)
    }

    async fn set_status(&self, status: ServingStatus) {
        self.serving
            .store(status == ServingStatus::Serving, Ordering::SeqCst);
        let mut reporter = self.reporter.lock().await;
        for service in ["", SERVICE_NAME] {
            reporter.set_service_status(service, status).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn health_status_transitions() {
        let (health, _server) = HealthService::new();
        assert!(!health.is_serving());

        health.set_serving().await;
        assert!(health.is_serving());

        let clone = health.clone();
        clone.set_not_serving().await;
        assert!(!health.is_serving());
    }
}
