//! Shutdown coordination.
//!
//! One [`ShutdownController`] is shared by every long-running task of the
//! control plane. Each loop selects on a [`ShutdownSignal`]; work that must
//! finish before the process exits holds an [`OperationGuard`].
//!
//! # Example
//!
//! ```rust
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! use std::time::Duration;
//! use switchyard_server::ShutdownController;
//!
//! let controller = ShutdownController::new();
//! let signal = controller.shutdown_signal();
//!
//! let task = tokio::spawn(async move { signal.wait().await });
//! assert!(controller.shutdown(Duration::from_secs(1)).await);
//! task.await.unwrap();
//! # }
//! ```

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{error, info, warn};

/// Controller for coordinating graceful shutdown.
#[derive(Debug, Clone)]
pub struct ShutdownController {
    inner: Arc<ShutdownInner>,
}

#[derive(Debug)]
struct ShutdownInner {
    initiated: AtomicBool,
    tx: watch::Sender<bool>,
    rx: watch::Receiver<bool>,
    active_ops: AtomicUsize,
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownController {
    /// Create a new shutdown controller.
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            inner: Arc::new(ShutdownInner {
                initiated: AtomicBool::new(false),
                tx,
                rx,
                active_ops: AtomicUsize::new(0),
            }),
        }
    }

    /// Check if shutdown has been initiated.
    pub fn is_shutdown(&self) -> bool {
        self.inner.initiated.load(Ordering::SeqCst)
    }

    /// Get a future that resolves when shutdown is initiated.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.inner.rx.clone(),
        }
    }

    /// Initiate shutdown and wait up to `grace_period` for registered
    /// operations to finish.
    ///
    /// Returns `true` if all operations completed, `false` if timed out.
    pub async fn shutdown(&self, grace_period: Duration) -> bool {
        if self
            .inner
            .initiated
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return true;
        }

        info!(grace_period_ms = grace_period.as_millis() as u64, "initiating shutdown");
        let _ = self.inner.tx.send(true);

        match timeout(grace_period, self.wait_for_completion()).await {
            Ok(()) => {
                info!("shutdown completed");
                true
            }
            Err(_) => {
                warn!(
                    remaining_ops = self.active_operations(),
                    "shutdown timed out with operations in flight"
                );
                false
            }
        }
    }

    async fn wait_for_completion(&self) {
        while self.active_operations() > 0 {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Register an operation that shutdown should wait for.
    pub fn register_operation(&self) -> OperationGuard {
        self.inner.active_ops.fetch_add(1, Ordering::SeqCst);
        OperationGuard {
            controller: self.clone(),
        }
    }

    /// Get the number of active operations.
    pub fn active_operations(&self) -> usize {
        self.inner.active_ops.load(Ordering::SeqCst)
    }
}

/// Guard for tracking an active operation.
///
/// Decrements the active operation counter when dropped.
#[derive(Debug)]
pub struct OperationGuard {
    controller: ShutdownController,
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        self.controller.inner.active_ops.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Future that resolves when shutdown is initiated.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Wait for the shutdown signal.
    pub async fn wait(mut self) {
        loop {
            if *self.rx.borrow() {
                return;
            }
            // A dropped controller counts as shutdown.
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Wait for SIGTERM or SIGINT (Ctrl+C elsewhere).
///
/// If no handler can be installed the error is logged and this never
/// resolves, leaving shutdown to other triggers.
pub async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(term), Ok(int)) => (term, int),
                (Err(e), _) | (_, Err(e)) => {
                    error!(error = %e, "cannot install signal handlers");
                    return std::future::pending().await;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM"),
            _ = sigint.recv() => info!("received SIGINT"),
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "cannot install Ctrl+C handler");
            return std::future::pending().await;
        }
        info!("received Ctrl+C");
    }
}
