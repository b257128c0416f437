//! Graceful shutdown coordinator
//!
//! Listens for SIGTERM/SIGINT, runs registered drain callbacks (the relay
//! uses one to push a shutdown notice to every open WebSocket session),
//! then fans a shutdown signal out over a broadcast channel. The whole
//! sequence is bounded by a hard deadline; whoever drives the server loop
//! stops waiting once the deadline passes, so the process exits regardless
//! of in-flight work.

use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::sleep;
use tracing::{info, warn};

/// Default time given to drain callbacks and shutdown notices (1 second)
const DEFAULT_DRAIN_TIMEOUT_MS: u64 = 1_000;

/// Default hard deadline for the whole shutdown sequence (10 seconds)
const DEFAULT_DEADLINE_MS: u64 = 10_000;

/// Configuration for shutdown behavior
#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// Pause after notifying sessions, letting notices flush before sockets
    /// start closing
    pub drain_timeout: Duration,

    /// Hard deadline for the whole shutdown sequence; past it the process
    /// exits regardless of in-flight work
    pub deadline: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout: Duration::from_millis(DEFAULT_DRAIN_TIMEOUT_MS),
            deadline: Duration::from_millis(DEFAULT_DEADLINE_MS),
        }
    }
}

impl ShutdownConfig {
    pub fn new(drain_timeout: Duration, deadline: Duration) -> Self {
        Self {
            drain_timeout,
            deadline,
        }
    }

    /// A fast configuration for tests (100 ms per phase).
    pub fn fast() -> Self {
        Self {
            drain_timeout: Duration::from_millis(100),
            deadline: Duration::from_millis(100),
        }
    }
}

/// Shutdown coordinator
///
/// One instance per process, constructed in `main` and shared by reference
/// with the server bootstrap. Callbacks registered via [`on_shutdown`] run
/// in the drain phase, before the broadcast signal is sent.
///
/// [`on_shutdown`]: ShutdownCoordinator::on_shutdown
pub struct ShutdownCoordinator {
    config: ShutdownConfig,
    shutdown_tx: broadcast::Sender<()>,
    callbacks: Mutex<Vec<Box<dyn Fn() + Send + Sync>>>,
}

impl ShutdownCoordinator {
    pub fn new(config: ShutdownConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(16);
        Self {
            config,
            shutdown_tx,
            callbacks: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &ShutdownConfig {
        &self.config
    }

    /// Register a callback to be executed in the drain phase.
    pub fn on_shutdown<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.callbacks
            .lock()
            .expect("shutdown callback lock poisoned")
            .push(Box::new(callback));
    }

    /// Create a future that completes when shutdown has been signaled.
    pub fn create_shutdown_signal(&self) -> impl std::future::Future<Output = ()> {
        let mut rx = self.shutdown_tx.subscribe();
        async move {
            let _ = rx.recv().await;
        }
    }

    /// Wait for SIGTERM/SIGINT, then run the drain sequence.
    pub async fn wait_for_signal(&self) {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            let mut sigterm =
                signal(SignalKind::terminate()).expect("Failed to register SIGTERM handler");
            let mut sigint =
                signal(SignalKind::interrupt()).expect("Failed to register SIGINT handler");

            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, initiating graceful shutdown");
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, initiating graceful shutdown");
                }
            }
        }

        #[cfg(not(unix))]
        {
            tokio::signal::ctrl_c()
                .await
                .expect("Failed to register Ctrl+C handler");
            info!("Received Ctrl+C, initiating graceful shutdown");
        }

        self.begin_shutdown().await;
    }

    /// Run drain callbacks, broadcast the shutdown signal, and give the
    /// drain timeout for notices to flush.
    pub async fn begin_shutdown(&self) {
        info!(
            drain_ms = self.config.drain_timeout.as_millis() as u64,
            deadline_ms = self.config.deadline.as_millis() as u64,
            "Entering shutdown drain phase"
        );

        {
            let callbacks = self
                .callbacks
                .lock()
                .expect("shutdown callback lock poisoned");
            for callback in callbacks.iter() {
                callback();
            }
        }

        if self.shutdown_tx.send(()).is_err() {
            warn!("No shutdown listeners registered");
        }

        sleep(self.config.drain_timeout).await;
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new(ShutdownConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tokio::time::timeout;

    #[test]
    fn test_shutdown_config_default() {
        let config = ShutdownConfig::default();
        assert_eq!(
            config.drain_timeout,
            Duration::from_millis(DEFAULT_DRAIN_TIMEOUT_MS)
        );
        assert_eq!(config.deadline, Duration::from_millis(DEFAULT_DEADLINE_MS));
    }

    #[test]
    fn test_shutdown_config_new() {
        let config = ShutdownConfig::new(Duration::from_secs(2), Duration::from_secs(5));
        assert_eq!(config.drain_timeout, Duration::from_secs(2));
        assert_eq!(config.deadline, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_shutdown_signal_fires_on_begin() {
        let coordinator = ShutdownCoordinator::new(ShutdownConfig::fast());
        let signal = coordinator.create_shutdown_signal();

        coordinator.begin_shutdown().await;

        let result = timeout(Duration::from_millis(100), signal).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_drain_callbacks_run_before_signal() {
        let coordinator = ShutdownCoordinator::new(ShutdownConfig::fast());
        let called = Arc::new(AtomicBool::new(false));
        let called_clone = Arc::clone(&called);

        coordinator.on_shutdown(move || {
            called_clone.store(true, Ordering::SeqCst);
        });

        coordinator.begin_shutdown().await;
        assert!(called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_multiple_subscribers_all_notified() {
        let coordinator = ShutdownCoordinator::new(ShutdownConfig::fast());
        let first = coordinator.create_shutdown_signal();
        let second = coordinator.create_shutdown_signal();

        coordinator.begin_shutdown().await;

        assert!(timeout(Duration::from_millis(100), first).await.is_ok());
        assert!(timeout(Duration::from_millis(100), second).await.is_ok());
    }
}
