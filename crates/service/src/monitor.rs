//! Backend reachability monitor
//!
//! A background task probes the registry on a fixed interval and records
//! the last success. Readiness is "a probe succeeded within the freshness
//! window": it flips false when the backend goes away and flips back on
//! the next successful probe, without ever crashing the process.

use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::{interval, timeout};
use tracing::{debug, info, warn};

use message_relay_core::health::ComponentHealth;

use crate::registry::ConnectionRegistry;

/// How often the backend is probed.
pub const PROBE_INTERVAL: Duration = Duration::from_secs(15);

/// How recent the last successful probe must be for the service to report
/// ready: three probe intervals.
pub const FRESHNESS_WINDOW: Duration = Duration::from_secs(45);

/// Upper bound on a single probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

pub struct BackendMonitor {
    last_success: RwLock<Option<Instant>>,
    probe_interval: Duration,
    freshness_window: Duration,
}

impl BackendMonitor {
    pub fn new() -> Self {
        Self::with_intervals(PROBE_INTERVAL, FRESHNESS_WINDOW)
    }

    pub fn with_intervals(probe_interval: Duration, freshness_window: Duration) -> Self {
        Self {
            last_success: RwLock::new(None),
            probe_interval,
            freshness_window,
        }
    }

    /// Record a successful reachability probe.
    pub fn record_success(&self) {
        *self.last_success.write() = Some(Instant::now());
    }

    /// Whether the most recent successful probe is within the freshness
    /// window. Never ready before the first success.
    pub fn is_ready(&self) -> bool {
        (*self.last_success.read())
            .map(|at| at.elapsed() <= self.freshness_window)
            .unwrap_or(false)
    }

    /// Component view of the backend probe, for readiness aggregation.
    pub fn component_health(&self) -> ComponentHealth {
        if self.is_ready() {
            ComponentHealth::healthy("backend", true)
        } else {
            ComponentHealth::unhealthy(
                "backend",
                true,
                "no successful reachability probe within the freshness window",
            )
        }
    }

    /// Probe loop. Runs until the shutdown future completes.
    pub async fn run(
        self: Arc<Self>,
        registry: Arc<dyn ConnectionRegistry>,
        shutdown: impl std::future::Future<Output = ()>,
    ) {
        let probes = async {
            let mut ticker = interval(self.probe_interval);
            loop {
                ticker.tick().await;
                match timeout(PROBE_TIMEOUT, registry.ping()).await {
                    Ok(Ok(())) => {
                        self.record_success();
                        debug!(backend = registry.backend_name(), "backend probe ok");
                    }
                    Ok(Err(e)) => {
                        warn!(
                            backend = registry.backend_name(),
                            error = %e,
                            "backend probe failed"
                        );
                    }
                    Err(_) => {
                        warn!(
                            backend = registry.backend_name(),
                            "backend probe timed out"
                        );
                    }
                }
            }
        };

        tokio::select! {
            _ = probes => {}
            _ = shutdown => {
                info!("backend monitor stopping");
            }
        }
    }
}

impl Default for BackendMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::InMemoryRegistry;
    use tokio::time::sleep;

    #[test]
    fn test_not_ready_before_first_probe() {
        let monitor = BackendMonitor::new();
        assert!(!monitor.is_ready());
    }

    #[test]
    fn test_ready_after_success() {
        let monitor = BackendMonitor::new();
        monitor.record_success();
        assert!(monitor.is_ready());
    }

    #[test]
    fn test_component_health_follows_probe_state() {
        let monitor = BackendMonitor::new();
        let health = monitor.component_health();
        assert!(!health.is_ready());
        assert!(health.critical);

        monitor.record_success();
        assert!(monitor.component_health().is_ready());
    }

    #[tokio::test]
    async fn test_readiness_goes_stale_past_window() {
        let monitor =
            BackendMonitor::with_intervals(Duration::from_millis(10), Duration::from_millis(20));
        monitor.record_success();
        assert!(monitor.is_ready());

        sleep(Duration::from_millis(50)).await;
        assert!(!monitor.is_ready());
    }

    #[tokio::test]
    async fn test_probe_loop_marks_ready_and_stops_on_shutdown() {
        let monitor = Arc::new(BackendMonitor::with_intervals(
            Duration::from_millis(10),
            Duration::from_secs(5),
        ));
        let registry: Arc<dyn ConnectionRegistry> = Arc::new(InMemoryRegistry::default());

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let task = tokio::spawn(monitor.clone().run(registry, async {
            let _ = rx.await;
        }));

        sleep(Duration::from_millis(50)).await;
        assert!(monitor.is_ready());

        let _ = tx.send(());
        let _ = tokio::time::timeout(Duration::from_secs(1), task).await;
    }
}
