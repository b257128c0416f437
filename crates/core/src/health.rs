//! Health primitives for the relay service
//!
//! Liveness is intentionally trivial: the process is healthy once it is
//! listening. Readiness aggregates per-component checks, principally the
//! registry backend reachability probe; only a critical component failing
//! takes readiness down.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Health status levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    /// A non-critical component is failing; traffic is still served.
    Degraded,
    /// A critical component is failing.
    Unhealthy,
}

impl HealthStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, HealthStatus::Healthy | HealthStatus::Degraded)
    }

    pub fn http_status_code(&self) -> u16 {
        match self {
            HealthStatus::Healthy | HealthStatus::Degraded => 200,
            HealthStatus::Unhealthy => 503,
        }
    }
}

/// Result of checking a single component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Critical components gate readiness; non-critical ones only degrade.
    pub critical: bool,
}

impl ComponentHealth {
    pub fn healthy(name: impl Into<String>, critical: bool) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Healthy,
            message: None,
            critical,
        }
    }

    pub fn unhealthy(name: impl Into<String>, critical: bool, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Unhealthy,
            message: Some(message.into()),
            critical,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status.is_ready()
    }
}

/// Service-wide readiness rollup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedHealth {
    pub status: HealthStatus,
    pub components: Vec<ComponentHealth>,
    pub version: String,
    pub timestamp: DateTime<Utc>,
}

impl AggregatedHealth {
    /// Roll component results up into one status: any critical failure is
    /// unhealthy, any failure at all degrades.
    pub fn from_components(components: Vec<ComponentHealth>) -> Self {
        let any_critical_down = components
            .iter()
            .any(|c| c.critical && c.status == HealthStatus::Unhealthy);
        let any_down = components.iter().any(|c| c.status != HealthStatus::Healthy);

        let status = if any_critical_down {
            HealthStatus::Unhealthy
        } else if any_down {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        Self {
            status,
            components,
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status.is_ready()
    }

    pub fn http_status_code(&self) -> u16 {
        self.status.http_status_code()
    }
}
