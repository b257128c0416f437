//! Broadcast router
//!
//! Resolves a `sendMessage` to a target connection: the registry names the
//! candidates for the opposite role, the local socket table decides which
//! of them can actually be delivered to. Registry entries with no live
//! local socket are stale and are reconciled on the way through rather
//! than surfaced to the sender.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::protocol::{DeliveredMessage, Role};
use crate::registry::ConnectionRegistry;
use crate::sessions::{Outbound, SessionTable};

/// How many recipients a single message reaches.
///
/// `FirstSuccess` matches the deployed semantics: delivery stops at the
/// first live connection of the opposite role. `FanOut` delivers to every
/// live connection; substituting it touches nothing but the constructor
/// call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryPolicy {
    FirstSuccess,
    FanOut,
}

/// Outcome reported back to the sender. Zero recipients is not an error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub success_count: u32,
    pub failure_count: u32,
}

pub struct BroadcastRouter {
    registry: Arc<dyn ConnectionRegistry>,
    sessions: Arc<SessionTable>,
    policy: DeliveryPolicy,
}

impl BroadcastRouter {
    pub fn new(
        registry: Arc<dyn ConnectionRegistry>,
        sessions: Arc<SessionTable>,
        policy: DeliveryPolicy,
    ) -> Self {
        Self {
            registry,
            sessions,
            policy,
        }
    }

    pub fn policy(&self) -> DeliveryPolicy {
        self.policy
    }

    /// Deliver `content` from the given sender to the opposite role.
    ///
    /// Candidates are taken in registry order and tried sequentially; fan-
    /// out is never parallelized, bounding per-message latency. A lookup
    /// failure against the registry is treated as "no recipients found",
    /// not retried here.
    pub async fn route(
        &self,
        sender_id: &str,
        sender_role: Role,
        content: &str,
    ) -> DeliveryReport {
        let target_role = sender_role.opposite();

        let candidates = match self.registry.list_by_role(target_role).await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(
                    target_role = %target_role,
                    error = %e,
                    "recipient lookup failed, treating as no recipients"
                );
                Vec::new()
            }
        };

        let frame = DeliveredMessage {
            content: content.to_string(),
            from: sender_role,
            connection_id: sender_id.to_string(),
            timestamp: Utc::now(),
        };
        let payload = match serde_json::to_string(&frame) {
            Ok(payload) => payload,
            Err(e) => {
                error!(error = %e, "failed to serialize delivery frame");
                return DeliveryReport::default();
            }
        };

        let mut report = DeliveryReport::default();
        for id in candidates {
            let delivered = match self.sessions.get(&id) {
                Some(handle) => handle.sender.try_send(Outbound(payload.clone())).is_ok(),
                None => false,
            };

            if delivered {
                report.success_count += 1;
                self.sessions.record_relayed(1);
                debug!(recipient = %id, sender = %sender_id, "message delivered");
                if self.policy == DeliveryPolicy::FirstSuccess {
                    break;
                }
            } else {
                report.failure_count += 1;
                self.reconcile_stale(&id).await;
            }
        }

        if report.success_count == 0 {
            debug!(
                sender = %sender_id,
                target_role = %target_role,
                "no live recipients for message"
            );
        }
        report
    }

    /// A registry entry with no live local socket: drop it from both views
    /// and move on. Not an error from the sender's perspective.
    async fn reconcile_stale(&self, id: &str) {
        self.sessions.remove(id);
        if let Err(e) = self.registry.unregister(id).await {
            warn!(id = %id, error = %e, "failed to unregister stale recipient");
        } else {
            debug!(id = %id, "unregistered stale recipient");
        }
    }
}
