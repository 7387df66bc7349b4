//! Forwarding of offers, answers and network candidates
//!
//! The relay never keeps state of its own. It trusts only the partner
//! directory published by the matchmaking engine, and every failure mode
//! degrades to a silent drop.

use crate::matchmaking::partners::PartnerDirectory;
use crate::metrics::MetricsCollector;
use crate::registry::ConnectionRegistry;
use crate::types::{ConnectionId, ServerEvent, SignalKind};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// What happened to a relayed message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Handed to the target's connection
    Delivered,
    /// Sender has no partner, or the target is not that partner
    Unauthorized,
    /// Target is the partner but is no longer reachable
    Unreachable,
}

impl RelayOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelayOutcome::Delivered => "delivered",
            RelayOutcome::Unauthorized => "unauthorized",
            RelayOutcome::Unreachable => "unreachable",
        }
    }
}

/// Relay for session-negotiation messages
#[derive(Clone)]
pub struct SignalingRelay {
    partners: Arc<PartnerDirectory>,
    registry: Arc<dyn ConnectionRegistry>,
    metrics_collector: Arc<MetricsCollector>,
}

impl SignalingRelay {
    pub fn new(
        partners: Arc<PartnerDirectory>,
        registry: Arc<dyn ConnectionRegistry>,
        metrics_collector: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            partners,
            registry,
            metrics_collector,
        }
    }

    /// Forward a message from `sender` to `target`, tagged with the sender id
    pub fn forward(
        &self,
        sender: ConnectionId,
        target: ConnectionId,
        kind: SignalKind,
        payload: Value,
    ) -> RelayOutcome {
        let outcome = self.try_forward(sender, target, kind, payload);
        self.metrics_collector
            .record_signal(kind.as_str(), outcome.as_str());
        outcome
    }

    fn try_forward(
        &self,
        sender: ConnectionId,
        target: ConnectionId,
        kind: SignalKind,
        payload: Value,
    ) -> RelayOutcome {
        match self.partners.partner_of(&sender) {
            Some(partner) if partner == target => {}
            Some(partner) => {
                debug!(
                    "Dropping {} from {}: target {} is not its partner {}",
                    kind, sender, target, partner
                );
                return RelayOutcome::Unauthorized;
            }
            None => {
                debug!("Dropping {} from {}: not matched", kind, sender);
                return RelayOutcome::Unauthorized;
            }
        }

        if !self.registry.is_live(&target) {
            debug!("Dropping {} from {}: {} is gone", kind, sender, target);
            return RelayOutcome::Unreachable;
        }

        match self
            .registry
            .send(&target, ServerEvent::signal(kind, sender, payload))
        {
            Ok(()) => {
                debug!("Relayed {} {} -> {}", kind, sender, target);
                RelayOutcome::Delivered
            }
            Err(e) => {
                debug!("Dropping {} from {} to {}: {}", kind, sender, target, e);
                RelayOutcome::Unreachable
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MatchmakingError;
    use crate::registry::connections::MockConnectionRegistry;
    use serde_json::json;

    fn create_relay(
        registry: MockConnectionRegistry,
    ) -> (SignalingRelay, Arc<PartnerDirectory>) {
        let partners = Arc::new(PartnerDirectory::new());
        let relay = SignalingRelay::new(
            partners.clone(),
            Arc::new(registry),
            Arc::new(MetricsCollector::new().unwrap()),
        );
        (relay, partners)
    }

    #[test]
    fn test_forward_to_partner() {
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        let payload = json!({"type": "offer", "sdp": "v=0"});

        let mut registry = MockConnectionRegistry::new();
        registry.expect_is_live().returning(|_| true);
        let expected = ServerEvent::signal(SignalKind::Offer, a, payload.clone());
        registry
            .expect_send()
            .withf(move |to, event| *to == b && *event == expected)
            .times(1)
            .returning(|_, _| Ok(()));

        let (relay, partners) = create_relay(registry);
        partners.publish(a, b);

        assert_eq!(
            relay.forward(a, b, SignalKind::Offer, payload),
            RelayOutcome::Delivered
        );
    }

    #[test]
    fn test_unmatched_sender_is_dropped() {
        let mut registry = MockConnectionRegistry::new();
        registry.expect_send().never();

        let (relay, _partners) = create_relay(registry);
        let outcome = relay.forward(
            ConnectionId::new(),
            ConnectionId::new(),
            SignalKind::Candidate,
            Value::Null,
        );
        assert_eq!(outcome, RelayOutcome::Unauthorized);
    }

    #[test]
    fn test_wrong_target_is_dropped() {
        let a = ConnectionId::new();
        let b = ConnectionId::new();

        let mut registry = MockConnectionRegistry::new();
        registry.expect_send().never();

        let (relay, partners) = create_relay(registry);
        partners.publish(a, b);

        let outcome = relay.forward(a, ConnectionId::new(), SignalKind::Answer, Value::Null);
        assert_eq!(outcome, RelayOutcome::Unauthorized);
    }

    #[test]
    fn test_dead_partner_is_dropped() {
        let a = ConnectionId::new();
        let b = ConnectionId::new();

        let mut registry = MockConnectionRegistry::new();
        registry.expect_is_live().returning(|_| false);
        registry.expect_send().never();

        let (relay, partners) = create_relay(registry);
        partners.publish(a, b);

        assert_eq!(
            relay.forward(a, b, SignalKind::Offer, Value::Null),
            RelayOutcome::Unreachable
        );
    }

    #[test]
    fn test_send_failure_is_swallowed() {
        let a = ConnectionId::new();
        let b = ConnectionId::new();

        let mut registry = MockConnectionRegistry::new();
        registry.expect_is_live().returning(|_| true);
        registry.expect_send().returning(|to, _| {
            Err(MatchmakingError::ConnectionUnavailable {
                connection_id: to.to_string(),
            }
            .into())
        });

        let (relay, partners) = create_relay(registry);
        partners.publish(a, b);

        assert_eq!(
            relay.forward(b, a, SignalKind::Candidate, Value::Null),
            RelayOutcome::Unreachable
        );
    }
}
