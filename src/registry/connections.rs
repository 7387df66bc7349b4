//! Live-connection table and outbound event delivery

use crate::error::{MatchmakingError, Result};
use crate::types::{ConnectionId, ServerEvent};
use std::collections::HashMap;
use std::sync::RwLock;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

/// Source of truth for connection reachability
#[cfg_attr(test, mockall::automock)]
pub trait ConnectionRegistry: Send + Sync {
    /// Whether the connection is currently reachable
    fn is_live(&self, id: &ConnectionId) -> bool;

    /// Deliver an event to a connection
    ///
    /// Delivery is fire-and-forget; an error only means the connection is gone.
    fn send(&self, id: &ConnectionId, event: ServerEvent) -> Result<()>;

    /// Number of live connections
    fn live_count(&self) -> usize;
}

/// Registry backed by one unbounded channel per connection
///
/// The transport drains each receiver into its socket, so `send` never blocks.
#[derive(Debug, Default)]
pub struct InMemoryConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, UnboundedSender<ServerEvent>>>,
}

impl InMemoryConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection with a fresh id
    pub fn register(&self) -> Result<(ConnectionId, UnboundedReceiver<ServerEvent>)> {
        let id = crate::utils::generate_connection_id();
        let receiver = self.register_with_id(id)?;
        Ok((id, receiver))
    }

    /// Register a connection under a caller-chosen id
    pub fn register_with_id(&self, id: ConnectionId) -> Result<UnboundedReceiver<ServerEvent>> {
        let (sender, receiver) = mpsc::unbounded_channel();

        let mut connections =
            self.connections
                .write()
                .map_err(|_| MatchmakingError::InternalError {
                    message: "Failed to acquire connections lock".to_string(),
                })?;

        if connections.insert(id, sender).is_some() {
            warn!("Connection {} was already registered, replacing channel", id);
        }

        info!(
            "Connection registered - id: {}, live: {}",
            id,
            connections.len()
        );
        Ok(receiver)
    }

    /// Remove a connection; a no-op if it is already gone
    pub fn unregister(&self, id: &ConnectionId) {
        match self.connections.write() {
            Ok(mut connections) => {
                if connections.remove(id).is_some() {
                    info!(
                        "Connection unregistered - id: {}, live: {}",
                        id,
                        connections.len()
                    );
                }
            }
            Err(_) => warn!("Failed to acquire connections lock while unregistering {}", id),
        }
    }
}

impl ConnectionRegistry for InMemoryConnectionRegistry {
    fn is_live(&self, id: &ConnectionId) -> bool {
        self.connections
            .read()
            .map(|connections| {
                connections
                    .get(id)
                    .map(|sender| !sender.is_closed())
                    .unwrap_or(false)
            })
            .unwrap_or(false)
    }

    fn send(&self, id: &ConnectionId, event: ServerEvent) -> Result<()> {
        let connections =
            self.connections
                .read()
                .map_err(|_| MatchmakingError::InternalError {
                    message: "Failed to acquire connections lock".to_string(),
                })?;

        let sender = connections
            .get(id)
            .ok_or_else(|| MatchmakingError::ConnectionUnavailable {
                connection_id: id.to_string(),
            })?;

        let event_name = event.name();
        sender
            .send(event)
            .map_err(|_| MatchmakingError::ConnectionUnavailable {
                connection_id: id.to_string(),
            })?;

        debug!("Queued '{}' for connection {}", event_name, id);
        Ok(())
    }

    fn live_count(&self) -> usize {
        self.connections
            .read()
            .map(|connections| connections.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_send() {
        let registry = InMemoryConnectionRegistry::new();
        let (id, mut receiver) = registry.register().unwrap();

        assert!(registry.is_live(&id));
        assert_eq!(registry.live_count(), 1);

        registry.send(&id, ServerEvent::MatchRejected).unwrap();
        assert_eq!(receiver.try_recv().unwrap(), ServerEvent::MatchRejected);
    }

    #[test]
    fn test_unregister_makes_connection_unreachable() {
        let registry = InMemoryConnectionRegistry::new();
        let (id, _receiver) = registry.register().unwrap();

        registry.unregister(&id);
        assert!(!registry.is_live(&id));
        assert!(registry.send(&id, ServerEvent::MatchRejected).is_err());

        // Second unregister is a no-op
        registry.unregister(&id);
        assert_eq!(registry.live_count(), 0);
    }

    #[test]
    fn test_dropped_receiver_is_not_live() {
        let registry = InMemoryConnectionRegistry::new();
        let (id, receiver) = registry.register().unwrap();

        drop(receiver);
        assert!(!registry.is_live(&id));
        assert!(registry.send(&id, ServerEvent::MatchRejected).is_err());
    }

    #[test]
    fn test_unknown_connection_is_not_live() {
        let registry = InMemoryConnectionRegistry::new();
        assert!(!registry.is_live(&ConnectionId::new()));
    }
}
