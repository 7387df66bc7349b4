//! Dispatch seam between the socket layer and the service

use crate::error::MatchmakingError;
use crate::types::{ClientMessage, ConnectionId};
use async_trait::async_trait;

/// Trait defining the interface for handling client frames
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handle a decoded message from a live connection
    async fn handle_client_message(&self, from: ConnectionId, message: ClientMessage);

    /// Handle the end of a connection, whatever the cause
    async fn handle_disconnect(&self, connection_id: ConnectionId);

    /// Handle a frame that failed validation
    async fn handle_error(&self, connection_id: ConnectionId, error: MatchmakingError, raw: &str);
}
