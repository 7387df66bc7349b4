//! Client transport for the signaling service
//!
//! This module owns the WebSocket endpoint, the JSON wire format and the
//! handler seam that routes decoded frames into the service.

pub mod handlers;
pub mod messages;
pub mod socket;

// Re-export commonly used types
pub use handlers::MessageHandler;
pub use messages::*;
pub use socket::{SignalingServer, SignalingServerConfig, SignalingState};
