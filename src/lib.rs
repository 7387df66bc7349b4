//! Duet - Matchmaking and signaling relay for anonymous one-to-one video
//!
//! This crate pairs anonymous WebSocket connections through a FIFO queue and a
//! two-phase propose/accept protocol, then relays WebRTC negotiation messages
//! between confirmed partners.

pub mod config;
pub mod error;
pub mod matchmaking;
pub mod metrics;
pub mod registry;
pub mod relay;
pub mod service;
pub mod transport;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{MatchmakingError, Result};
pub use types::*;

// Re-export key components
pub use matchmaking::{MatchmakingEngine, MatchmakingStats, PartnerDirectory};
pub use registry::{ConnectionRegistry, InMemoryConnectionRegistry};
pub use relay::{RelayOutcome, SignalingRelay};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
