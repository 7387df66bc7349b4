//! Error types for the matchmaking service
//!
//! This module defines all error types using anyhow for consistent error handling
//! throughout the application.

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Custom error types for specific matchmaking scenarios
#[derive(Debug, thiserror::Error)]
pub enum MatchmakingError {
    #[error("Connection unavailable: {connection_id}")]
    ConnectionUnavailable { connection_id: String },

    #[error("Invalid client message: {reason}")]
    InvalidClientMessage { reason: String },

    #[error("Invariant violated: {message}")]
    InvariantViolation { message: String },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Internal service error: {message}")]
    InternalError { message: String },
}
