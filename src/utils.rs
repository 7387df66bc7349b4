//! Utility functions for the matchmaking service

use crate::types::ConnectionId;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Generate a new unique connection ID
pub fn generate_connection_id() -> ConnectionId {
    ConnectionId::new()
}

/// Get the current UTC timestamp
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Check whether a timestamp is older than the given age
pub fn is_older_than(timestamp: DateTime<Utc>, now: DateTime<Utc>, max_age: Duration) -> bool {
    match chrono::Duration::from_std(max_age) {
        Ok(max_age) => now.signed_duration_since(timestamp) > max_age,
        // Ages beyond chrono's range never elapse
        Err(_) => false,
    }
}

/// Format a duration as fractional milliseconds for log lines
pub fn as_millis_f64(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}
