//! Signaling relay between confirmed partners

pub mod signaling;

pub use signaling::{RelayOutcome, SignalingRelay};
