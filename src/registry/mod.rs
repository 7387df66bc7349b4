//! Connection registry for the signaling service
//!
//! Tracks which connections are live and owns the outbound channel of each
//! one. Every other component asks the registry before delivering an event.

pub mod connections;

pub use connections::{ConnectionRegistry, InMemoryConnectionRegistry};
