//! Matchmaking system for the signaling service
//!
//! This module handles queue admission, FIFO pairing, the propose/accept
//! confirmation protocol and publication of confirmed partners.

pub mod engine;
pub mod partners;
pub mod proposal;
pub mod queue;

// Re-export commonly used types
pub use engine::{
    AcceptOutcome, DisconnectOutcome, MatchmakingEngine, MatchmakingStats, RejectOutcome,
    SeekOutcome,
};
pub use partners::PartnerDirectory;
pub use proposal::{Proposal, ProposalStore};
pub use queue::WaitingQueue;
