//! Common types used throughout the matchmaking service

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Unique identifier for one live client connection
///
/// Issued by the transport when a socket connects and never reused after it
/// disconnects. Ids are totally ordered so clients can agree on who sends the
/// session offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    /// Generate a fresh random connection id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for ConnectionId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Key naming an open match proposal
///
/// Derived from the unordered pair of participants, so both sides hold the
/// same key regardless of who was dequeued first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProposalKey(pub String);

impl ProposalKey {
    /// Build the key for a pair of connections
    pub fn for_pair(a: ConnectionId, b: ConnectionId) -> Self {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        Self(format!("{}:{}", low, high))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProposalKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state of a connection as seen by the matchmaking engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    Idle,
    Searching,
    ProposalPending,
    Matched,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Idle => write!(f, "Idle"),
            ConnectionState::Searching => write!(f, "Searching"),
            ConnectionState::ProposalPending => write!(f, "ProposalPending"),
            ConnectionState::Matched => write!(f, "Matched"),
        }
    }
}

/// Kind of session-negotiation message carried by the relay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalKind {
    Offer,
    Answer,
    Candidate,
}

impl SignalKind {
    /// Label used for logging and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::Offer => "offer",
            SignalKind::Answer => "answer",
            SignalKind::Candidate => "candidate",
        }
    }
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of accept/reject requests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalRef {
    #[serde(rename = "proposalKey", alias = "matchId")]
    pub proposal_key: ProposalKey,
}

/// Outbound negotiation message as sent by a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRequest {
    pub to: ConnectionId,
    #[serde(alias = "offer", alias = "answer", alias = "candidate")]
    pub payload: Value,
}

/// Negotiation message as delivered to the receiving partner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalDelivery {
    pub from: ConnectionId,
    pub payload: Value,
}

/// Client -> server messages
///
/// Each frame is `{"event": <name>, "data": <payload>}`. The legacy event
/// names used by the browser client are accepted as aliases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientMessage {
    #[serde(rename = "seek", alias = "find_match")]
    Seek,
    #[serde(rename = "accept", alias = "accept_match")]
    Accept(ProposalRef),
    #[serde(rename = "reject", alias = "reject_match")]
    Reject(ProposalRef),
    #[serde(rename = "cancel", alias = "cancel_search")]
    Cancel,
    #[serde(rename = "signal-offer", alias = "webrtc-offer")]
    SignalOffer(SignalRequest),
    #[serde(rename = "signal-answer", alias = "webrtc-answer")]
    SignalAnswer(SignalRequest),
    #[serde(rename = "signal-candidate", alias = "webrtc-ice")]
    SignalCandidate(SignalRequest),
}

impl ClientMessage {
    /// Event name for logging and metrics
    pub fn name(&self) -> &'static str {
        match self {
            ClientMessage::Seek => "seek",
            ClientMessage::Accept(_) => "accept",
            ClientMessage::Reject(_) => "reject",
            ClientMessage::Cancel => "cancel",
            ClientMessage::SignalOffer(_) => "signal-offer",
            ClientMessage::SignalAnswer(_) => "signal-answer",
            ClientMessage::SignalCandidate(_) => "signal-candidate",
        }
    }

    /// Split a signaling message into its kind and request
    pub fn as_signal(&self) -> Option<(SignalKind, &SignalRequest)> {
        match self {
            ClientMessage::SignalOffer(request) => Some((SignalKind::Offer, request)),
            ClientMessage::SignalAnswer(request) => Some((SignalKind::Answer, request)),
            ClientMessage::SignalCandidate(request) => Some((SignalKind::Candidate, request)),
            _ => None,
        }
    }
}

/// Server -> client events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    Connected {
        connection_id: ConnectionId,
    },
    MatchProposed {
        proposal_key: ProposalKey,
    },
    MatchConfirmed {
        partner_id: ConnectionId,
    },
    MatchRejected,
    PartnerLeft {
        partner_id: ConnectionId,
    },
    #[serde(rename = "signal-offer")]
    SignalOffer(SignalDelivery),
    #[serde(rename = "signal-answer")]
    SignalAnswer(SignalDelivery),
    #[serde(rename = "signal-candidate")]
    SignalCandidate(SignalDelivery),
    Error {
        message: String,
    },
}

impl ServerEvent {
    /// Build the forwarded event for a negotiation message
    pub fn signal(kind: SignalKind, from: ConnectionId, payload: Value) -> Self {
        let delivery = SignalDelivery { from, payload };
        match kind {
            SignalKind::Offer => ServerEvent::SignalOffer(delivery),
            SignalKind::Answer => ServerEvent::SignalAnswer(delivery),
            SignalKind::Candidate => ServerEvent::SignalCandidate(delivery),
        }
    }

    /// Event name for logging and metrics
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Connected { .. } => "connected",
            ServerEvent::MatchProposed { .. } => "match_proposed",
            ServerEvent::MatchConfirmed { .. } => "match_confirmed",
            ServerEvent::MatchRejected => "match_rejected",
            ServerEvent::PartnerLeft { .. } => "partner_left",
            ServerEvent::SignalOffer(_) => "signal-offer",
            ServerEvent::SignalAnswer(_) => "signal-answer",
            ServerEvent::SignalCandidate(_) => "signal-candidate",
            ServerEvent::Error { .. } => "error",
        }
    }
}
