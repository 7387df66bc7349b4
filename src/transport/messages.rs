//! Wire format for the signaling socket
//!
//! Frames are JSON text `{"event": <name>, "data": <payload>}`. Parsing is the
//! validation boundary: anything that does not decode into a
//! [`ClientMessage`] is rejected here and never reaches the engine.

use crate::error::{MatchmakingError, Result};
use crate::types::{ClientMessage, ServerEvent};

/// Path of the WebSocket endpoint
pub const SIGNALING_PATH: &str = "/ws";

/// Frames larger than this are rejected before parsing
pub const MAX_FRAME_BYTES: usize = 64 * 1024;

/// Decode a client text frame
pub fn parse_client_message(text: &str) -> Result<ClientMessage> {
    if text.len() > MAX_FRAME_BYTES {
        return Err(MatchmakingError::InvalidClientMessage {
            reason: format!("frame of {} bytes exceeds limit", text.len()),
        }
        .into());
    }

    serde_json::from_str(text).map_err(|e| {
        MatchmakingError::InvalidClientMessage {
            reason: format!("Failed to deserialize frame: {}", e),
        }
        .into()
    })
}

/// Encode a server event as a text frame
pub fn encode_event(event: &ServerEvent) -> Result<String> {
    serde_json::to_string(event).map_err(|e| {
        MatchmakingError::InternalError {
            message: format!("Failed to serialize {} event: {}", event.name(), e),
        }
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ConnectionId, ProposalKey, SignalKind};
    use serde_json::{json, Value};

    #[test]
    fn test_parse_seek_without_data() {
        assert_eq!(
            parse_client_message(r#"{"event":"seek"}"#).unwrap(),
            ClientMessage::Seek
        );
        assert_eq!(
            parse_client_message(r#"{"event":"find_match","data":null}"#).unwrap(),
            ClientMessage::Seek
        );
    }

    #[test]
    fn test_parse_accept_with_legacy_field() {
        let message =
            parse_client_message(r#"{"event":"accept_match","data":{"matchId":"a:b"}}"#).unwrap();

        match message {
            ClientMessage::Accept(reference) => {
                assert_eq!(reference.proposal_key, ProposalKey("a:b".to_string()))
            }
            other => panic!("Expected accept, got {:?}", other),
        }

        let message =
            parse_client_message(r#"{"event":"reject","data":{"proposalKey":"a:b"}}"#).unwrap();
        assert!(matches!(message, ClientMessage::Reject(_)));
    }

    #[test]
    fn test_parse_legacy_signal() {
        let to = ConnectionId::new();
        let frame = json!({
            "event": "webrtc-offer",
            "data": {"to": to, "offer": {"type": "offer", "sdp": "v=0"}}
        });

        let message = parse_client_message(&frame.to_string()).unwrap();
        let (kind, request) = message.as_signal().unwrap();
        assert_eq!(kind, SignalKind::Offer);
        assert_eq!(request.to, to);
        assert_eq!(request.payload["sdp"], "v=0");
    }

    #[test]
    fn test_parse_candidate() {
        let to = ConnectionId::new();
        let frame = json!({
            "event": "signal-candidate",
            "data": {"to": to, "payload": {"candidate": "candidate:1 1 udp"}}
        });

        let message = parse_client_message(&frame.to_string()).unwrap();
        assert_eq!(message.name(), "signal-candidate");
    }

    #[test]
    fn test_rejects_malformed_frames() {
        for frame in [
            "not json",
            r#"{"event":"dance"}"#,
            r#"{"event":"accept"}"#,
            r#"{"event":"signal-offer","data":{"to":"not-a-uuid","payload":{}}}"#,
            r#"{"data":{}}"#,
        ] {
            let err = parse_client_message(frame).unwrap_err();
            assert!(
                matches!(
                    err.downcast_ref::<MatchmakingError>(),
                    Some(MatchmakingError::InvalidClientMessage { .. })
                ),
                "frame {} should be rejected as invalid",
                frame
            );
        }
    }

    #[test]
    fn test_rejects_oversized_frame() {
        let frame = format!(
            r#"{{"event":"seek","data":"{}"}}"#,
            "x".repeat(MAX_FRAME_BYTES)
        );
        assert!(parse_client_message(&frame).is_err());
    }

    #[test]
    fn test_encode_events() {
        let partner = ConnectionId::new();

        let encoded: Value =
            serde_json::from_str(&encode_event(&ServerEvent::MatchConfirmed {
                partner_id: partner,
            })
            .unwrap())
            .unwrap();
        assert_eq!(encoded["event"], "match_confirmed");
        assert_eq!(encoded["data"]["partnerId"], partner.to_string());

        let encoded: Value =
            serde_json::from_str(&encode_event(&ServerEvent::MatchRejected).unwrap()).unwrap();
        assert_eq!(encoded["event"], "match_rejected");

        let encoded: Value = serde_json::from_str(
            &encode_event(&ServerEvent::signal(
                SignalKind::Answer,
                partner,
                json!({"sdp": "v=0"}),
            ))
            .unwrap(),
        )
        .unwrap();
        assert_eq!(encoded["event"], "signal-answer");
        assert_eq!(encoded["data"]["from"], partner.to_string());
        assert_eq!(encoded["data"]["payload"]["sdp"], "v=0");
    }
}
