//! Signaling messages and channel contract
//!
//! Three message kinds move between the two endpoints of a session: offer,
//! answer, ICE candidate. The channel guarantees in-order delivery per
//! session and nothing else; transport loss surfaces as a closed event, and
//! no component here ever retries.

pub mod memory;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::errors::PeerLensError;

pub use memory::MemorySignaling;

/// ICE candidate as carried on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(rename = "sdpMid")]
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex")]
    pub sdp_mline_index: Option<u16>,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>, sdp_mid: Option<String>, sdp_mline_index: Option<u16>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid,
            sdp_mline_index,
        }
    }
}

/// One signaling payload. Immutable once constructed.
///
/// Wire encoding is a `type`-tagged JSON object: `"offer"`, `"answer"`,
/// `"ice-candidate"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SignalingMessage {
    Offer { sdp: String },
    Answer { sdp: String },
    IceCandidate(IceCandidate),
}

impl SignalingMessage {
    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            SignalingMessage::Offer { .. } => "offer",
            SignalingMessage::Answer { .. } => "answer",
            SignalingMessage::IceCandidate(_) => "ice-candidate",
        }
    }
}

/// A message plus its session key and sending peer.
///
/// `from` lets both sides resolve simultaneous offers deterministically
/// without a round trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalingEnvelope {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub from: String,
    #[serde(flatten)]
    pub message: SignalingMessage,
}

impl SignalingEnvelope {
    pub fn offer(session_id: impl Into<String>, from: impl Into<String>, sdp: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            from: from.into(),
            message: SignalingMessage::Offer { sdp: sdp.into() },
        }
    }

    pub fn answer(session_id: impl Into<String>, from: impl Into<String>, sdp: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            from: from.into(),
            message: SignalingMessage::Answer { sdp: sdp.into() },
        }
    }

    pub fn ice_candidate(
        session_id: impl Into<String>,
        from: impl Into<String>,
        candidate: IceCandidate,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            from: from.into(),
            message: SignalingMessage::IceCandidate(candidate),
        }
    }
}

/// What a subscriber observes: inbound messages in arrival order, then at
/// most one `Closed` when the transport goes away.
#[derive(Debug, Clone)]
pub enum SignalingEvent {
    Message(SignalingEnvelope),
    Closed,
}

/// Bidirectional, ordered message transport keyed by session.
///
/// Implementations deliver inbound messages to every subscriber in the
/// order received from the transport, surface transport loss as
/// [`SignalingEvent::Closed`], and never reconnect on their own.
pub trait SignalingChannel: Send + Sync {
    /// Hand one message to the transport. Fails once the channel is closed.
    fn send(&self, envelope: SignalingEnvelope) -> Result<(), PeerLensError>;

    /// Observe inbound traffic. Each receiver sees messages in arrival
    /// order.
    fn subscribe(&self) -> broadcast::Receiver<SignalingEvent>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offer_wire_format() {
        let env = SignalingEnvelope::offer("session-1", "peer-a", "v=0\r\no=- 0 0 IN IP4 0.0.0.0\r\n");
        let value = serde_json::to_value(&env).unwrap();

        assert_eq!(value["type"], "offer");
        assert_eq!(value["sessionId"], "session-1");
        assert_eq!(value["from"], "peer-a");
        assert!(value["sdp"].as_str().unwrap().starts_with("v=0"));
    }

    #[test]
    fn test_ice_candidate_wire_field_names() {
        let env = SignalingEnvelope::ice_candidate(
            "session-1",
            "peer-b",
            IceCandidate::new(
                "candidate:1 1 UDP 2122260223 192.168.1.1 5000 typ host",
                Some("0".to_string()),
                Some(0),
            ),
        );
        let value = serde_json::to_value(&env).unwrap();

        assert_eq!(value["type"], "ice-candidate");
        assert_eq!(value["sdpMid"], "0");
        assert_eq!(value["sdpMLineIndex"], 0);
        assert!(value.get("sdp_mline_index").is_none(), "wire names are camelCase");
    }

    #[test]
    fn test_parse_answer_from_wire() {
        let raw = r#"{"sessionId":"s","from":"peer-b","type":"answer","sdp":"v=0"}"#;
        let env: SignalingEnvelope = serde_json::from_str(raw).unwrap();

        assert_eq!(env, SignalingEnvelope::answer("s", "peer-b", "v=0"));
        assert_eq!(env.message.kind(), "answer");
    }

    #[test]
    fn test_roundtrip_preserves_candidate() {
        let candidate = IceCandidate::new("candidate:2 1 TCP 1 10.0.0.1 9 typ host", None, Some(1));
        let env = SignalingEnvelope::ice_candidate("s", "a", candidate.clone());

        let json = serde_json::to_string(&env).unwrap();
        let back: SignalingEnvelope = serde_json::from_str(&json).unwrap();

        match back.message {
            SignalingMessage::IceCandidate(c) => assert_eq!(c, candidate),
            other => panic!("expected ice-candidate, got {:?}", other),
        }
    }
}
