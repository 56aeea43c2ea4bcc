//! Underlying transport seam
//!
//! The real-time-media stack is an external collaborator. The controller
//! drives it through `PeerTransport` and hears back through an event
//! stream; the crate ships a deterministic loopback implementation under
//! `testing`, production stacks bind their own.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::errors::PeerLensError;
use crate::media::MediaSource;
use crate::signaling::IceCandidate;

/// ICE server used to bootstrap connectivity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    pub urls: Vec<String>,
    pub username: Option<String>,
    pub credential: Option<String>,
}

impl IceServer {
    /// A credential-less STUN entry.
    pub fn stun(uri: impl Into<String>) -> Self {
        Self {
            urls: vec![uri.into()],
            username: None,
            credential: None,
        }
    }
}

/// SDP (Session Description Protocol) type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

/// Session description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    pub sdp_type: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// Events the transport pushes up to the controller.
#[derive(Clone)]
pub enum TransportEvent {
    /// A local ICE candidate is ready to be signaled to the peer.
    LocalCandidate(IceCandidate),
    /// Connectivity established end to end.
    Connected,
    /// Connectivity lost after having been established.
    Disconnected,
    /// The transport gave up on this connection.
    Failed(String),
    /// The remote media source became available.
    RemoteStream(Arc<dyn MediaSource>),
}

impl fmt::Debug for TransportEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportEvent::LocalCandidate(c) => {
                f.debug_tuple("LocalCandidate").field(&c.candidate).finish()
            }
            TransportEvent::Connected => write!(f, "Connected"),
            TransportEvent::Disconnected => write!(f, "Disconnected"),
            TransportEvent::Failed(reason) => f.debug_tuple("Failed").field(reason).finish(),
            TransportEvent::RemoteStream(_) => write!(f, "RemoteStream(..)"),
        }
    }
}

/// The underlying real-time-media stack.
///
/// The controller is the only caller and drives these methods from its
/// serialized event loop, so implementations see one call at a time.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Create a local offer and install it as the local description.
    async fn create_offer(&self) -> Result<SessionDescription, PeerLensError>;

    /// Create an answer to the current remote offer and install it as the
    /// local description. Requires a remote description.
    async fn create_answer(&self) -> Result<SessionDescription, PeerLensError>;

    /// Install the remote description. Receiving a remote offer while a
    /// local offer is outstanding implies rollback of the local one (glare
    /// resolution).
    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), PeerLensError>;

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), PeerLensError>;

    /// Tear the connection down. Further calls fail.
    async fn close(&self) -> Result<(), PeerLensError>;

    /// Observe transport events in the order the stack produced them.
    fn subscribe(&self) -> broadcast::Receiver<TransportEvent>;
}
