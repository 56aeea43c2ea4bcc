//! In-memory signaling for tests, demos, and single-process deployments
//!
//! Two linked endpoints stand in for the relay the original deployment ran:
//! a message sent on one side reaches subscribers of the other side only,
//! in order, and never echoes back to the sender.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;

use crate::errors::PeerLensError;
use crate::signaling::{SignalingChannel, SignalingEnvelope, SignalingEvent};

const CHANNEL_CAPACITY: usize = 64;

/// One endpoint of an in-memory signaling link.
pub struct MemorySignaling {
    session_id: String,
    /// Fan-out for messages arriving at this endpoint.
    inbound: broadcast::Sender<SignalingEvent>,
    /// The other endpoint's fan-out; `send` delivers here.
    peer_inbound: broadcast::Sender<SignalingEvent>,
    closed: Arc<AtomicBool>,
}

impl MemorySignaling {
    /// Build both endpoints of a session's signaling link.
    pub fn pair(session_id: impl Into<String>) -> (MemorySignaling, MemorySignaling) {
        let session_id = session_id.into();
        let (a_inbound, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (b_inbound, _) = broadcast::channel(CHANNEL_CAPACITY);
        let closed = Arc::new(AtomicBool::new(false));

        let a = MemorySignaling {
            session_id: session_id.clone(),
            inbound: a_inbound.clone(),
            peer_inbound: b_inbound.clone(),
            closed: Arc::clone(&closed),
        };
        let b = MemorySignaling {
            session_id,
            inbound: b_inbound,
            peer_inbound: a_inbound,
            closed,
        };

        (a, b)
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Tear the link down. Every subscriber on both sides observes
    /// `Closed` exactly once; later sends fail.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        log::debug!("signaling link closed for session {}", self.session_id);
        let _ = self.inbound.send(SignalingEvent::Closed);
        let _ = self.peer_inbound.send(SignalingEvent::Closed);
    }
}

impl SignalingChannel for MemorySignaling {
    fn send(&self, envelope: SignalingEnvelope) -> Result<(), PeerLensError> {
        if self.is_closed() {
            return Err(PeerLensError::signaling(format!(
                "channel for session {} is closed",
                self.session_id
            )));
        }

        log::debug!(
            "relaying {} from {} on session {}",
            envelope.message.kind(),
            envelope.from,
            envelope.session_id
        );

        // No subscriber on the far side just means nobody is listening yet;
        // the channel itself never buffers for absent peers.
        let _ = self.peer_inbound.send(SignalingEvent::Message(envelope));
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<SignalingEvent> {
        self.inbound.subscribe()
    }
}

impl Drop for MemorySignaling {
    fn drop(&mut self) {
        // Losing either endpoint kills the link, as a dropped socket would.
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signaling::SignalingMessage;

    fn recv_message(rx: &mut broadcast::Receiver<SignalingEvent>) -> SignalingEnvelope {
        match rx.try_recv().expect("expected a delivered event") {
            SignalingEvent::Message(env) => env,
            SignalingEvent::Closed => panic!("unexpected closed event"),
        }
    }

    #[tokio::test]
    async fn test_delivers_to_other_side_in_order() {
        let (a, b) = MemorySignaling::pair("session-1");
        let mut b_rx = b.subscribe();

        a.send(SignalingEnvelope::offer("session-1", "peer-a", "sdp-1"))
            .unwrap();
        a.send(SignalingEnvelope::answer("session-1", "peer-a", "sdp-2"))
            .unwrap();

        let first = recv_message(&mut b_rx);
        let second = recv_message(&mut b_rx);
        assert!(matches!(first.message, SignalingMessage::Offer { .. }));
        assert!(matches!(second.message, SignalingMessage::Answer { .. }));
    }

    #[tokio::test]
    async fn test_no_echo_to_sender() {
        let (a, b) = MemorySignaling::pair("session-1");
        let mut a_rx = a.subscribe();
        let _b_rx = b.subscribe();

        a.send(SignalingEnvelope::offer("session-1", "peer-a", "sdp"))
            .unwrap();

        assert!(
            a_rx.try_recv().is_err(),
            "sender must not receive its own message"
        );
    }

    #[tokio::test]
    async fn test_close_notifies_both_sides() {
        let (a, b) = MemorySignaling::pair("session-1");
        let mut a_rx = a.subscribe();
        let mut b_rx = b.subscribe();

        a.close();

        assert!(matches!(a_rx.try_recv(), Ok(SignalingEvent::Closed)));
        assert!(matches!(b_rx.try_recv(), Ok(SignalingEvent::Closed)));
        assert!(b.is_closed());
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let (a, b) = MemorySignaling::pair("session-1");
        b.close();

        let result = a.send(SignalingEnvelope::offer("session-1", "peer-a", "sdp"));
        assert!(matches!(
            result,
            Err(PeerLensError::SignalingTransport(_))
        ));
    }

    #[tokio::test]
    async fn test_drop_closes_link() {
        let (a, b) = MemorySignaling::pair("session-1");
        let mut b_rx = b.subscribe();

        drop(a);

        assert!(matches!(b_rx.try_recv(), Ok(SignalingEvent::Closed)));
    }
}
