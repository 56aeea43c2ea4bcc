//! Loopback peer transport
//!
//! Two endpoints over shared in-process state, standing in for a real
//! media stack. Descriptions and candidates still travel via signaling
//! between controllers; the loopback only decides when the "link" is
//! complete and surfaces the transport events a real stack would.
//!
//! The link counts as connected once both sides hold a local and a remote
//! description and each side has applied at least one candidate.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::errors::PeerLensError;
use crate::media::MediaSource;
use crate::peer::transport::{PeerTransport, SdpType, SessionDescription, TransportEvent};
use crate::signaling::IceCandidate;
use crate::testing::scripted::ScriptedMediaSource;
use crate::testing::synthetic_data::uniform_frame;
use crate::types::{ANALYSIS_HEIGHT, ANALYSIS_WIDTH};

const EVENT_CAPACITY: usize = 32;

#[derive(Default)]
struct SideState {
    local_description: Option<SessionDescription>,
    remote_description: Option<SessionDescription>,
    applied_candidates: Vec<IceCandidate>,
    candidate_emitted: bool,
}

struct LinkState {
    sides: [SideState; 2],
    events: [broadcast::Sender<TransportEvent>; 2],
    /// What each side receives as its remote stream on connect.
    remote_media: [Arc<dyn MediaSource>; 2],
    connected: bool,
    closed: [bool; 2],
}

impl LinkState {
    fn emit_local_candidate(&mut self, side: usize) {
        if self.sides[side].candidate_emitted {
            return;
        }
        self.sides[side].candidate_emitted = true;
        let candidate = IceCandidate::new(
            format!("candidate:1 1 udp 2122260223 10.0.0.{} 49152 typ host", side + 1),
            Some("0".to_string()),
            Some(0),
        );
        let _ = self.events[side].send(TransportEvent::LocalCandidate(candidate));
    }

    fn maybe_connect(&mut self) {
        if self.connected || self.closed[0] || self.closed[1] {
            return;
        }
        let ready = self.sides.iter().all(|side| {
            side.local_description.is_some()
                && side.remote_description.is_some()
                && !side.applied_candidates.is_empty()
        });
        if !ready {
            return;
        }

        self.connected = true;
        for side in 0..2 {
            let _ = self.events[side].send(TransportEvent::Connected);
            let _ = self.events[side]
                .send(TransportEvent::RemoteStream(Arc::clone(&self.remote_media[side])));
        }
    }
}

/// One endpoint of an in-process transport pair.
pub struct LoopbackTransport {
    side: usize,
    link: Arc<Mutex<LinkState>>,
    events: broadcast::Sender<TransportEvent>,
}

impl LoopbackTransport {
    /// A connected-capable pair whose remote streams are quiet uniform
    /// frames. Enough for negotiation tests that never sample.
    pub fn pair() -> (Arc<Self>, Arc<Self>) {
        let quiet = |value| -> Arc<dyn MediaSource> {
            Arc::new(ScriptedMediaSource::from_levels(
                &[0.0],
                uniform_frame(ANALYSIS_WIDTH, ANALYSIS_HEIGHT, value),
            ))
        };
        Self::pair_with_media(quiet(16), quiet(32))
    }

    /// A pair with explicit remote streams: the first endpoint receives
    /// `first_receives` when the link connects, the second `second_receives`.
    pub fn pair_with_media(
        first_receives: Arc<dyn MediaSource>,
        second_receives: Arc<dyn MediaSource>,
    ) -> (Arc<Self>, Arc<Self>) {
        let (events_a, _) = broadcast::channel(EVENT_CAPACITY);
        let (events_b, _) = broadcast::channel(EVENT_CAPACITY);

        let link = Arc::new(Mutex::new(LinkState {
            sides: [SideState::default(), SideState::default()],
            events: [events_a.clone(), events_b.clone()],
            remote_media: [first_receives, second_receives],
            connected: false,
            closed: [false, false],
        }));

        (
            Arc::new(Self {
                side: 0,
                link: Arc::clone(&link),
                events: events_a,
            }),
            Arc::new(Self {
                side: 1,
                link,
                events: events_b,
            }),
        )
    }

    /// Simulate a network drop: both sides observe `Disconnected`.
    pub fn drop_connectivity(&self) {
        let mut link = self.link.lock().expect("lock poisoned");
        if !link.connected {
            return;
        }
        link.connected = false;
        for side in 0..2 {
            let _ = link.events[side].send(TransportEvent::Disconnected);
        }
    }

    /// Simulate an unrecoverable transport failure on both sides.
    pub fn fail(&self, reason: &str) {
        let link = self.link.lock().expect("lock poisoned");
        for side in 0..2 {
            let _ = link.events[side].send(TransportEvent::Failed(reason.to_string()));
        }
    }

    /// Candidates this side has applied, in application order.
    pub fn applied_candidates(&self) -> Vec<IceCandidate> {
        self.link.lock().expect("lock poisoned").sides[self.side]
            .applied_candidates
            .clone()
    }

    pub fn remote_description(&self) -> Option<SessionDescription> {
        self.link.lock().expect("lock poisoned").sides[self.side]
            .remote_description
            .clone()
    }

    pub fn is_link_connected(&self) -> bool {
        self.link.lock().expect("lock poisoned").connected
    }

    fn with_open_link<T>(
        &self,
        f: impl FnOnce(&mut LinkState) -> Result<T, PeerLensError>,
    ) -> Result<T, PeerLensError> {
        let mut link = self.link.lock().expect("lock poisoned");
        if link.closed[self.side] {
            return Err(PeerLensError::invalid_state("transport is closed"));
        }
        f(&mut link)
    }
}

#[async_trait]
impl PeerTransport for LoopbackTransport {
    async fn create_offer(&self) -> Result<SessionDescription, PeerLensError> {
        self.with_open_link(|link| {
            let offer =
                SessionDescription::offer(format!("v=0 loopback offer from side {}", self.side));
            link.sides[self.side].local_description = Some(offer.clone());
            link.emit_local_candidate(self.side);
            link.maybe_connect();
            Ok(offer)
        })
    }

    async fn create_answer(&self) -> Result<SessionDescription, PeerLensError> {
        self.with_open_link(|link| {
            if link.sides[self.side].remote_description.is_none() {
                return Err(PeerLensError::negotiation(
                    "cannot answer without a remote offer",
                ));
            }
            let answer =
                SessionDescription::answer(format!("v=0 loopback answer from side {}", self.side));
            link.sides[self.side].local_description = Some(answer.clone());
            link.emit_local_candidate(self.side);
            link.maybe_connect();
            Ok(answer)
        })
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), PeerLensError> {
        self.with_open_link(|link| {
            let side = &mut link.sides[self.side];
            // A remote offer over an outstanding local offer rolls the
            // local one back, as glare resolution requires.
            if desc.sdp_type == SdpType::Offer
                && side
                    .local_description
                    .as_ref()
                    .is_some_and(|local| local.sdp_type == SdpType::Offer)
            {
                side.local_description = None;
            }
            side.remote_description = Some(desc);
            link.maybe_connect();
            Ok(())
        })
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), PeerLensError> {
        self.with_open_link(|link| {
            if link.sides[self.side].remote_description.is_none() {
                return Err(PeerLensError::negotiation(
                    "candidate applied before remote description",
                ));
            }
            link.sides[self.side].applied_candidates.push(candidate);
            link.maybe_connect();
            Ok(())
        })
    }

    async fn close(&self) -> Result<(), PeerLensError> {
        let mut link = self.link.lock().expect("lock poisoned");
        link.closed[self.side] = true;
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }
}
