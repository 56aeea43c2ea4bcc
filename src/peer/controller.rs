//! Peer connection controller
//!
//! Drives one session's negotiation: local commands, inbound signaling, and
//! transport events all funnel into a single event-loop task, so exactly one
//! transition is in flight at any time. The controller owns the connection
//! state, the pending-candidate buffer, and the callback streams.

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, watch};

use crate::assert_invariant;
use crate::config::ConnectionConfig;
use crate::errors::PeerLensError;
use crate::media::MediaSource;
use crate::peer::state::{next_state, ConnectionState, NegotiationInput};
use crate::peer::transport::{PeerTransport, SessionDescription, TransportEvent};
use crate::signaling::{
    IceCandidate, SignalingChannel, SignalingEnvelope, SignalingEvent, SignalingMessage,
};

const COMMAND_CAPACITY: usize = 64;
const EVENT_CAPACITY: usize = 32;

/// Callbacks surfaced to collaborators.
#[derive(Clone)]
pub enum CallEvent {
    /// The remote media source arrived. Emitted exactly once per
    /// successful negotiation.
    RemoteStream(Arc<dyn MediaSource>),
    /// Connectivity went up or down. Never auto-retried.
    ConnectivityChanged(bool),
}

impl fmt::Debug for CallEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallEvent::RemoteStream(_) => write!(f, "RemoteStream(..)"),
            CallEvent::ConnectivityChanged(connected) => {
                f.debug_tuple("ConnectivityChanged").field(connected).finish()
            }
        }
    }
}

enum Command {
    StartCall(oneshot::Sender<Result<(), PeerLensError>>),
    End(oneshot::Sender<Result<(), PeerLensError>>),
    Signaling(SignalingEvent),
    Transport(TransportEvent),
    RemoteOffer { from: String, sdp: String },
    RemoteAnswer { sdp: String },
    RemoteCandidate(IceCandidate),
}

/// Handle to one session's negotiation machine.
///
/// The event loop starts on construction so a callee reacts to an inbound
/// offer without any local command having been issued.
pub struct PeerConnectionController {
    session_id: String,
    peer_id: String,
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<CallEvent>,
    state_rx: watch::Receiver<ConnectionState>,
}

impl PeerConnectionController {
    pub fn new(
        session_id: impl Into<String>,
        peer_id: impl Into<String>,
        transport: Arc<dyn PeerTransport>,
        signaling: Arc<dyn SignalingChannel>,
        local_media: Option<Arc<dyn MediaSource>>,
        config: ConnectionConfig,
    ) -> Self {
        let session_id = session_id.into();
        let peer_id = peer_id.into();

        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let (state_tx, state_rx) = watch::channel(ConnectionState::New);

        let signaling_rx = signaling.subscribe();
        let transport_rx = transport.subscribe();

        let event_loop = EventLoop {
            session_id: session_id.clone(),
            peer_id: peer_id.clone(),
            transport,
            signaling,
            local_media,
            negotiation_timeout: Duration::from_millis(config.negotiation_timeout_ms),
            state: ConnectionState::New,
            state_tx,
            events: event_tx.clone(),
            pending_candidates: VecDeque::new(),
            remote_description_set: false,
            remote_stream_emitted: false,
        };

        tokio::spawn(event_loop.run(command_rx, signaling_rx, transport_rx));

        Self {
            session_id,
            peer_id,
            commands: command_tx,
            events: event_tx,
            state_rx,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    /// Current connection state, as of the last completed transition.
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Watch state transitions as they land.
    pub fn state_stream(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Observe remote-stream and connectivity callbacks.
    pub fn subscribe(&self) -> broadcast::Receiver<CallEvent> {
        self.events.subscribe()
    }

    /// Create and send a local offer. Valid only from `New`.
    pub async fn start_call(&self) -> Result<(), PeerLensError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send_command(Command::StartCall(reply_tx)).await?;
        reply_rx
            .await
            .map_err(|_| PeerLensError::invalid_state("controller event loop is gone"))?
    }

    /// Tear the session down. Valid from any state; idempotent.
    pub async fn end(&self) -> Result<(), PeerLensError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send_command(Command::End(reply_tx)).await?;
        reply_rx
            .await
            .map_err(|_| PeerLensError::invalid_state("controller event loop is gone"))?
    }

    /// Inject a remote offer as if it had arrived on the signaling channel.
    /// `from` is the sending peer's id (needed to resolve offer glare).
    pub async fn handle_remote_offer(
        &self,
        from: impl Into<String>,
        sdp: impl Into<String>,
    ) -> Result<(), PeerLensError> {
        self.send_command(Command::RemoteOffer {
            from: from.into(),
            sdp: sdp.into(),
        })
        .await
    }

    /// Inject a remote answer as if it had arrived on the signaling channel.
    pub async fn handle_remote_answer(&self, sdp: impl Into<String>) -> Result<(), PeerLensError> {
        self.send_command(Command::RemoteAnswer { sdp: sdp.into() }).await
    }

    /// Inject a remote ICE candidate as if it had arrived on the signaling
    /// channel.
    pub async fn handle_remote_ice_candidate(
        &self,
        candidate: IceCandidate,
    ) -> Result<(), PeerLensError> {
        self.send_command(Command::RemoteCandidate(candidate)).await
    }

    async fn send_command(&self, command: Command) -> Result<(), PeerLensError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| PeerLensError::invalid_state("controller event loop is gone"))
    }
}

/// All mutable negotiation state lives here, owned by one task.
struct EventLoop {
    session_id: String,
    peer_id: String,
    transport: Arc<dyn PeerTransport>,
    signaling: Arc<dyn SignalingChannel>,
    local_media: Option<Arc<dyn MediaSource>>,
    negotiation_timeout: Duration,
    state: ConnectionState,
    state_tx: watch::Sender<ConnectionState>,
    events: broadcast::Sender<CallEvent>,
    pending_candidates: VecDeque<IceCandidate>,
    remote_description_set: bool,
    remote_stream_emitted: bool,
}

impl EventLoop {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut signaling_rx: broadcast::Receiver<SignalingEvent>,
        mut transport_rx: broadcast::Receiver<TransportEvent>,
    ) {
        let mut signaling_live = true;
        let mut transport_live = true;

        loop {
            let command = tokio::select! {
                maybe = commands.recv() => match maybe {
                    Some(command) => command,
                    // Every handle dropped; nothing can reach us anymore.
                    None => break,
                },
                result = signaling_rx.recv(), if signaling_live => match result {
                    Ok(event) => Command::Signaling(event),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        log::warn!(
                            "session {}: dropped {} signaling events (subscriber lagged)",
                            self.session_id,
                            missed
                        );
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        signaling_live = false;
                        Command::Signaling(SignalingEvent::Closed)
                    }
                },
                result = transport_rx.recv(), if transport_live => match result {
                    Ok(event) => Command::Transport(event),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        log::warn!(
                            "session {}: dropped {} transport events (subscriber lagged)",
                            self.session_id,
                            missed
                        );
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        log::debug!("session {}: transport event stream ended", self.session_id);
                        transport_live = false;
                        continue;
                    }
                },
            };

            match command {
                Command::StartCall(reply) => {
                    let result = self.start_call().await;
                    let _ = reply.send(result);
                }
                Command::End(reply) => {
                    let result = self.end().await;
                    let _ = reply.send(result);
                }
                Command::Signaling(event) => self.handle_signaling(event).await,
                Command::Transport(event) => self.handle_transport(event).await,
                Command::RemoteOffer { from, sdp } => self.on_remote_offer(from, sdp).await,
                Command::RemoteAnswer { sdp } => self.on_remote_answer(sdp).await,
                Command::RemoteCandidate(candidate) => self.on_remote_candidate(candidate).await,
            }
        }
    }

    /// Apply one input to the transition table. Returns false when the
    /// current state does not accept it.
    fn apply(&mut self, input: NegotiationInput) -> bool {
        match next_state(self.state, input) {
            Some(next) => {
                if next != self.state {
                    log::debug!(
                        "session {}: {} -> {} on {:?}",
                        self.session_id,
                        self.state,
                        next,
                        input
                    );
                    self.state = next;
                    let _ = self.state_tx.send(next);
                }
                true
            }
            None => false,
        }
    }

    async fn with_timeout<T>(
        &self,
        operation: &str,
        fut: impl Future<Output = Result<T, PeerLensError>>,
    ) -> Result<T, PeerLensError> {
        match tokio::time::timeout(self.negotiation_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(PeerLensError::negotiation(format!(
                "{} timed out after {} ms",
                operation,
                self.negotiation_timeout.as_millis()
            ))),
        }
    }

    async fn start_call(&mut self) -> Result<(), PeerLensError> {
        if self.state != ConnectionState::New {
            return Err(PeerLensError::invalid_state(format!(
                "start_call requires state new, session {} is {}",
                self.session_id, self.state
            )));
        }
        if self.local_media.is_none() {
            return Err(PeerLensError::media(
                "no local media source; connection not attempted",
            ));
        }

        log::info!("session {}: starting call as {}", self.session_id, self.peer_id);

        let transport = Arc::clone(&self.transport);
        let offer = self
            .with_timeout("offer creation", transport.create_offer())
            .await?;

        self.apply(NegotiationInput::LocalOffer);
        self.signaling.send(SignalingEnvelope::offer(
            self.session_id.clone(),
            self.peer_id.clone(),
            offer.sdp,
        ))?;
        Ok(())
    }

    async fn end(&mut self) -> Result<(), PeerLensError> {
        if self.state.is_terminal() {
            return Ok(());
        }

        log::info!("session {}: ending call from state {}", self.session_id, self.state);

        if let Some(media) = &self.local_media {
            media.stop();
        }

        let transport = Arc::clone(&self.transport);
        if let Err(e) = transport.close().await {
            // Teardown proceeds regardless; the session still ends closed.
            log::warn!("session {}: transport close failed: {}", self.session_id, e);
        }

        self.pending_candidates.clear();
        self.remote_description_set = false;

        let was_connected = self.state.is_connected();
        self.apply(NegotiationInput::Close);
        if was_connected {
            self.emit_connectivity(false);
        }
        Ok(())
    }

    async fn handle_signaling(&mut self, event: SignalingEvent) {
        match event {
            SignalingEvent::Closed => {
                if self.state.is_terminal() {
                    log::debug!("session {}: channel closed after teardown", self.session_id);
                    return;
                }
                log::warn!("session {}: signaling channel closed mid-session", self.session_id);
                self.fail_session();
            }
            SignalingEvent::Message(envelope) => {
                if envelope.session_id != self.session_id {
                    log::debug!(
                        "session {}: dropping {} addressed to session {}",
                        self.session_id,
                        envelope.message.kind(),
                        envelope.session_id
                    );
                    return;
                }
                if envelope.from == self.peer_id {
                    log::debug!("session {}: dropping echoed {}", self.session_id, envelope.message.kind());
                    return;
                }
                match envelope.message {
                    SignalingMessage::Offer { sdp } => self.on_remote_offer(envelope.from, sdp).await,
                    SignalingMessage::Answer { sdp } => self.on_remote_answer(sdp).await,
                    SignalingMessage::IceCandidate(candidate) => {
                        self.on_remote_candidate(candidate).await
                    }
                }
            }
        }
    }

    async fn on_remote_offer(&mut self, from: String, sdp: String) {
        match self.state {
            ConnectionState::New => {}
            ConnectionState::HaveLocalOffer => {
                // Glare: both sides offered. The smaller peer id yields and
                // answers; the larger keeps its own offer on the table.
                if self.peer_id.as_str() < from.as_str() {
                    log::info!(
                        "session {}: offer glare, {} yields to {}",
                        self.session_id,
                        self.peer_id,
                        from
                    );
                } else {
                    log::info!(
                        "session {}: offer glare, keeping local offer over {}",
                        self.session_id,
                        from
                    );
                    return;
                }
            }
            _ => {
                log::warn!(
                    "session {}: dropping offer received in state {}",
                    self.session_id,
                    self.state
                );
                return;
            }
        }

        if let Err(e) = self.accept_remote_offer(sdp).await {
            log::warn!(
                "session {}: negotiation failed while answering offer: {}",
                self.session_id,
                e
            );
            self.abort_negotiation();
        }
    }

    /// Remote offer accepted: set remote description, drain buffered
    /// candidates, answer, settle.
    async fn accept_remote_offer(&mut self, sdp: String) -> Result<(), PeerLensError> {
        let transport = Arc::clone(&self.transport);
        self.with_timeout(
            "remote offer application",
            transport.set_remote_description(SessionDescription::offer(sdp)),
        )
        .await?;
        self.apply(NegotiationInput::RemoteOffer);
        self.remote_description_ready().await;

        let transport = Arc::clone(&self.transport);
        let answer = self
            .with_timeout("answer creation", transport.create_answer())
            .await?;
        self.signaling.send(SignalingEnvelope::answer(
            self.session_id.clone(),
            self.peer_id.clone(),
            answer.sdp,
        ))?;
        self.apply(NegotiationInput::AnswerSent);
        Ok(())
    }

    async fn on_remote_answer(&mut self, sdp: String) {
        if self.state != ConnectionState::HaveLocalOffer {
            log::warn!(
                "session {}: dropping answer received in state {}",
                self.session_id,
                self.state
            );
            return;
        }

        let transport = Arc::clone(&self.transport);
        let result = self
            .with_timeout(
                "remote answer application",
                transport.set_remote_description(SessionDescription::answer(sdp)),
            )
            .await;

        match result {
            Ok(()) => {
                self.apply(NegotiationInput::RemoteAnswer);
                self.remote_description_ready().await;
            }
            Err(e) => {
                log::warn!(
                    "session {}: negotiation failed while applying answer: {}",
                    self.session_id,
                    e
                );
                self.abort_negotiation();
            }
        }
    }

    async fn on_remote_candidate(&mut self, candidate: IceCandidate) {
        if self.state.is_terminal() {
            log::debug!("session {}: dropping candidate after teardown", self.session_id);
            return;
        }

        if self.remote_description_set {
            self.apply_candidate(candidate).await;
        } else {
            log::debug!(
                "session {}: buffering candidate until remote description is set",
                self.session_id
            );
            self.pending_candidates.push_back(candidate);
        }
    }

    /// The remote description just landed; buffered candidates apply now,
    /// exactly once each, in arrival order.
    async fn remote_description_ready(&mut self) {
        self.remote_description_set = true;
        while let Some(candidate) = self.pending_candidates.pop_front() {
            self.apply_candidate(candidate).await;
        }
        assert_invariant!(
            self.pending_candidates.is_empty(),
            "Pending candidate queue drains completely once the remote description is set",
            "peer::controller"
        );
    }

    async fn apply_candidate(&mut self, candidate: IceCandidate) {
        let transport = Arc::clone(&self.transport);
        if let Err(e) = transport.add_ice_candidate(candidate).await {
            // One bad candidate does not sink the session; the transport
            // keeps working with the rest.
            log::warn!("session {}: failed to apply candidate: {}", self.session_id, e);
        }
    }

    async fn handle_transport(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::LocalCandidate(candidate) => {
                if self.state.is_terminal() {
                    return;
                }
                let envelope = SignalingEnvelope::ice_candidate(
                    self.session_id.clone(),
                    self.peer_id.clone(),
                    candidate,
                );
                if let Err(e) = self.signaling.send(envelope) {
                    log::warn!(
                        "session {}: failed to signal local candidate: {}",
                        self.session_id,
                        e
                    );
                }
            }
            TransportEvent::Connected => {
                if self.apply(NegotiationInput::ConnectivityUp) {
                    self.emit_connectivity(true);
                } else {
                    log::warn!(
                        "session {}: dropping connectivity-up in state {}",
                        self.session_id,
                        self.state
                    );
                }
            }
            TransportEvent::Disconnected => {
                if self.apply(NegotiationInput::ConnectivityLost) {
                    self.emit_connectivity(false);
                } else {
                    log::warn!(
                        "session {}: dropping connectivity-lost in state {}",
                        self.session_id,
                        self.state
                    );
                }
            }
            TransportEvent::Failed(reason) => {
                if self.state.is_terminal() {
                    return;
                }
                log::warn!("session {}: transport failed: {}", self.session_id, reason);
                self.fail_session();
            }
            TransportEvent::RemoteStream(source) => {
                if self.state.is_terminal() {
                    return;
                }
                if self.remote_stream_emitted {
                    log::debug!(
                        "session {}: remote stream already delivered this negotiation",
                        self.session_id
                    );
                    return;
                }
                self.remote_stream_emitted = true;
                let _ = self.events.send(CallEvent::RemoteStream(source));
            }
        }
    }

    /// Abort the in-flight attempt and return to the retryable state.
    fn abort_negotiation(&mut self) {
        self.pending_candidates.clear();
        self.remote_description_set = false;
        self.remote_stream_emitted = false;
        self.apply(NegotiationInput::NegotiationFailed);
    }

    /// The session is unrecoverable. Emits the connectivity callback once.
    fn fail_session(&mut self) {
        if self.state.is_terminal() || self.state == ConnectionState::Failed {
            return;
        }
        self.apply(NegotiationInput::TransportFailed);
        self.emit_connectivity(false);
    }

    fn emit_connectivity(&self, connected: bool) {
        let _ = self.events.send(CallEvent::ConnectivityChanged(connected));
    }
}
