use thiserror::Error;

/// Crate-wide error taxonomy. Every variant carries a human-readable
/// reason; recovery is always caller-initiated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeerLensError {
    /// Signaling channel closed or unreachable. Fatal to the session.
    #[error("signaling transport error: {0}")]
    SignalingTransport(String),

    /// A command or message arrived in a state that does not accept it.
    /// Fatal for local commands, logged-and-dropped for inbound messages.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Description creation or application failed; the negotiation attempt
    /// is aborted and the machine returns to a safe state.
    #[error("negotiation error: {0}")]
    Negotiation(String),

    /// Local media source unavailable; no connection is attempted.
    #[error("media acquisition error: {0}")]
    MediaAcquisition(String),

    /// A single sampler tick failed; the tick is skipped and the loop
    /// continues.
    #[error("sampling error: {0}")]
    Sampling(String),

    /// Configuration could not be read, written, or parsed.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl PeerLensError {
    pub fn signaling(message: impl Into<String>) -> Self {
        Self::SignalingTransport(message.into())
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    pub fn negotiation(message: impl Into<String>) -> Self {
        Self::Negotiation(message.into())
    }

    pub fn media(message: impl Into<String>) -> Self {
        Self::MediaAcquisition(message.into())
    }

    pub fn sampling(message: impl Into<String>) -> Self {
        Self::Sampling(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}
