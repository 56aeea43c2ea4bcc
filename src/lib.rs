//! PeerLens: peer call negotiation and keyframe moment detection
//!
//! This crate drives one side of a two-party audio/video call over an
//! unreliable async signaling channel, and watches the resulting media for
//! moments worth keeping: loud audio and visible scene changes become
//! snapshot events in an in-memory log.
//!
//! # Features
//! - Offer/answer/ICE negotiation with a deterministic state machine
//! - Offer-glare resolution and candidate buffering until the remote
//!   description lands
//! - Fixed-rate keyframe sampling with loud-audio and scene-change rules
//! - In-memory keyframe log with PNG snapshots
//! - Deterministic in-process doubles for the media and transport seams
//!
//! # Usage
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use peerlens::config::PeerLensConfig;
//! use peerlens::events::EventLog;
//! use peerlens::peer::PeerConnectionController;
//! use peerlens::sampler::KeyframeSampler;
//!
//! let config = PeerLensConfig::load_or_default();
//! let controller = PeerConnectionController::new(
//!     "session-1",
//!     "alice",
//!     transport,        // Arc<dyn PeerTransport>
//!     signaling,        // Arc<dyn SignalingChannel>
//!     Some(local_media),
//!     config.connection.clone(),
//! );
//! controller.start_call().await?;
//!
//! let log = Arc::new(EventLog::new());
//! let sampler = KeyframeSampler::new(config.sampler.clone(), Arc::clone(&log));
//! sampler.start(local_media)?;
//! ```
pub mod config;
pub mod errors;
pub mod events;
pub mod invariant_ppt;
pub mod media;
pub mod peer;
pub mod sampler;
pub mod signaling;
pub mod timing;
pub mod types;

// Testing utilities - deterministic doubles for offline testing
pub mod testing;

// Re-exports for convenience
pub use config::PeerLensConfig;
pub use errors::PeerLensError;
pub use events::EventLog;
pub use media::MediaSource;
pub use peer::{CallEvent, ConnectionState, PeerConnectionController};
pub use sampler::{KeyframeSampler, SamplerConfig};
pub use signaling::{SignalingChannel, SignalingEnvelope, SignalingEvent};
pub use types::{KeyframeEvent, KeyframeKind, MediaSample, VideoFrame};

/// Initialize logging for the library
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "peerlens=info");
    }
    let _ = env_logger::try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Get crate information
pub fn get_info() -> CrateInfo {
    CrateInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: DESCRIPTION.to_string(),
    }
}

/// Crate information structure
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CrateInfo {
    pub name: String,
    pub version: String,
    pub description: String,
}
