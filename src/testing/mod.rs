//! Testing utilities for PeerLens
//!
//! Deterministic doubles for the two collaborator seams (media source,
//! peer transport) plus synthetic frame data, so negotiation and sampling
//! scenarios run offline with no camera or network.

pub mod loopback;
pub mod scripted;
pub mod synthetic_data;

pub use loopback::LoopbackTransport;
pub use scripted::{ScriptStep, ScriptedMediaSource};
pub use synthetic_data::{synthetic_video_frame, uniform_frame};
