//! Media source seam
//!
//! Audio/video acquisition is an external collaborator: browsers, capture
//! crates, or remote tracks all sit behind `MediaSource`. The sampler reads
//! it once per tick; the controller stops the local one on teardown.

use crate::errors::PeerLensError;
use crate::types::VideoFrame;

/// A live media source readable by the sampling loop.
///
/// Implementations must be cheap to read at the tick rate (100 ms) and
/// tolerant of concurrent readers: both execution contexts only read, never
/// mutate, the source.
pub trait MediaSource: Send + Sync {
    /// Read the current audio level (aggregate spectrum magnitude, 0-255)
    /// and a fresh video frame.
    ///
    /// A failed read surfaces as a sampling error for that tick only.
    fn sample(&self) -> Result<(f32, VideoFrame), PeerLensError>;

    /// Stop the underlying tracks. Idempotent; reads after stop fail.
    fn stop(&self);
}
