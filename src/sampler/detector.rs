//! Frame difference detection
//!
//! Pure comparison of two equally-sized RGB frames. The sampler calls this
//! at every video checkpoint to decide whether the scene changed enough to
//! record a keyframe moment.

use crate::assert_invariant;
use crate::types::VideoFrame;

/// Mean absolute per-channel difference between two frames.
///
/// Sums `|dR| + |dG| + |dB|` across every pixel and divides by
/// `pixel_count * 3`, so the result lands on the same 0-255 scale as the
/// channel values themselves: identical frames score 0.0, all-black vs
/// all-white scores 255.0. Symmetric in its arguments.
///
/// Both frames must share dimensions. The sampler guarantees this by
/// downscaling every frame to the analysis size before comparing.
pub fn frame_difference(a: &VideoFrame, b: &VideoFrame) -> f64 {
    assert_invariant!(
        a.width == b.width && a.height == b.height,
        "Frame difference requires equal dimensions",
        "sampler::detector"
    );

    let channel_count = (a.pixel_count() * 3) as f64;
    if channel_count == 0.0 {
        return 0.0;
    }

    let total: u64 = a
        .data
        .iter()
        .zip(b.data.iter())
        .map(|(&x, &y)| u64::from(x.abs_diff(y)))
        .sum();

    total as f64 / channel_count
}
