//! Property-based tests for the frame difference detector.
//!
//! Focus: stable invariants (zero on identity, symmetry, 0-255 scale,
//! metric behavior) and the downscale contract the sampler relies on.

use proptest::prelude::*;

use peerlens::sampler::detector::frame_difference;
use peerlens::testing::uniform_frame;
use peerlens::types::{VideoFrame, ANALYSIS_HEIGHT, ANALYSIS_WIDTH};

fn frame_strategy() -> impl Strategy<Value = VideoFrame> {
    (1u32..=32u32, 1u32..=32u32).prop_flat_map(|(width, height)| {
        let len = (width * height * 3) as usize;
        proptest::collection::vec(any::<u8>(), len)
            .prop_map(move |data| VideoFrame::new(width, height, data))
    })
}

fn frame_pair_strategy() -> impl Strategy<Value = (VideoFrame, VideoFrame)> {
    (1u32..=32u32, 1u32..=32u32).prop_flat_map(|(width, height)| {
        let len = (width * height * 3) as usize;
        (
            proptest::collection::vec(any::<u8>(), len),
            proptest::collection::vec(any::<u8>(), len),
        )
            .prop_map(move |(a, b)| {
                (
                    VideoFrame::new(width, height, a),
                    VideoFrame::new(width, height, b),
                )
            })
    })
}

fn frame_triple_strategy() -> impl Strategy<Value = (VideoFrame, VideoFrame, VideoFrame)> {
    (1u32..=32u32, 1u32..=32u32).prop_flat_map(|(width, height)| {
        let len = (width * height * 3) as usize;
        (
            proptest::collection::vec(any::<u8>(), len),
            proptest::collection::vec(any::<u8>(), len),
            proptest::collection::vec(any::<u8>(), len),
        )
            .prop_map(move |(a, b, c)| {
                (
                    VideoFrame::new(width, height, a),
                    VideoFrame::new(width, height, b),
                    VideoFrame::new(width, height, c),
                )
            })
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// INVARIANT: a frame diffed against itself is exactly zero.
    #[test]
    fn identical_frames_diff_to_zero(frame in frame_strategy()) {
        prop_assert_eq!(frame_difference(&frame, &frame), 0.0);
    }

    /// INVARIANT: difference is symmetric, down to the bit.
    #[test]
    fn difference_is_symmetric((a, b) in frame_pair_strategy()) {
        prop_assert_eq!(frame_difference(&a, &b), frame_difference(&b, &a));
    }

    /// INVARIANT: the mean absolute channel delta stays on the 0-255 scale.
    #[test]
    fn difference_stays_in_scale((a, b) in frame_pair_strategy()) {
        let d = frame_difference(&a, &b);
        prop_assert!((0.0..=255.0).contains(&d), "difference {} left the scale", d);
    }

    /// CONTRACT: two solid-color frames diff to exactly the distance between
    /// their values, independent of dimensions.
    #[test]
    fn uniform_frames_diff_exactly(
        width in 1u32..=32u32,
        height in 1u32..=32u32,
        v1 in any::<u8>(),
        v2 in any::<u8>(),
    ) {
        let a = uniform_frame(width, height, v1);
        let b = uniform_frame(width, height, v2);
        prop_assert_eq!(frame_difference(&a, &b), f64::from(v1.abs_diff(v2)));
    }

    /// INVARIANT: the difference behaves as a metric; the triangle inequality
    /// holds up to floating-point rounding.
    #[test]
    fn difference_obeys_triangle_inequality((a, b, c) in frame_triple_strategy()) {
        let ab = frame_difference(&a, &b);
        let bc = frame_difference(&b, &c);
        let ac = frame_difference(&a, &c);
        prop_assert!(ac <= ab + bc + 1e-9);
    }

    /// CONTRACT: downscaling any well-formed frame lands on the analysis
    /// resolution, so checkpoint diffs always compare equal dimensions.
    #[test]
    fn downscale_always_lands_on_analysis_size(frame in frame_strategy()) {
        let scaled = frame
            .downscale_for_analysis()
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert_eq!(scaled.width, ANALYSIS_WIDTH);
        prop_assert_eq!(scaled.height, ANALYSIS_HEIGHT);
        prop_assert!(scaled.is_well_formed());
    }
}
