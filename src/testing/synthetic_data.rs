//! Synthetic frame generators
//!
//! Deterministic pixel data for offline tests, shaped like what a live
//! capture pipeline would hand the sampler. No hardware or network needed.

use crate::types::VideoFrame;

/// A gradient frame whose content shifts with `frame_number`, so successive
/// frames differ and temporal logic has something to notice.
pub fn synthetic_video_frame(frame_number: u64, width: u32, height: u32) -> VideoFrame {
    let mut data = vec![0u8; (width * height * 3) as usize];

    let base = (frame_number % 256) as u8;
    for y in 0..height {
        for x in 0..width {
            let idx = ((y * width + x) * 3) as usize;
            data[idx] = base.wrapping_add((x % 256) as u8);
            data[idx + 1] = base.wrapping_add((y % 256) as u8);
            data[idx + 2] = base.wrapping_add(((x + y) % 256) as u8);
        }
    }

    VideoFrame::new(width, height, data)
}

/// A solid-color frame. Two of these with the same value diff to exactly
/// zero, which makes quiet-scene scenarios trivial to script.
pub fn uniform_frame(width: u32, height: u32, value: u8) -> VideoFrame {
    VideoFrame::new(width, height, vec![value; (width * height * 3) as usize])
}
