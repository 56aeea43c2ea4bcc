//! Keyframe snapshot encoding
//!
//! Keyframe events carry their snapshot as an in-memory PNG so the log stays
//! self-contained with no filesystem coupling.

use std::io::Cursor;

use bytes::Bytes;
use image::{DynamicImage, ImageFormat, RgbImage};

use crate::errors::PeerLensError;
use crate::types::VideoFrame;

/// Encode a frame as PNG bytes for storage in a keyframe event.
pub fn encode_snapshot(frame: &VideoFrame) -> Result<Bytes, PeerLensError> {
    let img = RgbImage::from_raw(frame.width, frame.height, frame.data.clone()).ok_or_else(
        || {
            PeerLensError::sampling(format!(
                "frame buffer length {} does not match {}x{} RGB dimensions",
                frame.data.len(),
                frame.width,
                frame.height
            ))
        },
    )?;

    let mut encoded = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut encoded), ImageFormat::Png)
        .map_err(|e| PeerLensError::sampling(format!("snapshot encoding failed: {}", e)))?;

    Ok(Bytes::from(encoded))
}
