use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::PeerLensError;

/// Frames are diffed and snapshotted at a fixed analysis resolution.
pub const ANALYSIS_WIDTH: u32 = 320;
pub const ANALYSIS_HEIGHT: u32 = 240;

/// Tightly packed RGB8 pixel buffer, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl VideoFrame {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            data,
        }
    }

    pub fn pixel_count(&self) -> usize {
        (self.width as usize) * (self.height as usize)
    }

    /// Expected buffer length for the declared dimensions (3 bytes per pixel).
    pub fn expected_len(&self) -> usize {
        self.pixel_count() * 3
    }

    pub fn is_well_formed(&self) -> bool {
        self.data.len() == self.expected_len()
    }

    /// Downscale to the analysis resolution. Frames already at that size
    /// pass through unchanged.
    pub fn downscale_for_analysis(&self) -> Result<VideoFrame, PeerLensError> {
        if self.width == ANALYSIS_WIDTH && self.height == ANALYSIS_HEIGHT {
            return Ok(self.clone());
        }

        let img = image::RgbImage::from_raw(self.width, self.height, self.data.clone())
            .ok_or_else(|| {
                PeerLensError::sampling(format!(
                    "frame buffer length {} does not match {}x{} RGB dimensions",
                    self.data.len(),
                    self.width,
                    self.height
                ))
            })?;

        // Triangle is cheap and plenty for differencing.
        let resized = image::imageops::resize(
            &img,
            ANALYSIS_WIDTH,
            ANALYSIS_HEIGHT,
            image::imageops::FilterType::Triangle,
        );

        Ok(VideoFrame::new(
            ANALYSIS_WIDTH,
            ANALYSIS_HEIGHT,
            resized.into_raw(),
        ))
    }
}

/// One tick's worth of signal data. Not retained beyond the tick except
/// the single previous frame the sampler keeps for diffing.
#[derive(Debug, Clone)]
pub struct MediaSample {
    /// Aggregate audio magnitude on the 0-255 scale.
    pub audio_level: f32,
    /// Fresh frame at the analysis resolution.
    pub frame: VideoFrame,
    /// Monotonic milliseconds since sampler start.
    pub timestamp_ms: u64,
}

/// Why a keyframe was captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyframeKind {
    Audio,
    Video,
}

impl fmt::Display for KeyframeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyframeKind::Audio => write!(f, "audio"),
            KeyframeKind::Video => write!(f, "video"),
        }
    }
}

/// A captured moment. Immutable once created; ordering in the event log is
/// arrival order.
#[derive(Debug, Clone)]
pub struct KeyframeEvent {
    pub id: String,
    pub kind: KeyframeKind,
    /// Monotonic milliseconds since sampler start.
    pub timestamp_ms: u64,
    /// Wall-clock time the event was created.
    pub captured_at: DateTime<Utc>,
    /// PNG-encoded snapshot, held in memory only.
    pub snapshot: Bytes,
}

impl KeyframeEvent {
    pub fn new(kind: KeyframeKind, timestamp_ms: u64, snapshot: Bytes) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            timestamp_ms,
            captured_at: Utc::now(),
            snapshot,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_frame(width: u32, height: u32, value: u8) -> VideoFrame {
        VideoFrame::new(width, height, vec![value; (width * height * 3) as usize])
    }

    #[test]
    fn test_frame_well_formed() {
        let frame = solid_frame(4, 4, 10);
        assert!(frame.is_well_formed());
        assert_eq!(frame.expected_len(), 48);

        let bad = VideoFrame::new(4, 4, vec![0; 7]);
        assert!(!bad.is_well_formed());
    }

    #[test]
    fn test_downscale_passthrough_at_analysis_size() {
        let frame = solid_frame(ANALYSIS_WIDTH, ANALYSIS_HEIGHT, 42);
        let scaled = frame.downscale_for_analysis().unwrap();
        assert_eq!(scaled, frame, "analysis-size frames should pass through");
    }

    #[test]
    fn test_downscale_resizes_larger_frames() {
        let frame = solid_frame(640, 480, 99);
        let scaled = frame.downscale_for_analysis().unwrap();
        assert_eq!(scaled.width, ANALYSIS_WIDTH);
        assert_eq!(scaled.height, ANALYSIS_HEIGHT);
        assert!(scaled.is_well_formed());
        // A solid color survives resampling untouched.
        assert!(scaled.data.iter().all(|&b| b == 99));
    }

    #[test]
    fn test_downscale_rejects_malformed_buffer() {
        let bad = VideoFrame::new(640, 480, vec![0; 10]);
        assert!(bad.downscale_for_analysis().is_err());
    }

    #[test]
    fn test_keyframe_kind_wire_names() {
        assert_eq!(serde_json::to_string(&KeyframeKind::Audio).unwrap(), "\"audio\"");
        assert_eq!(serde_json::to_string(&KeyframeKind::Video).unwrap(), "\"video\"");
        assert_eq!(KeyframeKind::Video.to_string(), "video");
    }

    #[test]
    fn test_keyframe_event_identity() {
        let a = KeyframeEvent::new(KeyframeKind::Audio, 100, Bytes::from_static(b"png"));
        let b = KeyframeEvent::new(KeyframeKind::Audio, 100, Bytes::from_static(b"png"));
        assert_ne!(a.id, b.id, "every event gets its own id");
        assert_eq!(a.timestamp_ms, 100);
    }
}
