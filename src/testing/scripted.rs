//! Scripted media source
//!
//! Plays back a predetermined sequence of audio levels and frames, one step
//! per `sample()` call, so sampler scenarios run deterministically.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::errors::PeerLensError;
use crate::media::MediaSource;
use crate::types::VideoFrame;

/// One scripted `sample()` outcome.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    Sample { audio_level: f32, frame: VideoFrame },
    Fail(String),
}

/// Media source that replays a script. Once the script runs out it holds
/// the last successful sample forever, like a frozen capture.
pub struct ScriptedMediaSource {
    script: Mutex<VecDeque<ScriptStep>>,
    last: Mutex<Option<(f32, VideoFrame)>>,
    stopped: AtomicBool,
}

impl ScriptedMediaSource {
    pub fn new(steps: Vec<ScriptStep>) -> Self {
        Self {
            script: Mutex::new(steps.into()),
            last: Mutex::new(None),
            stopped: AtomicBool::new(false),
        }
    }

    /// Script that varies only the audio level, reusing one frame
    /// throughout. The shape most audio-rule scenarios need.
    pub fn from_levels(levels: &[f32], frame: VideoFrame) -> Self {
        let steps = levels
            .iter()
            .map(|&audio_level| ScriptStep::Sample {
                audio_level,
                frame: frame.clone(),
            })
            .collect();
        Self::new(steps)
    }

    pub fn was_stopped(&self) -> bool {
        self.stopped.load(Ordering::Relaxed)
    }

    /// Steps not yet consumed.
    pub fn remaining(&self) -> usize {
        self.script.lock().expect("lock poisoned").len()
    }
}

impl MediaSource for ScriptedMediaSource {
    fn sample(&self) -> Result<(f32, VideoFrame), PeerLensError> {
        if self.stopped.load(Ordering::Relaxed) {
            return Err(PeerLensError::sampling("media source is stopped"));
        }

        let step = self.script.lock().expect("lock poisoned").pop_front();
        match step {
            Some(ScriptStep::Sample { audio_level, frame }) => {
                *self.last.lock().expect("lock poisoned") = Some((audio_level, frame.clone()));
                Ok((audio_level, frame))
            }
            Some(ScriptStep::Fail(reason)) => Err(PeerLensError::sampling(reason)),
            None => self
                .last
                .lock()
                .expect("lock poisoned")
                .clone()
                .ok_or_else(|| PeerLensError::sampling("script exhausted before any sample")),
        }
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::Relaxed);
    }
}
