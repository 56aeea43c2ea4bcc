//! Keyframe sampling engine
//!
//! A fixed-rate loop that reads audio level and video frames from a media
//! source, applies the loud-audio and scene-change rules, and records
//! qualifying moments to the event log. One spawned task owns all mutable
//! tick state; ticks never interleave.

pub mod detector;
pub mod snapshot;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::errors::PeerLensError;
use crate::events::EventLog;
use crate::media::MediaSource;
use crate::timing::MonotonicClock;
use crate::types::{KeyframeEvent, KeyframeKind, MediaSample, VideoFrame};

const EVENT_CAPACITY: usize = 32;

/// Sampling cadence and thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Milliseconds between ticks.
    pub tick_interval_ms: u64,
    /// Audio levels strictly above this (0-255 scale) capture a moment.
    pub audio_threshold: f32,
    /// Milliseconds between video checkpoints.
    pub video_interval_ms: u64,
    /// Frame differences strictly above this (0-255 scale) capture a moment.
    pub video_threshold: f64,
    /// Minimum milliseconds between consecutive audio events. 0 disables
    /// the cooldown and every loud tick emits.
    pub audio_cooldown_ms: u64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100,
            audio_threshold: 128.0,
            video_interval_ms: 3000,
            video_threshold: 0.1,
            audio_cooldown_ms: 1000,
        }
    }
}

/// Fixed-rate keyframe detector over a live media source.
///
/// Construction is passive. `start` spawns the tick task against a source;
/// `stop` halts it and joins, after which no further event can be observed.
pub struct KeyframeSampler {
    config: SamplerConfig,
    log: Arc<EventLog>,
    events: broadcast::Sender<KeyframeEvent>,
    stop_flag: Arc<AtomicBool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl KeyframeSampler {
    pub fn new(config: SamplerConfig, log: Arc<EventLog>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            config,
            log,
            events,
            stop_flag: Arc::new(AtomicBool::new(false)),
            task: Mutex::new(None),
        }
    }

    /// Begin ticking against the given source. Fails if already running.
    pub fn start(&self, source: Arc<dyn MediaSource>) -> Result<(), PeerLensError> {
        let mut task = self.task.lock().expect("lock poisoned");
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return Err(PeerLensError::invalid_state("sampler is already running"));
        }

        self.stop_flag.store(false, Ordering::Relaxed);
        let tick_loop = TickLoop {
            config: self.config.clone(),
            source,
            log: Arc::clone(&self.log),
            events: self.events.clone(),
            stop_flag: Arc::clone(&self.stop_flag),
        };
        *task = Some(tokio::spawn(tick_loop.run()));
        Ok(())
    }

    /// Halt the tick loop and wait for it to finish. Idempotent; once this
    /// returns, no further events are emitted.
    pub async fn stop(&self) -> Result<(), PeerLensError> {
        self.stop_flag.store(true, Ordering::Relaxed);
        let handle = self.task.lock().expect("lock poisoned").take();
        if let Some(handle) = handle {
            handle
                .await
                .map_err(|e| PeerLensError::sampling(format!("sampler task failed: {}", e)))?;
        }
        Ok(())
    }

    /// Observe captured keyframes as they happen. The event log keeps the
    /// full history regardless of subscribers.
    pub fn subscribe(&self) -> broadcast::Receiver<KeyframeEvent> {
        self.events.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .expect("lock poisoned")
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }
}

/// Everything one sampling run mutates, owned by the spawned task.
struct TickLoop {
    config: SamplerConfig,
    source: Arc<dyn MediaSource>,
    log: Arc<EventLog>,
    events: broadcast::Sender<KeyframeEvent>,
    stop_flag: Arc<AtomicBool>,
}

impl TickLoop {
    async fn run(self) {
        let clock = MonotonicClock::new();
        let mut ticker = interval(Duration::from_millis(self.config.tick_interval_ms));
        // Overrun ticks are skipped, never run back-to-back.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut previous_frame: Option<VideoFrame> = None;
        let mut last_checkpoint_ms: Option<u64> = None;
        let mut last_audio_event_ms: Option<u64> = None;

        log::info!(
            "sampler started: tick every {} ms, video checkpoint every {} ms",
            self.config.tick_interval_ms,
            self.config.video_interval_ms
        );

        loop {
            ticker.tick().await;
            if self.stop_flag.load(Ordering::Relaxed) {
                break;
            }

            let (audio_level, frame) = match self.source.sample() {
                Ok(reading) => reading,
                Err(e) => {
                    log::warn!("media sample failed, skipping tick: {}", e);
                    continue;
                }
            };
            let frame = match frame.downscale_for_analysis() {
                Ok(frame) => frame,
                Err(e) => {
                    log::warn!("frame downscale failed, skipping tick: {}", e);
                    continue;
                }
            };

            let sample = MediaSample {
                audio_level,
                frame,
                timestamp_ms: clock.now_ms(),
            };

            self.audio_rule(&sample, &mut last_audio_event_ms);
            self.video_rule(&sample, &mut previous_frame, &mut last_checkpoint_ms);
        }

        log::info!("sampler stopped");
    }

    /// Loud audio captures a moment immediately, subject to the cooldown.
    fn audio_rule(&self, sample: &MediaSample, last_audio_event_ms: &mut Option<u64>) {
        if sample.audio_level <= self.config.audio_threshold {
            return;
        }

        if self.config.audio_cooldown_ms > 0 {
            if let Some(last) = *last_audio_event_ms {
                if sample.timestamp_ms.saturating_sub(last) < self.config.audio_cooldown_ms {
                    log::debug!(
                        "loud tick at {} ms suppressed by cooldown",
                        sample.timestamp_ms
                    );
                    return;
                }
            }
        }

        if self.emit(KeyframeKind::Audio, sample) {
            *last_audio_event_ms = Some(sample.timestamp_ms);
        }
    }

    /// Scene changes are checked at checkpoint cadence. The first tick is
    /// the first checkpoint and only stores the baseline.
    fn video_rule(
        &self,
        sample: &MediaSample,
        previous_frame: &mut Option<VideoFrame>,
        last_checkpoint_ms: &mut Option<u64>,
    ) {
        let due = match *last_checkpoint_ms {
            None => true,
            Some(last) => {
                sample.timestamp_ms.saturating_sub(last) >= self.config.video_interval_ms
            }
        };
        if !due {
            return;
        }

        if let Some(previous) = previous_frame.as_ref() {
            let diff = detector::frame_difference(previous, &sample.frame);
            if diff > self.config.video_threshold {
                log::debug!(
                    "scene change {:.3} at {} ms checkpoint",
                    diff,
                    sample.timestamp_ms
                );
                self.emit(KeyframeKind::Video, sample);
            }
        }

        // The baseline advances every checkpoint, event or not.
        *previous_frame = Some(sample.frame.clone());
        *last_checkpoint_ms = Some(sample.timestamp_ms);
    }

    /// Encode, log, broadcast. Returns false when the snapshot could not be
    /// encoded and the event was dropped.
    fn emit(&self, kind: KeyframeKind, sample: &MediaSample) -> bool {
        let png = match snapshot::encode_snapshot(&sample.frame) {
            Ok(bytes) => bytes,
            Err(e) => {
                log::warn!(
                    "dropping {} keyframe at {} ms: {}",
                    kind,
                    sample.timestamp_ms,
                    e
                );
                return false;
            }
        };

        let event = KeyframeEvent::new(kind, sample.timestamp_ms, png);
        log::info!(
            "{} keyframe {} captured at {} ms",
            kind,
            event.id,
            event.timestamp_ms
        );
        // Log first so subscribers always find the event in the log.
        self.log.append(event.clone());
        let _ = self.events.send(event);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Source for rule-level tests that never reach the tick loop.
    struct IdleSource;

    impl MediaSource for IdleSource {
        fn sample(&self) -> Result<(f32, VideoFrame), PeerLensError> {
            Err(PeerLensError::sampling("idle source has no samples"))
        }

        fn stop(&self) {}
    }

    fn rule_harness(config: SamplerConfig) -> (TickLoop, Arc<EventLog>) {
        let log = Arc::new(EventLog::new());
        let (events, _) = broadcast::channel(8);
        let tick_loop = TickLoop {
            config,
            source: Arc::new(IdleSource),
            log: Arc::clone(&log),
            events,
            stop_flag: Arc::new(AtomicBool::new(false)),
        };
        (tick_loop, log)
    }

    fn sample_at(timestamp_ms: u64, audio_level: f32, pixel: u8) -> MediaSample {
        MediaSample {
            audio_level,
            frame: VideoFrame::new(2, 2, vec![pixel; 12]),
            timestamp_ms,
        }
    }

    #[test]
    fn test_config_defaults() {
        let config = SamplerConfig::default();
        assert_eq!(config.tick_interval_ms, 100);
        assert_eq!(config.audio_threshold, 128.0);
        assert_eq!(config.video_interval_ms, 3000);
        assert_eq!(config.video_threshold, 0.1);
        assert_eq!(config.audio_cooldown_ms, 1000);
    }

    #[test]
    fn test_audio_threshold_is_strict() {
        let (tick_loop, log) = rule_harness(SamplerConfig::default());
        let mut last_audio = None;

        tick_loop.audio_rule(&sample_at(100, 128.0, 10), &mut last_audio);
        assert!(log.is_empty(), "level equal to the threshold never fires");

        tick_loop.audio_rule(&sample_at(200, 128.5, 10), &mut last_audio);
        assert_eq!(log.len(), 1);
        assert_eq!(last_audio, Some(200));
    }

    #[test]
    fn test_audio_cooldown_suppresses_then_releases() {
        let (tick_loop, log) = rule_harness(SamplerConfig {
            audio_cooldown_ms: 1000,
            ..SamplerConfig::default()
        });
        let mut last_audio = None;

        tick_loop.audio_rule(&sample_at(0, 200.0, 10), &mut last_audio);
        tick_loop.audio_rule(&sample_at(500, 200.0, 10), &mut last_audio);
        assert_eq!(log.len(), 1, "second loud tick lands inside the cooldown");

        tick_loop.audio_rule(&sample_at(1000, 200.0, 10), &mut last_audio);
        assert_eq!(log.len(), 2, "cooldown expires exactly at the interval");
        assert_eq!(last_audio, Some(1000));
    }

    #[test]
    fn test_audio_cooldown_zero_emits_every_loud_tick() {
        let (tick_loop, log) = rule_harness(SamplerConfig {
            audio_cooldown_ms: 0,
            ..SamplerConfig::default()
        });
        let mut last_audio = None;

        for tick in 0..4u64 {
            tick_loop.audio_rule(&sample_at(tick * 100, 220.0, 10), &mut last_audio);
        }
        assert_eq!(log.len(), 4);
    }

    #[test]
    fn test_level_sequence_fires_only_on_the_loud_tick() {
        let (tick_loop, log) = rule_harness(SamplerConfig::default());
        let mut last_audio = None;

        for (tick, level) in [50.0, 60.0, 200.0, 40.0].into_iter().enumerate() {
            tick_loop.audio_rule(&sample_at(tick as u64 * 100, level, 10), &mut last_audio);
        }

        let all = log.all();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].kind, KeyframeKind::Audio);
        assert_eq!(all[0].timestamp_ms, 200, "only the third tick is loud");
    }

    #[test]
    fn test_first_checkpoint_stores_baseline_without_event() {
        let (tick_loop, log) = rule_harness(SamplerConfig::default());
        let mut previous = None;
        let mut checkpoint = None;

        tick_loop.video_rule(&sample_at(0, 0.0, 10), &mut previous, &mut checkpoint);
        assert!(log.is_empty());
        assert!(previous.is_some());
        assert_eq!(checkpoint, Some(0));
    }

    #[test]
    fn test_video_rule_waits_for_checkpoint_cadence() {
        let (tick_loop, log) = rule_harness(SamplerConfig::default());
        let mut previous = None;
        let mut checkpoint = None;

        tick_loop.video_rule(&sample_at(0, 0.0, 10), &mut previous, &mut checkpoint);
        // Wildly different frame, but only 100 ms in: not a checkpoint.
        tick_loop.video_rule(&sample_at(100, 0.0, 250), &mut previous, &mut checkpoint);
        assert!(log.is_empty());
        assert_eq!(checkpoint, Some(0), "off-cadence ticks leave the baseline alone");

        tick_loop.video_rule(&sample_at(3000, 0.0, 250), &mut previous, &mut checkpoint);
        assert_eq!(log.len(), 1);
        assert_eq!(log.all()[0].kind, KeyframeKind::Video);
        assert_eq!(checkpoint, Some(3000));
    }

    #[test]
    fn test_quiet_checkpoint_still_advances_baseline() {
        let (tick_loop, log) = rule_harness(SamplerConfig::default());
        let mut previous = None;
        let mut checkpoint = None;

        tick_loop.video_rule(&sample_at(0, 0.0, 10), &mut previous, &mut checkpoint);
        tick_loop.video_rule(&sample_at(3000, 0.0, 10), &mut previous, &mut checkpoint);
        assert!(log.is_empty(), "identical frames never fire");
        assert_eq!(checkpoint, Some(3000));

        // The 6000 ms frame diffs against the 3000 ms baseline, not the
        // original one.
        tick_loop.video_rule(&sample_at(6000, 0.0, 10), &mut previous, &mut checkpoint);
        assert!(log.is_empty());
        assert_eq!(checkpoint, Some(6000));
    }
}
