//! Speech segment driver.
//!
//! Couples a voice-activity backend to a sample ring and turns boundary
//! signals into discrete `SpeechSegment` events with wall-clock start times.
//! The driver also enforces segment validity (minimum duration, minimum
//! energy) and force-finalizes pathological never-ending speech at the
//! configured maximum duration.

use chrono::{DateTime, Duration, Utc};

use auricle_types::SegmenterConfig;

use super::ring_buffer::SampleRing;
use crate::engine::energy_vad::rms;
use crate::engine::{VadSignal, VoiceActivity};

/// A contiguous span of detected speech. Immutable once emitted.
#[derive(Debug, Clone)]
pub struct SpeechSegment {
    /// Mono samples at the pipeline rate, untouched by any gain stage
    pub samples: Vec<f32>,
    /// Wall-clock start of the utterance
    pub start: DateTime<Utc>,
    /// Duration in seconds
    pub duration_secs: f64,
}

impl SpeechSegment {
    /// Wall-clock end of the utterance.
    pub fn end(&self) -> DateTime<Utc> {
        self.start + Duration::milliseconds((self.duration_secs * 1000.0) as i64)
    }
}

/// Ring capacity margin beyond the maximum segment duration, in ms.
const RING_MARGIN_MS: u64 = 5_000;

pub struct SegmentDriver {
    cfg: SegmenterConfig,
    sample_rate: u32,
    ring: SampleRing,
    vad: Box<dyn VoiceActivity>,
    in_speech: bool,
    segment_start_idx: usize,
    segment_samples: u64,
    segment_start: DateTime<Utc>,
}

impl SegmentDriver {
    pub fn new(cfg: SegmenterConfig, sample_rate: u32, vad: Box<dyn VoiceActivity>) -> Self {
        let capacity =
            (sample_rate as u64 * (cfg.max_segment_ms as u64 + RING_MARGIN_MS) / 1000) as usize;
        Self {
            cfg,
            sample_rate,
            ring: SampleRing::new(capacity),
            vad,
            in_speech: false,
            segment_start_idx: 0,
            segment_samples: 0,
            segment_start: Utc::now(),
        }
    }

    /// Feed one chunk. `raw` is the original audio retained for extraction;
    /// `vad_input` is the same chunk after VAD-stage gain/gate.
    ///
    /// Returns a finalized segment when one completed inside this chunk.
    pub fn process(&mut self, raw: &[f32], vad_input: &[f32]) -> Option<SpeechSegment> {
        self.ring.write(raw);

        let mut started_this_chunk = false;
        match self.vad.process(vad_input) {
            VadSignal::SpeechStarted { lookback_samples } => {
                if !self.in_speech {
                    self.begin_segment(lookback_samples);
                    started_this_chunk = true;
                }
            }
            VadSignal::SpeechEnded => {
                if self.in_speech {
                    return self.finalize();
                }
            }
            VadSignal::None => {}
        }

        if self.in_speech {
            if !started_this_chunk {
                self.segment_samples += raw.len() as u64;
            }
            let duration_secs = self.segment_samples as f64 / self.sample_rate as f64;
            if duration_secs * 1000.0 >= self.cfg.max_segment_ms as f64 {
                tracing::debug!(duration_secs, "max segment duration reached, force finalizing");
                return self.finalize();
            }
        }

        None
    }

    pub fn reset(&mut self) {
        self.ring.clear();
        self.vad.reset();
        self.in_speech = false;
        self.segment_samples = 0;
    }

    fn begin_segment(&mut self, lookback_samples: usize) {
        self.in_speech = true;
        self.segment_start_idx = self.ring.index_behind(lookback_samples);
        self.segment_samples = lookback_samples as u64;
        let lookback_ms = lookback_samples as i64 * 1000 / self.sample_rate as i64;
        self.segment_start = Utc::now() - Duration::milliseconds(lookback_ms);
        tracing::debug!(lookback_samples, "segment started");
    }

    fn finalize(&mut self) -> Option<SpeechSegment> {
        self.in_speech = false;
        self.segment_samples = 0;

        let samples = self.ring.extract_from(self.segment_start_idx);
        if samples.is_empty() {
            return None;
        }

        let duration_secs = samples.len() as f64 / self.sample_rate as f64;
        if (duration_secs * 1000.0) < self.cfg.min_segment_ms as f64 {
            tracing::debug!(duration_secs, "segment below minimum duration, dropped");
            return None;
        }

        let level = rms(&samples);
        if level < self.cfg.min_segment_rms {
            tracing::debug!(level, "segment below minimum energy, dropped");
            return None;
        }

        tracing::debug!(duration_secs, level, "segment finalized");
        Some(SpeechSegment {
            samples,
            start: self.segment_start,
            duration_secs,
        })
    }
}
