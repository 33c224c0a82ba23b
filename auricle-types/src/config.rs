//! Service configuration.
//!
//! Loaded from a JSON file under the platform config directory. Every field
//! has a default so a missing or partial file still yields a working
//! configuration, and `clamp()` normalizes whatever was loaded so the
//! pipeline core only ever sees finite, in-range values.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Gain/gate parameters for one preprocessing stage.
///
/// Two independently tuned instances exist: one applied continuously to the
/// audio feeding voice-activity detection, one applied once per finalized
/// segment before transcription.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct GainConfig {
    /// Peak amplitude the gain aims for
    pub target_peak: f32,
    /// Upper bound on the applied gain
    pub max_gain: f32,
    /// Below this peak the buffer is left untouched (too quiet to estimate)
    pub min_peak_to_act: f32,
    /// Gains at or below this are not worth a copy
    pub min_gain_to_apply: f32,
    /// RMS below this nonzero value is zeroed out entirely (0 disables)
    pub noise_gate_rms: f32,
}

impl GainConfig {
    /// Defaults for the VAD stage: low target, aggressive gain, so quiet
    /// speech still trips the detector.
    pub fn vad_defaults() -> Self {
        Self {
            target_peak: 0.30,
            max_gain: 8.0,
            min_peak_to_act: 0.005,
            min_gain_to_apply: 1.05,
            noise_gate_rms: 0.0015,
        }
    }

    /// Defaults for the ASR stage: higher target, conservative gain, since
    /// the recognizer prefers natural dynamics.
    pub fn asr_defaults() -> Self {
        Self {
            target_peak: 0.70,
            max_gain: 3.0,
            min_peak_to_act: 0.01,
            min_gain_to_apply: 1.10,
            noise_gate_rms: 0.0,
        }
    }

    fn clamp(&mut self) {
        clamp_f32(&mut self.target_peak, 0.01, 1.0, 0.5);
        clamp_f32(&mut self.max_gain, 1.0, 100.0, 4.0);
        clamp_f32(&mut self.min_peak_to_act, 0.0, 1.0, 0.005);
        clamp_f32(&mut self.min_gain_to_apply, 1.0, 10.0, 1.05);
        clamp_f32(&mut self.noise_gate_rms, 0.0, 0.5, 0.0);
    }
}

impl Default for GainConfig {
    fn default() -> Self {
        Self::vad_defaults()
    }
}

/// Segment boundary tuning for the speech segmenter driver.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    /// Segments shorter than this are discarded (ms)
    pub min_segment_ms: u32,
    /// Segments are force-finalized at this duration (ms)
    pub max_segment_ms: u32,
    /// Segments quieter than this RMS are discarded
    pub min_segment_rms: f32,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            min_segment_ms: 300,
            max_segment_ms: 30_000,
            min_segment_rms: 0.004,
        }
    }
}

impl SegmenterConfig {
    fn clamp(&mut self) {
        self.min_segment_ms = self.min_segment_ms.clamp(0, 5_000);
        self.max_segment_ms = self.max_segment_ms.clamp(2_000, 120_000);
        clamp_f32(&mut self.min_segment_rms, 0.0, 0.5, 0.004);
    }
}

/// Overlap-context tuning: how much trailing audio to carry between
/// back-to-back segments, and how far apart segments may be for the carry
/// to still make sense.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlapConfig {
    /// Tail of the previous segment prepended to the next one (ms, 0 disables)
    pub overlap_ms: u32,
    /// Gap between segments beyond which no tail is carried (ms)
    pub max_gap_ms: u32,
}

impl Default for OverlapConfig {
    fn default() -> Self {
        Self {
            overlap_ms: 400,
            max_gap_ms: 2_000,
        }
    }
}

impl OverlapConfig {
    fn clamp(&mut self) {
        self.overlap_ms = self.overlap_ms.clamp(0, 2_000);
        self.max_gap_ms = self.max_gap_ms.clamp(0, 30_000);
    }
}

/// Speaker continuity tuning.
///
/// The strict-verification band edges and offsets are empirically tuned
/// values; treat them as knobs to validate against real recordings, not as
/// architecture.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeakerConfig {
    /// Base cosine-similarity threshold for a coarse match
    pub match_threshold: f32,
    /// Audio shorter than this many milliseconds is too little signal to
    /// trust an embedding; fall back to the last assigned speaker
    pub min_reliable_ms: u32,
    /// Segments longer than this always get strict re-verification (secs)
    pub long_segment_secs: f32,
    /// Ambiguous-candidate re-verification kicks in above this (secs)
    pub short_ambiguous_secs: f32,
    /// Additive strict offsets for short / medium / long segments
    pub strict_offsets: [f32; 3],
    /// Strict threshold never exceeds this ceiling
    pub strict_ceiling: f32,
    /// Observation count cap for centroid blending
    pub blend_count_cap: u32,
}

impl Default for SpeakerConfig {
    fn default() -> Self {
        Self {
            match_threshold: 0.60,
            min_reliable_ms: 400,
            long_segment_secs: 1.2,
            short_ambiguous_secs: 0.6,
            strict_offsets: [0.06, 0.10, 0.14],
            strict_ceiling: 0.92,
            blend_count_cap: 50,
        }
    }
}

impl SpeakerConfig {
    fn clamp(&mut self) {
        clamp_f32(&mut self.match_threshold, 0.0, 1.0, 0.60);
        self.min_reliable_ms = self.min_reliable_ms.clamp(0, 5_000);
        clamp_f32(&mut self.long_segment_secs, 0.1, 30.0, 1.2);
        clamp_f32(&mut self.short_ambiguous_secs, 0.0, 30.0, 0.6);
        for (i, default) in [0.06, 0.10, 0.14].iter().enumerate() {
            clamp_f32(&mut self.strict_offsets[i], 0.0, 0.5, *default);
        }
        clamp_f32(&mut self.strict_ceiling, 0.5, 1.0, 0.92);
        self.blend_count_cap = self.blend_count_cap.clamp(1, 10_000);
    }
}

/// Top-level service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub segmenter: SegmenterConfig,
    pub overlap: OverlapConfig,
    pub speakers: SpeakerConfig,
    pub gain_vad: GainConfig,
    pub gain_asr: GainConfig,
    /// Path to the whisper model file; None uses the bundled default lookup
    pub model_path: Option<PathBuf>,
    /// Directory for daily transcript files; None uses the platform data dir
    pub output_dir: Option<PathBuf>,
}

impl ServiceConfig {
    /// Load configuration from `path`. A missing file yields the defaults;
    /// an unreadable or unparseable file is an error so a typo does not
    /// silently run with defaults.
    pub fn load(path: &Path) -> Result<Self, std::io::Error> {
        if !path.exists() {
            let mut cfg = Self::default_tuned();
            cfg.clamp();
            return Ok(cfg);
        }
        let data = std::fs::read_to_string(path)?;
        let mut cfg: Self = serde_json::from_str(&data)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        cfg.clamp();
        Ok(cfg)
    }

    /// Defaults with the stage-specific gain tunings applied.
    pub fn default_tuned() -> Self {
        Self {
            gain_vad: GainConfig::vad_defaults(),
            gain_asr: GainConfig::asr_defaults(),
            ..Self::default()
        }
    }

    /// Normalize all fields to finite, in-range values.
    pub fn clamp(&mut self) {
        self.segmenter.clamp();
        self.overlap.clamp();
        self.speakers.clamp();
        self.gain_vad.clamp();
        self.gain_asr.clamp();
    }
}

/// Replace a non-finite or out-of-range value with its clamp or default.
fn clamp_f32(value: &mut f32, min: f32, max: f32, default: f32) {
    if !value.is_finite() {
        *value = default;
    } else {
        *value = value.clamp(min, max);
    }
}
