//! Energy-based voice-activity backend.
//!
//! Multi-feature speech detection over RMS amplitude, zero-crossing rate
//! and a first-difference spectral-centroid approximation, with two
//! acceptance modes (normal voiced speech and soft/breathy speech) and
//! transient rejection. A lookback ring lets the detector report how much
//! audio before the confirmation point belongs to the utterance, so the
//! true start of speech is not clipped.

use super::{VadSignal, VoiceActivity};

/// Acceptance window for one speech mode.
#[derive(Clone, Copy)]
pub struct VadMode {
    /// Minimum amplitude in dB
    pub threshold_db: f32,
    /// Zero-crossing-rate window (crossings per sample)
    pub zcr_range: (f32, f32),
    /// Spectral-centroid window in Hz
    pub centroid_range: (f32, f32),
    /// Milliseconds of matching audio before speech is confirmed
    pub onset_ms: u32,
}

impl VadMode {
    fn matches(&self, f: &Features) -> bool {
        f.db >= self.threshold_db
            && f.zcr >= self.zcr_range.0
            && f.zcr <= self.zcr_range.1
            && f.centroid_hz >= self.centroid_range.0
            && f.centroid_hz <= self.centroid_range.1
    }
}

/// Per-chunk acoustic features.
struct Features {
    db: f32,
    zcr: f32,
    centroid_hz: f32,
}

/// Onset accumulator with a grace period: brief feature dips do not reset
/// the count, sustained mismatches do.
struct OnsetGate {
    required: u32,
    grace_limit: u32,
    pending: bool,
    accumulated: u32,
    grace: u32,
}

impl OnsetGate {
    fn new(required: u32, grace_limit: u32) -> Self {
        Self {
            required,
            grace_limit,
            pending: false,
            accumulated: 0,
            grace: 0,
        }
    }

    /// Feed one chunk's match result; returns true when onset is satisfied.
    fn observe(&mut self, matched: bool, samples: u32) -> bool {
        if matched {
            self.grace = 0;
            if self.pending {
                self.accumulated += samples;
            } else {
                self.pending = true;
                self.accumulated = samples;
            }
            self.accumulated >= self.required
        } else {
            if self.pending {
                self.grace += samples;
                if self.grace >= self.grace_limit {
                    self.reset();
                }
            }
            false
        }
    }

    fn reset(&mut self) {
        self.pending = false;
        self.accumulated = 0;
        self.grace = 0;
    }
}

/// Ring of recent samples for retroactive start-of-speech analysis.
struct LookbackRing {
    buffer: Vec<f32>,
    write: usize,
    filled: bool,
}

impl LookbackRing {
    fn new(capacity: usize) -> Self {
        Self {
            buffer: vec![0.0; capacity],
            write: 0,
            filled: false,
        }
    }

    fn push(&mut self, samples: &[f32]) {
        for &s in samples {
            self.buffer[self.write] = s;
            self.write = (self.write + 1) % self.buffer.len();
            if self.write == 0 {
                self.filled = true;
            }
        }
    }

    /// Contents oldest-first.
    fn chronological(&self) -> Vec<f32> {
        if !self.filled {
            return self.buffer[..self.write].to_vec();
        }
        let mut out = Vec::with_capacity(self.buffer.len());
        out.extend_from_slice(&self.buffer[self.write..]);
        out.extend_from_slice(&self.buffer[..self.write]);
        out
    }

    fn reset(&mut self) {
        self.write = 0;
        self.filled = false;
    }
}

/// Default voice-activity detector.
pub struct EnergyVad {
    sample_rate: u32,
    voiced: VadMode,
    soft: VadMode,
    voiced_gate: OnsetGate,
    soft_gate: OnsetGate,
    /// Transient rejection: both must be exceeded for a chunk to be dropped
    transient_zcr: f32,
    transient_centroid_hz: f32,
    hold_samples: u32,
    silence_samples: u32,
    speaking: bool,
    lookback: LookbackRing,
    lookback_threshold_db: f32,
    lookback_margin_samples: usize,
    warmed_up: bool,
}

impl EnergyVad {
    /// Detector with the default tuning:
    /// - voiced mode: -42 dB, ZCR 0.01-0.30, centroid 200-5500 Hz, 80 ms onset
    /// - soft mode: -52 dB, ZCR 0.08-0.45, centroid 300-7000 Hz, 120 ms onset
    /// - transient rejection above ZCR 0.45 and centroid 6500 Hz
    /// - 500 ms hold, 30 ms onset grace, 200 ms lookback at -55 dB
    pub fn new(sample_rate: u32) -> Self {
        let voiced = VadMode {
            threshold_db: -42.0,
            zcr_range: (0.01, 0.30),
            centroid_range: (200.0, 5500.0),
            onset_ms: 80,
        };
        let soft = VadMode {
            threshold_db: -52.0,
            zcr_range: (0.08, 0.45),
            centroid_range: (300.0, 7000.0),
            onset_ms: 120,
        };
        Self::with_modes(sample_rate, voiced, soft)
    }

    pub fn with_modes(sample_rate: u32, voiced: VadMode, soft: VadMode) -> Self {
        let ms = |millis: u32| (sample_rate as u64 * millis as u64 / 1000) as u32;
        let grace = ms(30);
        Self {
            sample_rate,
            voiced_gate: OnsetGate::new(ms(voiced.onset_ms), grace),
            soft_gate: OnsetGate::new(ms(soft.onset_ms), grace),
            voiced,
            soft,
            transient_zcr: 0.45,
            transient_centroid_hz: 6500.0,
            hold_samples: ms(500),
            silence_samples: 0,
            lookback: LookbackRing::new(ms(200) as usize),
            lookback_threshold_db: -55.0,
            lookback_margin_samples: ms(20) as usize,
            speaking: false,
            warmed_up: false,
        }
    }

    fn analyze(&self, chunk: &[f32]) -> Features {
        let db = amplitude_to_db(rms(chunk));
        Features {
            db,
            zcr: zero_crossing_rate(chunk),
            centroid_hz: self.estimate_centroid(chunk, db),
        }
    }

    /// First-difference spectral-centroid approximation, gated below -55 dB
    /// where the estimate is dominated by noise.
    fn estimate_centroid(&self, chunk: &[f32], db: f32) -> f32 {
        const GATE_DB: f32 = -55.0;
        if chunk.len() < 2 || db < GATE_DB {
            return 0.0;
        }
        let mut diff_sum = 0.0f32;
        for pair in chunk.windows(2) {
            diff_sum += (pair[1] - pair[0]).abs();
        }
        let mean_diff = diff_sum / (chunk.len() - 1) as f32;
        let mean_abs = chunk.iter().map(|s| s.abs()).sum::<f32>() / chunk.len() as f32;
        if mean_abs < 1e-10 {
            return 0.0;
        }
        self.sample_rate as f32 * mean_diff / (2.0 * mean_abs)
    }

    /// Scan the lookback ring backward for the earliest audio above the
    /// lookback threshold, returning how many samples before the current
    /// position speech actually began.
    fn lookback_sample_count(&self) -> usize {
        let buffer = self.lookback.chronological();
        if buffer.is_empty() {
            return 0;
        }

        const BLOCK: usize = 128;
        let threshold = 10.0f32.powf(self.lookback_threshold_db / 20.0);
        let mut earliest_above = buffer.len();

        let mut pos = buffer.len();
        while pos > 0 {
            let start = pos.saturating_sub(BLOCK);
            let peak = buffer[start..pos].iter().map(|s| s.abs()).fold(0.0f32, f32::max);
            if peak >= threshold {
                earliest_above = start;
            } else if earliest_above < buffer.len() {
                break;
            }
            pos = start;
        }

        let start = earliest_above.saturating_sub(self.lookback_margin_samples);
        buffer.len() - start
    }

    fn confirm_start(&mut self) -> VadSignal {
        self.speaking = true;
        self.silence_samples = 0;
        self.voiced_gate.reset();
        self.soft_gate.reset();
        let lookback_samples = self.lookback_sample_count();
        tracing::debug!(lookback_samples, "speech started");
        VadSignal::SpeechStarted { lookback_samples }
    }
}

impl VoiceActivity for EnergyVad {
    fn process(&mut self, chunk: &[f32]) -> VadSignal {
        self.lookback.push(chunk);
        let features = self.analyze(chunk);

        // First chunk only primes the feature state.
        if !self.warmed_up {
            self.warmed_up = true;
            return VadSignal::None;
        }

        let is_transient =
            features.zcr > self.transient_zcr && features.centroid_hz > self.transient_centroid_hz;
        if is_transient {
            self.voiced_gate.reset();
            self.soft_gate.reset();
            if !self.speaking {
                return VadSignal::None;
            }
        }

        let samples = chunk.len() as u32;
        let matched_voiced = !is_transient && self.voiced.matches(&features);
        let matched_soft = !is_transient && self.soft.matches(&features);

        if matched_voiced || matched_soft {
            self.silence_samples = 0;
            if !self.speaking {
                let voiced_done = self.voiced_gate.observe(matched_voiced, samples);
                let soft_done = self.soft_gate.observe(matched_soft, samples);
                if voiced_done || soft_done {
                    return self.confirm_start();
                }
            }
        } else {
            self.voiced_gate.observe(false, samples);
            self.soft_gate.observe(false, samples);
            if self.speaking {
                self.silence_samples += samples;
                if self.silence_samples >= self.hold_samples {
                    self.speaking = false;
                    tracing::debug!("speech ended");
                    return VadSignal::SpeechEnded;
                }
            }
        }

        VadSignal::None
    }

    fn reset(&mut self) {
        self.speaking = false;
        self.silence_samples = 0;
        self.voiced_gate.reset();
        self.soft_gate.reset();
        self.lookback.reset();
        self.warmed_up = false;
    }
}

/// RMS amplitude of a buffer.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Linear amplitude to decibels.
pub fn amplitude_to_db(amplitude: f32) -> f32 {
    if amplitude <= 0.0 {
        return f32::NEG_INFINITY;
    }
    20.0 * amplitude.log10()
}

/// Sign changes per sample.
pub fn zero_crossing_rate(samples: &[f32]) -> f32 {
    if samples.len() < 2 {
        return 0.0;
    }
    let crossings = samples
        .windows(2)
        .filter(|pair| (pair[1] >= 0.0) != (pair[0] >= 0.0))
        .count();
    crossings as f32 / (samples.len() - 1) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 16_000;

    fn sine_chunk(freq: f32, amplitude: f32, len: usize, phase_offset: usize) -> Vec<f32> {
        (0..len)
            .map(|i| {
                let n = (i + phase_offset) as f32;
                amplitude * (2.0 * std::f32::consts::PI * freq * n / RATE as f32).sin()
            })
            .collect()
    }

    fn run_chunks(vad: &mut EnergyVad, chunks: usize, make: impl Fn(usize) -> Vec<f32>) -> Vec<VadSignal> {
        (0..chunks)
            .map(|i| vad.process(&make(i)))
            .filter(|s| *s != VadSignal::None)
            .collect()
    }

    #[test]
    fn test_rms_and_db() {
        assert!((rms(&[0.5, -0.5, 0.5, -0.5]) - 0.5).abs() < 1e-3);
        assert!((amplitude_to_db(0.1) + 20.0).abs() < 1e-3);
        assert!(amplitude_to_db(0.0).is_infinite());
    }

    #[test]
    fn test_zero_crossing_rate() {
        assert!((zero_crossing_rate(&[0.5, -0.5, 0.5, -0.5, 0.5]) - 1.0).abs() < 1e-3);
        assert!(zero_crossing_rate(&[0.5, 0.5, 0.5]).abs() < 1e-3);
    }

    #[test]
    fn test_tone_triggers_start_then_silence_ends() {
        let mut vad = EnergyVad::new(RATE);

        // ~200ms of a speech-band tone: warmup chunk + 80ms onset
        let started = run_chunks(&mut vad, 20, |i| sine_chunk(440.0, 0.3, 160, i * 160));
        assert!(
            matches!(started.first(), Some(VadSignal::SpeechStarted { .. })),
            "expected start, got {:?}",
            started
        );

        // 600ms of silence exceeds the 500ms hold
        let ended = run_chunks(&mut vad, 60, |_| vec![0.0; 160]);
        assert_eq!(ended, vec![VadSignal::SpeechEnded]);
    }

    #[test]
    fn test_start_reports_lookback() {
        let mut vad = EnergyVad::new(RATE);
        let mut lookback = None;
        for i in 0..20 {
            if let VadSignal::SpeechStarted { lookback_samples } =
                vad.process(&sine_chunk(440.0, 0.3, 160, i * 160))
            {
                lookback = Some(lookback_samples);
                break;
            }
        }
        // At minimum the onset audio itself is recovered.
        let lookback = lookback.expect("no start detected");
        assert!(lookback >= (RATE as usize * 80 / 1000));
    }

    #[test]
    fn test_transient_never_confirms() {
        let mut vad = EnergyVad::new(RATE);
        // Alternating full-scale samples: ZCR 1.0, centroid at the Nyquist
        // estimate, rejected as a transient.
        let click: Vec<f32> = (0..160).map(|i| if i % 2 == 0 { 0.5 } else { -0.5 }).collect();
        for _ in 0..40 {
            assert_eq!(vad.process(&click), VadSignal::None);
        }
    }

    #[test]
    fn test_silence_alone_never_confirms() {
        let mut vad = EnergyVad::new(RATE);
        for _ in 0..100 {
            assert_eq!(vad.process(&vec![0.0; 160]), VadSignal::None);
        }
    }

    #[test]
    fn test_reset_forgets_speaking_state() {
        let mut vad = EnergyVad::new(RATE);
        let _ = run_chunks(&mut vad, 20, |i| sine_chunk(440.0, 0.3, 160, i * 160));
        vad.reset();
        // No SpeechEnded after reset even through a long silence.
        let signals = run_chunks(&mut vad, 60, |_| vec![0.0; 160]);
        assert!(signals.is_empty());
    }
}
