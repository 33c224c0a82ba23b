//! Gain/gate preprocessing.
//!
//! Per-buffer amplitude normalization with a noise gate. Two independently
//! configured instances run in the pipeline: one continuously ahead of
//! voice-activity detection (low target, aggressive gain) and one per
//! finalized segment ahead of transcription (higher target, gentle gain).
//! Instances are plain values; nothing is shared between them.

use std::borrow::Cow;

use auricle_types::GainConfig;

use crate::engine::energy_vad::rms;

/// Stateless gain/gate stage.
#[derive(Debug, Clone, Copy)]
pub struct GainGate {
    cfg: GainConfig,
}

impl GainGate {
    pub fn new(cfg: GainConfig) -> Self {
        Self { cfg }
    }

    /// Apply the gate and gain to `samples`.
    ///
    /// Borrows the input whenever no change is needed; allocates only for
    /// the gated-to-silence and amplified cases.
    pub fn apply<'a>(&self, samples: &'a [f32]) -> Cow<'a, [f32]> {
        if samples.is_empty() {
            return Cow::Borrowed(samples);
        }

        if self.cfg.noise_gate_rms > 0.0 && rms(samples) < self.cfg.noise_gate_rms {
            // Background hiss: silence it rather than letting the gain
            // stage amplify it into phantom speech.
            return Cow::Owned(vec![0.0; samples.len()]);
        }

        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);
        if peak < self.cfg.min_peak_to_act {
            return Cow::Borrowed(samples);
        }

        let gain = self.cfg.max_gain.min(self.cfg.target_peak / peak);
        if gain <= self.cfg.min_gain_to_apply {
            return Cow::Borrowed(samples);
        }

        Cow::Owned(
            samples
                .iter()
                .map(|s| (s * gain).clamp(-1.0, 1.0))
                .collect(),
        )
    }
}
