//! Spectral-fingerprint embedding backend.
//!
//! A lightweight, deterministic stand-in for a neural speaker-embedding
//! model: audio is framed, per-frame log energies are measured in a bank of
//! Goertzel filters, and the embedding is the per-band mean and spread of
//! the level-normalized spectral shape. Coarse, but stable for the same
//! voice and cheap enough to run on every segment. Neural backends replace
//! this behind the `EmbeddingExtractor` trait.

use super::{EmbeddingExtractor, EngineError};

/// Number of filterbank bands; embedding dimension is twice this
const BANDS: usize = 16;

/// Analysis frame length in samples (25 ms at 16 kHz)
const FRAME_LEN: usize = 400;

/// Hop between frames (50% overlap)
const FRAME_HOP: usize = 200;

/// Band center frequencies span the speech fundamentals and formants
const BAND_LOW_HZ: f32 = 150.0;
const BAND_HIGH_HZ: f32 = 3800.0;

/// Fewer frames than this and the fingerprint is not meaningful
const MIN_FRAMES: usize = 4;

/// Deterministic spectral fingerprint extractor.
pub struct SpectralFingerprint {
    sample_rate: u32,
    /// Precomputed Goertzel coefficients, one per band
    coefficients: [f32; BANDS],
}

impl SpectralFingerprint {
    pub fn new(sample_rate: u32) -> Self {
        let mut coefficients = [0.0f32; BANDS];
        let ratio = (BAND_HIGH_HZ / BAND_LOW_HZ).ln();
        for (i, coeff) in coefficients.iter_mut().enumerate() {
            // Log-spaced centers, matching how hearing spaces pitch
            let frac = i as f32 / (BANDS - 1) as f32;
            let freq = BAND_LOW_HZ * (ratio * frac).exp();
            let omega = 2.0 * std::f32::consts::PI * freq / sample_rate as f32;
            *coeff = 2.0 * omega.cos();
        }
        Self {
            sample_rate,
            coefficients,
        }
    }

    pub fn dimension(&self) -> usize {
        BANDS * 2
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Per-frame log energies, normalized to zero mean so overall level
    /// drops out and only spectral shape remains.
    fn frame_shape(&self, frame: &[f32]) -> [f32; BANDS] {
        let mut shape = [0.0f32; BANDS];
        for (band, coeff) in self.coefficients.iter().enumerate() {
            shape[band] = (goertzel_power(frame, *coeff) + 1e-10).log10();
        }
        let mean = shape.iter().sum::<f32>() / BANDS as f32;
        for v in shape.iter_mut() {
            *v -= mean;
        }
        shape
    }
}

impl EmbeddingExtractor for SpectralFingerprint {
    fn extract(&mut self, audio: &[f32]) -> Result<Option<Vec<f32>>, EngineError> {
        let frames: Vec<&[f32]> = audio
            .windows(FRAME_LEN)
            .step_by(FRAME_HOP)
            .collect();
        if frames.len() < MIN_FRAMES {
            return Ok(None);
        }

        let mut mean = [0.0f64; BANDS];
        let mut mean_sq = [0.0f64; BANDS];
        for frame in &frames {
            let shape = self.frame_shape(frame);
            for band in 0..BANDS {
                mean[band] += shape[band] as f64;
                mean_sq[band] += (shape[band] as f64) * (shape[band] as f64);
            }
        }

        let n = frames.len() as f64;
        let mut embedding = Vec::with_capacity(BANDS * 2);
        for band in 0..BANDS {
            let m = mean[band] / n;
            let var = (mean_sq[band] / n - m * m).max(0.0);
            embedding.push(m as f32);
            embedding.push(var.sqrt() as f32);
        }

        // Unit scale; callers treat a near-zero norm as invalid anyway.
        let norm = embedding.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for v in embedding.iter_mut() {
                *v /= norm;
            }
        }

        Ok(Some(embedding))
    }
}

/// Signal power at one Goertzel filter's frequency.
fn goertzel_power(frame: &[f32], coeff: f32) -> f32 {
    let mut s_prev = 0.0f32;
    let mut s_prev2 = 0.0f32;
    for &x in frame {
        let s = x + coeff * s_prev - s_prev2;
        s_prev2 = s_prev;
        s_prev = s;
    }
    (s_prev * s_prev + s_prev2 * s_prev2 - coeff * s_prev * s_prev2) / (frame.len() as f32).powi(2)
}
