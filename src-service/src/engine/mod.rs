//! Inference engine seams.
//!
//! All neural inference (voice-activity detection, speech recognition,
//! speaker embeddings) sits behind the narrow traits in this module. The
//! pipeline core never depends on a specific backend's configuration shape;
//! any backend that satisfies a trait can be substituted, and the bundled
//! defaults keep the service self-contained.

pub mod embedding;
pub mod energy_vad;
pub mod whisper;

use std::fmt;

/// Error produced by an inference backend.
#[derive(Debug)]
pub enum EngineError {
    /// The model file is missing or failed to load
    Model(String),
    /// Inference itself failed
    Inference(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Model(msg) => write!(f, "model error: {}", msg),
            EngineError::Inference(msg) => write!(f, "inference error: {}", msg),
        }
    }
}

impl std::error::Error for EngineError {}

/// Speech boundary signal emitted by a voice-activity backend.
#[derive(Debug, Clone, PartialEq)]
pub enum VadSignal {
    /// No boundary crossed in this chunk
    None,
    /// Speech confirmed; `lookback_samples` of audio before the current
    /// write position belong to the utterance
    SpeechStarted { lookback_samples: usize },
    /// Speech ended (hold time of silence elapsed)
    SpeechEnded,
}

/// Voice-activity detection: continuous chunks in, boundary signals out.
pub trait VoiceActivity {
    /// Process one chunk of mono samples and report any boundary crossed.
    fn process(&mut self, chunk: &[f32]) -> VadSignal;

    /// Forget all detection state.
    fn reset(&mut self);
}

/// Opaque audio-to-text function.
pub trait Transcriber {
    /// Transcribe mono samples at the pipeline rate. An empty string means
    /// no recognizable speech.
    fn transcribe(&mut self, audio: &[f32]) -> Result<String, EngineError>;
}

/// Opaque audio-to-vector function for speaker identity.
pub trait EmbeddingExtractor {
    /// Extract a fixed-length embedding. `Ok(None)` means the backend is
    /// not ready (insufficient signal for its internal buffering).
    fn extract(&mut self, audio: &[f32]) -> Result<Option<Vec<f32>>, EngineError>;
}

/// Nearest-neighbor store for speaker embeddings.
///
/// `verify` is an optional capability: backends that cannot re-score a
/// single entry return `None` from the default method, and callers probe
/// for availability rather than assuming it.
pub trait SpeakerIndex {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Best entry scoring at or above `threshold`, as `(index, score)`.
    fn search(&self, embedding: &[f32], threshold: f32) -> Option<(usize, f32)>;

    /// Add an embedding, returning its index.
    fn add(&mut self, embedding: Vec<f32>) -> usize;

    /// Replace the embedding at `index`.
    fn update(&mut self, index: usize, embedding: Vec<f32>);

    /// The embedding at `index`.
    fn get(&self, index: usize) -> &[f32];

    /// Re-score entry `index` against a stricter threshold. `None` when the
    /// backend does not support verification.
    fn verify(&self, _index: usize, _embedding: &[f32], _threshold: f32) -> Option<bool> {
        None
    }

    fn clear(&mut self);
}

/// Cosine similarity of two vectors; 0.0 when either has no magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a <= f32::EPSILON || norm_b <= f32::EPSILON {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// In-memory cosine-similarity index over stored centroids.
#[derive(Default)]
pub struct CentroidIndex {
    vectors: Vec<Vec<f32>>,
}

impl CentroidIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SpeakerIndex for CentroidIndex {
    fn len(&self) -> usize {
        self.vectors.len()
    }

    fn search(&self, embedding: &[f32], threshold: f32) -> Option<(usize, f32)> {
        let mut best: Option<(usize, f32)> = None;
        for (i, v) in self.vectors.iter().enumerate() {
            let score = cosine_similarity(v, embedding);
            if score >= threshold && best.map_or(true, |(_, s)| score > s) {
                best = Some((i, score));
            }
        }
        best
    }

    fn add(&mut self, embedding: Vec<f32>) -> usize {
        self.vectors.push(embedding);
        self.vectors.len() - 1
    }

    fn update(&mut self, index: usize, embedding: Vec<f32>) {
        self.vectors[index] = embedding;
    }

    fn get(&self, index: usize) -> &[f32] {
        &self.vectors[index]
    }

    fn verify(&self, index: usize, embedding: &[f32], threshold: f32) -> Option<bool> {
        Some(cosine_similarity(&self.vectors[index], embedding) >= threshold)
    }

    fn clear(&mut self) {
        self.vectors.clear();
    }
}
