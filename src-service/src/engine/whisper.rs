//! Whisper transcription backend.
//!
//! Wraps `whisper-rs` for offline audio-to-text. The model is loaded
//! lazily on the first segment so service startup stays fast, and decoded
//! text is post-processed to collapse repetition loops (a known whisper
//! hallucination mode on low-information audio).

use std::path::PathBuf;

use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use super::{EngineError, Transcriber};

/// Repeated phrase must occur at least this many times to count as a loop
const MIN_LOOP_REPETITIONS: usize = 3;

/// Shortest word sequence considered when hunting for loops
const MIN_LOOP_SEQ_WORDS: usize = 3;

/// Offline ASR backend over whisper.cpp.
pub struct WhisperBackend {
    model_path: PathBuf,
    ctx: Option<WhisperContext>,
}

impl WhisperBackend {
    pub fn new(model_path: Option<PathBuf>) -> Self {
        Self {
            model_path: model_path.unwrap_or_else(default_model_path),
            ctx: None,
        }
    }

    pub fn model_path(&self) -> &PathBuf {
        &self.model_path
    }

    fn ensure_loaded(&mut self) -> Result<&WhisperContext, EngineError> {
        if self.ctx.is_none() {
            if !self.model_path.exists() {
                return Err(EngineError::Model(format!(
                    "whisper model not found at {}",
                    self.model_path.display()
                )));
            }
            tracing::info!(path = %self.model_path.display(), "loading whisper model");
            let path = self.model_path.to_string_lossy();
            let ctx = WhisperContext::new_with_params(&path, WhisperContextParameters::default())
                .map_err(|e| EngineError::Model(e.to_string()))?;
            self.ctx = Some(ctx);
            tracing::info!("whisper model loaded");
        }
        Ok(self.ctx.as_ref().expect("context loaded above"))
    }

    fn decode_params() -> FullParams<'static, 'static> {
        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_special(false);
        params.set_print_timestamps(false);
        params.set_suppress_blank(true);
        params.set_language(None);
        params
    }
}

impl Transcriber for WhisperBackend {
    fn transcribe(&mut self, audio: &[f32]) -> Result<String, EngineError> {
        let ctx = self.ensure_loaded()?;
        let mut state = ctx
            .create_state()
            .map_err(|e| EngineError::Inference(e.to_string()))?;

        state
            .full(Self::decode_params(), audio)
            .map_err(|e| EngineError::Inference(e.to_string()))?;

        let n_segments = state
            .full_n_segments()
            .map_err(|e| EngineError::Inference(e.to_string()))?;

        let mut text = String::new();
        for i in 0..n_segments {
            if let Ok(segment) = state.full_get_segment_text(i) {
                let trimmed = segment.trim();
                if !trimmed.is_empty() {
                    if !text.is_empty() {
                        text.push(' ');
                    }
                    text.push_str(trimmed);
                }
            }
        }

        Ok(collapse_repetition_loops(&text))
    }
}

/// Default model location under the platform data directory.
pub fn default_model_path() -> PathBuf {
    auricle_types::paths::data_dir()
        .join("models")
        .join("ggml-base.en.bin")
}

/// Collapse hallucinated repetition loops, keeping the first occurrence.
///
/// Whisper occasionally emits output like "and that's the plan. and that's
/// the plan. and that's the plan." on trailing silence; the loop carries no
/// information beyond its first instance.
pub fn collapse_repetition_loops(text: &str) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() < MIN_LOOP_SEQ_WORDS * MIN_LOOP_REPETITIONS {
        return text.trim().to_string();
    }

    let lowered: Vec<String> = words.iter().map(|w| w.to_lowercase()).collect();

    // Longer sequences first: a long loop also matches at shorter lengths,
    // and collapsing the longest form keeps the most text intact.
    for seq_len in (MIN_LOOP_SEQ_WORDS..=words.len() / MIN_LOOP_REPETITIONS).rev() {
        for start in 0..=words.len().saturating_sub(seq_len * MIN_LOOP_REPETITIONS) {
            let pattern = &lowered[start..start + seq_len];

            let mut repeats = 1;
            let mut pos = start + seq_len;
            while pos + seq_len <= words.len() && &lowered[pos..pos + seq_len] == pattern {
                repeats += 1;
                pos += seq_len;
            }

            if repeats >= MIN_LOOP_REPETITIONS {
                let mut kept: Vec<&str> = Vec::with_capacity(words.len());
                kept.extend_from_slice(&words[..start + seq_len]);
                kept.extend_from_slice(&words[start + seq_len * repeats..]);
                let collapsed = kept.join(" ");
                tracing::debug!(seq_len, repeats, "collapsed repetition loop");
                return collapsed;
            }
        }
    }

    text.trim().to_string()
}
