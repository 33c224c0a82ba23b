//! Speaker continuity tracking.
//!
//! Assigns a stable `Speaker_<n>` label to each segment, balancing three
//! failure modes: splitting one voice into many identities on short noisy
//! segments, merging two voices whose embeddings are superficially close,
//! and unbounded identity growth from transient noise. Matching is coarse
//! nearest-neighbor search plus a strict re-verification pass for the
//! segments where a wrong answer is most damaging; confirmed matches blend
//! into a running centroid; everything is persisted after each change so
//! identities survive restarts.

use std::path::PathBuf;

use auricle_types::{PersistedSpeaker, PersistedSpeakerStore, SpeakerConfig};

use super::store;
use crate::engine::{EmbeddingExtractor, SpeakerIndex};

/// Label used when no embedding can be trusted and no speaker is known yet.
pub const UNKNOWN_SPEAKER: &str = "Unknown";

pub struct SpeakerTracker {
    cfg: SpeakerConfig,
    min_reliable_samples: usize,
    sample_rate: u32,
    extractor: Box<dyn EmbeddingExtractor>,
    index: Box<dyn SpeakerIndex>,
    /// Display names, parallel to the index entries
    names: Vec<String>,
    /// Observation counts, parallel to the index entries
    counts: Vec<u32>,
    /// Allocation counter; never decreases, names are never reused
    speaker_count: u32,
    last_assigned: Option<String>,
    store_path: PathBuf,
}

impl SpeakerTracker {
    pub fn new(
        cfg: SpeakerConfig,
        sample_rate: u32,
        extractor: Box<dyn EmbeddingExtractor>,
        index: Box<dyn SpeakerIndex>,
        store_path: PathBuf,
    ) -> Self {
        let min_reliable_samples =
            (sample_rate as u64 * cfg.min_reliable_ms as u64 / 1000) as usize;
        let mut tracker = Self {
            cfg,
            min_reliable_samples,
            sample_rate,
            extractor,
            index,
            names: Vec::new(),
            counts: Vec::new(),
            speaker_count: 0,
            last_assigned: None,
            store_path,
        };
        tracker.load();
        tracker
    }

    pub fn known_speakers(&self) -> usize {
        self.index.len()
    }

    /// Identify the speaker of `audio` (original, ungained segment audio).
    ///
    /// Never fails: insufficient or untrustworthy signal falls back to the
    /// last assigned speaker, or `Unknown` before any assignment.
    pub fn identify(&mut self, audio: &[f32]) -> String {
        if audio.len() < self.min_reliable_samples {
            return self.fallback_name();
        }

        let embedding = match self.extractor.extract(audio) {
            Ok(Some(embedding)) => embedding,
            Ok(None) => {
                tracing::debug!("embedding extractor not ready, reusing last speaker");
                return self.fallback_name();
            }
            Err(e) => {
                tracing::warn!(error = %e, "embedding extraction failed, reusing last speaker");
                return self.fallback_name();
            }
        };
        if !is_valid_embedding(&embedding) {
            tracing::debug!("invalid embedding, reusing last speaker");
            return self.fallback_name();
        }

        let duration_secs = audio.len() as f64 / self.sample_rate as f64;

        if let Some((idx, score)) = self.index.search(&embedding, self.cfg.match_threshold) {
            if self.confirm_match(idx, &embedding, score, duration_secs) {
                return self.accept_match(idx, embedding);
            }
            tracing::debug!(
                candidate = %self.names[idx],
                score,
                duration_secs,
                "strict verification rejected candidate, creating new speaker"
            );
        }

        self.create_speaker(embedding)
    }

    /// Forget every known speaker and persist the empty store.
    pub fn reset(&mut self) {
        self.index.clear();
        self.names.clear();
        self.counts.clear();
        self.speaker_count = 0;
        self.last_assigned = None;
        self.persist();
        tracing::info!("speaker store reset");
    }

    fn fallback_name(&self) -> String {
        self.last_assigned
            .clone()
            .unwrap_or_else(|| UNKNOWN_SPEAKER.to_string())
    }

    /// Decide whether the coarse match stands, re-verifying strictly where
    /// a wrong answer is most damaging.
    ///
    /// Strict verification runs for long segments (plenty of signal, so
    /// demand a high score) and for medium segments whose candidate is a
    /// *different* speaker than the one just active when at least two are
    /// known. Short backchannels matched to the active speaker skip it:
    /// re-scoring every "yeah" against the current speaker is expensive and
    /// failure-prone on so little audio.
    fn confirm_match(&self, idx: usize, embedding: &[f32], score: f32, duration_secs: f64) -> bool {
        let candidate_differs = self
            .last_assigned
            .as_deref()
            .map_or(true, |last| last != self.names[idx]);
        let needs_strict = duration_secs > self.cfg.long_segment_secs as f64
            || (self.index.len() >= 2
                && candidate_differs
                && duration_secs > self.cfg.short_ambiguous_secs as f64);
        if !needs_strict {
            return true;
        }

        let threshold = self.strict_threshold(duration_secs);
        match self.index.verify(idx, embedding, threshold) {
            Some(verified) => {
                if !verified {
                    tracing::debug!(score, threshold, "candidate failed strict threshold");
                }
                verified
            }
            // Index backend offers no verification capability; the coarse
            // match is the best answer available.
            None => true,
        }
    }

    /// Strict threshold for a segment: longer audio carries more signal, so
    /// more similarity is demanded before merging identities.
    fn strict_threshold(&self, duration_secs: f64) -> f32 {
        let offset = if duration_secs < self.cfg.short_ambiguous_secs as f64 {
            self.cfg.strict_offsets[0]
        } else if duration_secs < self.cfg.long_segment_secs as f64 {
            self.cfg.strict_offsets[1]
        } else {
            self.cfg.strict_offsets[2]
        };
        (self.cfg.match_threshold + offset).min(self.cfg.strict_ceiling)
    }

    /// Blend a confirmed observation into the stored centroid.
    ///
    /// The running average is weighted by an observation count capped so
    /// one outlier cannot drag a mature centroid far, and a mature centroid
    /// can still drift with a voice across a long session.
    fn accept_match(&mut self, idx: usize, embedding: Vec<f32>) -> String {
        let weight = self.counts[idx].min(self.cfg.blend_count_cap) as f32;
        let old = self.index.get(idx);
        let mut blended: Vec<f32> = old
            .iter()
            .zip(embedding.iter())
            .map(|(o, n)| (o * weight + n) / (weight + 1.0))
            .collect();
        unit_scale(&mut blended);

        self.index.update(idx, blended);
        self.counts[idx] = self.counts[idx].saturating_add(1);
        let name = self.names[idx].clone();
        self.last_assigned = Some(name.clone());
        self.persist();
        tracing::debug!(speaker = %name, observations = self.counts[idx], "speaker matched");
        name
    }

    fn create_speaker(&mut self, mut embedding: Vec<f32>) -> String {
        unit_scale(&mut embedding);
        self.speaker_count += 1;
        let name = format!("Speaker_{}", self.speaker_count);
        self.index.add(embedding);
        self.names.push(name.clone());
        self.counts.push(1);
        self.last_assigned = Some(name.clone());
        self.persist();
        tracing::info!(speaker = %name, "new speaker");
        name
    }

    /// Best-effort persistence: a write failure is logged and the in-memory
    /// result of the current identification stands.
    fn persist(&self) {
        let store = PersistedSpeakerStore {
            speaker_count: self.speaker_count,
            speakers: self
                .names
                .iter()
                .enumerate()
                .map(|(i, name)| PersistedSpeaker {
                    name: name.clone(),
                    embedding: self.index.get(i).to_vec(),
                    count: self.counts[i],
                })
                .collect(),
        };
        if let Err(e) = store::save_snapshot(&self.store_path, &store) {
            tracing::warn!(path = %self.store_path.display(), error = %e, "speaker store write failed");
        }
    }

    /// Load the persisted store; individually invalid entries are skipped,
    /// and a missing or corrupt store means a fresh start.
    fn load(&mut self) {
        let Some(persisted) = store::load_snapshot::<PersistedSpeakerStore>(&self.store_path)
        else {
            return;
        };

        let mut highest: Option<(u32, String)> = None;
        for speaker in persisted.speakers {
            if !is_valid_embedding(&speaker.embedding) {
                tracing::warn!(name = %speaker.name, "skipping stored speaker with invalid embedding");
                continue;
            }
            if let Some(n) = speaker_number(&speaker.name) {
                if highest.as_ref().map_or(true, |(h, _)| n > *h) {
                    highest = Some((n, speaker.name.clone()));
                }
            }
            self.index.add(speaker.embedding);
            self.names.push(speaker.name);
            self.counts.push(speaker.count.max(1));
        }

        // The counter must clear every loaded name even if the stored value
        // lagged, so names are never reissued.
        let highest_n = highest.as_ref().map(|(n, _)| *n).unwrap_or(0);
        self.speaker_count = persisted.speaker_count.max(highest_n);

        // Continuity across a restart mid-conversation: the most recently
        // created speaker seeds the short-segment fallback.
        self.last_assigned = highest.map(|(_, name)| name);

        tracing::info!(
            speakers = self.index.len(),
            counter = self.speaker_count,
            "speaker store loaded"
        );
    }
}

/// An embedding is usable if it is non-empty, fully finite, and not
/// effectively zero.
fn is_valid_embedding(embedding: &[f32]) -> bool {
    if embedding.is_empty() || embedding.iter().any(|v| !v.is_finite()) {
        return false;
    }
    let norm: f32 = embedding.iter().map(|v| v * v).sum::<f32>().sqrt();
    norm > 1e-6
}

fn unit_scale(embedding: &mut [f32]) {
    let norm: f32 = embedding.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for v in embedding.iter_mut() {
            *v /= norm;
        }
    }
}

/// Parse the `<n>` out of `Speaker_<n>`.
fn speaker_number(name: &str) -> Option<u32> {
    name.strip_prefix("Speaker_")?.parse().ok()
}
