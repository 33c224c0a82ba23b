//! Overlap context between consecutive segments.
//!
//! A word truncated at a segment boundary is unrecoverable by the time the
//! recognizer sees the next segment, so the pipeline carries a short tail
//! of each segment's audio into the transcription pass of the next one —
//! but only when the two segments are close enough in time to plausibly be
//! one utterance. The duplicated text this introduces is removed at the
//! token level against the previous transcript.
//!
//! State here is process-wide per pipeline instance and is reset at service
//! start; it is never persisted.

use std::borrow::Cow;

use chrono::{DateTime, Utc};

use auricle_types::OverlapConfig;

use super::segmenter::SpeechSegment;

/// Longest token window tried during overlap deduplication.
const MAX_DEDUPE_WINDOW: usize = 12;

pub struct OverlapContext {
    overlap_samples: usize,
    max_gap_ms: i64,
    /// Suffix of the previous segment's original audio
    previous_tail: Vec<f32>,
    /// Wall-clock end of the previous segment (start + duration)
    last_speech_end: Option<DateTime<Utc>>,
    /// Last non-empty emitted text, for deduplication on the next segment
    previous_transcript: String,
}

impl OverlapContext {
    pub fn new(cfg: OverlapConfig, sample_rate: u32) -> Self {
        Self {
            overlap_samples: (sample_rate as u64 * cfg.overlap_ms as u64 / 1000) as usize,
            max_gap_ms: cfg.max_gap_ms as i64,
            previous_tail: Vec::new(),
            last_speech_end: None,
            previous_transcript: String::new(),
        }
    }

    /// Build the transcription input for `segment`.
    ///
    /// Prepends the previous tail when overlap applies; returns the input
    /// and whether overlap was used (which decides deduplication later).
    pub fn stage<'a>(&self, segment: &'a SpeechSegment) -> (Cow<'a, [f32]>, bool) {
        if self.previous_tail.is_empty() || self.overlap_samples == 0 {
            return (Cow::Borrowed(&segment.samples[..]), false);
        }
        let within_gap = match self.last_speech_end {
            // Stitching across a long pause would join unrelated utterances.
            Some(end) => (segment.start - end).num_milliseconds() <= self.max_gap_ms,
            None => false,
        };
        if !within_gap {
            return (Cow::Borrowed(&segment.samples[..]), false);
        }

        let mut stitched =
            Vec::with_capacity(self.previous_tail.len() + segment.samples.len());
        stitched.extend_from_slice(&self.previous_tail);
        stitched.extend_from_slice(&segment.samples);
        (Cow::Owned(stitched), true)
    }

    /// Record `segment` as the most recent speech, unconditionally.
    ///
    /// Runs even when transcription failed: the tail and end time come from
    /// the raw audio, and the next segment's overlap decision must not be
    /// corrupted by an ASR error on this one.
    pub fn note_segment(&mut self, segment: &SpeechSegment) {
        let tail_len = self.overlap_samples.min(segment.samples.len());
        self.previous_tail.clear();
        self.previous_tail
            .extend_from_slice(&segment.samples[segment.samples.len() - tail_len..]);
        self.last_speech_end = Some(segment.end());
    }

    /// Resolve the raw transcription into the text to emit.
    ///
    /// Deduplicates against the previous transcript when overlap was used.
    /// Returns `None` for empty or whitespace-only results, which also
    /// leave the previous transcript untouched.
    pub fn resolve_text(&mut self, raw: &str, used_overlap: bool) -> Option<String> {
        let text = if used_overlap {
            dedupe_overlap_text(&self.previous_transcript, raw)
        } else {
            raw.trim().to_string()
        };
        if text.is_empty() {
            return None;
        }
        self.previous_transcript = text.clone();
        Some(text)
    }
}

/// Remove from `current` the leading tokens that re-transcribe the tail of
/// `previous`.
///
/// Tokens are compared after lowercasing and stripping non-alphanumeric
/// characters, so punctuation and casing differences between the two passes
/// do not defeat the match. The longest plausible window is tried first; a
/// window only matches if every normalized token pair is equal and
/// non-empty. No match returns `current` trimmed as-is.
pub fn dedupe_overlap_text(previous: &str, current: &str) -> String {
    let prev_tokens: Vec<&str> = previous.split_whitespace().collect();
    let curr_tokens: Vec<&str> = current.split_whitespace().collect();
    if prev_tokens.is_empty() || curr_tokens.is_empty() {
        return current.trim().to_string();
    }

    let prev_norm: Vec<String> = prev_tokens.iter().map(|t| normalize_token(t)).collect();
    let curr_norm: Vec<String> = curr_tokens.iter().map(|t| normalize_token(t)).collect();

    let max_window = MAX_DEDUPE_WINDOW
        .min(prev_tokens.len())
        .min(curr_tokens.len());

    for window in (1..=max_window).rev() {
        let prev_suffix = &prev_norm[prev_norm.len() - window..];
        let curr_prefix = &curr_norm[..window];
        let matched = prev_suffix
            .iter()
            .zip(curr_prefix.iter())
            // An empty normalized token (pure punctuation) never matches;
            // two of them being "equal" says nothing about the words.
            .all(|(a, b)| !a.is_empty() && a == b);
        if matched {
            return curr_tokens[window..].join(" ").trim().to_string();
        }
    }

    current.trim().to_string()
}

/// Lowercase and keep only letters and digits.
fn normalize_token(token: &str) -> String {
    token
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 16_000;

    fn cfg(overlap_ms: u32, max_gap_ms: u32) -> OverlapConfig {
        OverlapConfig {
            overlap_ms,
            max_gap_ms,
        }
    }

    fn segment(samples: Vec<f32>, start: DateTime<Utc>) -> SpeechSegment {
        let duration_secs = samples.len() as f64 / RATE as f64;
        SpeechSegment {
            samples,
            start,
            duration_secs,
        }
    }

    #[test]
    fn test_first_segment_has_no_overlap() {
        let ctx = OverlapContext::new(cfg(400, 2000), RATE);
        let seg = segment(vec![0.1; 8000], Utc::now());
        let (staged, used) = ctx.stage(&seg);
        assert!(!used);
        assert_eq!(staged.len(), 8000);
    }

    #[test]
    fn test_back_to_back_segments_get_tail_prepended() {
        let mut ctx = OverlapContext::new(cfg(400, 2000), RATE);
        let t0 = Utc::now();

        let first = segment(vec![0.5; 16_000], t0); // 1s
        ctx.note_segment(&first);

        // 500ms later: inside the max gap.
        let second_start = first.end() + chrono::Duration::milliseconds(500);
        let second = segment(vec![0.25; 8000], second_start);
        let (staged, used) = ctx.stage(&second);

        assert!(used);
        // 400ms tail at 16kHz = 6400 samples prepended.
        assert_eq!(staged.len(), 6400 + 8000);
        assert!(staged[..6400].iter().all(|s| *s == 0.5));
        assert!(staged[6400..].iter().all(|s| *s == 0.25));
    }

    #[test]
    fn test_long_gap_disables_overlap() {
        let mut ctx = OverlapContext::new(cfg(400, 2000), RATE);
        let first = segment(vec![0.5; 16_000], Utc::now());
        ctx.note_segment(&first);

        let second_start = first.end() + chrono::Duration::milliseconds(2500);
        let second = segment(vec![0.25; 8000], second_start);
        let (staged, used) = ctx.stage(&second);

        assert!(!used);
        assert_eq!(staged.len(), 8000);
    }

    #[test]
    fn test_zero_overlap_config_disables_overlap() {
        let mut ctx = OverlapContext::new(cfg(0, 2000), RATE);
        let first = segment(vec![0.5; 16_000], Utc::now());
        ctx.note_segment(&first);

        let second = segment(vec![0.25; 8000], first.end());
        let (_, used) = ctx.stage(&second);
        assert!(!used);
    }

    #[test]
    fn test_tail_is_whole_segment_when_shorter_than_overlap() {
        let mut ctx = OverlapContext::new(cfg(400, 2000), RATE);
        // 200ms segment, shorter than the 400ms overlap.
        let first = segment(vec![0.5; 3200], Utc::now());
        ctx.note_segment(&first);

        let second = segment(vec![0.25; 8000], first.end());
        let (staged, used) = ctx.stage(&second);
        assert!(used);
        assert_eq!(staged.len(), 3200 + 8000);
    }

    #[test]
    fn test_tail_updates_even_without_text() {
        let mut ctx = OverlapContext::new(cfg(400, 2000), RATE);
        let first = segment(vec![0.5; 16_000], Utc::now());
        ctx.note_segment(&first);
        assert_eq!(ctx.resolve_text("hello", false).as_deref(), Some("hello"));

        // Transcription produced nothing for the second segment; the tail
        // still moves forward and the transcript memory does not.
        let second = segment(vec![0.25; 16_000], first.end());
        ctx.note_segment(&second);
        assert!(ctx.resolve_text("   ", true).is_none());
        assert_eq!(ctx.previous_transcript, "hello");
        assert!(ctx.previous_tail.iter().all(|s| *s == 0.25));
    }

    #[test]
    fn test_resolve_dedupes_only_when_overlap_used() {
        let mut ctx = OverlapContext::new(cfg(400, 2000), RATE);
        assert_eq!(
            ctx.resolve_text("the meeting starts now", false).as_deref(),
            Some("the meeting starts now")
        );
        assert_eq!(
            ctx.resolve_text("starts now and we begin", true).as_deref(),
            Some("and we begin")
        );
        // Without overlap the same leading words are kept.
        assert_eq!(
            ctx.resolve_text("and we begin again", false).as_deref(),
            Some("and we begin again")
        );
    }

    #[test]
    fn test_dedupe_single_token_overlap() {
        assert_eq!(dedupe_overlap_text("привет мир", "мир как дела"), "как дела");
    }

    #[test]
    fn test_dedupe_multi_token_overlap_ignores_case_and_punctuation() {
        assert_eq!(
            dedupe_overlap_text("I'll see you tomorrow.", "See you Tomorrow at noon"),
            "at noon"
        );
    }

    #[test]
    fn test_dedupe_prefers_longest_window() {
        // "one two" matches as a 2-token window; a 1-token match on "two"
        // alone would leave a stray "two" behind.
        assert_eq!(
            dedupe_overlap_text("count one two", "one two three"),
            "three"
        );
    }

    #[test]
    fn test_dedupe_no_match_returns_trimmed_current() {
        assert_eq!(
            dedupe_overlap_text("completely different", "  unrelated words here  "),
            "unrelated words here"
        );
    }

    #[test]
    fn test_dedupe_punctuation_only_tokens_never_match() {
        // "-" normalizes to empty on both sides; that must not count as an
        // overlap, so the current text passes through untouched.
        assert_eq!(dedupe_overlap_text("pause -", "- and then"), "- and then");
    }

    #[test]
    fn test_dedupe_empty_sides() {
        assert_eq!(dedupe_overlap_text("", "fresh start"), "fresh start");
        assert_eq!(dedupe_overlap_text("prior text", "   "), "");
    }

    #[test]
    fn test_dedupe_full_duplicate_yields_empty() {
        assert_eq!(dedupe_overlap_text("same words", "same words"), "");
    }
}
