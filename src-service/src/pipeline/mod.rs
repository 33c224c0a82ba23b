//! Capture-to-transcript pipeline.
//!
//! Chunks of mono 16kHz audio come in; timestamped, speaker-attributed
//! transcript lines go out. The stages are wired here: VAD-stage gain feeds
//! the segment driver, finalized segments pass through overlap staging and
//! ASR-stage gain into the transcriber, and surviving text is attributed
//! and appended to the daily transcript file.
//!
//! A failure in any stage drops at most the current segment; the pipeline
//! itself keeps running.

pub mod gain;
pub mod overlap;
pub mod ring_buffer;
pub mod segmenter;
pub mod speakers;
pub mod store;
pub mod writer;

use std::path::PathBuf;

use auricle_types::{ServiceConfig, TranscriptRecord};

use crate::engine::{Transcriber, VoiceActivity};
use gain::GainGate;
use overlap::OverlapContext;
use segmenter::{SegmentDriver, SpeechSegment};
use speakers::SpeakerTracker;
use writer::TranscriptWriter;

/// Internal processing rate; capture resamples everything to this.
pub const PIPELINE_SAMPLE_RATE: u32 = 16_000;

pub struct Pipeline {
    gain_vad: GainGate,
    gain_asr: GainGate,
    driver: SegmentDriver,
    overlap: OverlapContext,
    transcriber: Box<dyn Transcriber>,
    speakers: SpeakerTracker,
    writer: TranscriptWriter,
}

impl Pipeline {
    pub fn new(
        cfg: &ServiceConfig,
        sample_rate: u32,
        vad: Box<dyn VoiceActivity>,
        transcriber: Box<dyn Transcriber>,
        speakers: SpeakerTracker,
        transcripts_dir: PathBuf,
    ) -> Self {
        Self {
            gain_vad: GainGate::new(cfg.gain_vad),
            gain_asr: GainGate::new(cfg.gain_asr),
            driver: SegmentDriver::new(cfg.segmenter, sample_rate, vad),
            overlap: OverlapContext::new(cfg.overlap, sample_rate),
            transcriber,
            speakers,
            writer: TranscriptWriter::new(transcripts_dir),
        }
    }

    /// Feed one captured chunk through the pipeline.
    pub fn handle_chunk(&mut self, chunk: &[f32]) {
        let vad_input = self.gain_vad.apply(chunk);
        if let Some(segment) = self.driver.process(chunk, &vad_input) {
            self.handle_segment(segment);
        }
    }

    fn handle_segment(&mut self, segment: SpeechSegment) {
        let (staged, used_overlap) = self.overlap.stage(&segment);
        let asr_input = self.gain_asr.apply(&staged);
        let result = self.transcriber.transcribe(&asr_input);

        // The overlap state advances on the raw segment no matter what the
        // recognizer did with it.
        self.overlap.note_segment(&segment);

        let raw_text = match result {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, duration_secs = segment.duration_secs, "transcription failed, segment dropped");
                return;
            }
        };

        let Some(text) = self.overlap.resolve_text(&raw_text, used_overlap) else {
            tracing::debug!(duration_secs = segment.duration_secs, "segment produced no text");
            return;
        };

        // Attribution runs on the original segment audio: the prepended
        // overlap tail belongs to the previous utterance, and gain would
        // distort the spectral shape the embedding measures.
        let speaker = self.speakers.identify(&segment.samples);

        let record = TranscriptRecord::new(segment.start, segment.duration_secs, text, speaker);
        match self.writer.append(&record) {
            Ok(()) => tracing::info!(
                speaker = %record.speaker,
                duration = record.duration,
                chars = record.text.len(),
                "transcript line appended"
            ),
            Err(e) => tracing::warn!(error = %e, "transcript write failed, line lost"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::embedding::SpectralFingerprint;
    use crate::engine::{CentroidIndex, EngineError, VadSignal};
    use auricle_types::SpeakerConfig;
    use std::collections::VecDeque;
    use std::fs;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct ScriptedVad {
        script: VecDeque<VadSignal>,
    }

    impl VoiceActivity for ScriptedVad {
        fn process(&mut self, _chunk: &[f32]) -> VadSignal {
            self.script.pop_front().unwrap_or(VadSignal::None)
        }

        fn reset(&mut self) {
            self.script.clear();
        }
    }

    struct ScriptedTranscriber {
        script: VecDeque<Result<String, EngineError>>,
    }

    impl Transcriber for ScriptedTranscriber {
        fn transcribe(&mut self, _audio: &[f32]) -> Result<String, EngineError> {
            self.script
                .pop_front()
                .unwrap_or_else(|| Ok(String::new()))
        }
    }

    fn scratch_dir(label: &str) -> PathBuf {
        static COUNTER: AtomicU32 = AtomicU32::new(0);
        let dir = std::env::temp_dir().join(format!(
            "auricle-pipeline-{}-{}-{}",
            label,
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn pipeline(
        label: &str,
        vad: Vec<VadSignal>,
        transcripts: Vec<Result<String, EngineError>>,
    ) -> (Pipeline, PathBuf) {
        let dir = scratch_dir(label);
        let speakers = SpeakerTracker::new(
            SpeakerConfig::default(),
            PIPELINE_SAMPLE_RATE,
            Box::new(SpectralFingerprint::new(PIPELINE_SAMPLE_RATE)),
            Box::new(CentroidIndex::new()),
            dir.join("speakers.json"),
        );
        let cfg = ServiceConfig::default_tuned();
        let pipeline = Pipeline::new(
            &cfg,
            PIPELINE_SAMPLE_RATE,
            Box::new(ScriptedVad { script: vad.into() }),
            Box::new(ScriptedTranscriber {
                script: transcripts.into(),
            }),
            speakers,
            dir.join("transcripts"),
        );
        (pipeline, dir)
    }

    /// 100ms of a 300Hz tone at the pipeline rate.
    fn tone_chunk() -> Vec<f32> {
        (0..1600)
            .map(|i| {
                0.3 * (2.0 * std::f32::consts::PI * 300.0 * i as f32 / PIPELINE_SAMPLE_RATE as f32)
                    .sin()
            })
            .collect()
    }

    fn read_lines(dir: &PathBuf) -> Vec<TranscriptRecord> {
        let transcripts = dir.join("transcripts");
        let Ok(entries) = fs::read_dir(&transcripts) else {
            return Vec::new();
        };
        let mut records = Vec::new();
        for entry in entries {
            let content = fs::read_to_string(entry.unwrap().path()).unwrap();
            for line in content.lines() {
                records.push(serde_json::from_str(line).unwrap());
            }
        }
        records
    }

    /// One segment spanning `chunks` 100ms chunks, start through end.
    fn segment_script(chunks: usize) -> Vec<VadSignal> {
        let mut script = vec![VadSignal::SpeechStarted {
            lookback_samples: 1600,
        }];
        script.resize(chunks - 1, VadSignal::None);
        script.push(VadSignal::SpeechEnded);
        script
    }

    #[test]
    fn test_segment_flows_to_transcript_file() {
        let (mut pipeline, dir) =
            pipeline("flow", segment_script(5), vec![Ok("hello there".into())]);

        let chunk = tone_chunk();
        for _ in 0..5 {
            pipeline.handle_chunk(&chunk);
        }

        let records = read_lines(&dir);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].text, "hello there");
        assert_eq!(records[0].speaker, "Speaker_1");
        assert!((records[0].duration - 0.5).abs() < 0.11);
    }

    #[test]
    fn test_back_to_back_segments_dedupe_overlap() {
        let mut script = segment_script(5);
        script.extend(segment_script(5));
        let (mut pipeline, dir) = pipeline(
            "dedupe",
            script,
            vec![Ok("one two three".into()), Ok("two three four".into())],
        );

        let chunk = tone_chunk();
        for _ in 0..10 {
            pipeline.handle_chunk(&chunk);
        }

        let records = read_lines(&dir);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].text, "one two three");
        // The second segment re-transcribed the carried tail; the repeated
        // tokens are stripped.
        assert_eq!(records[1].text, "four");
        // Same voice across both segments.
        assert_eq!(records[1].speaker, records[0].speaker);
    }

    #[test]
    fn test_transcription_failure_drops_only_that_segment() {
        let mut script = segment_script(5);
        script.extend(segment_script(5));
        let (mut pipeline, dir) = pipeline(
            "asrfail",
            script,
            vec![
                Err(EngineError::Inference("decode failed".into())),
                Ok("still running".into()),
            ],
        );

        let chunk = tone_chunk();
        for _ in 0..10 {
            pipeline.handle_chunk(&chunk);
        }

        let records = read_lines(&dir);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].text, "still running");
    }

    #[test]
    fn test_empty_transcription_writes_nothing() {
        let (mut pipeline, dir) = pipeline("empty", segment_script(5), vec![Ok("   ".into())]);

        let chunk = tone_chunk();
        for _ in 0..5 {
            pipeline.handle_chunk(&chunk);
        }

        assert!(read_lines(&dir).is_empty());
    }

    #[test]
    fn test_silence_produces_no_segments() {
        let (mut pipeline, dir) = pipeline("silence", Vec::new(), Vec::new());
        let quiet = vec![0.0005; 1600];
        for _ in 0..20 {
            pipeline.handle_chunk(&quiet);
        }
        assert!(read_lines(&dir).is_empty());
    }
}
