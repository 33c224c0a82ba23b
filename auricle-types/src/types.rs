//! Shared record and store types.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// One finalized transcript line, appended as a single JSON object to the
/// daily transcript file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptRecord {
    /// Segment start time, ISO-8601 with millisecond precision
    pub ts: String,
    /// Segment duration in seconds, rounded to 2 decimals
    pub duration: f64,
    /// Transcribed text (overlap-deduplicated)
    pub text: String,
    /// Stable speaker label (`Speaker_<n>` or `Unknown`)
    pub speaker: String,
}

impl TranscriptRecord {
    pub fn new(start: DateTime<Utc>, duration_secs: f64, text: String, speaker: String) -> Self {
        Self {
            ts: start.to_rfc3339_opts(SecondsFormat::Millis, true),
            duration: (duration_secs * 100.0).round() / 100.0,
            text,
            speaker,
        }
    }
}

/// On-disk representation of one speaker identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedSpeaker {
    /// Display name, unique within a store
    pub name: String,
    /// Blended centroid embedding
    pub embedding: Vec<f32>,
    /// Observation count used to weight centroid updates
    pub count: u32,
}

/// On-disk speaker store. Written atomically (temp file + rename); a
/// corrupt or missing store is treated as empty at load time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSpeakerStore {
    /// Monotonically increasing allocation counter; names are never reused
    pub speaker_count: u32,
    pub speakers: Vec<PersistedSpeaker>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_rounds_duration() {
        let rec = TranscriptRecord::new(Utc::now(), 1.23456, "hi".into(), "Speaker_1".into());
        assert_eq!(rec.duration, 1.23);
    }

    #[test]
    fn test_record_timestamp_is_iso8601() {
        let start = DateTime::parse_from_rfc3339("2026-03-01T12:00:00.500Z")
            .unwrap()
            .with_timezone(&Utc);
        let rec = TranscriptRecord::new(start, 0.5, "x".into(), "Unknown".into());
        assert_eq!(rec.ts, "2026-03-01T12:00:00.500Z");
    }

    #[test]
    fn test_store_schema_field_names() {
        let store = PersistedSpeakerStore {
            speaker_count: 2,
            speakers: vec![PersistedSpeaker {
                name: "Speaker_1".into(),
                embedding: vec![0.5, 0.5],
                count: 3,
            }],
        };
        let json = serde_json::to_string(&store).unwrap();
        assert!(json.contains("\"speakerCount\":2"));
        assert!(json.contains("\"speakers\""));
        assert!(json.contains("\"embedding\""));
    }
}
