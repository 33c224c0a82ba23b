//! Command implementations.
//!
//! The CLI reads the same files the service writes (daily transcript files
//! and the speaker store); there is no IPC channel. Every command supports
//! `--json` for scripting.

use std::fs;
use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use auricle_types::{paths, PersistedSpeakerStore, TranscriptRecord};

use crate::colors;
use crate::exit_codes::ExitCode;

fn transcript_path(date: NaiveDate) -> std::path::PathBuf {
    paths::transcripts_dir().join(format!("transcript_{}.jsonl", date.format("%Y-%m-%d")))
}

fn load_speaker_store() -> Option<PersistedSpeakerStore> {
    let data = fs::read_to_string(paths::speaker_store_path()).ok()?;
    serde_json::from_str(&data).ok()
}

/// Parse a transcript file, skipping lines that fail to parse.
fn read_transcript(path: &Path) -> Result<Vec<TranscriptRecord>, std::io::Error> {
    let content = fs::read_to_string(path)?;
    let mut records = Vec::new();
    let mut skipped = 0usize;
    for line in content.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(record) => records.push(record),
            Err(_) => skipped += 1,
        }
    }
    if skipped > 0 {
        eprintln!(
            "{}",
            colors::warning(&format!("{} malformed line(s) skipped", skipped))
        );
    }
    Ok(records)
}

#[derive(Serialize)]
struct StatusReport {
    data_dir: String,
    transcripts_dir: String,
    config_path: String,
    config_present: bool,
    speaker_store_present: bool,
    known_speakers: usize,
    today_file: String,
    today_lines: usize,
    last_activity: Option<String>,
}

/// Show where Auricle keeps its data and what it has captured today.
pub fn status(json: bool) -> ExitCode {
    let config_path = paths::config_path();
    let store = load_speaker_store();
    let today_file = transcript_path(Utc::now().date_naive());

    let (today_lines, last_activity) = match fs::metadata(&today_file) {
        Ok(meta) => {
            let lines = read_transcript(&today_file).map(|r| r.len()).unwrap_or(0);
            let modified = meta
                .modified()
                .ok()
                .map(|t| DateTime::<Utc>::from(t).to_rfc3339());
            (lines, modified)
        }
        Err(_) => (0, None),
    };

    let report = StatusReport {
        data_dir: paths::data_dir().display().to_string(),
        transcripts_dir: paths::transcripts_dir().display().to_string(),
        config_path: config_path.display().to_string(),
        config_present: config_path.exists(),
        speaker_store_present: store.is_some(),
        known_speakers: store.as_ref().map_or(0, |s| s.speakers.len()),
        today_file: today_file.display().to_string(),
        today_lines,
        last_activity,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report).unwrap_or_default());
        return ExitCode::Success;
    }

    println!("{}", colors::header("Auricle"));
    println!("  Data directory:  {}", colors::path(&report.data_dir));
    println!(
        "  Config:          {} {}",
        colors::path(&report.config_path),
        if report.config_present {
            colors::dim("(present)")
        } else {
            colors::dim("(defaults)")
        }
    );
    println!(
        "  Known speakers:  {}",
        colors::number(&report.known_speakers.to_string())
    );
    println!(
        "  Today's lines:   {}",
        colors::number(&report.today_lines.to_string())
    );
    if let Some(ts) = &report.last_activity {
        println!("  Last activity:   {}", colors::timestamp(ts));
    } else {
        println!("  Last activity:   {}", colors::dim("none today"));
    }
    ExitCode::Success
}

#[derive(Serialize)]
struct SpeakerSummary {
    name: String,
    observations: u32,
}

/// List known speaker profiles.
pub fn speakers(json: bool) -> ExitCode {
    let store = load_speaker_store().unwrap_or_default();
    let summaries: Vec<SpeakerSummary> = store
        .speakers
        .iter()
        .map(|s| SpeakerSummary {
            name: s.name.clone(),
            observations: s.count,
        })
        .collect();

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&summaries).unwrap_or_default()
        );
        return ExitCode::Success;
    }

    if summaries.is_empty() {
        println!("{}", colors::dim("No known speakers."));
        return ExitCode::Success;
    }

    println!("{}", colors::header("Known speakers"));
    for summary in &summaries {
        println!(
            "  {}  {}",
            colors::speaker(&summary.name),
            colors::dim(&format!("{} observation(s)", summary.observations))
        );
    }
    ExitCode::Success
}

/// Clear all speaker profiles.
///
/// If the service is running it keeps its in-memory profiles and will
/// re-persist them; restart the service after resetting.
pub fn reset_speakers(json: bool, quiet: bool) -> ExitCode {
    let path = paths::speaker_store_path();
    let removed = load_speaker_store().map_or(0, |s| s.speakers.len());

    let empty = PersistedSpeakerStore::default();
    let data = match serde_json::to_vec_pretty(&empty) {
        Ok(data) => data,
        Err(e) => {
            eprintln!("{}", colors::error(&e.to_string()));
            return ExitCode::GeneralError;
        }
    };

    // Same temp-then-rename discipline the service uses, so a concurrent
    // reader never sees a torn store.
    let write = (|| -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, &data)?;
        fs::rename(&tmp, &path)
    })();
    if let Err(e) = write {
        eprintln!(
            "{}",
            colors::error(&format!("failed to reset speaker store: {}", e))
        );
        return ExitCode::GeneralError;
    }

    if json {
        println!("{{\"removed\": {}}}", removed);
    } else if !quiet {
        println!(
            "{}",
            colors::success(&format!("Removed {} speaker profile(s)", removed))
        );
        if removed > 0 {
            println!(
                "{}",
                colors::dim("Restart the service for the reset to take effect.")
            );
        }
    }
    ExitCode::Success
}

/// Print a day's transcript.
pub fn transcript(date: Option<NaiveDate>, limit: Option<usize>, json: bool) -> ExitCode {
    let date = date.unwrap_or_else(|| Utc::now().date_naive());
    let path = transcript_path(date);

    let mut records = match read_transcript(&path) {
        Ok(records) => records,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            eprintln!(
                "{}",
                colors::error(&format!("no transcript for {}", date))
            );
            return ExitCode::NotFound;
        }
        Err(e) => {
            eprintln!("{}", colors::error(&e.to_string()));
            return ExitCode::GeneralError;
        }
    };

    if let Some(limit) = limit {
        let skip = records.len().saturating_sub(limit);
        records.drain(..skip);
    }

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&records).unwrap_or_default()
        );
        return ExitCode::Success;
    }

    for record in &records {
        let time = record
            .ts
            .split('T')
            .nth(1)
            .and_then(|t| t.get(..8))
            .unwrap_or(&record.ts);
        println!(
            "{} {} {} {}",
            colors::timestamp(time),
            colors::speaker(&record.speaker),
            colors::dim(&format!("({:.1}s)", record.duration)),
            record.text
        );
    }
    ExitCode::Success
}
