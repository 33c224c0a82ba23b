//! Daily transcript sink.
//!
//! Appends one JSON object per line to `transcript_YYYY-MM-DD.jsonl` in the
//! transcripts directory, rotating at UTC midnight. Each line is flushed as
//! soon as it is written, so a crash loses at most the record in flight.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;

use chrono::{NaiveDate, Utc};

use auricle_types::TranscriptRecord;

pub struct TranscriptWriter {
    dir: PathBuf,
    file: Option<File>,
    open_date: Option<NaiveDate>,
}

impl TranscriptWriter {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            file: None,
            open_date: None,
        }
    }

    pub fn file_path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("transcript_{}.jsonl", date.format("%Y-%m-%d")))
    }

    /// Append `record` to today's file, opening or rotating as needed.
    pub fn append(&mut self, record: &TranscriptRecord) -> io::Result<()> {
        let today = Utc::now().date_naive();
        if self.open_date != Some(today) {
            fs::create_dir_all(&self.dir)?;
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.file_path_for(today))?;
            self.file = Some(file);
            self.open_date = Some(today);
            tracing::info!(date = %today, "transcript file opened");
        }

        let file = self
            .file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "transcript file not open"))?;
        let mut line = serde_json::to_vec(record)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        line.push(b'\n');
        file.write_all(&line)?;
        file.flush()
    }
}
