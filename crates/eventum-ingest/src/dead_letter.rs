//! Dead-letter file for events that could not be staged or persisted.
//!
//! Records are appended as JSON lines to a local file, independent of the
//! backing stores whose failure put them here. Decode failures are not
//! recorded: a payload that does not parse has no event to preserve.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use eventum_core::{Event, StagingKey};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Pipeline stage at which an event was given up on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailedStage {
    Staging,
    Persist,
}

/// One dead-lettered event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetterRecord {
    pub stage: FailedStage,
    pub error: String,
    pub staging_key: String,
    pub event: Event,
    pub failed_at: DateTime<Utc>,
}

impl DeadLetterRecord {
    pub fn new(stage: FailedStage, key: &StagingKey, event: &Event, error: &Error) -> Self {
        Self {
            stage,
            error: error.to_string(),
            staging_key: key.as_str().to_string(),
            event: event.clone(),
            failed_at: Utc::now(),
        }
    }
}

/// Append-only JSONL writer.
pub struct DeadLetterWriter {
    path: PathBuf,
    file: Mutex<File>,
}

impl DeadLetterWriter {
    /// Open (or create) the dead-letter file for appending.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        tracing::info!("Dead-letter file opened at {}", path.display());
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    #[cfg(test)]
    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record and flush it to disk.
    pub fn write(&self, record: &DeadLetterRecord) -> Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut file = self.file.lock();
        file.write_all(&line)?;
        file.sync_data()?;
        tracing::trace!(path = %self.path.display(), "Dead-letter record written");
        Ok(())
    }
}

/// Read every record from a dead-letter file.
///
/// Lines that do not parse are skipped with a warning.
#[cfg(test)]
pub(crate) fn read_records<P: AsRef<Path>>(path: P) -> Result<Vec<DeadLetterRecord>> {
    use std::io::{BufRead, BufReader};

    let reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();

    for (line_num, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(&line) {
            Ok(record) => records.push(record),
            Err(e) => tracing::warn!("Line {}: unreadable dead-letter record: {}", line_num + 1, e),
        }
    }

    Ok(records)
}
