//! Append-only outcome journal.
//!
//! One JSON object per line, flushed as each outcome is recorded, so a run
//! that dies mid-batch still leaves a record of what reached the broker.

use super::OrderOutcome;
use mirror_common::{Error, Result};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

pub struct OutcomeJournal {
    path: PathBuf,
    file: File,
}

impl OutcomeJournal {
    /// Open (or create) the journal at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| Error::Io(e).with_context(format!("opening {}", path.display())))?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&mut self, run_id: &str, outcome: &OrderOutcome) -> Result<()> {
        let mut line = serde_json::to_value(outcome)?;
        if let serde_json::Value::Object(map) = &mut line {
            map.insert("run_id".into(), run_id.into());
        }
        writeln!(self.file, "{}", serde_json::to_string(&line)?)?;
        self.file.flush()?;
        Ok(())
    }

    /// Outcomes recorded for `run_id`, in order.
    pub fn read_run(path: &Path, run_id: &str) -> Result<Vec<OrderOutcome>> {
        let reader = BufReader::new(File::open(path)?);
        let mut outcomes = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let value: serde_json::Value = serde_json::from_str(&line)?;
            if value.get("run_id").and_then(|v| v.as_str()) == Some(run_id) {
                outcomes.push(serde_json::from_value(value)?);
            }
        }
        Ok(outcomes)
    }
}
