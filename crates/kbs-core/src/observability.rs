//! Observability - persistent run events.

use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::trace::{TraceEvent, TraceSink};

/// A trace event stamped with wall-clock time and the run it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEvent {
    pub timestamp: DateTime<Utc>,
    pub run_id: Uuid,
    #[serde(flatten)]
    pub event: TraceEvent,
}

/// Appends run events to a JSONL file.
///
/// Logging is best effort: a failed write is reported through `tracing` and
/// counted, and the run carries on.
pub struct EventLog {
    path: PathBuf,
    run_id: Uuid,
    failures: usize,
}

impl EventLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            run_id: Uuid::new_v4(),
            failures: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Number of events that could not be written.
    pub fn failures(&self) -> usize {
        self.failures
    }

    /// Append one event.
    pub fn append(&self, event: &RunEvent) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let line = serde_json::to_string(event)?;
        writeln!(file, "{}", line)?;

        Ok(())
    }

    /// Read the last `limit` events, skipping lines that do not parse.
    pub fn read_recent(&self, limit: usize) -> Vec<RunEvent> {
        let file = match std::fs::File::open(&self.path) {
            Ok(f) => f,
            Err(_) => return Vec::new(),
        };

        let reader = BufReader::new(file);
        let mut events: Vec<RunEvent> = reader
            .lines()
            .map_while(|line| line.ok())
            .filter_map(|line| serde_json::from_str(&line).ok())
            .collect();

        if events.len() > limit {
            events.drain(0..events.len() - limit);
        }

        events
    }
}

impl TraceSink for EventLog {
    fn emit(&mut self, event: TraceEvent) {
        let event = RunEvent {
            timestamp: Utc::now(),
            run_id: self.run_id,
            event,
        };
        if let Err(err) = self.append(&event) {
            self.failures += 1;
            tracing::warn!(path = %self.path.display(), error = %err, "failed to append run event");
        }
    }
}
