//! Journal of forwarded calls, persisted as JSONL.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const MAX_JOURNAL_ENTRIES: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallOutcome {
    Completed,
    RemoteError,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallRecord {
    pub timestamp: DateTime<Utc>,
    pub model: String,
    pub remote_model: String,
    pub stream: bool,
    pub outcome: CallOutcome,
    pub duration_ms: u64,
    #[serde(default)]
    pub prompt_eval_count: u64,
    #[serde(default)]
    pub eval_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CallRecord {
    pub fn new(model: impl Into<String>, remote_model: impl Into<String>, stream: bool) -> Self {
        Self {
            timestamp: Utc::now(),
            model: model.into(),
            remote_model: remote_model.into(),
            stream,
            outcome: CallOutcome::Completed,
            duration_ms: 0,
            prompt_eval_count: 0,
            eval_count: 0,
            status: None,
            error: None,
        }
    }

    #[must_use]
    pub fn took(mut self, elapsed: Duration) -> Self {
        self.duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[must_use]
    pub fn with_usage(mut self, prompt_eval_count: u64, eval_count: u64) -> Self {
        self.prompt_eval_count = prompt_eval_count;
        self.eval_count = eval_count;
        self
    }

    #[must_use]
    pub fn failed(mut self, outcome: CallOutcome, status: Option<u16>, error: impl Into<String>) -> Self {
        self.outcome = outcome;
        self.status = status;
        self.error = Some(error.into());
        self
    }
}

/// Ring buffer of recent calls, mirrored to an append-only JSONL file.
pub struct Journal {
    entries: VecDeque<CallRecord>,
    writer: Option<BufWriter<File>>,
}

impl Journal {
    pub fn new(file_path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file_path = file_path.as_ref();

        if let Some(parent) = file_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut entries = VecDeque::with_capacity(MAX_JOURNAL_ENTRIES);

        if file_path.exists() {
            let reader = BufReader::new(File::open(file_path)?);
            for line in reader.lines().map_while(std::result::Result::ok) {
                if let Ok(record) = serde_json::from_str::<CallRecord>(&line) {
                    if entries.len() >= MAX_JOURNAL_ENTRIES {
                        entries.pop_front();
                    }
                    entries.push_back(record);
                }
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(file_path)?;

        Ok(Self {
            entries,
            writer: Some(BufWriter::new(file)),
        })
    }

    pub fn record(&mut self, record: CallRecord) {
        let write_failed = match (self.writer.as_mut(), serde_json::to_string(&record)) {
            (Some(writer), Ok(json)) => writeln!(writer, "{json}")
                .and_then(|()| writer.flush())
                .is_err(),
            _ => false,
        };
        if write_failed {
            tracing::warn!("call journal write failed, keeping records in memory only");
            self.writer = None;
        }
        if self.entries.len() >= MAX_JOURNAL_ENTRIES {
            self.entries.pop_front();
        }
        self.entries.push_back(record);
    }

    /// Most recent records first.
    pub fn recent(&self, limit: usize) -> Vec<CallRecord> {
        self.entries.iter().rev().take(limit).cloned().collect()
    }
}

#[derive(Clone)]
pub struct SharedJournal(Arc<Mutex<Journal>>);

impl SharedJournal {
    pub fn new(file_path: impl AsRef<Path>) -> std::io::Result<Self> {
        Ok(Self(Arc::new(Mutex::new(Journal::new(file_path)?))))
    }

    pub fn record(&self, record: CallRecord) {
        if let Ok(mut journal) = self.0.lock() {
            journal.record(record);
        }
    }

    pub fn recent(&self, limit: usize) -> Vec<CallRecord> {
        self.0.lock().map(|j| j.recent(limit)).unwrap_or_default()
    }
}
