//! Append-only JSONL run journal, one file per run identifier.

use crate::core::types::{FileCommand, RunMessage, RunObserver, RunSummary};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

/// A journal entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JournalEvent {
    RunStarted {
        run_id: String,
        codemod: String,
        engine: String,
        target: PathBuf,
        dry_run: bool,
        recast_version: String,
    },
    FileFailed {
        codemod: Option<String>,
        path: Option<PathBuf>,
        message: String,
    },
    CommandEmitted {
        kind: String,
        path: PathBuf,
    },
    RunCompleted {
        commands: usize,
        processed_files: u64,
        errors: usize,
        no_files: bool,
        timed_out: bool,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct TimestampedEvent {
    ts: String,
    #[serde(flatten)]
    event: JournalEvent,
}

/// Generate an ISO 8601 UTC timestamp.
pub fn now_iso8601() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format_epoch_secs(secs)
}

fn format_epoch_secs(secs: u64) -> String {
    let mut days = (secs / 86_400) as i64;
    let of_day = secs % 86_400;

    let mut year = 1970i64;
    loop {
        let len = if is_leap(year) { 366 } else { 365 };
        if days < len {
            break;
        }
        days -= len;
        year += 1;
    }
    let feb = if is_leap(year) { 29 } else { 28 };
    let months = [31, feb, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];
    let mut month = 1;
    for len in months {
        if days < len {
            break;
        }
        days -= len;
        month += 1;
    }

    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
        year,
        month,
        days + 1,
        of_day / 3600,
        (of_day % 3600) / 60,
        of_day % 60
    )
}

fn is_leap(y: i64) -> bool {
    (y % 4 == 0 && y % 100 != 0) || y % 400 == 0
}

/// Generate a run identifier.
pub fn generate_run_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    format!("r-{:012x}", nanos & 0xFFFF_FFFF_FFFF)
}

/// Journal path for a run.
pub fn journal_path(journal_dir: &Path, run_id: &str) -> PathBuf {
    journal_dir.join(format!("{}.jsonl", run_id))
}

/// Append one event to the run's journal.
pub fn append_event(journal_dir: &Path, run_id: &str, event: JournalEvent) -> Result<(), String> {
    std::fs::create_dir_all(journal_dir)
        .map_err(|e| format!("cannot create journal dir {}: {}", journal_dir.display(), e))?;

    let line = serde_json::to_string(&TimestampedEvent {
        ts: now_iso8601(),
        event,
    })
    .map_err(|e| format!("JSON serialize error: {}", e))?;

    let path = journal_path(journal_dir, run_id);
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| format!("cannot open journal {}: {}", path.display(), e))?;
    writeln!(file, "{}", line).map_err(|e| format!("write error: {}", e))
}

/// Read back every event of a run, skipping lines that do not parse.
pub fn read_events(journal_dir: &Path, run_id: &str) -> Result<Vec<JournalEvent>, String> {
    let path = journal_path(journal_dir, run_id);
    let content = std::fs::read_to_string(&path)
        .map_err(|e| format!("cannot read journal {}: {}", path.display(), e))?;
    Ok(content
        .lines()
        .filter_map(|l| serde_json::from_str::<TimestampedEvent>(l).ok())
        .map(|te| te.event)
        .collect())
}

/// Wraps an observer and journals what passes through it.
///
/// Journal write failures are logged and never interrupt the run.
pub struct JournalObserver<'a> {
    inner: &'a mut dyn RunObserver,
    dir: PathBuf,
    run_id: String,
}

impl<'a> JournalObserver<'a> {
    pub fn new(inner: &'a mut dyn RunObserver, dir: impl Into<PathBuf>, run_id: &str) -> Self {
        Self {
            inner,
            dir: dir.into(),
            run_id: run_id.to_string(),
        }
    }

    pub fn record(&self, event: JournalEvent) {
        if let Err(e) = append_event(&self.dir, &self.run_id, event) {
            warn!(run_id = %self.run_id, error = %e, "journal write failed");
        }
    }

    pub fn record_summary(&self, summary: &RunSummary) {
        self.record(JournalEvent::RunCompleted {
            commands: summary.commands,
            processed_files: summary.processed_files,
            errors: summary.errors,
            no_files: summary.no_files,
            timed_out: summary.timed_out,
        });
    }
}

impl RunObserver for JournalObserver<'_> {
    fn on_message(&mut self, message: RunMessage) {
        if let RunMessage::Error {
            message: text,
            codemod_name,
            path,
        } = &message
        {
            self.record(JournalEvent::FileFailed {
                codemod: codemod_name.clone(),
                path: path.clone(),
                message: text.clone(),
            });
        }
        self.inner.on_message(message);
    }

    fn on_command(&mut self, command: FileCommand) {
        let kind = match &command {
            FileCommand::CreateFile { .. } => "createFile",
            FileCommand::UpdateFile { .. } => "updateFile",
            FileCommand::DeleteFile { .. } => "deleteFile",
            FileCommand::MoveFile { .. } => "moveFile",
        };
        self.record(JournalEvent::CommandEmitted {
            kind: kind.to_string(),
            path: command.path().to_path_buf(),
        });
        self.inner.on_command(command);
    }
}
