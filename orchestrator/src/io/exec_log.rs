//! Append-only execution log for shell command attempts.
//!
//! Every attempt of a `run_command` task produces one entry. Entries are kept
//! in memory for the review prompt and appended to a JSON Lines file; neither
//! copy is ever rewritten.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    Failed,
    TimedOut,
    SpawnError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionLogEntry {
    pub step_id: u32,
    pub command: String,
    /// 1-based attempt number.
    pub attempt_number: u32,
    pub timestamp: String,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    pub stdout_excerpt: String,
    pub stderr_excerpt: String,
    pub outcome: AttemptOutcome,
}

/// Single-writer log; `path` is `None` for in-memory runs.
#[derive(Debug, Default)]
pub struct ExecutionLog {
    path: Option<PathBuf>,
    entries: Vec<ExecutionLogEntry>,
}

impl ExecutionLog {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            entries: Vec::new(),
        }
    }

    pub fn entries(&self) -> &[ExecutionLogEntry] {
        &self.entries
    }

    pub fn append(&mut self, entry: ExecutionLogEntry) -> Result<()> {
        if let Some(path) = &self.path {
            append_line(path, &entry)?;
        }
        debug!(
            step_id = entry.step_id,
            attempt = entry.attempt_number,
            outcome = ?entry.outcome,
            "execution log entry appended"
        );
        self.entries.push(entry);
        Ok(())
    }

    /// Short per-command digest for prompts: final outcome and attempt count.
    pub fn summary(&self) -> String {
        if self.entries.is_empty() {
            return "No commands were executed.".to_string();
        }
        let mut lines = Vec::new();
        for (idx, entry) in self.entries.iter().enumerate() {
            let is_last_attempt = self
                .entries
                .get(idx + 1)
                .is_none_or(|next| next.step_id != entry.step_id || next.attempt_number == 1);
            if is_last_attempt {
                lines.push(format!(
                    "- step {} `{}`: {:?} after {} attempt(s), exit code {:?}",
                    entry.step_id, entry.command, entry.outcome, entry.attempt_number, entry.exit_code
                ));
            }
        }
        lines.join("\n")
    }
}

fn append_line(path: &Path, entry: &ExecutionLogEntry) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    }
    let mut line = serde_json::to_string(entry).context("serialize execution log entry")?;
    line.push('\n');
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open execution log {}", path.display()))?;
    file.write_all(line.as_bytes())
        .with_context(|| format!("append execution log {}", path.display()))?;
    Ok(())
}

/// Read every entry back from a JSON Lines log.
pub fn read_log(path: &Path) -> Result<Vec<ExecutionLogEntry>> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read execution log {}", path.display()))?;
    contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .enumerate()
        .map(|(idx, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("parse {} line {}", path.display(), idx + 1))
        })
        .collect()
}
