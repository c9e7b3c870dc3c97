//! Persisted feedback-loop state (`ralph_state.json`).

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::io::atomic::write_json_atomic;

/// One completed review/fix round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub iteration: u32,
    pub score: f64,
    pub items_fixed: usize,
}

/// Loop bookkeeping, written after every iteration so an interrupted loop can resume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RalphState {
    /// Fix rounds completed so far. Never decreases.
    pub iteration: u32,
    pub threshold: f64,
    pub max_iterations: u32,
    #[serde(default)]
    pub score_history: Vec<ScoreRecord>,
    #[serde(default)]
    pub completion_promise: Option<String>,
    #[serde(default)]
    pub completion_promise_seen: bool,
    pub timestamp: String,
}

impl RalphState {
    pub fn new(threshold: f64, max_iterations: u32, completion_promise: Option<String>) -> Self {
        Self {
            iteration: 0,
            threshold,
            max_iterations,
            score_history: Vec::new(),
            completion_promise,
            completion_promise_seen: false,
            timestamp: now(),
        }
    }

    pub fn record(&mut self, score: f64, items_fixed: usize) {
        self.score_history.push(ScoreRecord {
            iteration: self.iteration,
            score,
            items_fixed,
        });
        self.timestamp = now();
    }
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Load loop state if the file exists.
pub fn load_ralph_state(path: &Path) -> Result<Option<RalphState>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents =
        fs::read_to_string(path).with_context(|| format!("read loop state {}", path.display()))?;
    let state: RalphState = serde_json::from_str(&contents)
        .with_context(|| format!("parse loop state {}", path.display()))?;
    debug!(iteration = state.iteration, "loop state loaded");
    Ok(Some(state))
}

pub fn write_ralph_state(path: &Path, state: &RalphState) -> Result<()> {
    debug!(path = %path.display(), iteration = state.iteration, "writing loop state");
    write_json_atomic(path, state)
}
