//! Bounded review/fix automation (the "Ralph Wiggum" loop).
//!
//! A baseline review is scored; while the score is below the threshold and
//! fewer than `max_iterations` fix rounds have run, every open item is fixed
//! and the code is reviewed again. A completion promise printed by the fixer
//! also ends the loop.

use std::path::PathBuf;
use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;
use tracing::{info, instrument, warn};

use crate::core::review::{ReviewReport, sort_by_severity, unresolved};
use crate::core::score::ScoringPolicy;
use crate::core::types::ReviewItem;
use crate::error::OrchestratorError;
use crate::io::feedback_state::{RalphState, write_ralph_state};

static PROMISE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<promise>(.*?)</promise>").expect("promise regex"));

/// The two stages the loop alternates between.
pub trait ReviewFixCycle {
    /// Review the current code.
    fn review(&mut self) -> Result<ReviewReport>;

    /// Fix `items` (already ordered by severity). `history` is the condensed
    /// record of earlier rounds. Returns the raw fixer output.
    fn fix(&mut self, items: &[ReviewItem], history: &str) -> Result<String>;

    /// Whether an interrupt was requested.
    fn interrupted(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoopSettings {
    pub threshold: f64,
    pub max_iterations: u32,
    pub completion_promise: Option<String>,
    /// Where to persist state after every round; `None` keeps it in memory.
    pub state_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoopStop {
    Accepted { score: f64 },
    Exhausted { score: f64 },
    /// Below threshold, but the review listed nothing to fix.
    NothingToFix { score: f64 },
    Interrupted,
}

#[derive(Debug, Clone)]
pub struct LoopOutcome {
    pub stop: LoopStop,
    pub state: RalphState,
    /// Most recent review.
    pub report: ReviewReport,
}

impl LoopOutcome {
    /// Warning text for a loop that ended below its threshold.
    pub fn warning(&self) -> Option<String> {
        match self.stop {
            LoopStop::Exhausted { score } => Some(
                OrchestratorError::LoopExhausted {
                    iterations: self.state.iteration,
                    last_score: score,
                }
                .to_string(),
            ),
            LoopStop::NothingToFix { score } => Some(format!(
                "feedback loop stopped at score {score:.2}: the review listed no items to fix"
            )),
            LoopStop::Accepted { .. } | LoopStop::Interrupted => None,
        }
    }
}

/// Whether fixer `output` carries the completion promise `token`.
///
/// Tagged promises (`<promise>TOKEN</promise>`) must match exactly; without
/// any tag the bare token anywhere in the output counts.
pub fn promise_seen(output: &str, token: &str) -> bool {
    let token = token.trim();
    if token.is_empty() {
        return false;
    }
    let mut tagged = PROMISE_RE
        .captures_iter(output)
        .map(|caps| caps[1].trim().to_string())
        .peekable();
    if tagged.peek().is_some() {
        tagged.any(|promised| promised == token)
    } else {
        output.contains(token)
    }
}

/// Condensed history for the fix prompt: scores so far and the items that
/// survived the last fix round.
pub fn condensed_history(state: &RalphState, previous: &[ReviewItem], current: &[ReviewItem]) -> String {
    let mut lines: Vec<String> = state
        .score_history
        .iter()
        .map(|record| {
            format!(
                "- round {}: score {:.2} after fixing {} item(s)",
                record.iteration, record.score, record.items_fixed
            )
        })
        .collect();
    let open = unresolved(previous, current);
    if !open.is_empty() {
        lines.push("Still unresolved from the previous round:".to_string());
        lines.extend(open.iter().map(|item| {
            format!(
                "- [{}] {}: {}",
                item.severity, item.file, item.description
            )
        }));
    }
    lines.join("\n")
}

/// Run the loop to completion.
///
/// `resume` restores the iteration counter and history of an interrupted
/// loop; threshold and limits always come from `settings`.
#[instrument(skip_all, fields(threshold = settings.threshold, max_iterations = settings.max_iterations))]
pub fn run_feedback_loop<C, P>(
    cycle: &mut C,
    policy: &P,
    settings: &LoopSettings,
    resume: Option<RalphState>,
) -> Result<LoopOutcome>
where
    C: ReviewFixCycle,
    P: ScoringPolicy + ?Sized,
{
    let mut state = match resume {
        Some(mut state) => {
            info!(iteration = state.iteration, "resuming feedback loop");
            state.threshold = settings.threshold;
            state.max_iterations = settings.max_iterations;
            state.completion_promise = settings.completion_promise.clone();
            state
        }
        None => RalphState::new(
            settings.threshold,
            settings.max_iterations,
            settings.completion_promise.clone(),
        ),
    };
    persist(settings, &state)?;

    let mut report = cycle.review()?;
    let mut score = policy.score(&report);
    info!(score, items = report.items.len(), "baseline review scored");
    let mut previous_items: Vec<ReviewItem> = Vec::new();

    let stop = loop {
        if score >= settings.threshold {
            info!(score, iteration = state.iteration, "score reached threshold");
            break LoopStop::Accepted { score };
        }
        if state.completion_promise_seen {
            info!(iteration = state.iteration, "completion promise seen");
            break LoopStop::Accepted { score };
        }
        if report.items.is_empty() {
            warn!(score, parsed = report.parsed, "review below threshold lists nothing to fix");
            break LoopStop::NothingToFix { score };
        }
        if state.iteration >= settings.max_iterations {
            warn!(score, iteration = state.iteration, "feedback loop exhausted");
            break LoopStop::Exhausted { score };
        }
        if cycle.interrupted() {
            break LoopStop::Interrupted;
        }

        let mut items = report.items.clone();
        sort_by_severity(&mut items);
        let history = condensed_history(&state, &previous_items, &report.items);
        let output = cycle.fix(&items, &history)?;
        if let Some(token) = settings.completion_promise.as_deref()
            && promise_seen(&output, token)
        {
            state.completion_promise_seen = true;
        }
        state.iteration += 1;

        previous_items = std::mem::take(&mut report.items);
        report = cycle.review()?;
        score = policy.score(&report);
        state.record(score, items.len());
        info!(iteration = state.iteration, score, fixed = items.len(), "fix round reviewed");
        persist(settings, &state)?;
    };

    persist(settings, &state)?;
    Ok(LoopOutcome {
        stop,
        state,
        report,
    })
}

fn persist(settings: &LoopSettings, state: &RalphState) -> Result<()> {
    match &settings.state_path {
        Some(path) => write_ralph_state(path, state),
        None => Ok(()),
    }
}
