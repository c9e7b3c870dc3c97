//! Orchestration context: the record threaded through every stage.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::review::ReviewReport;
use crate::core::types::{ReviewItem, Stage, Task, TaskStatus};

/// One entry of the debug trace kept when debug mode is on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub timestamp: String,
    pub stage: Stage,
    pub message: String,
}

/// Accumulated state of one run.
///
/// Stages never touch each other's storage directly: each receives the
/// current record and returns an updated copy that the pipeline commits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationContext {
    pub run_id: String,
    pub goal: String,
    pub project_name: String,
    /// Directory generated files are written into.
    pub workspace_root: PathBuf,
    /// Next stage to run.
    pub stage: Stage,
    #[serde(default)]
    pub approaches: Vec<String>,
    #[serde(default)]
    pub recommended_approach: Option<String>,
    #[serde(default)]
    pub selected_approach: Option<String>,
    #[serde(default)]
    pub plan: Vec<Task>,
    #[serde(default)]
    pub stage_outputs: BTreeMap<Stage, String>,
    /// Unified diff per written file, keyed by workspace-relative path.
    #[serde(default)]
    pub diffs: BTreeMap<String, String>,
    #[serde(default)]
    pub review: Option<ReviewReport>,
    #[serde(default)]
    pub selected_items: Vec<ReviewItem>,
    #[serde(default)]
    pub fix_iterations: u32,
    /// Condensed feedback-loop history included in fix prompts.
    #[serde(default)]
    pub feedback_notes: Option<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub debug_trace: Vec<TraceEntry>,
}

impl OrchestrationContext {
    pub fn new(run_id: &str, goal: &str, project_name: &str, workspace_root: PathBuf) -> Self {
        Self {
            run_id: run_id.to_string(),
            goal: goal.to_string(),
            project_name: project_name.to_string(),
            workspace_root,
            stage: Stage::Brainstorm,
            approaches: Vec::new(),
            recommended_approach: None,
            selected_approach: None,
            plan: Vec::new(),
            stage_outputs: BTreeMap::new(),
            diffs: BTreeMap::new(),
            review: None,
            selected_items: Vec::new(),
            fix_iterations: 0,
            feedback_notes: None,
            warnings: Vec::new(),
            debug_trace: Vec::new(),
        }
    }

    pub fn output(&self, stage: Stage) -> Option<&str> {
        self.stage_outputs.get(&stage).map(String::as_str)
    }

    /// Brainstorm text approaches are drawn from: the reviewed version when
    /// present, else the raw ideas.
    pub fn ideas(&self) -> &str {
        self.output(Stage::BrainstormReview)
            .filter(|text| !text.trim().is_empty())
            .or_else(|| self.output(Stage::Brainstorm))
            .unwrap_or_default()
    }

    pub fn count_tasks(&self, status: TaskStatus) -> usize {
        self.plan.iter().filter(|task| task.status == status).count()
    }

    /// Human-readable end-of-run summary.
    pub fn summary(&self) -> String {
        let mut lines = vec![
            format!("run {} ({})", self.run_id, self.project_name),
            format!("stage: {}", self.stage),
            format!(
                "tasks: {} done, {} failed, {} pending",
                self.count_tasks(TaskStatus::Done),
                self.count_tasks(TaskStatus::Failed),
                self.count_tasks(TaskStatus::Pending)
            ),
            format!("files changed: {}", self.diffs.len()),
        ];
        if let Some(review) = &self.review {
            lines.push(format!("open review items: {}", review.items.len()));
        }
        if self.fix_iterations > 0 {
            lines.push(format!("fix iterations: {}", self.fix_iterations));
        }
        lines.extend(self.warnings.iter().map(|warning| format!("warning: {warning}")));
        lines.join("\n")
    }
}
