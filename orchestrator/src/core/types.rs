//! Shared domain types for the orchestration pipeline.

use std::fmt;
use std::str::FromStr;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

/// Pipeline stage. `Done` and `Aborted` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Brainstorm,
    BrainstormReview,
    ApproachSelection,
    Plan,
    Execute,
    CodeReview,
    ReviewSelection,
    Fix,
    Done,
    Aborted,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Brainstorm => "brainstorm",
            Stage::BrainstormReview => "brainstorm_review",
            Stage::ApproachSelection => "approach_selection",
            Stage::Plan => "plan",
            Stage::Execute => "execute",
            Stage::CodeReview => "code_review",
            Stage::ReviewSelection => "review_selection",
            Stage::Fix => "fix",
            Stage::Done => "done",
            Stage::Aborted => "aborted",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Done | Stage::Aborted)
    }

    /// Role whose tool is invoked while running this stage, if any.
    pub fn role(self) -> Option<Role> {
        match self {
            Stage::Brainstorm => Some(Role::Brainstormer),
            Stage::BrainstormReview => Some(Role::Reviewer),
            Stage::Plan => Some(Role::Planner),
            Stage::Execute => Some(Role::Executor),
            Stage::CodeReview => Some(Role::CodeReviewer),
            Stage::Fix => Some(Role::Fixer),
            Stage::ApproachSelection | Stage::ReviewSelection | Stage::Done | Stage::Aborted => {
                None
            }
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logical role a tool is assigned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Brainstormer,
    Reviewer,
    Planner,
    Executor,
    CodeReviewer,
    Fixer,
}

impl Role {
    pub const ALL: [Role; 6] = [
        Role::Brainstormer,
        Role::Reviewer,
        Role::Planner,
        Role::Executor,
        Role::CodeReviewer,
        Role::Fixer,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Brainstormer => "brainstormer",
            Role::Reviewer => "reviewer",
            Role::Planner => "planner",
            Role::Executor => "executor",
            Role::CodeReviewer => "code_reviewer",
            Role::Fixer => "fixer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        let normalized = value.trim().to_ascii_lowercase().replace('-', "_");
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == normalized)
            .ok_or_else(|| anyhow!("unknown role {value:?}"))
    }
}

/// Kind of work a plan task performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    WriteFile,
    RunCommand,
}

impl TaskKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::WriteFile => "write_file",
            TaskKind::RunCommand => "run_command",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    Done,
    Failed,
}

/// One ordered unit of work in the plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub step_id: u32,
    pub kind: TaskKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_or_diff: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    pub description: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub critical: bool,
}

/// Review finding severity, ordered from most to least severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Critical => "CRITICAL",
            Severity::High => "HIGH",
            Severity::Medium => "MEDIUM",
            Severity::Low => "LOW",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = anyhow::Error;

    /// Case-insensitive; `info` is folded into `LOW`.
    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "critical" => Ok(Severity::Critical),
            "high" => Ok(Severity::High),
            "medium" => Ok(Severity::Medium),
            "low" | "info" => Ok(Severity::Low),
            other => Err(anyhow!("unknown severity {other:?}")),
        }
    }
}

/// One structured finding from the code review stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewItem {
    /// Content fingerprint; stable across review iterations.
    pub id: String,
    /// 1-based position as numbered by the reviewer.
    pub ordinal: u32,
    pub severity: Severity,
    #[serde(rename = "type")]
    pub item_type: String,
    pub file: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_start: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_end: Option<u32>,
}
