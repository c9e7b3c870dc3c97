//! Plan parsing: planner output text to an ordered task list.

use std::collections::HashSet;

use anyhow::{Context, Result, anyhow, bail};
use jsonschema::Draft;
use serde::Deserialize;
use serde_json::Value;

use crate::core::text::{extract_json_array, normalize_run_command};
use crate::core::types::{Task, TaskKind, TaskStatus};

const PLAN_SCHEMA: &str = include_str!("../../schemas/plan.schema.json");

/// Parsed plan plus entries that were accepted but carry no executable work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPlan {
    pub tasks: Vec<Task>,
    /// Step ids of `other` entries, which are informational only.
    pub skipped: Vec<u32>,
}

#[derive(Debug, Deserialize)]
struct PlanEntry {
    step_id: u32,
    #[serde(alias = "action_type")]
    kind: String,
    #[serde(default)]
    file_path: Option<String>,
    #[serde(default, alias = "content")]
    content_or_diff: Option<String>,
    #[serde(default)]
    command: Option<String>,
    #[serde(default, alias = "instruction")]
    description: String,
    #[serde(default)]
    critical: bool,
}

/// Parse planner output into tasks.
///
/// The payload is the JSON array found in `text`. It must satisfy the plan
/// schema, carry unique step ids, and yield at least one executable task.
/// Errors describe the first problem found and are fed back to the planner.
pub fn parse_plan(text: &str) -> Result<ParsedPlan> {
    let entries =
        extract_json_array(text).ok_or_else(|| anyhow!("no JSON array of tasks found"))?;
    let instance = Value::Array(entries);
    validate_plan_schema(&instance)?;

    let entries: Vec<PlanEntry> =
        serde_json::from_value(instance).context("decode plan entries")?;

    let mut seen = HashSet::new();
    let mut tasks = Vec::with_capacity(entries.len());
    let mut skipped = Vec::new();
    for entry in entries {
        if !seen.insert(entry.step_id) {
            bail!("duplicate step_id {}", entry.step_id);
        }
        let step_id = entry.step_id;
        match task_from_entry(entry)? {
            Some(task) => tasks.push(task),
            None => skipped.push(step_id),
        }
    }
    if tasks.is_empty() {
        bail!("plan contains no executable tasks");
    }
    Ok(ParsedPlan { tasks, skipped })
}

fn task_from_entry(entry: PlanEntry) -> Result<Option<Task>> {
    let kind = match entry.kind.as_str() {
        "write_file" | "create_file" | "edit_file" => TaskKind::WriteFile,
        "run_command" => TaskKind::RunCommand,
        "other" => return Ok(None),
        other => bail!("step {}: unknown kind {other:?}", entry.step_id),
    };
    let file_path = entry
        .file_path
        .map(|path| path.trim().to_string())
        .filter(|path| !path.is_empty());
    let command = match kind {
        TaskKind::WriteFile => {
            if file_path.is_none() {
                bail!("step {}: write_file requires file_path", entry.step_id);
            }
            None
        }
        TaskKind::RunCommand => {
            let command = entry
                .command
                .map(|command| command.trim().to_string())
                .filter(|command| !command.is_empty())
                .unwrap_or_else(|| normalize_run_command(&entry.description));
            if command.is_empty() {
                bail!("step {}: run_command requires a command", entry.step_id);
            }
            Some(command)
        }
    };
    Ok(Some(Task {
        step_id: entry.step_id,
        kind,
        file_path,
        content_or_diff: entry.content_or_diff,
        command,
        description: entry.description,
        status: TaskStatus::Pending,
        critical: entry.critical,
    }))
}

/// Validate a plan instance against the embedded schema (Draft 2020-12).
fn validate_plan_schema(instance: &Value) -> Result<()> {
    let schema: Value = serde_json::from_str(PLAN_SCHEMA).context("parse plan schema")?;
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .context("compile plan schema")?;
    let messages: Vec<String> = compiled
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        bail!("plan schema validation failed:\n- {}", messages.join("\n- "));
    }
    Ok(())
}

/// One line per task, used in prompts and summaries.
pub fn plan_summary(tasks: &[Task]) -> String {
    tasks
        .iter()
        .map(|task| match task.kind {
            TaskKind::WriteFile => format!(
                "- Step {}: write_file {}",
                task.step_id,
                task.file_path.as_deref().unwrap_or("?")
            ),
            TaskKind::RunCommand => format!(
                "- Step {}: run_command `{}`",
                task.step_id,
                task.command.as_deref().unwrap_or("?")
            ),
        })
        .collect::<Vec<_>>()
        .join("\n")
}
