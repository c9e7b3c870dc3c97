//! Scripted collaborators for driving the pipeline without real tools.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde_json::json;
use tempfile::TempDir;

use crate::core::context::OrchestrationContext;
use crate::core::review::ReviewSelection;
use crate::core::types::{ReviewItem, Role, Task, TaskKind, TaskStatus};
use crate::error::OrchestratorError;
use crate::io::interaction::Interaction;
use crate::io::paths::RunPaths;
use crate::io::shell::{ShellResult, ShellRunner};
use crate::io::tools::factory::ToolSet;
use crate::io::tools::{InvokeOptions, ToolKind, ToolOutput};

/// Canned reply for one invocation.
enum Reply {
    Text(String),
    Fail(String),
    /// Raise the interrupt flag, then fail the way a signalled child does.
    Interrupted(Arc<AtomicBool>),
}

/// Tool set answering each role from its own queue and recording prompts.
#[derive(Default)]
pub struct ScriptedTools {
    replies: RefCell<BTreeMap<Role, VecDeque<Reply>>>,
    prompts: RefCell<Vec<(Role, String)>>,
}

impl ScriptedTools {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a text reply for `role`.
    pub fn reply(self, role: Role, text: impl Into<String>) -> Self {
        self.replies
            .borrow_mut()
            .entry(role)
            .or_default()
            .push_back(Reply::Text(text.into()));
        self
    }

    /// Queue a `StageInvocation` failure for `role`.
    pub fn fail(self, role: Role, reason: &str) -> Self {
        self.replies
            .borrow_mut()
            .entry(role)
            .or_default()
            .push_back(Reply::Fail(reason.to_string()));
        self
    }

    /// Queue an invocation that is interrupted mid-flight through `flag`.
    pub fn interrupt(self, role: Role, flag: &Arc<AtomicBool>) -> Self {
        self.replies
            .borrow_mut()
            .entry(role)
            .or_default()
            .push_back(Reply::Interrupted(Arc::clone(flag)));
        self
    }

    /// Prompts sent to `role`, in order.
    pub fn prompts(&self, role: Role) -> Vec<String> {
        self.prompts
            .borrow()
            .iter()
            .filter(|(r, _)| *r == role)
            .map(|(_, prompt)| prompt.clone())
            .collect()
    }

    pub fn calls(&self, role: Role) -> usize {
        self.prompts(role).len()
    }
}

impl ToolSet for ScriptedTools {
    fn kind_for(&self, role: Role) -> ToolKind {
        ToolKind::default_for(role)
    }

    fn invoke(&self, role: Role, prompt: &str, _options: &InvokeOptions) -> Result<ToolOutput> {
        self.prompts.borrow_mut().push((role, prompt.to_string()));
        let reply = self
            .replies
            .borrow_mut()
            .get_mut(&role)
            .and_then(VecDeque::pop_front)
            .ok_or_else(|| anyhow!("no scripted reply left for role {role}"))?;
        match reply {
            Reply::Text(text) => Ok(ToolOutput::Text(text)),
            Reply::Fail(reason) => Err(OrchestratorError::StageInvocation {
                tool: ToolKind::default_for(role).to_string(),
                reason,
            }
            .into()),
            Reply::Interrupted(flag) => {
                flag.store(true, Ordering::SeqCst);
                Err(OrchestratorError::StageInvocation {
                    tool: ToolKind::default_for(role).to_string(),
                    reason: "exit code Some(130)".to_string(),
                }
                .into())
            }
        }
    }
}

/// Interaction answering from queues; an empty queue falls back to the
/// auto answer (default option, yes, all).
#[derive(Default)]
pub struct ScriptedInteraction {
    selections: RefCell<VecDeque<usize>>,
    texts: RefCell<VecDeque<String>>,
    confirms: RefCell<VecDeque<bool>>,
    review_selections: RefCell<VecDeque<ReviewSelection>>,
    asked: RefCell<Vec<String>>,
}

impl ScriptedInteraction {
    pub fn with_selections(self, answers: impl IntoIterator<Item = usize>) -> Self {
        self.selections.borrow_mut().extend(answers);
        self
    }

    pub fn with_texts<S: Into<String>>(self, answers: impl IntoIterator<Item = S>) -> Self {
        self.texts
            .borrow_mut()
            .extend(answers.into_iter().map(Into::into));
        self
    }

    pub fn with_confirms(self, answers: impl IntoIterator<Item = bool>) -> Self {
        self.confirms.borrow_mut().extend(answers);
        self
    }

    pub fn with_review_selections(self, answers: impl IntoIterator<Item = ReviewSelection>) -> Self {
        self.review_selections.borrow_mut().extend(answers);
        self
    }

    /// Every question asked, in order.
    pub fn asked(&self) -> Vec<String> {
        self.asked.borrow().clone()
    }
}

impl Interaction for ScriptedInteraction {
    fn request_selection(&self, title: &str, _options: &[String], default: usize) -> Result<usize> {
        self.asked.borrow_mut().push(title.to_string());
        Ok(self.selections.borrow_mut().pop_front().unwrap_or(default))
    }

    fn request_text(&self, prompt: &str) -> Result<String> {
        self.asked.borrow_mut().push(prompt.to_string());
        self.texts
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("no scripted text answer for {prompt:?}"))
    }

    fn confirm(&self, prompt: &str) -> Result<bool> {
        self.asked.borrow_mut().push(prompt.to_string());
        Ok(self.confirms.borrow_mut().pop_front().unwrap_or(true))
    }

    fn request_review_selection(&self, _items: &[ReviewItem]) -> Result<ReviewSelection> {
        self.asked.borrow_mut().push("review selection".to_string());
        Ok(self
            .review_selections
            .borrow_mut()
            .pop_front()
            .unwrap_or(ReviewSelection::All))
    }
}

/// Shell returning canned results in order and recording commands.
pub struct ScriptedShell {
    results: RefCell<VecDeque<ShellResult>>,
    commands: RefCell<Vec<String>>,
}

impl ScriptedShell {
    pub fn new(results: impl IntoIterator<Item = ShellResult>) -> Self {
        Self {
            results: RefCell::new(results.into_iter().collect()),
            commands: RefCell::new(Vec::new()),
        }
    }

    /// A finished command with `code` as its exit status.
    pub fn exit(code: i32) -> ShellResult {
        ShellResult {
            exit_code: Some(code),
            stdout: String::new(),
            stderr: if code == 0 {
                String::new()
            } else {
                format!("exit {code}")
            },
            timed_out: false,
            duration: Duration::from_millis(1),
        }
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.borrow().clone()
    }
}

impl ShellRunner for ScriptedShell {
    fn run(
        &self,
        command: &str,
        _workdir: &Path,
        _timeout: Duration,
        _output_limit_bytes: usize,
    ) -> Result<ShellResult> {
        self.commands.borrow_mut().push(command.to_string());
        self.results
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("no scripted shell result for {command:?}"))
    }
}

/// Temp workspace holding one project, removed on drop.
pub struct TestWorkspace {
    temp: TempDir,
    pub paths: RunPaths,
}

impl TestWorkspace {
    pub fn new(project_name: &str) -> Result<Self> {
        let temp = tempfile::tempdir().context("create temp workspace")?;
        let paths = RunPaths::new(temp.path(), project_name);
        Ok(Self { temp, paths })
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    /// Fresh context for `goal` targeting this workspace's project.
    pub fn context(&self, run_id: &str, goal: &str) -> OrchestrationContext {
        let project_name = self
            .paths
            .project_dir
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        OrchestrationContext::new(run_id, goal, &project_name, self.paths.project_dir.clone())
    }

    /// Contents of a generated project file.
    pub fn read(&self, relative: &str) -> Result<String> {
        let path = self.paths.project_dir.join(relative);
        fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))
    }
}

pub fn write_task(step_id: u32, path: &str, content: Option<&str>) -> Task {
    Task {
        step_id,
        kind: TaskKind::WriteFile,
        file_path: Some(path.to_string()),
        content_or_diff: content.map(str::to_string),
        command: None,
        description: format!("write {path}"),
        status: TaskStatus::Pending,
        critical: false,
    }
}

pub fn command_task(step_id: u32, command: &str) -> Task {
    Task {
        step_id,
        kind: TaskKind::RunCommand,
        file_path: None,
        content_or_diff: None,
        command: Some(command.to_string()),
        description: format!("run {command}"),
        status: TaskStatus::Pending,
        critical: false,
    }
}

/// Planner output writing each `(path, content)` pair in order.
pub fn plan_json(files: &[(&str, &str)]) -> String {
    let steps: Vec<serde_json::Value> = files
        .iter()
        .enumerate()
        .map(|(idx, (path, content))| {
            json!({
                "step_id": idx + 1,
                "kind": "write_file",
                "file_path": path,
                "content": content,
                "description": format!("create {path}"),
            })
        })
        .collect();
    format!(
        "Here is the plan:\n```json\n{}\n```\n",
        serde_json::to_string_pretty(&steps).unwrap_or_default()
    )
}

/// Code reviewer output with one finding per `(severity, file, description)`.
pub fn review_json(items: &[(&str, &str, &str)]) -> String {
    let entries: Vec<serde_json::Value> = items
        .iter()
        .enumerate()
        .map(|(idx, (severity, file, description))| {
            json!({
                "item_id": idx + 1,
                "severity": severity,
                "type": "bug",
                "file": file,
                "description": description,
            })
        })
        .collect();
    json!({
        "overall_assessment": "scripted review",
        "requires_fixes": !entries.is_empty(),
        "items": entries,
    })
    .to_string()
}

/// Brainstorm review text naming two approaches and a recommendation.
pub const BRAINSTORM_REVIEW: &str = "### Approach 1: Flask app\nSmall and quick.\n\n\
### Approach 2: Django app\nBatteries included.\n\n\
## Recommended Approach\nDjango app, because it ships an admin.\n";
