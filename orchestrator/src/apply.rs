//! Task executor: applies a plan to the project workspace.
//!
//! Tasks run strictly in plan order. `write_file` tasks go through the
//! path-safe [`Workspace`]; `run_command` tasks go through a [`ShellRunner`]
//! with confirmation gating and bounded retries. A failed command only stops
//! the plan when its task is marked critical.

use std::fs;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::core::backoff::RetryPolicy;
use crate::core::text::{excerpt, normalize_run_command};
use crate::core::types::{Task, TaskKind, TaskStatus};
use crate::error::OrchestratorError;
use crate::io::exec_log::{AttemptOutcome, ExecutionLog, ExecutionLogEntry};
use crate::io::interaction::Interaction;
use crate::io::shell::ShellRunner;
use crate::io::workspace::{WriteOutcome, Workspace};

#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    /// Run commands without asking.
    pub auto_run: bool,
    /// Approve every confirmation prompt.
    pub auto_approve: bool,
    pub command_timeout: Duration,
    pub output_limit_bytes: usize,
    pub excerpt_bytes: usize,
    pub retry: RetryPolicy,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            auto_run: false,
            auto_approve: false,
            command_timeout: Duration::from_secs(300),
            output_limit_bytes: 200_000,
            excerpt_bytes: 2_000,
            retry: RetryPolicy::default(),
        }
    }
}

/// What happened to one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Written { path: String, outcome: WriteOutcome },
    CommandSucceeded { attempts: u32 },
    /// The user declined to run the command; the task stays pending.
    Declined,
    CommandFailed {
        attempts: u32,
        exit_code: Option<i32>,
        stderr_excerpt: String,
    },
    /// The write could not be applied (bad diff, I/O error).
    WriteFailed { path: String, reason: String },
}

impl TaskOutcome {
    pub fn status(&self) -> TaskStatus {
        match self {
            TaskOutcome::Written { .. } | TaskOutcome::CommandSucceeded { .. } => TaskStatus::Done,
            TaskOutcome::Declined => TaskStatus::Pending,
            TaskOutcome::CommandFailed { .. } | TaskOutcome::WriteFailed { .. } => {
                TaskStatus::Failed
            }
        }
    }
}

/// Per-plan result handed back to the Execute stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// `(path, unified diff)` for every file whose content changed.
    pub diffs: Vec<(String, String)>,
    pub written: Vec<String>,
    pub failures: Vec<String>,
}

pub struct TaskExecutor<'a, S, I> {
    workspace: &'a Workspace,
    shell: &'a S,
    interaction: &'a I,
    settings: ExecutorSettings,
}

impl<'a, S: ShellRunner, I: Interaction> TaskExecutor<'a, S, I> {
    pub fn new(
        workspace: &'a Workspace,
        shell: &'a S,
        interaction: &'a I,
        settings: ExecutorSettings,
    ) -> Self {
        Self {
            workspace,
            shell,
            interaction,
            settings,
        }
    }

    /// Apply every task not yet done, in order.
    ///
    /// `generate` supplies content for `write_file` tasks that carry none; it
    /// receives the task and the file's current content. Task statuses are
    /// updated in place. Path escapes and generation errors abort; a failed
    /// critical command aborts with `CommandFailed`.
    pub fn apply_plan<F>(
        &self,
        tasks: &mut [Task],
        mut generate: F,
        log: &mut ExecutionLog,
    ) -> Result<ApplyReport>
    where
        F: FnMut(&Task, Option<&str>) -> Result<String>,
    {
        let mut report = ApplyReport::default();
        for task in tasks.iter_mut() {
            if task.status == TaskStatus::Done {
                debug!(step_id = task.step_id, "task already done, skipping");
                continue;
            }
            let outcome = match task.kind {
                TaskKind::WriteFile => self.apply_write(task, &mut generate)?,
                TaskKind::RunCommand => {
                    if task.command.is_none() {
                        task.command = Some(normalize_run_command(&task.description));
                    }
                    let command = task.command.clone().unwrap_or_default();
                    self.run_command(task.step_id, &command, log)?
                }
            };
            task.status = outcome.status();
            match outcome {
                TaskOutcome::Written { path, outcome } => {
                    if let WriteOutcome::Written { diff, .. } = outcome {
                        report.diffs.push((path.clone(), diff));
                    }
                    report.written.push(path);
                }
                TaskOutcome::CommandFailed {
                    attempts,
                    exit_code,
                    stderr_excerpt,
                } => {
                    let command = task.command.clone().unwrap_or_default();
                    warn!(
                        step_id = task.step_id,
                        command = %command,
                        attempts,
                        exit_code = ?exit_code,
                        stderr = %stderr_excerpt,
                        "command failed"
                    );
                    if task.critical {
                        return Err(OrchestratorError::CommandFailed {
                            command,
                            attempts,
                            exit_code,
                        }
                        .into());
                    }
                    report.failures.push(format!(
                        "step {}: `{command}` failed after {attempts} attempt(s) (exit code {exit_code:?})",
                        task.step_id
                    ));
                }
                TaskOutcome::WriteFailed { path, reason } => {
                    warn!(step_id = task.step_id, path = %path, reason = %reason, "write failed");
                    report
                        .failures
                        .push(format!("step {}: write {path} failed: {reason}", task.step_id));
                }
                TaskOutcome::CommandSucceeded { .. } | TaskOutcome::Declined => {}
            }
        }
        info!(
            written = report.written.len(),
            failures = report.failures.len(),
            "plan applied"
        );
        Ok(report)
    }

    fn apply_write<F>(&self, task: &Task, generate: &mut F) -> Result<TaskOutcome>
    where
        F: FnMut(&Task, Option<&str>) -> Result<String>,
    {
        let path = task
            .file_path
            .clone()
            .ok_or_else(|| anyhow!("write_file step {} has no file_path", task.step_id))?;
        // Resolve first so an escaping path fails before any tool runs.
        self.workspace.resolve(&path)?;
        let content = match &task.content_or_diff {
            Some(content) => content.clone(),
            None => {
                let existing = self.workspace.read_existing(&path)?;
                generate(task, existing.as_deref())?
            }
        };
        Ok(self.write(&path, &content))
    }

    /// Write content or a diff to `path`. Path escapes are the only error;
    /// other failures are reported in the outcome.
    pub fn write_file(&self, path: &str, content_or_diff: &str) -> Result<TaskOutcome> {
        self.workspace.resolve(path)?;
        Ok(self.write(path, content_or_diff))
    }

    fn write(&self, path: &str, content_or_diff: &str) -> TaskOutcome {
        match self.workspace.apply_content(path, content_or_diff) {
            Ok(outcome) => TaskOutcome::Written {
                path: path.to_string(),
                outcome,
            },
            Err(err) => TaskOutcome::WriteFailed {
                path: path.to_string(),
                reason: format!("{err:#}"),
            },
        }
    }

    /// Run one command with gating and retries, logging every attempt.
    #[instrument(skip_all, fields(step_id = step_id, command = %command))]
    pub fn run_command(
        &self,
        step_id: u32,
        command: &str,
        log: &mut ExecutionLog,
    ) -> Result<TaskOutcome> {
        if !(self.settings.auto_run || self.settings.auto_approve)
            && !self
                .interaction
                .confirm(&format!("Run command `{command}`?"))?
        {
            info!("command declined");
            return Ok(TaskOutcome::Declined);
        }

        let workdir = self.workspace.root();
        fs::create_dir_all(workdir)
            .with_context(|| format!("create workspace {}", workdir.display()))?;

        let max_attempts = self.settings.retry.max_attempts();
        let mut last_exit = None;
        let mut last_stderr = String::new();
        for attempt in 0..max_attempts {
            let timestamp = chrono::Utc::now().to_rfc3339();
            let started = Instant::now();
            let result = self.shell.run(
                command,
                workdir,
                self.settings.command_timeout,
                self.settings.output_limit_bytes,
            );
            let entry = match &result {
                Ok(run) => ExecutionLogEntry {
                    step_id,
                    command: command.to_string(),
                    attempt_number: attempt + 1,
                    timestamp,
                    exit_code: run.exit_code,
                    duration_ms: duration_ms(run.duration),
                    stdout_excerpt: excerpt(&run.stdout, self.settings.excerpt_bytes),
                    stderr_excerpt: excerpt(&run.stderr, self.settings.excerpt_bytes),
                    outcome: if run.success() {
                        AttemptOutcome::Success
                    } else if run.timed_out {
                        AttemptOutcome::TimedOut
                    } else {
                        AttemptOutcome::Failed
                    },
                },
                Err(err) => ExecutionLogEntry {
                    step_id,
                    command: command.to_string(),
                    attempt_number: attempt + 1,
                    timestamp,
                    exit_code: None,
                    duration_ms: duration_ms(started.elapsed()),
                    stdout_excerpt: String::new(),
                    stderr_excerpt: excerpt(&format!("{err:#}"), self.settings.excerpt_bytes),
                    outcome: AttemptOutcome::SpawnError,
                },
            };
            last_exit = entry.exit_code;
            last_stderr = entry.stderr_excerpt.clone();
            let succeeded = entry.outcome == AttemptOutcome::Success;
            log.append(entry)?;
            if succeeded {
                return Ok(TaskOutcome::CommandSucceeded {
                    attempts: attempt + 1,
                });
            }
            if attempt + 1 < max_attempts {
                let delay = self.settings.retry.delay_after(attempt);
                debug!(attempt = attempt + 1, delay_ms = duration_ms(delay), "retrying command");
                thread::sleep(delay);
            }
        }
        Ok(TaskOutcome::CommandFailed {
            attempts: max_attempts,
            exit_code: last_exit,
            stderr_excerpt: last_stderr,
        })
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedInteraction, ScriptedShell, command_task, write_task};

    fn settings(max_retries: u32) -> ExecutorSettings {
        ExecutorSettings {
            auto_run: true,
            retry: RetryPolicy::no_delay(max_retries),
            ..ExecutorSettings::default()
        }
    }

    fn no_generation(task: &Task, _existing: Option<&str>) -> Result<String> {
        Err(anyhow!("unexpected generation for step {}", task.step_id))
    }

    /// Verifies a command that fails twice then succeeds logs three attempts.
    #[test]
    fn retries_until_success_and_logs_every_attempt() {
        let temp = tempfile::tempdir().expect("tempdir");
        let workspace = Workspace::new(temp.path());
        let shell = ScriptedShell::new([
            ScriptedShell::exit(1),
            ScriptedShell::exit(1),
            ScriptedShell::exit(0),
        ]);
        let ui = ScriptedInteraction::default();
        let executor = TaskExecutor::new(&workspace, &shell, &ui, settings(3));
        let mut log = ExecutionLog::in_memory();

        let outcome = executor.run_command(1, "make test", &mut log).expect("run");
        assert_eq!(outcome, TaskOutcome::CommandSucceeded { attempts: 3 });
        let outcomes: Vec<AttemptOutcome> = log.entries().iter().map(|e| e.outcome).collect();
        assert_eq!(
            outcomes,
            vec![AttemptOutcome::Failed, AttemptOutcome::Failed, AttemptOutcome::Success]
        );
        assert_eq!(log.entries()[2].attempt_number, 3);
    }

    #[test]
    fn non_critical_failure_does_not_block_later_tasks() {
        let temp = tempfile::tempdir().expect("tempdir");
        let workspace = Workspace::new(temp.path());
        let shell = ScriptedShell::new([ScriptedShell::exit(2), ScriptedShell::exit(0)]);
        let ui = ScriptedInteraction::default();
        let executor = TaskExecutor::new(&workspace, &shell, &ui, settings(0));
        let mut log = ExecutionLog::in_memory();
        let mut tasks = vec![
            command_task(1, "false"),
            write_task(2, "a.txt", Some("A")),
            command_task(3, "true"),
        ];

        let report = executor
            .apply_plan(&mut tasks, no_generation, &mut log)
            .expect("apply");
        let statuses: Vec<TaskStatus> = tasks.iter().map(|t| t.status).collect();
        assert_eq!(
            statuses,
            vec![TaskStatus::Failed, TaskStatus::Done, TaskStatus::Done]
        );
        assert_eq!(report.failures.len(), 1);
        assert_eq!(shell.commands(), vec!["false", "true"]);
    }

    #[test]
    fn critical_failure_aborts_the_plan() {
        let temp = tempfile::tempdir().expect("tempdir");
        let workspace = Workspace::new(temp.path());
        let shell = ScriptedShell::new([ScriptedShell::exit(1), ScriptedShell::exit(1)]);
        let ui = ScriptedInteraction::default();
        let executor = TaskExecutor::new(&workspace, &shell, &ui, settings(1));
        let mut log = ExecutionLog::in_memory();
        let mut critical = command_task(1, "pip install -r requirements.txt");
        critical.critical = true;
        let mut tasks = vec![critical, write_task(2, "a.txt", Some("A"))];

        let err = executor
            .apply_plan(&mut tasks, no_generation, &mut log)
            .unwrap_err();
        match err.downcast_ref::<OrchestratorError>() {
            Some(OrchestratorError::CommandFailed { attempts, .. }) => assert_eq!(*attempts, 2),
            other => panic!("unexpected error {other:?}"),
        }
        assert!(!temp.path().join("a.txt").exists());
    }

    #[test]
    fn declined_command_stays_pending_and_is_not_run() {
        let temp = tempfile::tempdir().expect("tempdir");
        let workspace = Workspace::new(temp.path());
        let shell = ScriptedShell::new([]);
        let ui = ScriptedInteraction::default().with_confirms([false]);
        let executor = TaskExecutor::new(
            &workspace,
            &shell,
            &ui,
            ExecutorSettings {
                retry: RetryPolicy::no_delay(0),
                ..ExecutorSettings::default()
            },
        );
        let mut log = ExecutionLog::in_memory();
        let mut tasks = vec![command_task(1, "rm -rf build")];

        executor
            .apply_plan(&mut tasks, no_generation, &mut log)
            .expect("apply");
        assert_eq!(tasks[0].status, TaskStatus::Pending);
        assert!(log.entries().is_empty());
        assert!(shell.commands().is_empty());
    }

    #[test]
    fn escaping_path_aborts_before_generation() {
        let temp = tempfile::tempdir().expect("tempdir");
        let workspace = Workspace::new(temp.path().join("proj"));
        let shell = ScriptedShell::new([]);
        let ui = ScriptedInteraction::default();
        let executor = TaskExecutor::new(&workspace, &shell, &ui, settings(0));
        let mut log = ExecutionLog::in_memory();
        let mut tasks = vec![write_task(1, "../outside.txt", None)];

        let err = executor
            .apply_plan(&mut tasks, no_generation, &mut log)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<OrchestratorError>(),
            Some(OrchestratorError::PathEscape { .. })
        ));
        assert!(!temp.path().join("outside.txt").exists());
    }

    #[test]
    fn generated_content_sees_existing_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let workspace = Workspace::new(temp.path());
        workspace.write_file("app.py", "old\n").expect("seed");
        let shell = ScriptedShell::new([]);
        let ui = ScriptedInteraction::default();
        let executor = TaskExecutor::new(&workspace, &shell, &ui, settings(0));
        let mut log = ExecutionLog::in_memory();
        let mut tasks = vec![write_task(1, "app.py", None)];

        let report = executor
            .apply_plan(
                &mut tasks,
                |_, existing| Ok(format!("{}new\n", existing.unwrap_or_default())),
                &mut log,
            )
            .expect("apply");
        assert_eq!(
            workspace.read_existing("app.py").expect("read").as_deref(),
            Some("old\nnew\n")
        );
        assert_eq!(report.diffs.len(), 1);
        assert!(report.diffs[0].1.contains("+new"));
    }

    #[test]
    fn bad_diff_marks_task_failed() {
        let temp = tempfile::tempdir().expect("tempdir");
        let workspace = Workspace::new(temp.path());
        workspace.write_file("app.py", "a\n").expect("seed");
        let shell = ScriptedShell::new([]);
        let ui = ScriptedInteraction::default();
        let executor = TaskExecutor::new(&workspace, &shell, &ui, settings(0));
        let mut log = ExecutionLog::in_memory();
        let diff = "@@ -1,1 +1,1 @@\n-zzz\n+b\n";
        let mut tasks = vec![write_task(1, "app.py", Some(diff))];

        let report = executor
            .apply_plan(&mut tasks, no_generation, &mut log)
            .expect("apply");
        assert_eq!(tasks[0].status, TaskStatus::Failed);
        assert_eq!(report.failures.len(), 1);
    }
}
