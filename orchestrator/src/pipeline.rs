//! Stage pipeline: drives one run from goal to generated code.
//!
//! Brainstorm → BrainstormReview → ApproachSelection → Plan → Execute →
//! [CodeReview → ReviewSelection → Fix]* → Done.
//!
//! Each stage works on a copy of the context; the driver commits the copy
//! and persists it only after the stage succeeds, so an aborted or
//! interrupted run can resume from the stage that did not finish.

use std::cell::{Cell, Ref, RefCell};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::apply::{ExecutorSettings, TaskExecutor, TaskOutcome};
use crate::core::approaches::{default_choice, extract_approaches, extract_recommended};
use crate::core::context::{OrchestrationContext, TraceEntry};
use crate::core::path::normalize_relative;
use crate::core::plan::{parse_plan, plan_summary};
use crate::core::review::{ReviewReport, ReviewSelection, parse_review};
use crate::core::text::{excerpt, extract_code_block};
use crate::core::types::{ReviewItem, Stage, TaskKind, TaskStatus};
use crate::error::{OrchestratorError, error_kind};
use crate::feedback::{LoopSettings, LoopStop, ReviewFixCycle, run_feedback_loop};
use crate::io::config::Settings;
use crate::io::context_store::save_context;
use crate::io::debug_log::DebugLog;
use crate::io::exec_log::ExecutionLog;
use crate::io::feedback_state::load_ralph_state;
use crate::io::interaction::Interaction;
use crate::io::paths::RunPaths;
use crate::io::prompt::{FileSnapshot, FixPromptInput, PromptEngine, ReviewPromptInput, system_prompt};
use crate::io::shell::ShellRunner;
use crate::io::tooling::detect_tooling;
use crate::io::tools::InvokeOptions;
use crate::io::tools::factory::ToolSet;
use crate::io::workspace::{WriteOutcome, Workspace};
use crate::validate::{CodeValidator, Validation};

/// Run-level switches, mostly from the CLI.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub auto_select: bool,
    pub auto_run: bool,
    pub auto_approve: bool,
    pub auto_fix: bool,
    pub skip_review: bool,
    pub max_fix_iterations: u32,
    /// Keep raw tool output and a trace; include raw output in abort reports.
    pub debug: bool,
    /// Echo tool output to stderr as it arrives.
    pub stream: bool,
    /// Delegate the review/fix segment to the feedback loop.
    pub feedback: Option<LoopSettings>,
    /// Restore feedback-loop state from its state file.
    pub resume: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            auto_select: false,
            auto_run: false,
            auto_approve: false,
            auto_fix: false,
            skip_review: false,
            max_fix_iterations: 1,
            debug: false,
            stream: false,
            feedback: None,
            resume: false,
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Done,
    Aborted {
        stage: Stage,
        kind: &'static str,
        message: String,
        /// Last raw tool output, kept only in debug mode.
        raw_output: Option<String>,
    },
    Interrupted { stage: Stage },
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub context: OrchestrationContext,
}

pub struct Pipeline<'a, T, I, S> {
    tools: &'a T,
    interaction: &'a I,
    shell: &'a S,
    settings: &'a Settings,
    options: PipelineOptions,
    paths: RunPaths,
    prompts: PromptEngine,
    workspace: Workspace,
    /// Tools detected in the workspace, shown to the brainstorm and plan roles.
    tooling: String,
    interrupt: Arc<AtomicBool>,
    log: RefCell<ExecutionLog>,
    debug_log: Option<DebugLog>,
    invocations: Cell<usize>,
    last_output: RefCell<Option<String>>,
}

impl<'a, T: ToolSet, I: Interaction, S: ShellRunner> Pipeline<'a, T, I, S> {
    pub fn new(
        tools: &'a T,
        interaction: &'a I,
        shell: &'a S,
        settings: &'a Settings,
        options: PipelineOptions,
        paths: RunPaths,
        run_id: &str,
    ) -> Self {
        let debug_log = options
            .debug
            .then(|| DebugLog::new(paths.debug_dir.clone(), run_id));
        Self {
            tools,
            interaction,
            shell,
            settings,
            workspace: Workspace::new(paths.project_dir.clone()),
            tooling: detect_tooling(&paths.workspace),
            log: RefCell::new(ExecutionLog::at(paths.execution_log_path(run_id))),
            options,
            paths,
            prompts: PromptEngine::new(),
            interrupt: Arc::new(AtomicBool::new(false)),
            debug_log,
            invocations: Cell::new(0),
            last_output: RefCell::new(None),
        }
    }

    /// Share an externally owned interrupt flag (set from a signal handler).
    pub fn with_interrupt(mut self, interrupt: Arc<AtomicBool>) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn execution_log(&self) -> Ref<'_, ExecutionLog> {
        self.log.borrow()
    }

    fn interrupted(&self) -> bool {
        self.interrupt.load(Ordering::SeqCst)
    }

    /// Drive `ctx` until a terminal stage, an abort, or an interrupt.
    ///
    /// Stage failures end in [`RunOutcome::Aborted`]; `Err` is reserved for
    /// failing to persist the context itself.
    #[instrument(skip_all, fields(run_id = %ctx.run_id, project = %ctx.project_name))]
    pub fn run(&self, mut ctx: OrchestrationContext) -> Result<RunReport> {
        while !ctx.stage.is_terminal() {
            let stage = ctx.stage;
            if self.interrupted() {
                warn!(stage = %stage, "interrupted");
                ctx.warnings
                    .push(OrchestratorError::Interrupted { stage }.to_string());
                save_context(&self.paths.context_path, &ctx)?;
                return Ok(RunReport {
                    outcome: RunOutcome::Interrupted { stage },
                    context: ctx,
                });
            }

            info!(stage = %stage, "stage started");
            let mut next = ctx.clone();
            match self.run_stage(&mut next) {
                Ok(()) => {
                    if self.options.debug {
                        next.debug_trace.push(TraceEntry {
                            timestamp: chrono::Utc::now().to_rfc3339(),
                            stage,
                            message: format!("completed, next stage {}", next.stage),
                        });
                    }
                    ctx = next;
                    save_context(&self.paths.context_path, &ctx)?;
                    if ctx.stage == stage {
                        // Only an interrupted feedback loop leaves the stage unchanged.
                        return Ok(RunReport {
                            outcome: RunOutcome::Interrupted { stage },
                            context: ctx,
                        });
                    }
                    info!(stage = %stage, next = %ctx.stage, "stage completed");
                }
                Err(err) if self.interrupted() => {
                    // Ctrl-C also reaches the tool's process group, so its
                    // failure is a consequence of the interrupt.
                    warn!(stage = %stage, error = %format!("{err:#}"), "stage failed after interrupt");
                    ctx.warnings
                        .push(OrchestratorError::Interrupted { stage }.to_string());
                    save_context(&self.paths.context_path, &ctx)?;
                    return Ok(RunReport {
                        outcome: RunOutcome::Interrupted { stage },
                        context: ctx,
                    });
                }
                Err(err) => {
                    let kind = error_kind(&err);
                    let message = format!("{err:#}");
                    warn!(stage = %stage, kind, error = %message, "stage failed, aborting run");
                    save_context(&self.paths.context_path, &ctx)?;
                    let raw_output = if self.options.debug {
                        self.last_output.borrow().clone()
                    } else {
                        None
                    };
                    ctx.stage = Stage::Aborted;
                    return Ok(RunReport {
                        outcome: RunOutcome::Aborted {
                            stage,
                            kind,
                            message,
                            raw_output,
                        },
                        context: ctx,
                    });
                }
            }
        }
        Ok(RunReport {
            outcome: RunOutcome::Done,
            context: ctx,
        })
    }

    fn run_stage(&self, ctx: &mut OrchestrationContext) -> Result<()> {
        match ctx.stage {
            Stage::Brainstorm => self.brainstorm(ctx),
            Stage::BrainstormReview => self.brainstorm_review(ctx),
            Stage::ApproachSelection => self.select_approach(ctx),
            Stage::Plan => self.plan(ctx),
            Stage::Execute => self.execute(ctx),
            Stage::CodeReview => match &self.options.feedback {
                Some(settings) => self.feedback_loop(ctx, settings),
                None => self.code_review(ctx),
            },
            Stage::ReviewSelection => self.select_review_items(ctx),
            Stage::Fix => self.fix(ctx),
            Stage::Done | Stage::Aborted => Ok(()),
        }
    }

    /// Invoke the tool serving `stage` and collect its full output.
    #[instrument(skip_all, fields(stage = %stage))]
    fn invoke(&self, stage: Stage, label: Option<&str>, prompt: &str) -> Result<String> {
        let role = stage
            .role()
            .ok_or_else(|| anyhow!("stage {stage} does not invoke a tool"))?;
        let seq = self.invocations.get() + 1;
        self.invocations.set(seq);

        let mut options = InvokeOptions::new(&self.paths.project_dir, self.settings.tool_timeout());
        options.system_prompt = Some(system_prompt(role).to_string());
        options.stream = self.options.stream;
        options.output_limit_bytes = self.settings.output_limit_bytes;
        if let Some(debug_log) = &self.debug_log
            && self.options.stream
        {
            options.tee_path = Some(debug_log.stream_path(seq, stage));
        }

        info!(role = %role, tool = %self.tools.kind_for(role), "invoking tool");
        let output = self.tools.invoke(role, prompt, &options)?;
        let stream = self.options.stream;
        let text = output.collect_with(|chunk| {
            if stream {
                eprint!("{chunk}");
            }
        })?;
        debug!(bytes = text.len(), "tool output collected");
        if let Some(debug_log) = &self.debug_log {
            debug_log.record(seq, stage, label, &text)?;
        }
        *self.last_output.borrow_mut() = Some(text.clone());
        Ok(text)
    }

    fn brainstorm(&self, ctx: &mut OrchestrationContext) -> Result<()> {
        info!(tooling = %self.tooling, "workspace tooling");
        let prompt = self.prompts.brainstorm(&ctx.goal, &self.tooling)?;
        let output = self.invoke(Stage::Brainstorm, None, &prompt)?;
        ctx.stage_outputs.insert(Stage::Brainstorm, output);
        ctx.stage = Stage::BrainstormReview;
        Ok(())
    }

    fn brainstorm_review(&self, ctx: &mut OrchestrationContext) -> Result<()> {
        let ideas = ctx.output(Stage::Brainstorm).unwrap_or_default();
        let prompt = self.prompts.brainstorm_review(&ctx.goal, ideas, &self.tooling)?;
        let output = self.invoke(Stage::BrainstormReview, None, &prompt)?;
        ctx.recommended_approach = extract_recommended(&output);
        ctx.stage_outputs.insert(Stage::BrainstormReview, output);
        ctx.stage = Stage::ApproachSelection;
        Ok(())
    }

    fn select_approach(&self, ctx: &mut OrchestrationContext) -> Result<()> {
        let approaches = extract_approaches(ctx.ideas());
        let selected = if approaches.is_empty() {
            warn!("no approaches found in brainstorm output, using the goal");
            ctx.warnings
                .push("no approaches found; the goal was used as the approach".to_string());
            ctx.goal.clone()
        } else {
            let default = default_choice(&approaches, ctx.recommended_approach.as_deref());
            if self.options.auto_select {
                approaches[default].clone()
            } else {
                let mut options = approaches.clone();
                options.push("Custom approach (describe your own)".to_string());
                let choice =
                    self.interaction
                        .request_selection("Select an approach", &options, default)?;
                match approaches.get(choice) {
                    Some(approach) => approach.clone(),
                    None => self.interaction.request_text("Describe your approach")?,
                }
            }
        };
        info!(approach = %selected, "approach selected");
        ctx.approaches = approaches;
        ctx.selected_approach = Some(selected);
        ctx.stage = Stage::Plan;
        Ok(())
    }

    fn plan(&self, ctx: &mut OrchestrationContext) -> Result<()> {
        let approach = ctx.selected_approach.clone().unwrap_or_else(|| ctx.goal.clone());
        let attempts = self.settings.plan_retries + 1;
        let mut error: Option<String> = None;
        for attempt in 1..=attempts {
            let prompt = self.prompts.plan(
                &ctx.goal,
                &approach,
                &ctx.project_name,
                &self.tooling,
                error.as_deref(),
            )?;
            let output = self.invoke(Stage::Plan, None, &prompt)?;
            match parse_plan(&output) {
                Ok(parsed) => {
                    if !parsed.skipped.is_empty() {
                        ctx.warnings.push(format!(
                            "plan steps without executable work were skipped: {:?}",
                            parsed.skipped
                        ));
                    }
                    info!(tasks = parsed.tasks.len(), attempt, "plan accepted");
                    ctx.plan = parsed.tasks;
                    ctx.stage_outputs.insert(Stage::Plan, output);
                    ctx.stage = Stage::Execute;
                    return Ok(());
                }
                Err(err) => {
                    warn!(attempt, error = %format!("{err:#}"), "plan rejected");
                    error = Some(format!("{err:#}"));
                }
            }
        }
        Err(OrchestratorError::PlanParse {
            attempts,
            reason: error.unwrap_or_default(),
        }
        .into())
    }

    fn executor(&self) -> TaskExecutor<'_, S, I> {
        TaskExecutor::new(
            &self.workspace,
            self.shell,
            self.interaction,
            ExecutorSettings {
                auto_run: self.options.auto_run,
                auto_approve: self.options.auto_approve,
                command_timeout: self.settings.command_timeout(),
                output_limit_bytes: self.settings.output_limit_bytes,
                excerpt_bytes: self.settings.excerpt_bytes,
                retry: self.settings.retry_policy(),
            },
        )
    }

    fn validator(&self) -> CodeValidator<'_, S> {
        CodeValidator::new(
            self.shell,
            &self.settings.validators,
            self.paths.state_dir.join("validate"),
            self.settings.command_timeout(),
            self.settings.output_limit_bytes,
            self.settings.excerpt_bytes,
        )
    }

    /// Check tool output destined for `path` and ask the stage's tool for a
    /// repair while it fails, up to `validation_retries` times. Returns the
    /// content to write; content that still fails is returned with a warning.
    fn validated(
        &self,
        stage: Stage,
        label: &str,
        path: &str,
        mut content: String,
        warnings: &mut Vec<String>,
    ) -> Result<String> {
        let validator = self.validator();
        let retries = self.settings.validation_retries;
        for attempt in 0..=retries {
            // A diff that does not apply is reported by the write itself.
            let Ok(candidate) = self.workspace.final_content(path, &content) else {
                return Ok(content);
            };
            let error = match validator.validate(path, &candidate) {
                Validation::Passed => return Ok(content),
                Validation::Skipped(reason) => {
                    debug!(path, %reason, "validation skipped");
                    return Ok(content);
                }
                Validation::Failed(error) => error,
            };
            if attempt == retries {
                warn!(path, attempts = attempt, error = %error, "file still invalid, writing anyway");
                warnings.push(format!(
                    "{path} still fails validation after {attempt} repair attempt(s): {}",
                    error.lines().next().unwrap_or_default()
                ));
                break;
            }
            warn!(path, attempt = attempt + 1, error = %error, "generated file invalid, requesting repair");
            let prompt = self.prompts.repair(path, &error, &candidate)?;
            let repair_label = format!("{label}-repair-{}", attempt + 1);
            let output = self.invoke(stage, Some(&repair_label), &prompt)?;
            content = file_content(&output);
        }
        Ok(content)
    }

    fn execute(&self, ctx: &mut OrchestrationContext) -> Result<()> {
        let goal = ctx.goal.clone();
        let approach = ctx.selected_approach.clone().unwrap_or_default();
        let summary = plan_summary(&ctx.plan);
        let executor = self.executor();
        let mut validation_warnings = Vec::new();
        let report = {
            let mut log = self.log.borrow_mut();
            executor.apply_plan(
                &mut ctx.plan,
                |task, existing| {
                    let path = task.file_path.as_deref().unwrap_or_default();
                    let prompt = self.prompts.execute(
                        &goal,
                        &approach,
                        &summary,
                        path,
                        &task.description,
                        existing,
                    )?;
                    let label = format!("step-{}", task.step_id);
                    let output = self.invoke(Stage::Execute, Some(&label), &prompt)?;
                    self.validated(
                        Stage::Execute,
                        &label,
                        path,
                        file_content(&output),
                        &mut validation_warnings,
                    )
                },
                &mut log,
            )?
        };
        ctx.warnings.extend(validation_warnings);
        for (path, diff) in report.diffs {
            if !diff.is_empty() {
                ctx.diffs.insert(path, diff);
            }
        }
        ctx.warnings.extend(report.failures);
        ctx.stage_outputs
            .insert(Stage::Execute, self.log.borrow().summary());
        ctx.stage = if self.options.skip_review {
            Stage::Done
        } else {
            Stage::CodeReview
        };
        Ok(())
    }

    /// Files the run wrote: completed write tasks plus every diffed path.
    fn written_files(ctx: &OrchestrationContext) -> BTreeSet<String> {
        ctx.plan
            .iter()
            .filter(|task| task.kind == TaskKind::WriteFile && task.status == TaskStatus::Done)
            .filter_map(|task| task.file_path.as_deref())
            .map(|raw| match normalize_relative(raw) {
                Some(path) => path.to_string_lossy().replace('\\', "/"),
                None => raw.to_string(),
            })
            .chain(ctx.diffs.keys().cloned())
            .collect()
    }

    fn code_review(&self, ctx: &mut OrchestrationContext) -> Result<()> {
        let mut files = Vec::new();
        for path in Self::written_files(ctx) {
            let content = match self.workspace.read_existing(&path) {
                Ok(Some(content)) => content,
                Ok(None) => continue,
                Err(err) => {
                    warn!(path = %path, error = %format!("{err:#}"), "file left out of review");
                    ctx.warnings
                        .push(format!("{path} left out of the review: {err:#}"));
                    continue;
                }
            };
            files.push(FileSnapshot {
                content: excerpt(&content, self.settings.file_context_bytes),
                path,
            });
        }
        let summary = plan_summary(&ctx.plan);
        let execution_summary = self.log.borrow().summary();
        let prompt = self.prompts.code_review(&ReviewPromptInput {
            goal: &ctx.goal,
            plan_summary: &summary,
            execution_summary: &execution_summary,
            diffs: ctx.diffs.values().map(String::as_str).collect(),
            files,
        })?;
        let output = self.invoke(Stage::CodeReview, None, &prompt)?;
        let report = parse_review(&output);
        for warning in &report.warnings {
            warn!(%warning, "review item dropped");
            ctx.warnings.push(warning.to_string());
        }
        if !report.parsed {
            warn!("code review output carried no JSON");
            ctx.warnings
                .push("code review output could not be parsed".to_string());
        }
        info!(
            items = report.items.len(),
            requires_fixes = report.requires_fixes,
            "code review parsed"
        );
        ctx.review = Some(report);
        ctx.stage_outputs.insert(Stage::CodeReview, output);
        ctx.stage = Stage::ReviewSelection;
        Ok(())
    }

    fn select_review_items(&self, ctx: &mut OrchestrationContext) -> Result<()> {
        let Some(review) = ctx.review.as_ref().filter(|r| r.requires_fixes && !r.items.is_empty())
        else {
            info!("no fixes required");
            ctx.selected_items.clear();
            ctx.stage = Stage::Done;
            return Ok(());
        };
        let selection = if self.options.auto_fix {
            ReviewSelection::All
        } else {
            self.interaction.request_review_selection(&review.items)?
        };
        let selected = selection.apply(&review.items);
        info!(selected = selected.len(), "review items selected");
        ctx.stage = if selected.is_empty() {
            Stage::Done
        } else {
            Stage::Fix
        };
        ctx.selected_items = selected;
        Ok(())
    }

    fn fix(&self, ctx: &mut OrchestrationContext) -> Result<()> {
        let items = std::mem::take(&mut ctx.selected_items);
        self.fix_items(ctx, &items, None, None)?;
        ctx.fix_iterations += 1;
        ctx.stage = if ctx.fix_iterations >= self.options.max_fix_iterations {
            Stage::Done
        } else {
            Stage::CodeReview
        };
        Ok(())
    }

    /// One fixer invocation per item, in the given order. Returns the raw
    /// fixer outputs joined together.
    fn fix_items(
        &self,
        ctx: &mut OrchestrationContext,
        items: &[ReviewItem],
        history: Option<&str>,
        promise: Option<&str>,
    ) -> Result<String> {
        let executor = self.executor();
        let mut outputs = Vec::with_capacity(items.len());
        for item in items {
            let content = match self.workspace.read_existing(&item.file) {
                Ok(content) => content.unwrap_or_default(),
                Err(err)
                    if matches!(
                        err.downcast_ref::<OrchestratorError>(),
                        Some(OrchestratorError::PathEscape { .. })
                    ) =>
                {
                    return Err(err);
                }
                Err(err) => {
                    warn!(file = %item.file, error = %format!("{err:#}"), "fix skipped");
                    ctx.warnings.push(format!(
                        "fix for item {} skipped: {} is unreadable: {err:#}",
                        item.ordinal, item.file
                    ));
                    continue;
                }
            };
            let prompt = self.prompts.fix(&FixPromptInput {
                goal: &ctx.goal,
                item,
                content: &content,
                history,
                promise,
            })?;
            let label = format!("item-{}", item.ordinal);
            let output = self.invoke(Stage::Fix, Some(&label), &prompt)?;
            let content =
                self.validated(Stage::Fix, &label, &item.file, file_content(&output), &mut ctx.warnings)?;
            match executor.write_file(&item.file, &content)? {
                TaskOutcome::Written {
                    path,
                    outcome: WriteOutcome::Written { diff, .. },
                } => {
                    debug!(path = %path, "fix applied");
                    ctx.diffs.insert(path, diff);
                }
                TaskOutcome::WriteFailed { path, reason } => {
                    warn!(path = %path, reason = %reason, "fix could not be written");
                    ctx.warnings
                        .push(format!("fix for item {} not applied: {reason}", item.ordinal));
                }
                _ => debug!(file = %item.file, "fix left file unchanged"),
            }
            outputs.push(output);
        }
        ctx.stage_outputs.insert(Stage::Fix, outputs.join("\n"));
        Ok(outputs.join("\n"))
    }

    fn feedback_loop(&self, ctx: &mut OrchestrationContext, settings: &LoopSettings) -> Result<()> {
        let resume = match (&settings.state_path, self.options.resume) {
            (Some(path), true) => load_ralph_state(path)?,
            _ => None,
        };
        let mut cycle = LoopCycle {
            pipeline: self,
            ctx: ctx.clone(),
            promise: settings.completion_promise.clone(),
        };
        let outcome = run_feedback_loop(&mut cycle, &self.settings.scoring, settings, resume)?;
        *ctx = cycle.ctx;
        ctx.fix_iterations = outcome.state.iteration;
        ctx.review = Some(outcome.report.clone());
        if let Some(warning) = outcome.warning() {
            ctx.warnings.push(warning);
        }
        match outcome.stop {
            LoopStop::Accepted { score } => {
                info!(score, iterations = outcome.state.iteration, "feedback loop accepted");
                ctx.stage = Stage::Done;
            }
            LoopStop::Exhausted { .. } | LoopStop::NothingToFix { .. } => ctx.stage = Stage::Done,
            LoopStop::Interrupted => {
                warn!("feedback loop interrupted");
                ctx.stage = Stage::CodeReview;
            }
        }
        Ok(())
    }
}

/// Adapts the pipeline's review and fix stages to the feedback loop.
struct LoopCycle<'p, 'a, T, I, S> {
    pipeline: &'p Pipeline<'a, T, I, S>,
    ctx: OrchestrationContext,
    promise: Option<String>,
}

impl<T: ToolSet, I: Interaction, S: ShellRunner> ReviewFixCycle for LoopCycle<'_, '_, T, I, S> {
    fn review(&mut self) -> Result<ReviewReport> {
        self.pipeline
            .code_review(&mut self.ctx)
            .context("feedback loop review")?;
        Ok(self.ctx.review.clone().unwrap_or_default())
    }

    fn fix(&mut self, items: &[ReviewItem], history: &str) -> Result<String> {
        self.ctx.feedback_notes = (!history.is_empty()).then(|| history.to_string());
        let promise = self.promise.clone();
        self.pipeline
            .fix_items(&mut self.ctx, items, Some(history), promise.as_deref())
    }

    fn interrupted(&self) -> bool {
        self.pipeline.interrupted()
    }
}

/// File content from tool output: the fenced body, newline-terminated.
fn file_content(output: &str) -> String {
    let mut content = extract_code_block(output);
    if !content.is_empty() && !content.ends_with('\n') {
        content.push('\n');
    }
    content
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_content_strips_fences_and_terminates() {
        assert_eq!(file_content("Here:\n```python\nprint(1)\n```\n"), "print(1)\n");
        assert_eq!(file_content("plain"), "plain\n");
        assert_eq!(file_content(""), "");
    }
}
