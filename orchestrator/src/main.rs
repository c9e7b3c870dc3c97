//! Goal-to-code orchestrator CLI.
//!
//! Turns a natural-language goal into a generated project under
//! `<workspace>/<project>/`, keeping run state in
//! `<workspace>/.orchestrator/<project>/` so an interrupted run can resume.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::{info, warn};

use orchestrator::core::context::OrchestrationContext;
use orchestrator::core::text::project_slug;
use orchestrator::core::types::Role;
use orchestrator::exit_codes;
use orchestrator::feedback::LoopSettings;
use orchestrator::io::config::{Settings, load_settings};
use orchestrator::io::context_store::load_context;
use orchestrator::io::interaction::{AutoInteraction, Interaction, TerminalInteraction};
use orchestrator::io::paths::RunPaths;
use orchestrator::io::shell::SystemShell;
use orchestrator::io::tools::factory::{ToolAssignments, ToolBox, cli_overrides, load_tool_config};
use orchestrator::logging;
use orchestrator::pipeline::{Pipeline, PipelineOptions, RunOutcome, RunReport};

#[derive(Parser, Debug)]
#[command(
    name = "orchestrator",
    version,
    about = "Drive LLM tools from a goal to generated, reviewed code"
)]
struct Cli {
    /// What to build, in plain language.
    #[arg(required_unless_present = "resume")]
    goal: Option<String>,

    /// Directory holding generated projects and run state.
    #[arg(long, default_value = ".")]
    workspace: PathBuf,

    /// Project directory name (default: derived from the goal).
    #[arg(long)]
    project_name: Option<String>,

    /// Pick the recommended approach without asking.
    #[arg(long)]
    auto_select: bool,

    /// Run plan commands without asking.
    #[arg(long)]
    auto_run: bool,

    /// Answer yes to every confirmation.
    #[arg(long)]
    auto_approve: bool,

    /// Fix every review finding without asking.
    #[arg(long)]
    auto_fix: bool,

    /// Stop after executing the plan.
    #[arg(long)]
    skip_review: bool,

    /// Review/fix rounds before stopping.
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    max_fix_iterations: u32,

    /// Verbose diagnostics and raw tool output in the debug directory.
    #[arg(long)]
    debug: bool,

    /// Directory for raw tool output (implies --debug).
    #[arg(long, value_name = "DIR")]
    debug_log: Option<PathBuf>,

    /// Echo tool output to stderr as it arrives.
    #[arg(long)]
    stream: bool,

    #[arg(long, value_name = "TOOL")]
    brainstormer: Option<String>,

    #[arg(long, value_name = "TOOL")]
    reviewer: Option<String>,

    #[arg(long, value_name = "TOOL")]
    planner: Option<String>,

    #[arg(long, value_name = "TOOL")]
    executor: Option<String>,

    #[arg(long, value_name = "TOOL")]
    code_reviewer: Option<String>,

    #[arg(long, value_name = "TOOL")]
    fixer: Option<String>,

    /// JSON or TOML file mapping role names to tools.
    #[arg(long, value_name = "FILE")]
    tool_config: Option<PathBuf>,

    /// Repeat review and fix until the score threshold is met.
    #[arg(long)]
    ralph: bool,

    /// Acceptance score in [0, 1] (default from settings: 0.8).
    #[arg(long)]
    ralph_threshold: Option<f64>,

    /// Maximum fix rounds in the loop (default from settings: 3).
    #[arg(long)]
    ralph_max_iterations: Option<u32>,

    /// Token the fixer prints to declare the work complete.
    #[arg(long)]
    completion_promise: Option<String>,

    /// Loop state file (default: `.orchestrator/<project>/ralph_state.json`).
    #[arg(long, value_name = "FILE")]
    ralph_state_file: Option<PathBuf>,

    /// Keep loop state in memory only; nothing is written or resumed.
    #[arg(long, conflicts_with = "ralph_state_file")]
    no_ralph_state: bool,

    /// Continue the saved run for this project from its next stage.
    #[arg(long)]
    resume: bool,
}

impl Cli {
    fn debug_enabled(&self) -> bool {
        self.debug || self.debug_log.is_some()
    }

    fn role_overrides(&self) -> [(Role, Option<&str>); 6] {
        [
            (Role::Brainstormer, self.brainstormer.as_deref()),
            (Role::Reviewer, self.reviewer.as_deref()),
            (Role::Planner, self.planner.as_deref()),
            (Role::Executor, self.executor.as_deref()),
            (Role::CodeReviewer, self.code_reviewer.as_deref()),
            (Role::Fixer, self.fixer.as_deref()),
        ]
    }
}

/// Everything resolved before the first stage runs.
struct Prepared {
    settings: Settings,
    paths: RunPaths,
    tools: ToolBox,
    context: OrchestrationContext,
    options: PipelineOptions,
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.debug_enabled());
    let prepared = match prepare(&cli) {
        Ok(prepared) => prepared,
        Err(err) => {
            eprintln!("error: {err:#}");
            std::process::exit(exit_codes::INVALID);
        }
    };
    let code = match run(&cli, prepared) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            exit_codes::ABORTED
        }
    };
    std::process::exit(code);
}

fn prepare(cli: &Cli) -> Result<Prepared> {
    let workspace = std::path::absolute(&cli.workspace)
        .with_context(|| format!("resolve workspace {}", cli.workspace.display()))?;
    let project_name = match (&cli.project_name, &cli.goal) {
        (Some(name), _) => name.clone(),
        (None, Some(goal)) => project_slug(goal),
        (None, None) => bail!("--resume without a goal needs --project-name"),
    };
    if project_name.contains(['/', '\\']) || project_name.starts_with('.') {
        bail!("invalid project name {project_name:?}");
    }
    let paths = RunPaths::new(&workspace, &project_name)
        .with_debug_dir(cli.debug_log.as_deref())
        .with_ralph_state_path(cli.ralph_state_file.as_deref());

    let mut settings = load_settings(&paths.settings_path)?;
    if let Some(threshold) = cli.ralph_threshold {
        settings.ralph.threshold = threshold;
    }
    if let Some(max_iterations) = cli.ralph_max_iterations {
        settings.ralph.max_iterations = max_iterations;
    }
    if let Some(promise) = &cli.completion_promise {
        settings.ralph.completion_promise = Some(promise.clone());
    }
    settings.validate().context("invalid loop options")?;

    let file_mapping = match &cli.tool_config {
        Some(path) => load_tool_config(path)?,
        None => Default::default(),
    };
    let assignments = ToolAssignments::resolve(&file_mapping, &cli_overrides(cli.role_overrides())?);
    let tools = ToolBox::new(assignments)?;

    let context = if cli.resume {
        let ctx = load_context(&paths.context_path)
            .with_context(|| format!("nothing to resume for project {project_name}"))?;
        info!(run_id = %ctx.run_id, stage = %ctx.stage, "resuming run");
        ctx
    } else {
        let goal = cli.goal.clone().unwrap_or_default();
        if goal.trim().is_empty() {
            bail!("goal must not be empty");
        }
        let run_id = chrono::Utc::now().format("%Y%m%d-%H%M%S").to_string();
        OrchestrationContext::new(&run_id, goal.trim(), &project_name, paths.project_dir.clone())
    };

    let feedback = cli.ralph.then(|| LoopSettings {
        threshold: settings.ralph.threshold,
        max_iterations: settings.ralph.max_iterations,
        completion_promise: settings.ralph.completion_promise.clone(),
        state_path: (!cli.no_ralph_state).then(|| paths.ralph_state_path.clone()),
    });
    let options = PipelineOptions {
        auto_select: cli.auto_select,
        auto_run: cli.auto_run,
        auto_approve: cli.auto_approve,
        auto_fix: cli.auto_fix || cli.ralph,
        skip_review: cli.skip_review,
        max_fix_iterations: cli.max_fix_iterations,
        debug: cli.debug_enabled(),
        stream: cli.stream,
        feedback,
        resume: cli.resume,
    };

    Ok(Prepared {
        settings,
        paths,
        tools,
        context,
        options,
    })
}

fn run(cli: &Cli, prepared: Prepared) -> Result<i32> {
    let Prepared {
        settings,
        paths,
        tools,
        context,
        options,
    } = prepared;
    fs::create_dir_all(&paths.project_dir)
        .with_context(|| format!("create project dir {}", paths.project_dir.display()))?;
    for warning in tools.preflight() {
        warn!("{warning}");
        eprintln!("warning: {warning}");
    }

    let interrupt = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&interrupt);
    if let Err(err) = ctrlc::set_handler(move || handler_flag.store(true, Ordering::SeqCst)) {
        warn!(error = %err, "could not install interrupt handler");
    }

    let unattended = cli.auto_select && (cli.auto_run || cli.auto_approve) && cli.auto_fix;
    let run_id = context.run_id.clone();
    let report = if unattended {
        drive(&tools, &AutoInteraction, &settings, options, &paths, &run_id, interrupt, context)?
    } else {
        let terminal = TerminalInteraction::stdio();
        drive(&tools, &terminal, &settings, options, &paths, &run_id, interrupt, context)?
    };
    Ok(report_outcome(&report, &paths.context_path))
}

#[allow(clippy::too_many_arguments)]
fn drive<I: Interaction>(
    tools: &ToolBox,
    interaction: &I,
    settings: &Settings,
    options: PipelineOptions,
    paths: &RunPaths,
    run_id: &str,
    interrupt: Arc<AtomicBool>,
    context: OrchestrationContext,
) -> Result<RunReport> {
    let shell = SystemShell;
    let pipeline = Pipeline::new(
        tools,
        interaction,
        &shell,
        settings,
        options,
        paths.clone(),
        run_id,
    )
    .with_interrupt(interrupt);
    pipeline.run(context)
}

fn report_outcome(report: &RunReport, context_path: &Path) -> i32 {
    println!("{}", report.context.summary());
    match &report.outcome {
        RunOutcome::Done => exit_codes::OK,
        RunOutcome::Aborted {
            stage,
            kind,
            message,
            raw_output,
        } => {
            eprintln!("aborted in stage {stage}: {kind}: {message}");
            if let Some(raw) = raw_output {
                eprintln!("--- raw tool output ---\n{raw}");
            }
            eprintln!("context saved to {}", context_path.display());
            exit_codes::ABORTED
        }
        RunOutcome::Interrupted { stage } => {
            eprintln!(
                "interrupted before stage {stage}; context saved to {} (rerun with --resume)",
                context_path.display()
            );
            exit_codes::INTERRUPTED
        }
    }
}
