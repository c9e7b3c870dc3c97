//! End-to-end pipeline runs against scripted tools.
//!
//! Each test builds a temp workspace, queues tool replies per role, and drives
//! `Pipeline::run` from a fresh context to a terminal outcome.

use std::collections::BTreeMap;
use std::fs;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use orchestrator::core::types::{Role, Stage, TaskStatus};
use orchestrator::feedback::LoopSettings;
use orchestrator::io::config::Settings;
use orchestrator::io::context_store::load_context;
use orchestrator::io::exec_log::{AttemptOutcome, read_log};
use orchestrator::io::feedback_state::load_ralph_state;
use orchestrator::io::shell::{ShellRunner, SystemShell};
use orchestrator::pipeline::{Pipeline, PipelineOptions, RunOutcome, RunReport};
use orchestrator::test_support::{
    BRAINSTORM_REVIEW, ScriptedInteraction, ScriptedShell, ScriptedTools, TestWorkspace, plan_json,
    review_json,
};

const PROJECT: &str = "todo-app";

/// Settings without backoff delays or file validators.
fn fast_settings() -> Settings {
    Settings {
        backoff_base_ms: 1,
        backoff_max_ms: 1,
        validators: Default::default(),
        ..Settings::default()
    }
}

/// Settings validating `.py` files through the (scripted) shell.
fn validating_settings(validation_retries: u32) -> Settings {
    Settings {
        validation_retries,
        validators: BTreeMap::from([("py".to_string(), "python3 -m py_compile {file}".to_string())]),
        ..fast_settings()
    }
}

const GENERATED_APP_PLAN: &str = "```json\n[{\"step_id\": 1, \"kind\": \"write_file\", \
    \"file_path\": \"app.py\", \"description\": \"flask entry point\"}]\n```";

fn auto_options() -> PipelineOptions {
    PipelineOptions {
        auto_select: true,
        auto_run: true,
        auto_fix: true,
        ..PipelineOptions::default()
    }
}

/// Tools scripted through planning: ideas, a review recommending Django, then `plan`.
fn tools_through_plan(plan: &str) -> ScriptedTools {
    ScriptedTools::new()
        .reply(Role::Brainstormer, "1. Flask\n2. Django")
        .reply(Role::Reviewer, BRAINSTORM_REVIEW)
        .reply(Role::Planner, plan)
}

fn workspace() -> TestWorkspace {
    TestWorkspace::new(PROJECT).expect("workspace")
}

fn run_with<S: ShellRunner>(
    workspace: &TestWorkspace,
    tools: &ScriptedTools,
    shell: &S,
    settings: &Settings,
    options: PipelineOptions,
    run_id: &str,
) -> RunReport {
    let interaction = ScriptedInteraction::default();
    let ctx = workspace.context(run_id, "build a todo app");
    Pipeline::new(
        tools,
        &interaction,
        shell,
        settings,
        options,
        workspace.paths.clone(),
        run_id,
    )
    .run(ctx)
    .expect("pipeline run")
}

/// Verifies a clean review finishes the run with every planned file written verbatim.
#[test]
fn full_run_writes_planned_files() {
    let ws = workspace();
    let tools = tools_through_plan(&plan_json(&[
        ("app.py", "print('todo')\n"),
        ("templates/index.html", "<h1>Todo</h1>\n"),
        ("README.md", "# Todo\n"),
    ]))
    .reply(Role::CodeReviewer, review_json(&[]));
    let shell = ScriptedShell::new([]);

    let report = run_with(&ws, &tools, &shell, &fast_settings(), auto_options(), "run-1");

    assert_eq!(report.outcome, RunOutcome::Done);
    assert_eq!(ws.read("app.py").expect("app"), "print('todo')\n");
    assert_eq!(ws.read("templates/index.html").expect("index"), "<h1>Todo</h1>\n");
    assert_eq!(ws.read("README.md").expect("readme"), "# Todo\n");
    assert_eq!(report.context.count_tasks(TaskStatus::Done), 3);
    assert_eq!(report.context.diffs.len(), 3);
    assert_eq!(report.context.selected_approach.as_deref(), Some("Django app"));
    assert_eq!(tools.calls(Role::Fixer), 0);

    let saved = load_context(&ws.paths.context_path).expect("saved");
    assert_eq!(saved.stage, Stage::Done);
}

/// Verifies the executor tool is asked for content when a step carries none.
#[test]
fn steps_without_content_are_generated() {
    let ws = workspace();
    let tools = tools_through_plan(GENERATED_APP_PLAN).reply(Role::Executor, "```python\nimport flask\n```");
    let shell = ScriptedShell::new([]);
    let options = PipelineOptions {
        skip_review: true,
        ..auto_options()
    };

    let report = run_with(&ws, &tools, &shell, &fast_settings(), options, "run-1");

    assert_eq!(report.outcome, RunOutcome::Done);
    assert_eq!(ws.read("app.py").expect("app"), "import flask\n");
    let prompts = tools.prompts(Role::Executor);
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("flask entry point"));
}

/// Verifies an escaping path aborts the run and nothing lands outside the project.
#[test]
fn escaping_path_aborts_run() {
    let ws = workspace();
    let tools = tools_through_plan(&plan_json(&[
        ("../outside.txt", "nope\n"),
        ("app.py", "print(1)\n"),
    ]));
    let shell = ScriptedShell::new([]);

    let report = run_with(&ws, &tools, &shell, &fast_settings(), auto_options(), "run-1");

    match &report.outcome {
        RunOutcome::Aborted { stage, kind, .. } => {
            assert_eq!(*stage, Stage::Execute);
            assert_eq!(*kind, "PathEscapeError");
        }
        other => panic!("expected abort, got {other:?}"),
    }
    assert_eq!(report.context.stage, Stage::Aborted);
    assert!(!ws.root().join("outside.txt").exists());
    assert!(!ws.paths.project_dir.join("app.py").exists());

    // The saved context still points at the stage that failed.
    let saved = load_context(&ws.paths.context_path).expect("saved");
    assert_eq!(saved.stage, Stage::Execute);
}

/// Verifies the planner is retried with the parse error and the run aborts once
/// retries run out.
#[test]
fn unparseable_plan_aborts_after_retries() {
    let ws = workspace();
    let settings = Settings {
        plan_retries: 1,
        ..fast_settings()
    };
    let tools = ScriptedTools::new()
        .reply(Role::Brainstormer, "ideas")
        .reply(Role::Reviewer, BRAINSTORM_REVIEW)
        .reply(Role::Planner, "I would start with a database.")
        .reply(Role::Planner, "```json\n[]\n```");
    let shell = ScriptedShell::new([]);

    let report = run_with(&ws, &tools, &shell, &settings, auto_options(), "run-1");

    match &report.outcome {
        RunOutcome::Aborted { stage, kind, .. } => {
            assert_eq!(*stage, Stage::Plan);
            assert_eq!(*kind, "PlanParseError");
        }
        other => panic!("expected abort, got {other:?}"),
    }
    let prompts = tools.prompts(Role::Planner);
    assert_eq!(prompts.len(), 2);
    assert!(prompts[1].contains("no JSON array of tasks found"));
}

/// Verifies a second run of the same plan leaves every file untouched.
#[test]
fn reapplying_identical_plan_changes_nothing() {
    let ws = workspace();
    let plan = plan_json(&[("app.py", "print('todo')\n"), ("README.md", "# Todo\n")]);
    let shell = ScriptedShell::new([]);
    let options = PipelineOptions {
        skip_review: true,
        ..auto_options()
    };

    let first_tools = tools_through_plan(&plan);
    let first = run_with(&ws, &first_tools, &shell, &fast_settings(), options.clone(), "run-1");
    assert_eq!(first.outcome, RunOutcome::Done);
    assert_eq!(first.context.diffs.len(), 2);

    let second_tools = tools_through_plan(&plan);
    let second = run_with(&ws, &second_tools, &shell, &fast_settings(), options, "run-2");
    assert_eq!(second.outcome, RunOutcome::Done);
    assert!(second.context.diffs.is_empty());
    assert_eq!(ws.read("app.py").expect("app"), "print('todo')\n");
}

/// Verifies review findings are fixed once and the run stops at the fix limit.
#[test]
fn review_findings_are_fixed() {
    let ws = workspace();
    let tools = tools_through_plan(&plan_json(&[("app.py", "print('todo')\n")]))
        .reply(
            Role::CodeReviewer,
            review_json(&[("high", "app.py", "no error handling")]),
        )
        .reply(Role::Fixer, "```python\ntry:\n    print('todo')\nexcept Exception:\n    pass\n```");
    let shell = ScriptedShell::new([]);

    let report = run_with(&ws, &tools, &shell, &fast_settings(), auto_options(), "run-1");

    assert_eq!(report.outcome, RunOutcome::Done);
    assert_eq!(report.context.fix_iterations, 1);
    assert_eq!(tools.calls(Role::Fixer), 1);
    assert!(tools.prompts(Role::Fixer)[0].contains("no error handling"));
    let app = ws.read("app.py").expect("app");
    assert!(app.starts_with("try:\n"));
    assert!(report.context.diffs["app.py"].contains("+try:"));
}

/// Verifies the feedback loop fixes until the review score clears the threshold
/// and persists its state.
#[test]
fn feedback_loop_runs_until_threshold() {
    let ws = workspace();
    let tools = tools_through_plan(&plan_json(&[("app.py", "print('todo')\n")]))
        // Baseline: two criticals score 0.5.
        .reply(
            Role::CodeReviewer,
            review_json(&[
                ("critical", "app.py", "sql injection"),
                ("critical", "app.py", "no auth"),
            ]),
        )
        .reply(Role::Fixer, "```python\nprint('safe')\n```")
        .reply(Role::Fixer, "```python\nprint('safe and authed')\n```")
        // After one round: a single high scores 0.875.
        .reply(
            Role::CodeReviewer,
            review_json(&[("high", "app.py", "missing tests")]),
        );
    let shell = ScriptedShell::new([]);
    let options = PipelineOptions {
        feedback: Some(LoopSettings {
            threshold: 0.8,
            max_iterations: 3,
            completion_promise: None,
            state_path: Some(ws.paths.ralph_state_path.clone()),
        }),
        ..auto_options()
    };

    let report = run_with(&ws, &tools, &shell, &fast_settings(), options, "run-1");

    assert_eq!(report.outcome, RunOutcome::Done);
    assert_eq!(report.context.fix_iterations, 1);
    assert_eq!(tools.calls(Role::CodeReviewer), 2);
    assert_eq!(tools.calls(Role::Fixer), 2);
    assert_eq!(ws.read("app.py").expect("app"), "print('safe and authed')\n");

    let state = load_ralph_state(&ws.paths.ralph_state_path)
        .expect("load state")
        .expect("state written");
    assert_eq!(state.iteration, 1);
    assert_eq!(state.score_history.len(), 1);
    assert!((state.score_history[0].score - 0.875).abs() < 1e-9);
}

/// Verifies a flaky command is retried through a real shell and every attempt
/// is logged.
#[cfg(unix)]
#[test]
fn flaky_command_is_retried_and_logged() {
    let ws = workspace();
    let plan = "```json\n[\
        {\"step_id\": 1, \"kind\": \"write_file\", \"file_path\": \"app.py\", \"content\": \"print(1)\\n\"},\
        {\"step_id\": 2, \"kind\": \"run_command\", \"command\": \
         \"n=$(cat count 2>/dev/null || echo 0); n=$((n+1)); echo $n > count; [ $n -ge 3 ]\"}\
        ]\n```";
    let tools = tools_through_plan(plan);
    let options = PipelineOptions {
        skip_review: true,
        ..auto_options()
    };

    let report = run_with(&ws, &tools, &SystemShell, &fast_settings(), options, "run-1");

    assert_eq!(report.outcome, RunOutcome::Done);
    assert_eq!(report.context.count_tasks(TaskStatus::Done), 2);
    let log_path = ws.paths.execution_log_path("run-1");
    let entries = read_log(&log_path).expect("read log");
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].outcome, AttemptOutcome::Failed);
    assert_eq!(entries[1].outcome, AttemptOutcome::Failed);
    assert_eq!(entries[2].outcome, AttemptOutcome::Success);
    assert_eq!(
        entries.iter().map(|e| e.attempt_number).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
}

/// Verifies declining a command leaves its step pending and the run continues.
#[test]
fn declined_command_stays_pending() {
    let ws = workspace();
    let plan = "```json\n[{\"step_id\": 1, \"kind\": \"run_command\", \"command\": \"rm -rf build\"}]\n```";
    let tools = tools_through_plan(plan);
    let shell = ScriptedShell::new([]);
    let interaction = ScriptedInteraction::default().with_confirms([false]);
    let settings = fast_settings();
    let options = PipelineOptions {
        auto_select: true,
        skip_review: true,
        ..PipelineOptions::default()
    };
    let ctx = ws.context("run-1", "build a todo app");

    let report = Pipeline::new(
        &tools,
        &interaction,
        &shell,
        &settings,
        options,
        ws.paths.clone(),
        "run-1",
    )
    .run(ctx)
    .expect("run");

    assert_eq!(report.outcome, RunOutcome::Done);
    assert_eq!(report.context.plan[0].status, TaskStatus::Pending);
    assert!(shell.commands().is_empty());
    assert_eq!(interaction.asked().len(), 1);
}

/// Verifies a binary artifact left by a command neither aborts the review nor
/// reaches the reviewer, and a finding against it is skipped.
#[cfg(unix)]
#[test]
fn binary_artifacts_stay_out_of_review() {
    let ws = workspace();
    let plan = "```json\n[\
        {\"step_id\": 1, \"kind\": \"write_file\", \"file_path\": \"./app.py\", \"content\": \"print(1)\\n\"},\
        {\"step_id\": 2, \"kind\": \"run_command\", \"command\": \"printf '\\\\377\\\\376\\\\000' > app.pyc\"}\
        ]\n```";
    let tools = tools_through_plan(plan).reply(
        Role::CodeReviewer,
        review_json(&[("low", "app.pyc", "stale bytecode")]),
    );

    let report = run_with(&ws, &tools, &SystemShell, &fast_settings(), auto_options(), "run-1");

    assert_eq!(report.outcome, RunOutcome::Done);
    assert!(ws.paths.project_dir.join("app.pyc").exists());
    let prompts = tools.prompts(Role::CodeReviewer);
    assert_eq!(prompts.len(), 1);
    assert_eq!(prompts[0].matches("### app.py\n").count(), 1);
    assert!(!prompts[0].contains("### app.pyc"));
    assert_eq!(tools.calls(Role::Fixer), 0);
    assert!(
        report
            .context
            .warnings
            .iter()
            .any(|w| w.contains("fix for item 1 skipped")),
        "warnings: {:?}",
        report.context.warnings
    );
}

/// Verifies Ctrl-C during a tool call ends the run as interrupted, not aborted,
/// with the context saved at the unfinished stage.
#[test]
fn interrupt_during_tool_call_is_not_an_abort() {
    let ws = workspace();
    let flag = Arc::new(AtomicBool::new(false));
    let tools = ScriptedTools::new().interrupt(Role::Brainstormer, &flag);
    let shell = ScriptedShell::new([]);
    let interaction = ScriptedInteraction::default();
    let settings = fast_settings();

    let report = Pipeline::new(
        &tools,
        &interaction,
        &shell,
        &settings,
        auto_options(),
        ws.paths.clone(),
        "run-1",
    )
    .with_interrupt(Arc::clone(&flag))
    .run(ws.context("run-1", "build a todo app"))
    .expect("run");

    assert_eq!(
        report.outcome,
        RunOutcome::Interrupted {
            stage: Stage::Brainstorm
        }
    );
    let saved = load_context(&ws.paths.context_path).expect("saved");
    assert_eq!(saved.stage, Stage::Brainstorm);
}

/// Verifies a failing tool aborts the run with its invocation error.
#[test]
fn failing_tool_aborts_run() {
    let ws = workspace();
    let tools = ScriptedTools::new()
        .reply(Role::Brainstormer, "1. Flask")
        .fail(Role::Reviewer, "exit code Some(1)");
    let shell = ScriptedShell::new([]);

    let report = run_with(&ws, &tools, &shell, &fast_settings(), auto_options(), "run-1");

    match &report.outcome {
        RunOutcome::Aborted {
            stage,
            kind,
            message,
            raw_output,
        } => {
            assert_eq!(*stage, Stage::BrainstormReview);
            assert_eq!(*kind, "StageInvocationError");
            assert!(message.contains("exit code Some(1)"), "message: {message}");
            assert!(raw_output.is_none());
        }
        other => panic!("expected abort, got {other:?}"),
    }
    let saved = load_context(&ws.paths.context_path).expect("saved");
    assert_eq!(saved.stage, Stage::BrainstormReview);
}

/// Verifies generated code that fails validation is sent back to the executor
/// with the error, and the repaired version is written.
#[test]
fn invalid_generated_code_is_repaired() {
    let ws = workspace();
    let tools = tools_through_plan(GENERATED_APP_PLAN)
        .reply(Role::Executor, "```python\ndef broken(:\n```")
        .reply(Role::Executor, "```python\ndef fixed():\n    pass\n```");
    let shell = ScriptedShell::new([ScriptedShell::exit(1), ScriptedShell::exit(0)]);
    let options = PipelineOptions {
        skip_review: true,
        ..auto_options()
    };

    let report = run_with(&ws, &tools, &shell, &validating_settings(2), options, "run-1");

    assert_eq!(report.outcome, RunOutcome::Done);
    assert_eq!(ws.read("app.py").expect("app"), "def fixed():\n    pass\n");
    let prompts = tools.prompts(Role::Executor);
    assert_eq!(prompts.len(), 2);
    assert!(prompts[1].contains("`app.py` failed validation"));
    assert!(prompts[1].contains("exit 1"));
    assert!(prompts[1].contains("def broken(:"));
    let commands = shell.commands();
    assert_eq!(commands.len(), 2);
    assert!(commands.iter().all(|c| c.starts_with("python3 -m py_compile '")));
    assert!(report.context.warnings.is_empty(), "warnings: {:?}", report.context.warnings);
}

/// Verifies code that never validates is written after the last repair with a
/// warning, and no further repairs are requested.
#[test]
fn unrepairable_code_is_written_with_warning() {
    let ws = workspace();
    let tools = tools_through_plan(GENERATED_APP_PLAN)
        .reply(Role::Executor, "```python\ndef broken(:\n```")
        .reply(Role::Executor, "```python\ndef still_broken(:\n```");
    let shell = ScriptedShell::new([ScriptedShell::exit(1), ScriptedShell::exit(1)]);
    let options = PipelineOptions {
        skip_review: true,
        ..auto_options()
    };

    let report = run_with(&ws, &tools, &shell, &validating_settings(1), options, "run-1");

    assert_eq!(report.outcome, RunOutcome::Done);
    assert_eq!(ws.read("app.py").expect("app"), "def still_broken(:\n");
    assert_eq!(tools.calls(Role::Executor), 2);
    assert!(
        report
            .context
            .warnings
            .iter()
            .any(|w| w.contains("app.py still fails validation after 1 repair attempt(s)")),
        "warnings: {:?}",
        report.context.warnings
    );
}

/// Verifies the fixer is asked to repair a fix that breaks validation.
#[test]
fn invalid_fix_is_repaired_by_fixer() {
    let ws = workspace();
    let tools = tools_through_plan(&plan_json(&[("app.py", "print('todo')\n")]))
        .reply(Role::CodeReviewer, review_json(&[("high", "app.py", "no main guard")]))
        .reply(Role::Fixer, "```python\nif __name__ == '__main__'\n    print('todo')\n```")
        .reply(Role::Fixer, "```python\nif __name__ == '__main__':\n    print('todo')\n```");
    let shell = ScriptedShell::new([ScriptedShell::exit(1), ScriptedShell::exit(0)]);

    let report = run_with(&ws, &tools, &shell, &validating_settings(2), auto_options(), "run-1");

    assert_eq!(report.outcome, RunOutcome::Done);
    assert_eq!(tools.calls(Role::Fixer), 2);
    assert!(tools.prompts(Role::Fixer)[1].contains("failed validation"));
    assert_eq!(
        ws.read("app.py").expect("app"),
        "if __name__ == '__main__':\n    print('todo')\n"
    );
}

/// Verifies tooling found in the workspace reaches the brainstorm, review and
/// plan prompts.
#[test]
fn workspace_tooling_reaches_prompts() {
    let ws = workspace();
    fs::write(ws.root().join("uv.lock"), "").expect("write lock");
    fs::write(ws.root().join("pyproject.toml"), "[tool.poetry]\nname = \"todo\"\n")
        .expect("write manifest");
    let tools = tools_through_plan(&plan_json(&[("app.py", "print(1)\n")]));
    let shell = ScriptedShell::new([]);
    let options = PipelineOptions {
        skip_review: true,
        ..auto_options()
    };

    let report = run_with(&ws, &tools, &shell, &fast_settings(), options, "run-1");

    assert_eq!(report.outcome, RunOutcome::Done);
    for role in [Role::Brainstormer, Role::Reviewer, Role::Planner] {
        let prompts = tools.prompts(role);
        assert!(
            prompts[0].contains("## Existing project tooling\nuv, poetry"),
            "{role} prompt: {}",
            prompts[0]
        );
    }
}
