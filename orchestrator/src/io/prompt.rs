//! Stage prompts rendered from embedded minijinja templates.

use anyhow::Result;
use minijinja::{Environment, context};
use serde::Serialize;

use crate::core::types::{ReviewItem, Role};

const BRAINSTORMER_TEMPLATE: &str = include_str!("prompts/brainstormer.md");
const BRAINSTORM_REVIEWER_TEMPLATE: &str = include_str!("prompts/brainstorm_reviewer.md");
const PLANNER_TEMPLATE: &str = include_str!("prompts/planner.md");
const EXECUTOR_TEMPLATE: &str = include_str!("prompts/executor.md");
const CODE_REVIEWER_TEMPLATE: &str = include_str!("prompts/code_reviewer.md");
const FIXER_TEMPLATE: &str = include_str!("prompts/fixer.md");
const REPAIR_TEMPLATE: &str = include_str!("prompts/repair.md");

/// Standing instructions sent ahead of every prompt for a role.
pub fn system_prompt(role: Role) -> &'static str {
    match role {
        Role::Brainstormer => "You are a senior engineer exploring design options. Be concrete and brief.",
        Role::Reviewer => "You are a critical design reviewer. Keep what works, cut what does not.",
        Role::Planner => "You are a build planner. You answer with machine-readable JSON only.",
        Role::Executor => "You write production-quality source files. You answer with file content only.",
        Role::CodeReviewer => "You are a strict code reviewer. You answer with machine-readable JSON only.",
        Role::Fixer => "You fix one reported problem at a time without changing unrelated code.",
    }
}

/// One file shown to the code reviewer.
#[derive(Debug, Clone, Serialize)]
pub struct FileSnapshot {
    pub path: String,
    pub content: String,
}

#[derive(Debug, Clone, Default)]
pub struct ReviewPromptInput<'a> {
    pub goal: &'a str,
    pub plan_summary: &'a str,
    pub execution_summary: &'a str,
    pub diffs: Vec<&'a str>,
    pub files: Vec<FileSnapshot>,
}

#[derive(Debug, Clone)]
pub struct FixPromptInput<'a> {
    pub goal: &'a str,
    pub item: &'a ReviewItem,
    pub content: &'a str,
    pub history: Option<&'a str>,
    pub promise: Option<&'a str>,
}

/// Template engine wrapper around minijinja.
#[derive(Debug)]
pub struct PromptEngine {
    env: Environment<'static>,
}

impl Default for PromptEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn non_empty(text: Option<&str>) -> Option<&str> {
    text.map(str::trim).filter(|s| !s.is_empty())
}

impl PromptEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        for (name, source) in [
            ("brainstormer", BRAINSTORMER_TEMPLATE),
            ("brainstorm_reviewer", BRAINSTORM_REVIEWER_TEMPLATE),
            ("planner", PLANNER_TEMPLATE),
            ("executor", EXECUTOR_TEMPLATE),
            ("code_reviewer", CODE_REVIEWER_TEMPLATE),
            ("fixer", FIXER_TEMPLATE),
            ("repair", REPAIR_TEMPLATE),
        ] {
            env.add_template(name, source)
                .expect("embedded prompt template should be valid");
        }
        Self { env }
    }

    /// `tooling` names the workspace's detected tools, or `unknown`.
    pub fn brainstorm(&self, goal: &str, tooling: &str) -> Result<String> {
        let template = self.env.get_template("brainstormer")?;
        Ok(template.render(context! { goal => goal.trim(), tooling => tooling })?)
    }

    pub fn brainstorm_review(&self, goal: &str, ideas: &str, tooling: &str) -> Result<String> {
        let template = self.env.get_template("brainstorm_reviewer")?;
        Ok(template.render(context! {
            goal => goal.trim(),
            ideas => ideas.trim(),
            tooling => tooling,
        })?)
    }

    /// Planner prompt; `error` carries the rejection reason of a previous attempt.
    pub fn plan(
        &self,
        goal: &str,
        approach: &str,
        project_name: &str,
        tooling: &str,
        error: Option<&str>,
    ) -> Result<String> {
        let template = self.env.get_template("planner")?;
        Ok(template.render(context! {
            goal => goal.trim(),
            approach => approach.trim(),
            project_name => project_name,
            tooling => tooling,
            error => non_empty(error),
        })?)
    }

    pub fn execute(
        &self,
        goal: &str,
        approach: &str,
        plan_summary: &str,
        file_path: &str,
        description: &str,
        existing: Option<&str>,
    ) -> Result<String> {
        let template = self.env.get_template("executor")?;
        Ok(template.render(context! {
            goal => goal.trim(),
            approach => approach.trim(),
            plan_summary => plan_summary.trim(),
            file_path => file_path,
            description => description.trim(),
            existing => non_empty(existing),
        })?)
    }

    pub fn code_review(&self, input: &ReviewPromptInput<'_>) -> Result<String> {
        let template = self.env.get_template("code_reviewer")?;
        let diffs: Vec<&str> = input
            .diffs
            .iter()
            .map(|diff| diff.trim_end())
            .filter(|diff| !diff.is_empty())
            .collect();
        Ok(template.render(context! {
            goal => input.goal.trim(),
            plan_summary => input.plan_summary.trim(),
            execution_summary => input.execution_summary.trim(),
            diffs => diffs,
            files => input.files,
        })?)
    }

    pub fn fix(&self, input: &FixPromptInput<'_>) -> Result<String> {
        let template = self.env.get_template("fixer")?;
        Ok(template.render(context! {
            goal => input.goal.trim(),
            item => input.item,
            content => input.content.trim_end(),
            history => non_empty(input.history),
            promise => non_empty(input.promise),
        })?)
    }

    /// Ask for a corrected file after `content` failed validation with `error`.
    pub fn repair(&self, file_path: &str, error: &str, content: &str) -> Result<String> {
        let template = self.env.get_template("repair")?;
        Ok(template.render(context! {
            file_path => file_path,
            error => error.trim(),
            content => content.trim_end(),
        })?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Severity;

    #[test]
    fn planner_prompt_includes_retry_feedback_only_when_present() {
        let engine = PromptEngine::new();
        let first = engine
            .plan("todo app", "flask", "todo_app", "uv", None)
            .expect("render");
        assert!(first.contains("todo_app"));
        assert!(first.contains("## Existing project tooling\nuv"));
        assert!(!first.contains("Previous attempt was rejected"));

        let retry = engine
            .plan("todo app", "flask", "todo_app", "unknown", Some("duplicate step_id 2"))
            .expect("render");
        assert!(retry.contains("Previous attempt was rejected"));
        assert!(retry.contains("duplicate step_id 2"));
    }

    #[test]
    fn brainstorm_prompts_carry_tooling() {
        let engine = PromptEngine::new();
        let ideas = engine.brainstorm("todo app", "poetry").expect("render");
        assert!(ideas.contains("## Existing project tooling\npoetry"));
        let review = engine
            .brainstorm_review("todo app", "### Approach 1: Flask", "poetry")
            .expect("render");
        assert!(review.contains("poetry"));
        assert!(review.contains("### Approach 1: Flask"));
    }

    #[test]
    fn repair_prompt_quotes_error_and_content() {
        let engine = PromptEngine::new();
        let prompt = engine
            .repair("app.py", "SyntaxError: invalid syntax (line 1)\n", "def broken(:\n")
            .expect("render");
        assert!(prompt.contains("`app.py` failed validation"));
        assert!(prompt.contains("SyntaxError: invalid syntax (line 1)\n\n## Current content"));
        assert!(prompt.contains("```\ndef broken(:\n```"));
    }

    #[test]
    fn review_prompt_lists_files_and_diffs() {
        let engine = PromptEngine::new();
        let input = ReviewPromptInput {
            goal: "calc",
            plan_summary: "1. write_file calc.py",
            execution_summary: "No commands were executed.",
            diffs: vec!["--- a/calc.py\n+++ b/calc.py\n@@ -0,0 +1 @@\n+x = 1\n", ""],
            files: vec![FileSnapshot {
                path: "calc.py".to_string(),
                content: "x = 1\n".to_string(),
            }],
        };
        let prompt = engine.code_review(&input).expect("render");
        assert!(prompt.contains("### calc.py"));
        assert!(prompt.contains("+x = 1"));
        assert_eq!(prompt.matches("```diff").count(), 1);
    }

    #[test]
    fn fix_prompt_renders_item_fields() {
        let engine = PromptEngine::new();
        let item = ReviewItem {
            id: "abc".to_string(),
            ordinal: 1,
            severity: Severity::High,
            item_type: "bug".to_string(),
            file: "calc.py".to_string(),
            description: "divides by zero".to_string(),
            suggestion: Some("guard the divisor".to_string()),
            line_start: Some(3),
            line_end: None,
        };
        let prompt = engine
            .fix(&FixPromptInput {
                goal: "calc",
                item: &item,
                content: "x = 1 / 0\n",
                history: None,
                promise: Some("DONE"),
            })
            .expect("render");
        assert!(prompt.contains("severity: HIGH"));
        assert!(prompt.contains("type: bug"));
        assert!(prompt.contains("lines: 3"));
        assert!(prompt.contains("guard the divisor"));
        assert!(prompt.contains("<promise>DONE</promise>"));
        assert!(!prompt.contains("Earlier review rounds"));
    }
}
