//! CLI-backed tools (`gemini`, `codex`, `claude`).

use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Result, anyhow};
use tracing::{debug, info, instrument, warn};

use super::{InvokeOptions, Tool, ToolKind, ToolOutput};
use crate::core::text::{excerpt, stream_json_text};
use crate::core::types::Role;
use crate::error::OrchestratorError;
use crate::io::process::run_command;

/// Prompts above this size go over stdin; a single argument past the
/// kernel's per-argument cap (128 KiB on Linux) fails to spawn.
pub const ARGUMENT_PROMPT_LIMIT: usize = 100 * 1024;

/// How the prompt reaches the child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PromptDelivery {
    Argument,
    Stdin,
}

impl PromptDelivery {
    fn for_prompt(prompt: &str) -> Self {
        if prompt.len() > ARGUMENT_PROMPT_LIMIT {
            PromptDelivery::Stdin
        } else {
            PromptDelivery::Argument
        }
    }
}

/// Tool that spawns a local CLI with the prompt as an argument, or on stdin
/// when it is too large for one.
#[derive(Debug, Clone)]
pub struct ProcessTool {
    kind: ToolKind,
    program: String,
    /// Search path override; `None` reads `PATH` at invocation time.
    search_path: Option<OsString>,
}

impl ProcessTool {
    pub fn new(kind: ToolKind) -> Result<Self> {
        if kind.is_api() {
            return Err(anyhow!("{kind} is not a process-backed tool"));
        }
        Ok(Self {
            kind,
            program: kind.as_str().to_string(),
            search_path: None,
        })
    }

    pub fn with_search_path(mut self, search_path: impl Into<OsString>) -> Self {
        self.search_path = Some(search_path.into());
        self
    }

    /// Locate the executable, or explain why it is unavailable.
    pub fn resolve(&self) -> Result<PathBuf, OrchestratorError> {
        let unavailable = |detail: String| OrchestratorError::ToolUnavailable {
            tool: self.kind.to_string(),
            detail,
        };
        let program = Path::new(&self.program);
        if program.components().count() > 1 {
            return if is_executable(program) {
                Ok(program.to_path_buf())
            } else {
                Err(unavailable(format!("{} is not executable", program.display())))
            };
        }
        let search_path = self.search_path.clone().or_else(|| env::var_os("PATH"));
        search_path
            .as_deref()
            .into_iter()
            .flat_map(env::split_paths)
            .map(|dir| dir.join(&self.program))
            .find(|candidate| is_executable(candidate))
            .ok_or_else(|| unavailable(format!("`{}` not found on PATH", self.program)))
    }

    fn build_command(
        &self,
        executable: &Path,
        prompt: &str,
        delivery: PromptDelivery,
        stream: bool,
    ) -> Command {
        let mut cmd = Command::new(executable);
        let inline = delivery == PromptDelivery::Argument;
        match self.kind {
            ToolKind::Codex => {
                // `-` tells codex to read the prompt from stdin.
                cmd.arg("exec")
                    .arg("--skip-git-repo-check")
                    .arg(if inline { prompt } else { "-" });
            }
            ToolKind::Claude => {
                if inline {
                    cmd.arg(prompt);
                }
                cmd.arg("--print")
                    .arg("--tools")
                    .arg("")
                    .arg("--disable-slash-commands")
                    .arg("--permission-mode")
                    .arg("dontAsk");
                if stream {
                    cmd.arg("--output-format").arg("stream-json").arg("--verbose");
                }
            }
            _ => {
                if inline {
                    cmd.arg(prompt);
                }
            }
        }
        cmd
    }

    fn streams_json(&self, options: &InvokeOptions) -> bool {
        self.kind == ToolKind::Claude && options.stream
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

impl Tool for ProcessTool {
    fn kind(&self) -> ToolKind {
        self.kind
    }

    fn is_available(&self) -> bool {
        self.resolve().is_ok()
    }

    #[instrument(skip_all, fields(tool = %self.kind, role = %role, timeout_secs = options.timeout.as_secs()))]
    fn invoke(&self, role: Role, prompt: &str, options: &InvokeOptions) -> Result<ToolOutput> {
        let executable = self.resolve()?;
        let full_prompt = match options.system_prompt.as_deref() {
            Some(system) if !system.trim().is_empty() => format!("{}\n\n{prompt}", system.trim()),
            _ => prompt.to_string(),
        };
        let stream_json = self.streams_json(options);
        let delivery = PromptDelivery::for_prompt(&full_prompt);
        let mut cmd = self.build_command(&executable, &full_prompt, delivery, stream_json);
        cmd.current_dir(&options.workdir);

        info!(executable = %executable.display(), ?delivery, prompt_bytes = full_prompt.len(), "invoking tool");
        let invocation_failed = |reason: String| OrchestratorError::StageInvocation {
            tool: self.kind.to_string(),
            reason,
        };
        let stdin = (delivery == PromptDelivery::Stdin).then_some(full_prompt.as_bytes());
        let output = run_command(
            cmd,
            stdin,
            options.timeout,
            options.output_limit_bytes,
            options.tee_path.as_deref(),
        )
        .map_err(|err| invocation_failed(format!("{err:#}")))?;

        if output.timed_out {
            warn!("tool timed out");
            return Err(invocation_failed(format!("timed out after {:?}", options.timeout)).into());
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "tool exited unsuccessfully");
            return Err(invocation_failed(format!(
                "exit code {:?}: {}",
                output.status.code(),
                excerpt(output.stderr_text().trim(), 500)
            ))
            .into());
        }

        let stdout = output.stdout_text();
        if stream_json {
            let texts: Vec<String> = stdout.lines().flat_map(stream_json_text).collect();
            if !texts.is_empty() {
                debug!(chunks = texts.len(), "decoded stream-json output");
                return Ok(ToolOutput::Text(last_result_or_joined(&stdout, texts)));
            }
        }
        Ok(ToolOutput::Text(stdout))
    }
}

/// A stream-json transcript ends with a `result` record holding the full
/// answer; prefer it over concatenated deltas when present.
fn last_result_or_joined(stdout: &str, texts: Vec<String>) -> String {
    let result = stdout.lines().rev().find_map(|line| {
        serde_json::from_str::<serde_json::Value>(line.trim())
            .ok()
            .and_then(|value| value.get("result").and_then(|r| r.as_str()).map(str::to_string))
    });
    result.unwrap_or_else(|| texts.concat())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::time::Duration;

    fn install_script(dir: &Path, name: &str, body: &str) {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod");
    }

    #[test]
    fn missing_binary_is_tool_unavailable() {
        let temp = tempfile::tempdir().expect("tempdir");
        let tool = ProcessTool::new(ToolKind::Gemini)
            .expect("tool")
            .with_search_path(temp.path().as_os_str());
        assert!(!tool.is_available());
        let options = InvokeOptions::new(temp.path(), Duration::from_secs(5));
        let err = tool.invoke(Role::Brainstormer, "hi", &options).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<OrchestratorError>(),
            Some(OrchestratorError::ToolUnavailable { .. })
        ));
    }

    #[test]
    fn prompt_is_passed_as_argument() {
        let temp = tempfile::tempdir().expect("tempdir");
        install_script(temp.path(), "codex", r#"echo "$1|$2|$3""#);
        let tool = ProcessTool::new(ToolKind::Codex)
            .expect("tool")
            .with_search_path(temp.path().as_os_str());
        let options = InvokeOptions::new(temp.path(), Duration::from_secs(5));
        let text = tool
            .invoke(Role::Planner, "make a plan", &options)
            .expect("invoke")
            .into_text()
            .expect("text");
        assert_eq!(text, "exec|--skip-git-repo-check|make a plan\n");
    }

    /// Verifies an oversized prompt is piped through stdin instead of argv.
    #[test]
    fn oversized_prompt_goes_over_stdin() {
        let temp = tempfile::tempdir().expect("tempdir");
        install_script(temp.path(), "codex", r#"printf '%s|' "$3"; wc -c | tr -d ' '"#);
        let tool = ProcessTool::new(ToolKind::Codex)
            .expect("tool")
            .with_search_path(temp.path().as_os_str());
        let options = InvokeOptions::new(temp.path(), Duration::from_secs(10));
        let prompt = "x".repeat(150_000);
        let text = tool
            .invoke(Role::Executor, &prompt, &options)
            .expect("invoke")
            .into_text()
            .expect("text");
        assert_eq!(text.trim_end(), "-|150000");
    }

    #[test]
    fn gemini_reads_large_prompt_from_stdin() {
        let temp = tempfile::tempdir().expect("tempdir");
        install_script(temp.path(), "gemini", r#"echo "args=$#"; wc -c | tr -d ' '"#);
        let tool = ProcessTool::new(ToolKind::Gemini)
            .expect("tool")
            .with_search_path(temp.path().as_os_str());
        let options = InvokeOptions::new(temp.path(), Duration::from_secs(10));
        let prompt = "y".repeat(ARGUMENT_PROMPT_LIMIT + 1);
        let text = tool
            .invoke(Role::Brainstormer, &prompt, &options)
            .expect("invoke")
            .into_text()
            .expect("text");
        assert_eq!(text, format!("args=0\n{}\n", ARGUMENT_PROMPT_LIMIT + 1));
    }

    #[test]
    fn nonzero_exit_is_invocation_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        install_script(temp.path(), "gemini", "echo boom >&2; exit 4");
        let tool = ProcessTool::new(ToolKind::Gemini)
            .expect("tool")
            .with_search_path(temp.path().as_os_str());
        let options = InvokeOptions::new(temp.path(), Duration::from_secs(5));
        let err = tool.invoke(Role::Brainstormer, "x", &options).unwrap_err();
        match err.downcast_ref::<OrchestratorError>() {
            Some(OrchestratorError::StageInvocation { reason, .. }) => {
                assert!(reason.contains("boom"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn claude_stream_json_is_decoded() {
        let temp = tempfile::tempdir().expect("tempdir");
        install_script(
            temp.path(),
            "claude",
            r#"echo '{"type":"system","subtype":"init"}'
echo '{"type":"result","result":"final answer"}'"#,
        );
        let tool = ProcessTool::new(ToolKind::Claude)
            .expect("tool")
            .with_search_path(temp.path().as_os_str());
        let mut options = InvokeOptions::new(temp.path(), Duration::from_secs(5));
        options.stream = true;
        let text = tool
            .invoke(Role::Executor, "write code", &options)
            .expect("invoke")
            .into_text()
            .expect("text");
        assert_eq!(text, "final answer");
    }

    #[test]
    fn api_kinds_are_rejected() {
        assert!(ProcessTool::new(ToolKind::OpenAi).is_err());
    }
}
