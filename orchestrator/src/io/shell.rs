//! Shell command runner used by `run_command` tasks.

use std::path::Path;
use std::process::Command;
use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::instrument;

use crate::io::process::run_command;

/// Result of one shell invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellResult {
    /// `None` when the process was killed by a signal or timed out.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub duration: Duration,
}

impl ShellResult {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// Abstraction over shell execution so retries can be tested without processes.
pub trait ShellRunner {
    /// Run `command` through the shell in `workdir`. `Err` means the shell
    /// could not be spawned at all.
    fn run(
        &self,
        command: &str,
        workdir: &Path,
        timeout: Duration,
        output_limit_bytes: usize,
    ) -> Result<ShellResult>;
}

/// Runs commands with `sh -c`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemShell;

impl ShellRunner for SystemShell {
    #[instrument(skip_all, fields(command = %command, workdir = %workdir.display()))]
    fn run(
        &self,
        command: &str,
        workdir: &Path,
        timeout: Duration,
        output_limit_bytes: usize,
    ) -> Result<ShellResult> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command).current_dir(workdir);
        let started = Instant::now();
        let output = run_command(cmd, None, timeout, output_limit_bytes, None)?;
        Ok(ShellResult {
            exit_code: if output.timed_out {
                None
            } else {
                output.status.code()
            },
            stdout: output.stdout_text(),
            stderr: output.stderr_text(),
            timed_out: output.timed_out,
            duration: started.elapsed(),
        })
    }
}
