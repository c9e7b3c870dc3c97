//! Syntax validation of generated files before they are written.
//!
//! Each file extension may map to a shell command template containing
//! `{file}`. The candidate content is written to a scratch copy outside the
//! project and the command runs against it; exit code 0 passes. A validator
//! that cannot run (spawn failure, missing interpreter, timeout) skips the
//! check rather than blocking the write.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, instrument, warn};

use crate::core::text::excerpt;
use crate::io::shell::ShellRunner;

/// Exit code `sh` uses for a command it cannot find.
const COMMAND_NOT_FOUND: i32 = 127;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    Passed,
    /// No check ran; the reason is for logs.
    Skipped(String),
    /// The validator rejected the content with this output.
    Failed(String),
}

pub struct CodeValidator<'a, S> {
    shell: &'a S,
    commands: &'a BTreeMap<String, String>,
    scratch_dir: PathBuf,
    timeout: Duration,
    output_limit_bytes: usize,
    excerpt_bytes: usize,
}

impl<'a, S: ShellRunner> CodeValidator<'a, S> {
    pub fn new(
        shell: &'a S,
        commands: &'a BTreeMap<String, String>,
        scratch_dir: impl Into<PathBuf>,
        timeout: Duration,
        output_limit_bytes: usize,
        excerpt_bytes: usize,
    ) -> Self {
        Self {
            shell,
            commands,
            scratch_dir: scratch_dir.into(),
            timeout,
            output_limit_bytes,
            excerpt_bytes,
        }
    }

    /// Check `content` as it would be written to the project file `path`.
    #[instrument(skip_all, fields(path = path))]
    pub fn validate(&self, path: &str, content: &str) -> Validation {
        let extension = Path::new(path)
            .extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase());
        let Some(template) = extension.as_deref().and_then(|ext| self.commands.get(ext)) else {
            return Validation::Skipped("no validator for this file type".to_string());
        };
        let scratch = match self.stage(path, content) {
            Ok(scratch) => scratch,
            Err(err) => {
                warn!(error = %format!("{err:#}"), "could not stage file for validation");
                return Validation::Skipped(format!("{err:#}"));
            }
        };
        let command = template.replace("{file}", &shell_quote(&scratch.to_string_lossy()));
        debug!(command = %command, "running validator");
        let result = match self.shell.run(
            &command,
            &self.scratch_dir,
            self.timeout,
            self.output_limit_bytes,
        ) {
            Ok(result) => result,
            Err(err) => {
                warn!(error = %format!("{err:#}"), "validator could not run");
                return Validation::Skipped(format!("validator could not run: {err:#}"));
            }
        };
        if result.success() {
            return Validation::Passed;
        }
        if result.timed_out {
            warn!("validator timed out");
            return Validation::Skipped("validator timed out".to_string());
        }
        if result.exit_code == Some(COMMAND_NOT_FOUND) {
            warn!(command = %command, "validator not installed");
            return Validation::Skipped(format!("validator `{template}` is not installed"));
        }
        let output = format!("{}\n{}", result.stderr.trim(), result.stdout.trim());
        // Report the project path, not the scratch copy.
        let output = output.replace(&*scratch.to_string_lossy(), path);
        Validation::Failed(excerpt(output.trim(), self.excerpt_bytes))
    }

    /// Scratch copy named like the project file so tools key off its extension.
    fn stage(&self, path: &str, content: &str) -> Result<PathBuf> {
        let name = Path::new(path)
            .file_name()
            .map_or_else(|| "candidate".into(), |name| name.to_os_string());
        fs::create_dir_all(&self.scratch_dir)
            .with_context(|| format!("create {}", self.scratch_dir.display()))?;
        let scratch = self.scratch_dir.join(name);
        fs::write(&scratch, content).with_context(|| format!("write {}", scratch.display()))?;
        Ok(scratch)
    }
}

/// Single-quote `text` for `sh`.
fn shell_quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', r"'\''"))
}
