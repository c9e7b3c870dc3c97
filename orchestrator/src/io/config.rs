//! Settings stored in `<workspace>/orchestrator.toml`.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::backoff::RetryPolicy;
use crate::core::score::SeverityWeights;

/// Orchestrator settings (TOML).
///
/// Missing fields default to the values below; a missing file is the same as
/// an empty one. CLI flags override the feedback-loop values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Per-invocation timeout for model tools.
    pub tool_timeout_secs: u64,

    /// Per-attempt timeout for `run_command` tasks.
    pub command_timeout_secs: u64,

    /// Truncate captured tool and command output beyond this many bytes.
    pub output_limit_bytes: usize,

    /// Size of stdout/stderr excerpts kept in execution log entries.
    pub excerpt_bytes: usize,

    /// Retries after the first failed `run_command` attempt.
    pub max_retries: u32,

    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,

    /// Extra planner invocations after an unparseable plan.
    pub plan_retries: u32,

    /// Per-file content budget in review and fix prompts.
    pub file_context_bytes: usize,

    /// Repair requests after generated content fails validation; the last
    /// attempt is written regardless.
    pub validation_retries: u32,

    /// File extension (without the dot) to a validation command; `{file}` is
    /// replaced with the quoted path of a scratch copy.
    pub validators: BTreeMap<String, String>,

    pub ralph: RalphSettings,

    pub scoring: SeverityWeights,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RalphSettings {
    pub threshold: f64,
    pub max_iterations: u32,
    pub completion_promise: Option<String>,
}

impl Default for RalphSettings {
    fn default() -> Self {
        Self {
            threshold: 0.8,
            max_iterations: 3,
            completion_promise: None,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 10 * 60,
            command_timeout_secs: 5 * 60,
            output_limit_bytes: 200_000,
            excerpt_bytes: 2_000,
            max_retries: 2,
            backoff_base_ms: 500,
            backoff_max_ms: 10_000,
            plan_retries: 2,
            file_context_bytes: 20_000,
            validation_retries: 2,
            validators: BTreeMap::from([(
                "py".to_string(),
                "python3 -m py_compile {file}".to_string(),
            )]),
            ralph: RalphSettings::default(),
            scoring: SeverityWeights::default(),
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if self.tool_timeout_secs == 0 {
            return Err(anyhow!("tool_timeout_secs must be > 0"));
        }
        if self.command_timeout_secs == 0 {
            return Err(anyhow!("command_timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.backoff_max_ms < self.backoff_base_ms {
            return Err(anyhow!("backoff_max_ms must be >= backoff_base_ms"));
        }
        if !(0.0..=1.0).contains(&self.ralph.threshold) {
            return Err(anyhow!("ralph.threshold must be within [0, 1]"));
        }
        for (extension, command) in &self.validators {
            if extension.is_empty() || extension.starts_with('.') {
                return Err(anyhow!("validators key {extension:?} must be an extension without the dot"));
            }
            if !command.contains("{file}") {
                return Err(anyhow!("validators.{extension} must contain {{file}}"));
            }
        }
        if self.ralph.max_iterations == 0 {
            return Err(anyhow!("ralph.max_iterations must be > 0"));
        }
        self.scoring.validate()
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.backoff_base_ms),
            max_delay: Duration::from_millis(self.backoff_max_ms),
        }
    }
}

/// Load settings from a TOML file.
///
/// If the file is missing, returns `Settings::default()`.
pub fn load_settings(path: &Path) -> Result<Settings> {
    if !path.exists() {
        let settings = Settings::default();
        settings.validate()?;
        return Ok(settings);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let settings: Settings =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    settings
        .validate()
        .with_context(|| format!("invalid settings {}", path.display()))?;
    Ok(settings)
}
