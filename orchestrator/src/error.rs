//! Domain error taxonomy.
//!
//! Plumbing failures (I/O, serialization) travel as `anyhow::Error` with
//! context. The variants below are the failures the pipeline reacts to; they
//! are recovered from an `anyhow::Error` with `downcast_ref`.

use std::path::PathBuf;

use thiserror::Error;

use crate::core::types::Stage;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("tool `{tool}` is not available: {detail}")]
    ToolUnavailable { tool: String, detail: String },

    #[error("tool `{tool}` requires the environment variable {var}")]
    MissingCredential { tool: String, var: String },

    #[error("tool `{tool}` invocation failed: {reason}")]
    StageInvocation { tool: String, reason: String },

    #[error("plan output could not be parsed after {attempts} attempt(s): {reason}")]
    PlanParse { attempts: u32, reason: String },

    #[error("path `{path}` escapes workspace {}", root.display())]
    PathEscape { path: String, root: PathBuf },

    #[error("command `{command}` failed after {attempts} attempt(s) (exit code {exit_code:?})")]
    CommandFailed {
        command: String,
        attempts: u32,
        exit_code: Option<i32>,
    },

    #[error("feedback loop exhausted after {iterations} iteration(s), last score {last_score:.2}")]
    LoopExhausted { iterations: u32, last_score: f64 },

    #[error("interrupted before stage {stage}")]
    Interrupted { stage: Stage },
}

impl OrchestratorError {
    /// Short name of the error kind, used in abort reports.
    pub fn kind(&self) -> &'static str {
        match self {
            OrchestratorError::ToolUnavailable { .. } => "ToolUnavailable",
            OrchestratorError::MissingCredential { .. } => "MissingCredential",
            OrchestratorError::StageInvocation { .. } => "StageInvocationError",
            OrchestratorError::PlanParse { .. } => "PlanParseError",
            OrchestratorError::PathEscape { .. } => "PathEscapeError",
            OrchestratorError::CommandFailed { .. } => "CommandFailed",
            OrchestratorError::LoopExhausted { .. } => "LoopExhausted",
            OrchestratorError::Interrupted { .. } => "Interrupted",
        }
    }
}

/// Name the error kind of an arbitrary pipeline error.
pub fn error_kind(err: &anyhow::Error) -> &'static str {
    err.downcast_ref::<OrchestratorError>()
        .map_or("InternalError", OrchestratorError::kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_survives_anyhow_context() {
        let err = anyhow::Error::new(OrchestratorError::PathEscape {
            path: "../x".to_string(),
            root: PathBuf::from("/w"),
        })
        .context("apply task 3");
        assert_eq!(error_kind(&err), "PathEscapeError");
        assert_eq!(error_kind(&anyhow::anyhow!("disk full")), "InternalError");
    }
}
