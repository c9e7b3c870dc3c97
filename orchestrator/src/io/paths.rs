//! Canonical on-disk layout for a run.

use std::path::{Path, PathBuf};

/// Settings file looked up in the workspace root.
pub const SETTINGS_FILE: &str = "orchestrator.toml";

/// All paths used by one project inside a workspace.
///
/// ```text
/// <workspace>/orchestrator.toml            settings (optional)
/// <workspace>/<project>/                   generated files
/// <workspace>/.orchestrator/<project>/     state: context, loop state, logs
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPaths {
    pub workspace: PathBuf,
    pub settings_path: PathBuf,
    pub project_dir: PathBuf,
    pub state_dir: PathBuf,
    pub context_path: PathBuf,
    pub ralph_state_path: PathBuf,
    pub log_dir: PathBuf,
    pub debug_dir: PathBuf,
}

impl RunPaths {
    pub fn new(workspace: impl Into<PathBuf>, project_name: &str) -> Self {
        let workspace = workspace.into();
        let state_dir = workspace.join(".orchestrator").join(project_name);
        Self {
            settings_path: workspace.join(SETTINGS_FILE),
            project_dir: workspace.join(project_name),
            context_path: state_dir.join("context.json"),
            ralph_state_path: state_dir.join("ralph_state.json"),
            log_dir: state_dir.join("logs"),
            debug_dir: state_dir.join("debug"),
            state_dir,
            workspace,
        }
    }

    pub fn with_debug_dir(mut self, dir: Option<&Path>) -> Self {
        if let Some(dir) = dir {
            self.debug_dir = dir.to_path_buf();
        }
        self
    }

    pub fn with_ralph_state_path(mut self, path: Option<&Path>) -> Self {
        if let Some(path) = path {
            self.ralph_state_path = path.to_path_buf();
        }
        self
    }

    /// Append-only execution log for one run.
    pub fn execution_log_path(&self, run_id: &str) -> PathBuf {
        self.log_dir.join(format!("{run_id}.jsonl"))
    }
}
