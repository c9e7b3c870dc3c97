//! Context snapshots (`.orchestrator/<project>/context.json`).

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use crate::core::context::OrchestrationContext;
use crate::io::atomic::write_json_atomic;

/// Load a saved context, e.g. to resume an interrupted run.
pub fn load_context(path: &Path) -> Result<OrchestrationContext> {
    debug!(path = %path.display(), "loading context");
    let contents =
        fs::read_to_string(path).with_context(|| format!("read context {}", path.display()))?;
    let ctx: OrchestrationContext = serde_json::from_str(&contents)
        .with_context(|| format!("parse context {}", path.display()))?;
    debug!(run_id = %ctx.run_id, stage = %ctx.stage, "context loaded");
    Ok(ctx)
}

/// Atomically write the context to disk.
pub fn save_context(path: &Path, ctx: &OrchestrationContext) -> Result<()> {
    debug!(path = %path.display(), run_id = %ctx.run_id, stage = %ctx.stage, "saving context");
    write_json_atomic(path, ctx)
}
