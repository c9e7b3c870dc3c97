//! Stable exit codes for the orchestrator CLI.

/// The run reached `Done`.
pub const OK: i32 = 0;
/// A stage failed and the run was aborted.
pub const ABORTED: i32 = 1;
/// Invalid arguments, settings, or tool configuration.
pub const INVALID: i32 = 2;
/// Interrupted (Ctrl-C); context was saved for `--resume`.
pub const INTERRUPTED: i32 = 130;
