//! Development-time tracing for debugging the orchestrator.
//!
//! # Separation of Concerns
//!
//! - **Tracing (this module)**: diagnostics via `RUST_LOG`, output to stderr.
//!   Not persisted, not part of the run's product output.
//!
//! - **Run artifacts (`io/exec_log`, `io/debug_log`, state files)**: written
//!   under `.orchestrator/<project>/`, unaffected by `RUST_LOG`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`. Defaults to `warn` if unset, or to
/// `warn,orchestrator=debug` when `debug` is set.
///
/// # Example
/// ```bash
/// RUST_LOG=orchestrator=info orchestrator "build a todo app"
/// ```
pub fn init(debug: bool) {
    let fallback = if debug {
        "warn,orchestrator=debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
