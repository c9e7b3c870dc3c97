//! Goal-to-code orchestrator.
//!
//! Drives external language-model tools through a fixed workflow:
//! brainstorm, review the ideas, pick an approach, plan, execute the plan,
//! then review and fix the generated code, optionally in a bounded loop that
//! stops once a quality score is reached. The architecture enforces a strict
//! separation:
//!
//! - **[`core`]**: Pure, deterministic logic (plan and review parsing,
//!   scoring, diffs, path normalization). No I/O.
//! - **[`io`]**: Side-effecting operations (tools, processes, filesystem,
//!   prompts, user interaction). Behind traits where tests need fakes.
//!
//! [`pipeline`] runs the stages, [`apply`] executes plan tasks,
//! [`validate`] checks generated files and [`feedback`] runs the review/fix
//! loop.

pub mod apply;
pub mod core;
pub mod error;
pub mod exit_codes;
pub mod feedback;
pub mod io;
pub mod logging;
pub mod pipeline;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod validate;
