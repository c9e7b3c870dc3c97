//! Side-effecting operations: processes, tools, filesystem state, prompts and
//! user interaction.

pub mod atomic;
pub mod config;
pub mod context_store;
pub mod debug_log;
pub mod exec_log;
pub mod feedback_state;
pub mod interaction;
pub mod paths;
pub mod process;
pub mod prompt;
pub mod shell;
pub mod tooling;
pub mod tools;
pub mod workspace;
