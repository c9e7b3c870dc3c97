//! Deterministic, pure logic shared by the orchestrator.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and tool output text and return deterministic results.

pub mod approaches;
pub mod backoff;
pub mod context;
pub mod patch;
pub mod path;
pub mod plan;
pub mod review;
pub mod score;
pub mod text;
pub mod types;
