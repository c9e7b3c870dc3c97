//! Tool abstraction: one contract over CLI-backed and API-backed models.
//!
//! Each role is served by a [`ToolKind`], a closed set of backends. Process
//! tools spawn a local CLI; API tools call a provider over HTTPS. Both answer
//! [`Tool::invoke`] with either a complete text or a lazy chunk stream.

pub mod api;
pub mod factory;
pub mod process;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::types::Role;

/// Per-invocation options.
#[derive(Debug, Clone)]
pub struct InvokeOptions {
    pub workdir: PathBuf,
    pub timeout: Duration,
    pub system_prompt: Option<String>,
    /// Ask the backend for incremental output.
    pub stream: bool,
    pub output_limit_bytes: usize,
    /// When set, process tools mirror raw stdout lines here as they arrive.
    pub tee_path: Option<PathBuf>,
}

impl InvokeOptions {
    pub fn new(workdir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            workdir: workdir.into(),
            timeout,
            system_prompt: None,
            stream: false,
            output_limit_bytes: 200_000,
            tee_path: None,
        }
    }
}

/// Lazy, finite, non-restartable sequence of text chunks.
pub struct ChunkStream {
    inner: Box<dyn Iterator<Item = Result<String>>>,
}

impl ChunkStream {
    pub fn new(inner: impl Iterator<Item = Result<String>> + 'static) -> Self {
        Self {
            inner: Box::new(inner),
        }
    }
}

impl Iterator for ChunkStream {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

impl fmt::Debug for ChunkStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ChunkStream")
    }
}

/// Output of one tool invocation.
#[derive(Debug)]
pub enum ToolOutput {
    Text(String),
    Stream(ChunkStream),
}

impl ToolOutput {
    /// Drain the output into one string, calling `on_chunk` for each streamed piece.
    pub fn collect_with(self, mut on_chunk: impl FnMut(&str)) -> Result<String> {
        match self {
            ToolOutput::Text(text) => Ok(text),
            ToolOutput::Stream(stream) => {
                let mut text = String::new();
                for chunk in stream {
                    let chunk = chunk?;
                    on_chunk(&chunk);
                    text.push_str(&chunk);
                }
                Ok(text)
            }
        }
    }

    pub fn into_text(self) -> Result<String> {
        self.collect_with(|_| {})
    }
}

/// A model backend that can serve a role.
pub trait Tool {
    fn kind(&self) -> ToolKind;

    /// Whether the backend can be used right now (binary on PATH, credential set).
    fn is_available(&self) -> bool;

    /// Invoke the backend. Failures carry an `OrchestratorError` variant
    /// (`ToolUnavailable`, `MissingCredential`, `StageInvocation`).
    fn invoke(&self, role: Role, prompt: &str, options: &InvokeOptions) -> Result<ToolOutput>;
}

/// Closed set of supported backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    Gemini,
    Codex,
    Claude,
    #[serde(rename = "openai")]
    OpenAi,
    Anthropic,
    Google,
}

impl ToolKind {
    pub const ALL: [ToolKind; 6] = [
        ToolKind::Gemini,
        ToolKind::Codex,
        ToolKind::Claude,
        ToolKind::OpenAi,
        ToolKind::Anthropic,
        ToolKind::Google,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ToolKind::Gemini => "gemini",
            ToolKind::Codex => "codex",
            ToolKind::Claude => "claude",
            ToolKind::OpenAi => "openai",
            ToolKind::Anthropic => "anthropic",
            ToolKind::Google => "google",
        }
    }

    pub fn is_api(self) -> bool {
        matches!(self, ToolKind::OpenAi | ToolKind::Anthropic | ToolKind::Google)
    }

    /// Built-in assignment for a role.
    pub fn default_for(role: Role) -> Self {
        match role {
            Role::Brainstormer => ToolKind::Gemini,
            Role::Reviewer | Role::Planner | Role::CodeReviewer => ToolKind::Codex,
            Role::Executor | Role::Fixer => ToolKind::Claude,
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "gemini" => Ok(ToolKind::Gemini),
            "codex" => Ok(ToolKind::Codex),
            "claude" => Ok(ToolKind::Claude),
            "openai" | "openai-api" | "openai_api" => Ok(ToolKind::OpenAi),
            "anthropic" | "anthropic-api" | "anthropic_api" => Ok(ToolKind::Anthropic),
            "google" | "google-api" | "google_api" | "gemini-api" => Ok(ToolKind::Google),
            other => Err(anyhow!(
                "unknown tool {other:?} (expected one of: {})",
                ToolKind::ALL.map(ToolKind::as_str).join(", ")
            )),
        }
    }
}
