//! HTTPS-backed tools (OpenAI, Anthropic, Google AI).

use std::env;
use std::io::{BufRead, BufReader, Lines};

use anyhow::{Context, Result, anyhow};
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};

use super::{ChunkStream, InvokeOptions, Tool, ToolKind, ToolOutput};
use crate::core::text::excerpt;
use crate::core::types::Role;
use crate::error::OrchestratorError;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const ANTHROPIC_MAX_TOKENS: u32 = 8192;

/// Provider endpoint details for an API-backed kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Provider {
    credential_var: &'static str,
    model: &'static str,
    base_url: &'static str,
}

fn provider(kind: ToolKind) -> Option<Provider> {
    match kind {
        ToolKind::OpenAi => Some(Provider {
            credential_var: "OPENAI_API_KEY",
            model: "gpt-4o",
            base_url: "https://api.openai.com",
        }),
        ToolKind::Anthropic => Some(Provider {
            credential_var: "ANTHROPIC_API_KEY",
            model: "claude-sonnet-4-20250514",
            base_url: "https://api.anthropic.com",
        }),
        ToolKind::Google => Some(Provider {
            credential_var: "GOOGLE_AI_API_KEY",
            model: "gemini-2.0-flash",
            base_url: "https://generativelanguage.googleapis.com",
        }),
        ToolKind::Gemini | ToolKind::Codex | ToolKind::Claude => None,
    }
}

/// Tool that calls a hosted model API with a credential from the environment.
#[derive(Debug, Clone)]
pub struct ApiTool {
    kind: ToolKind,
    provider: Provider,
    base_url: String,
    api_key: Option<String>,
}

impl ApiTool {
    /// Read the provider's credential variable from the process environment.
    pub fn from_env(kind: ToolKind) -> Result<Self> {
        Self::from_lookup(kind, |var| env::var(var).ok())
    }

    /// Build with an explicit variable lookup.
    pub fn from_lookup(kind: ToolKind, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let provider = provider(kind).ok_or_else(|| anyhow!("{kind} is not an API-backed tool"))?;
        let api_key = lookup(provider.credential_var)
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());
        Ok(Self {
            kind,
            provider,
            base_url: provider.base_url.to_string(),
            api_key,
        })
    }

    #[cfg(test)]
    fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.to_string();
        self
    }

    pub fn credential_var(&self) -> &'static str {
        self.provider.credential_var
    }

    fn api_key(&self) -> Result<&str, OrchestratorError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| OrchestratorError::MissingCredential {
                tool: self.kind.to_string(),
                var: self.provider.credential_var.to_string(),
            })
    }

    fn request(&self, client: &Client, api_key: &str, body: &Value, stream: bool) -> RequestBuilder {
        let base = &self.base_url;
        match self.kind {
            ToolKind::OpenAi => client
                .post(format!("{base}/v1/chat/completions"))
                .bearer_auth(api_key)
                .json(body),
            ToolKind::Anthropic => client
                .post(format!("{base}/v1/messages"))
                .header("x-api-key", api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(body),
            _ => {
                // The key travels in a header so it never appears in a URL.
                let method = if stream {
                    "streamGenerateContent?alt=sse"
                } else {
                    "generateContent"
                };
                client
                    .post(format!("{base}/v1beta/models/{}:{method}", self.provider.model))
                    .header("x-goog-api-key", api_key)
                    .json(body)
            }
        }
    }

    fn invocation_failed(&self, reason: String) -> OrchestratorError {
        OrchestratorError::StageInvocation {
            tool: self.kind.to_string(),
            reason,
        }
    }
}

/// JSON request body for the provider's generation endpoint.
fn request_body(kind: ToolKind, model: &str, prompt: &str, system: Option<&str>, stream: bool) -> Value {
    let system = system.map(str::trim).filter(|s| !s.is_empty());
    match kind {
        ToolKind::OpenAi => {
            let mut messages = Vec::new();
            if let Some(system) = system {
                messages.push(json!({"role": "system", "content": system}));
            }
            messages.push(json!({"role": "user", "content": prompt}));
            json!({"model": model, "messages": messages, "stream": stream})
        }
        ToolKind::Anthropic => {
            let mut body = json!({
                "model": model,
                "max_tokens": ANTHROPIC_MAX_TOKENS,
                "messages": [{"role": "user", "content": prompt}],
                "stream": stream,
            });
            if let Some(system) = system {
                body["system"] = json!(system);
            }
            body
        }
        _ => {
            let mut body = json!({"contents": [{"role": "user", "parts": [{"text": prompt}]}]});
            if let Some(system) = system {
                body["systemInstruction"] = json!({"parts": [{"text": system}]});
            }
            body
        }
    }
}

fn join_texts<'a>(parts: impl Iterator<Item = &'a Value>) -> String {
    parts
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect()
}

/// Generated text from a complete (non-streaming) response body.
fn response_text(kind: ToolKind, body: &Value) -> Option<String> {
    match kind {
        ToolKind::OpenAi => body
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::to_string),
        ToolKind::Anthropic => body
            .get("content")
            .and_then(Value::as_array)
            .map(|blocks| join_texts(blocks.iter())),
        _ => body
            .pointer("/candidates/0/content/parts")
            .and_then(Value::as_array)
            .map(|parts| join_texts(parts.iter())),
    }
}

/// Text delta carried by one server-sent event payload.
fn event_text(kind: ToolKind, event: &Value) -> Option<String> {
    match kind {
        ToolKind::OpenAi => event
            .pointer("/choices/0/delta/content")
            .and_then(Value::as_str)
            .map(str::to_string),
        ToolKind::Anthropic => {
            if event.get("type").and_then(Value::as_str) != Some("content_block_delta") {
                return None;
            }
            event
                .pointer("/delta/text")
                .and_then(Value::as_str)
                .map(str::to_string)
        }
        _ => response_text(kind, event),
    }
}

/// Lazily decodes `data:` lines of an SSE response into text chunks.
struct SseChunks<R> {
    kind: ToolKind,
    lines: Lines<BufReader<R>>,
    finished: bool,
}

impl<R: std::io::Read> Iterator for SseChunks<R> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.finished {
            let line = match self.lines.next() {
                Some(Ok(line)) => line,
                Some(Err(err)) => {
                    self.finished = true;
                    return Some(Err(err).context("read event stream"));
                }
                None => {
                    self.finished = true;
                    return None;
                }
            };
            let Some(data) = line.strip_prefix("data:").map(str::trim) else {
                continue;
            };
            if data == "[DONE]" {
                self.finished = true;
                return None;
            }
            match serde_json::from_str::<Value>(data) {
                Ok(event) => {
                    if let Some(text) = event_text(self.kind, &event).filter(|t| !t.is_empty()) {
                        return Some(Ok(text));
                    }
                }
                Err(err) => debug!(err = %err, "skipping undecodable event"),
            }
        }
        None
    }
}

fn check_status(response: Response) -> Result<Response, String> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(format!("HTTP {status}: {}", excerpt(body.trim(), 500)))
}

impl Tool for ApiTool {
    fn kind(&self) -> ToolKind {
        self.kind
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    #[instrument(skip_all, fields(tool = %self.kind, role = %role, stream = options.stream))]
    fn invoke(&self, role: Role, prompt: &str, options: &InvokeOptions) -> Result<ToolOutput> {
        let api_key = self.api_key()?;
        let body = request_body(
            self.kind,
            self.provider.model,
            prompt,
            options.system_prompt.as_deref(),
            options.stream,
        );
        let client = Client::builder()
            .timeout(options.timeout)
            .build()
            .context("build HTTP client")?;

        info!(model = self.provider.model, "calling model API");
        let response = self
            .request(&client, api_key, &body, options.stream)
            .send()
            .map_err(|err| self.invocation_failed(format!("request failed: {}", err.without_url())))?;
        let response = check_status(response).map_err(|reason| {
            warn!(%reason, "model API returned an error");
            self.invocation_failed(reason)
        })?;

        if options.stream {
            return Ok(ToolOutput::Stream(ChunkStream::new(SseChunks {
                kind: self.kind,
                lines: BufReader::new(response).lines(),
                finished: false,
            })));
        }
        let payload: Value = response
            .json()
            .map_err(|err| {
                self.invocation_failed(format!("decode response: {}", err.without_url()))
            })?;
        let text = response_text(self.kind, &payload)
            .ok_or_else(|| self.invocation_failed("response carried no text".to_string()))?;
        Ok(ToolOutput::Text(text))
    }
}
