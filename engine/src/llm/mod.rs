//! LLM Provider Abstraction Layer
//!
//! Providers (Ollama, OpenAI-compatible) implement `LLMProvider`. Nothing in the
//! research core talks to a provider directly: every call goes through
//! `gateway::ModelGateway`, which owns retries, backoff, rate tracking,
//! fallback and structured-output parsing.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod gateway;
pub mod ollama;
pub mod openai;

#[cfg(test)]
pub(crate) mod testing;

/// Result type for LLM operations
pub type Result<T> = std::result::Result<T, LLMError>;

/// Errors that can occur during provider calls
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LLMError {
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Timeout")]
    Timeout,

    #[error("Parse error: {0}")]
    ParseError(String),
}

impl LLMError {
    /// Whether the same call may succeed if repeated after a delay
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LLMError::ProviderUnavailable(_)
                | LLMError::RateLimitExceeded
                | LLMError::NetworkError(_)
                | LLMError::Timeout
                | LLMError::ParseError(_)
        )
    }

    /// Short name used in retry logs
    pub fn kind(&self) -> &'static str {
        match self {
            LLMError::ProviderUnavailable(_) => "provider_unavailable",
            LLMError::AuthenticationFailed(_) => "authentication_failed",
            LLMError::RateLimitExceeded => "rate_limited",
            LLMError::InvalidRequest(_) => "invalid_request",
            LLMError::NetworkError(_) => "network",
            LLMError::Timeout => "timeout",
            LLMError::ParseError(_) => "malformed_response",
        }
    }

    /// Map a reqwest transport error
    pub(crate) fn from_transport(err: reqwest::Error, provider: &str, base_url: &str) -> Self {
        if err.is_timeout() {
            LLMError::Timeout
        } else if err.is_connect() {
            LLMError::ProviderUnavailable(format!(
                "Cannot connect to {} at {}",
                provider, base_url
            ))
        } else {
            LLMError::NetworkError(err.to_string())
        }
    }

    /// Map a non-success HTTP status
    pub(crate) fn from_status(status: reqwest::StatusCode, provider: &str, body: &str) -> Self {
        let body: String = body.chars().take(200).collect();
        match status.as_u16() {
            401 | 403 => LLMError::AuthenticationFailed(format!("{} rejected credentials", provider)),
            429 => LLMError::RateLimitExceeded,
            400..=499 => LLMError::InvalidRequest(format!("{} ({}): {}", provider, status, body)),
            _ => LLMError::ProviderUnavailable(format!("{} API error ({}): {}", provider, status, body)),
        }
    }
}

/// Message in a prompt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }
}

/// Role of a message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::System => write!(f, "system"),
        }
    }
}

/// Provider-level completion request, already validated by the gateway
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    /// Ask the provider to emit a JSON object
    pub json_mode: bool,
    pub temperature: f32,
    pub top_p: Option<f32>,
    pub max_tokens: u32,
}

/// LLM Provider trait that all providers must implement
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Returns the name of the provider (e.g., "ollama", "openai")
    fn name(&self) -> &str;

    /// Returns true if this is a local provider
    fn is_local(&self) -> bool;

    /// Generate a completion and return the raw text content
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;

    /// Embed a piece of text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Check if the provider is currently healthy and available
    async fn check_health(&self) -> bool {
        true
    }
}

/// Extract a JSON object from model output.
///
/// Handles the formats models actually produce:
/// 1. Raw JSON
/// 2. Fenced JSON (with or without trailing text): ` ```json\n{...}\n``` `
/// 3. A JSON object embedded in prose
pub fn extract_json_object(content: &str) -> Option<serde_json::Map<String, serde_json::Value>> {
    let trimmed = content.trim();

    if let Some(obj) = parse_object(trimmed) {
        return Some(obj);
    }

    if let Some(inner) = extract_fenced_json(trimmed) {
        if let Some(obj) = parse_object(inner.trim()) {
            return Some(obj);
        }
    }

    // Try every '{' in turn; prose often contains stray braces before the payload
    for (pos, _) in trimmed.match_indices('{') {
        if let Some(candidate) = extract_balanced_json(&trimmed[pos..]) {
            if let Some(obj) = parse_object(candidate) {
                return Some(obj);
            }
        }
    }

    None
}

fn parse_object(s: &str) -> Option<serde_json::Map<String, serde_json::Value>> {
    match serde_json::from_str::<serde_json::Value>(s).ok()? {
        serde_json::Value::Object(map) => Some(map),
        _ => None,
    }
}

/// Extract the body of the first markdown code fence in the text.
///
/// Works even when there is trailing prose after the closing ```.
fn extract_fenced_json(content: &str) -> Option<&str> {
    let fence_start = content.find("```")?;
    let after_opening = &content[fence_start + 3..];

    // Skip the language tag line (e.g. "json\n")
    let body_start_rel = after_opening.find('\n')? + 1;
    let body_start = fence_start + 3 + body_start_rel;

    let closing = content[body_start..].find("```")?;
    let body_end = body_start + closing;

    if body_start >= body_end {
        return None;
    }

    Some(&content[body_start..body_end])
}

/// Extract a balanced JSON object starting at position 0 of `s`.
///
/// Counts `{` / `}` depth, respecting string literals.
fn extract_balanced_json(s: &str) -> Option<&str> {
    if !s.starts_with('{') {
        return None;
    }
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}
