//! The LLM JSON Caller: a provider-agnostic `generate_json` contract (spec
//! §4.5, §6.4) plus a deterministic mock and an optional HTTP-backed
//! implementation.

#[cfg(feature = "http")]
pub mod http;
pub mod mock;

pub use mock::MockLlmProvider;
#[cfg(feature = "http")]
pub use http::HttpLlmProvider;

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// Per-call knobs (spec §6.4). `response_format` names a provider-specific
/// structured-output mode (e.g. `"json_object"`); providers that don't
/// support one fall back to balanced-brace extraction.
#[derive(Debug, Clone)]
pub struct LlmOptions {
    pub timeout: Duration,
    pub max_tokens: Option<u32>,
    pub response_format: Option<String>,
}

impl Default for LlmOptions {
    fn default() -> Self {
        Self { timeout: Duration::from_secs(30), max_tokens: None, response_format: Some("json_object".to_string()) }
    }
}

/// The three failure kinds a provider may surface (spec §4.5).
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("language model transport or authorization failure: {message}")]
    Unavailable { message: String },
    #[error("language model response was not valid JSON: {raw}")]
    ParseError { raw: String },
    #[error("language model refused or returned an empty response{}", reason.as_ref().map(|r| format!(": {r}")).unwrap_or_default())]
    Refusal { reason: Option<String> },
}

/// A text-completion model that returns parsed JSON (spec §4.5, §6.4).
///
/// Implementations must be safe to call concurrently and must abort their
/// outgoing request if the calling task is cancelled (spec §4.5
/// "Cancellation").
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn generate_json(&self, prompt: &str, options: &LlmOptions) -> Result<Value, LlmError>;
}

/// Extracts the first balanced `{...}` substring from raw provider text,
/// for providers with no native JSON mode (spec §4.5).
pub fn extract_balanced_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let bytes = raw.as_bytes();
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&raw[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parses raw provider text into JSON, applying balanced-brace extraction
/// when the text isn't already a bare JSON object (spec §4.5).
pub fn parse_json_response(raw: &str) -> Result<Value, LlmError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(LlmError::Refusal { reason: Some("empty response".to_string()) });
    }
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        if value.is_object() {
            return Ok(value);
        }
    }
    let candidate = extract_balanced_object(trimmed).ok_or_else(|| LlmError::ParseError { raw: raw.to_string() })?;
    serde_json::from_str::<Value>(candidate).map_err(|_| LlmError::ParseError { raw: raw.to_string() })
}
