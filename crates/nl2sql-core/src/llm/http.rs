//! A [`reqwest`]-backed [`LlmProvider`] for hosted chat-completion APIs.
//!
//! Thin and stateless beyond the shared client: one call, one request, no
//! retry logic here (retries are the orchestrator's job — spec §7).

use super::{parse_json_response, LlmError, LlmOptions, LlmProvider};
use async_trait::async_trait;
use serde_json::Value;

/// A generic OpenAI-style chat-completions endpoint. `endpoint` and `model`
/// are provider-specific; the pipeline body never branches on which
/// provider is configured (spec §9 "Pluggable LLM provider").
pub struct HttpLlmProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl HttpLlmProvider {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl LlmProvider for HttpLlmProvider {
    async fn generate_json(&self, prompt: &str, options: &LlmOptions) -> Result<Value, LlmError> {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
        });
        if let Some(max_tokens) = options.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        if let Some(format) = &options.response_format {
            body["response_format"] = serde_json::json!({"type": format});
        }

        let request = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .timeout(options.timeout)
            .json(&body);

        // `send()` is itself cancel-safe: dropping this future (task
        // cancellation) drops the in-flight request rather than leaking it
        // (spec §4.5 "Cancellation").
        let response = request.send().await.map_err(|e| LlmError::Unavailable { message: e.to_string() })?;

        if !response.status().is_success() {
            return Err(LlmError::Unavailable { message: format!("HTTP {}", response.status()) });
        }

        let payload: Value = response.json().await.map_err(|e| LlmError::ParseError { raw: e.to_string() })?;

        let text = payload["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| LlmError::Refusal { reason: Some("no completion content in response".to_string()) })?;

        parse_json_response(text)
    }
}
