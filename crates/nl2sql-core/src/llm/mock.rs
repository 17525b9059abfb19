//! A deterministic [`LlmProvider`] stand-in so the pipeline and its test
//! suite can run fully offline, without a network-reachable model.

use super::{LlmError, LlmOptions, LlmProvider};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Mutex;

/// Maps a prompt (matched by substring) to a canned JSON response.
///
/// Intended for demo mode and tests: register the few prompts a scenario
/// needs and let everything else fail with a recognizable [`LlmError`]
/// rather than silently returning nonsense.
pub struct MockLlmProvider {
    responses: Vec<(String, Value)>,
    default: Option<Value>,
    calls: Mutex<Vec<String>>,
}

impl MockLlmProvider {
    pub fn new() -> Self {
        Self { responses: Vec::new(), default: None, calls: Mutex::new(Vec::new()) }
    }

    /// Registers a response returned when `prompt.contains(needle)`.
    /// Checked in registration order; the first match wins.
    pub fn respond_when_contains(mut self, needle: impl Into<String>, response: Value) -> Self {
        self.responses.push((needle.into(), response));
        self
    }

    pub fn with_default(mut self, response: Value) -> Self {
        self.default = Some(response);
        self
    }

    /// Prompts seen so far, for assertions in tests that need to check the
    /// assembled prompt content without duplicating a fake HTTP layer.
    pub fn recorded_prompts(&self) -> Vec<String> {
        self.calls.lock().expect("mock provider mutex poisoned").clone()
    }
}

impl Default for MockLlmProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn generate_json(&self, prompt: &str, _options: &LlmOptions) -> Result<Value, LlmError> {
        self.calls.lock().expect("mock provider mutex poisoned").push(prompt.to_string());

        for (needle, response) in &self.responses {
            if prompt.contains(needle.as_str()) {
                return Ok(response.clone());
            }
        }
        if let Some(default) = &self.default {
            return Ok(default.clone());
        }
        Err(LlmError::Refusal { reason: Some("no mock response registered for this prompt".to_string()) })
    }
}

/// Thread-safe counter-backed provider used by tests that need to assert a
/// specific call count (e.g. retry-then-succeed scenarios) without string
/// matching on the prompt.
pub struct SequencedMockLlmProvider {
    responses: Mutex<std::collections::VecDeque<Result<Value, LlmErrorKind>>>,
}

/// A cloneable description of an [`LlmError`], since `LlmError` itself isn't
/// `Clone` (its variants carry owned diagnostic strings we don't need to
/// duplicate per queued response).
#[derive(Debug, Clone)]
pub enum LlmErrorKind {
    Unavailable,
    ParseError,
    Refusal,
}

impl From<LlmErrorKind> for LlmError {
    fn from(kind: LlmErrorKind) -> Self {
        match kind {
            LlmErrorKind::Unavailable => LlmError::Unavailable { message: "mock unavailable".to_string() },
            LlmErrorKind::ParseError => LlmError::ParseError { raw: "mock parse error".to_string() },
            LlmErrorKind::Refusal => LlmError::Refusal { reason: Some("mock refusal".to_string()) },
        }
    }
}

impl SequencedMockLlmProvider {
    pub fn new(responses: Vec<Result<Value, LlmErrorKind>>) -> Self {
        Self { responses: Mutex::new(responses.into()) }
    }
}

#[async_trait]
impl LlmProvider for SequencedMockLlmProvider {
    async fn generate_json(&self, _prompt: &str, _options: &LlmOptions) -> Result<Value, LlmError> {
        let mut queue = self.responses.lock().expect("mock provider mutex poisoned");
        match queue.pop_front() {
            Some(Ok(value)) => Ok(value),
            Some(Err(kind)) => Err(kind.into()),
            None => Err(LlmError::Refusal { reason: Some("mock response queue exhausted".to_string()) }),
        }
    }
}
