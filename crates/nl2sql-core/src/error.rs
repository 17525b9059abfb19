//! Top-level error taxonomy for the inference pipeline.
//!
//! # Error handling strategy
//!
//! Each stage (schema conversion, ranking, prompting, the LLM call,
//! sanitization, validation, compilation) has its own narrow error type.
//! [`PipelineError`] is the orchestrator-facing error: it names exactly the
//! error kinds of the pipeline's external contract and wraps the stage error
//! that produced it, along with a [`CorrelationId`] for log correlation.
//!
//! Recoverable failures (ranker unavailable, a single bad LLM response) are
//! absorbed *inside* the orchestrator via retry/fallback and never become a
//! `PipelineError` variant the caller sees unless every fallback is
//! exhausted.

use crate::ir::ValidationError;
use crate::llm::LlmError;
use std::fmt;
use uuid::Uuid;

/// Opaque identifier correlating a single pipeline invocation across log
/// lines and error reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The stable error kinds surfaced across the pipeline's public contract
/// (spec §7). Each variant's `Display` message is redacted for end users;
/// the wrapped stage error carries the full diagnostic for logs.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("no schema registered for database {database_id:?} [{correlation_id}]")]
    SchemaMissing {
        database_id: String,
        correlation_id: CorrelationId,
    },

    #[error("the language model is temporarily unavailable [{correlation_id}]")]
    LlmUnavailable {
        #[source]
        source: LlmError,
        correlation_id: CorrelationId,
    },

    #[error("the language model did not return valid JSON [{correlation_id}]")]
    LlmParseError {
        #[source]
        source: LlmError,
        correlation_id: CorrelationId,
    },

    #[error("the request could not be completed [{correlation_id}]")]
    LlmRefusal {
        #[source]
        source: LlmError,
        correlation_id: CorrelationId,
    },

    #[error("the generated query could not be validated against the schema [{correlation_id}]")]
    IrInvalid {
        diagnostics: Vec<ValidationError>,
        correlation_id: CorrelationId,
    },

    #[error("internal error compiling a validated query [{correlation_id}]")]
    CompilerError {
        message: String,
        correlation_id: CorrelationId,
    },

    #[error("the request took too long to complete [{correlation_id}]")]
    PipelineTimeout { correlation_id: CorrelationId },
}

impl PipelineError {
    pub fn correlation_id(&self) -> CorrelationId {
        match self {
            PipelineError::SchemaMissing { correlation_id, .. }
            | PipelineError::LlmUnavailable { correlation_id, .. }
            | PipelineError::LlmParseError { correlation_id, .. }
            | PipelineError::LlmRefusal { correlation_id, .. }
            | PipelineError::IrInvalid { correlation_id, .. }
            | PipelineError::CompilerError { correlation_id, .. }
            | PipelineError::PipelineTimeout { correlation_id } => *correlation_id,
        }
    }
}
