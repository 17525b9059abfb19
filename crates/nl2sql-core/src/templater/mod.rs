//! Jinja2 template rendering used by the Prompt Assembler (spec §4.4) to
//! turn the pruned schema, RAG examples, and conversation context into the
//! single text prompt sent to the LLM.
//!
//! The Prompt Assembler's own logic (selecting which tables/columns to
//! render, truncating history to the configured window) lives in
//! [`crate::prompt`]; this module is purely the rendering backend.

mod error;
mod jinja;

pub use error::TemplateError;

use std::collections::HashMap;

/// Renders `template` against `context`. Pure and deterministic: the same
/// template and context always render to the same string (spec §4.4
/// "byte-for-byte deterministic").
pub fn render(template: &str, context: &HashMap<String, serde_json::Value>) -> Result<String, TemplateError> {
    jinja::render_jinja(template, context)
}
