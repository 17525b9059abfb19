//! Human-readable text output formatting.

use nl2sql_core::PipelineResponse;
use std::fmt::Write as _;

/// Renders a pipeline response as a short human-readable report: the
/// resolved question (when it differs from the original), the compiled SQL,
/// its parameter bindings, and the confidence score. Explanations and
/// suggested fixes are reported separately on stderr by the caller so they
/// don't pollute a SQL-shaped stdout.
pub fn format_text(response: &PipelineResponse) -> String {
    let mut out = String::new();
    if response.resolved_question != response.original_question {
        let _ = writeln!(out, "resolved: {}", response.resolved_question);
    }
    if response.sql.is_empty() && !response.questions.is_empty() {
        let _ = writeln!(out, "clarification needed:");
        for question in &response.questions {
            let _ = writeln!(out, "  - {question}");
        }
        return out;
    }
    let _ = writeln!(out, "{}", response.sql);
    if !response.params.is_empty() {
        let _ = writeln!(out);
        for (name, value) in &response.params {
            let _ = writeln!(out, "  {name} = {value}");
        }
    }
    let _ = write!(out, "\nconfidence: {:.2}", response.confidence);
    out
}
