//! JSON output formatting.

use nl2sql_core::PipelineResponse;

/// Formats the pipeline response as JSON.
///
/// If `compact` is true, outputs minified JSON without whitespace.
pub fn format_json(response: &PipelineResponse, compact: bool) -> String {
    if compact {
        serde_json::to_string(response).expect("serialization cannot fail")
    } else {
        serde_json::to_string_pretty(response).expect("serialization cannot fail")
    }
}
