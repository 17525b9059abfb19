//! Pipeline configuration.
//!
//! `spec.md` §9 leaves several knobs as open questions (`top_k` oscillates
//! between 15/25/50 in the source material). This module resolves them as
//! documented defaults rather than hard-coded constants, so an embedder can
//! override any of them without forking the pipeline. See DESIGN.md Decision
//! D1 for the `top_k` default.

use std::time::Duration;

/// Tunable knobs for a single pipeline instance.
///
/// Cloned cheaply and shared across concurrent requests; nothing here is
/// mutated after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Number of schema nodes the GAT ranker keeps before the Intelligent
    /// Fallback augments them (spec §4.2, §9 Open Question).
    pub top_k: usize,
    /// Per-call LLM HTTP timeout (spec §4.5, §5).
    pub llm_timeout: Duration,
    /// Advisory GAT forward-pass timeout; exceeding it falls back to no
    /// pruning (spec §5).
    pub gat_timeout: Duration,
    /// Whole-pipeline wall-clock budget (spec §5), surfaced as
    /// `PipelineTimeout`.
    pub pipeline_timeout: Duration,
    /// Retries on `LLMUnavailable` before surfacing (spec §7).
    pub max_llm_retries_unavailable: u32,
    /// Retries on `LLMParseError` before surfacing (spec §7).
    pub max_llm_retries_parse: u32,
    /// Correction rounds after an invalid IR before surfacing `IRInvalid`
    /// (spec §4.12 step 6).
    pub ir_correction_rounds: u32,
    /// Max columns per table in the compact (unpruned) schema rendering
    /// (spec §4.4).
    pub compact_schema_max_columns: usize,
    /// Number of prior conversation turns folded into the prompt (spec
    /// §4.4, §4.8).
    pub history_window: usize,
    /// Max RAG examples rendered into the prompt (spec §4.4).
    pub max_rag_examples: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            top_k: 25,
            llm_timeout: Duration::from_secs(30),
            gat_timeout: Duration::from_secs(5),
            pipeline_timeout: Duration::from_secs(60),
            max_llm_retries_unavailable: 2,
            max_llm_retries_parse: 1,
            ir_correction_rounds: 1,
            compact_schema_max_columns: 8,
            history_window: 3,
            max_rag_examples: 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.top_k, 25);
        assert_eq!(cfg.llm_timeout, Duration::from_secs(30));
        assert_eq!(cfg.gat_timeout, Duration::from_secs(5));
        assert_eq!(cfg.pipeline_timeout, Duration::from_secs(60));
        assert_eq!(cfg.max_llm_retries_unavailable, 2);
        assert_eq!(cfg.max_llm_retries_parse, 1);
        assert_eq!(cfg.ir_correction_rounds, 1);
    }
}
