//! The Orchestrator (spec §4.12): composes all prior stages into a single
//! `execute` call, owning the retry/correction policy and the whole-pipeline
//! timeout (spec §5, §7).

use crate::complexity::{self, ComplexityReport};
use crate::config::PipelineConfig;
use crate::context::{self, HistoryTurn};
use crate::corrector::{self, CorrectionHint};
use crate::error::{CorrelationId, PipelineError};
use crate::ir::{self, Dialect, Ir, ValidationError};
use crate::llm::{LlmError, LlmOptions, LlmProvider};
use crate::prompt::{self, ConversationTurn, PromptInputs, RagExample};
use crate::ranker::gat::{self, GatWeights, ScoredNode};
use crate::ranker::{fallback, RankedNode};
use crate::schema::{CanonicalSchema, Schema};
use crate::stores::{ConversationStore, RagStore, SchemaCache};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Optional GAT ranker wiring: weights plus the two encoders they were
/// trained against (spec §6.3). Absent entirely means the orchestrator
/// never prunes the schema (spec §4.2 "no pruning" fallback).
pub struct RankerHandle {
    pub weights: GatWeights,
    pub question_encoder_dim: usize,
    pub node_text_encoder_dim: usize,
}

/// Everything a single `execute` call needs beyond the question itself.
pub struct PipelineRequest {
    pub question: String,
    pub conversation_id: Option<String>,
    pub database_id: String,
    pub schema: Schema,
    pub dialect: Dialect,
}

/// The full, documented result of a pipeline run (spec §4.12).
#[derive(Debug, Clone, serde::Serialize)]
pub struct PipelineResponse {
    pub original_question: String,
    pub resolved_question: String,
    pub sql: String,
    pub params: indexmap::IndexMap<String, Value>,
    pub ir: Ir,
    pub confidence: f64,
    pub ambiguities: Vec<String>,
    pub questions: Vec<String>,
    pub explanations: Vec<String>,
    pub suggested_fixes: Vec<String>,
    pub execution_time: Duration,
}

/// Composes the Context Resolver, Schema Converter, GAT Ranker +
/// Intelligent Fallback, Prompt Assembler, LLM JSON Caller, IR Sanitizer,
/// IR Validator, IR→SQL Compiler, and the Complexity Analyzer + SQL
/// Corrector auxiliaries behind one `execute` call (spec §4.12).
pub struct Orchestrator {
    config: PipelineConfig,
    llm: Arc<dyn LlmProvider>,
    ranker: Option<RankerHandle>,
    schema_cache: Arc<dyn SchemaCache>,
    conversation_store: Arc<dyn ConversationStore>,
    rag_store: Arc<dyn RagStore>,
}

impl Orchestrator {
    pub fn new(
        config: PipelineConfig,
        llm: Arc<dyn LlmProvider>,
        ranker: Option<RankerHandle>,
        schema_cache: Arc<dyn SchemaCache>,
        conversation_store: Arc<dyn ConversationStore>,
        rag_store: Arc<dyn RagStore>,
    ) -> Self {
        Self { config, llm, ranker, schema_cache, conversation_store, rag_store }
    }

    /// Runs the full pipeline, bounded by `config.pipeline_timeout` (spec
    /// §5). A timed-out run surfaces as [`PipelineError::PipelineTimeout`]
    /// regardless of which stage was in flight.
    pub async fn execute(&self, request: PipelineRequest) -> Result<PipelineResponse, PipelineError> {
        let correlation_id = CorrelationId::new();
        let started = Instant::now();

        #[cfg(feature = "tracing")]
        tracing::info!(%correlation_id, database_id = %request.database_id, "pipeline run started");

        let result = tokio::time::timeout(self.config.pipeline_timeout, self.run(request, correlation_id)).await;

        match result {
            Ok(Ok(mut response)) => {
                response.execution_time = started.elapsed();
                Ok(response)
            }
            Ok(Err(err)) => Err(err),
            Err(_elapsed) => Err(PipelineError::PipelineTimeout { correlation_id }),
        }
    }

    async fn run(&self, request: PipelineRequest, correlation_id: CorrelationId) -> Result<PipelineResponse, PipelineError> {
        let canonical = self.canonical_schema(&request.schema);

        let history = match &request.conversation_id {
            Some(id) => self.conversation_store.get(id),
            None => Vec::new(),
        };
        let resolved = context::resolve(&request.question, &history);

        let fingerprint = request.schema.fingerprint();
        let rag_examples: Vec<RagExample> = self
            .rag_store
            .similar(&resolved.resolved, fingerprint, self.config.max_rag_examples)
            .into_iter()
            .take(self.config.max_rag_examples)
            .collect();

        let ranked_nodes = self.rank_schema(&resolved.resolved, &canonical).await;

        let prompt_history: Vec<ConversationTurn> = history
            .iter()
            .map(|t| ConversationTurn { question: t.question.clone(), sql: t.sql.clone() })
            .collect();

        let mut prompt_text = self.assemble_prompt(&request.schema, &canonical, ranked_nodes.as_deref(), &rag_examples, &prompt_history, &resolved.resolved);

        let mut attempt = 0u32;
        let (ir, sql, params) = loop {
            let raw = self.call_llm(&prompt_text, correlation_id).await?;
            let sanitized = ir::sanitize(&raw);
            let parsed: Ir = match serde_json::from_value(sanitized) {
                Ok(ir) => ir,
                Err(e) => {
                    return Err(PipelineError::LlmParseError {
                        source: LlmError::ParseError { raw: e.to_string() },
                        correlation_id,
                    })
                }
            };

            match ir::validate(&parsed, &canonical) {
                Ok(validated) => {
                    let compiled = ir::compile(&validated, request.dialect);
                    break (parsed, compiled.sql, compiled.params);
                }
                Err(diagnostics) if attempt < self.config.ir_correction_rounds => {
                    attempt += 1;
                    prompt_text = self.correction_prompt(&prompt_text, &diagnostics);
                    continue;
                }
                Err(diagnostics) => {
                    return Err(PipelineError::IrInvalid { diagnostics, correlation_id });
                }
            }
        };

        // Clarification-needed response (spec §6.6): the LLM asked a
        // question rather than committing to a query; surface it with an
        // empty `sql` instead of compiling and persisting a guess.
        if !ir.questions.is_empty() {
            return Ok(PipelineResponse {
                original_question: request.question,
                resolved_question: resolved.resolved,
                sql: String::new(),
                params: indexmap::IndexMap::new(),
                confidence: ir.confidence,
                ambiguities: ir.ambiguities.clone(),
                questions: ir.questions.clone(),
                explanations: Vec::new(),
                suggested_fixes: Vec::new(),
                ir,
                execution_time: Duration::default(),
            });
        }

        let (sql, corrector_hints) = corrector::check(&ir, &sql);
        let complexity = complexity::analyze(&ir);

        if let Some(conversation_id) = &request.conversation_id {
            self.conversation_store.append(
                conversation_id,
                HistoryTurn { question: request.question.clone(), sql: sql.clone(), recorded_at: chrono::Utc::now() },
            );
        }

        #[cfg(feature = "tracing")]
        tracing::info!(%correlation_id, complexity = ?complexity.band, "pipeline run completed");

        Ok(PipelineResponse {
            original_question: request.question,
            resolved_question: resolved.resolved,
            sql,
            params,
            confidence: ir.confidence,
            ambiguities: ir.ambiguities.clone(),
            questions: Vec::new(),
            explanations: explanations_for(&complexity),
            suggested_fixes: corrector_hints.into_iter().map(|h| h.message).collect(),
            ir,
            execution_time: Duration::default(),
        })
    }

    fn canonical_schema(&self, schema: &Schema) -> CanonicalSchema {
        let fingerprint = schema.fingerprint();
        if let Some(cached) = self.schema_cache.get(fingerprint) {
            return cached;
        }
        let canonical = crate::schema::convert(schema);
        self.schema_cache.put(fingerprint, canonical.clone(), Duration::from_secs(3600));
        canonical
    }

    /// Runs the GAT ranker then the Intelligent Fallback, or `None` on any
    /// ranker failure (missing weights, embedding failure, timeout) per
    /// spec §4.2's "no pruning" fallback contract.
    async fn rank_schema(&self, question: &str, schema: &CanonicalSchema) -> Option<Vec<RankedNode>> {
        let handle = self.ranker.as_ref()?;
        let scored: Vec<ScoredNode> = gat::score_nodes_with_timeout(
            handle.weights.clone(),
            handle.question_encoder_dim,
            handle.node_text_encoder_dim,
            question.to_string(),
            schema.clone(),
            self.config.top_k,
            self.config.gat_timeout,
        )
        .await
        .ok()?;

        Some(fallback::augment(question, schema, &scored))
    }

    fn assemble_prompt(
        &self,
        schema: &Schema,
        canonical: &CanonicalSchema,
        ranked_nodes: Option<&[RankedNode]>,
        rag_examples: &[RagExample],
        history: &[ConversationTurn],
        resolved_question: &str,
    ) -> String {
        let inputs = PromptInputs {
            schema,
            canonical,
            ranked_nodes,
            rag_examples,
            history,
            resolved_question,
            compact_schema_max_columns: self.config.compact_schema_max_columns,
            history_window: self.config.history_window,
        };
        prompt::assemble(&inputs)
    }

    /// Calls the LLM with retry policy (spec §7): exponential backoff up to
    /// `max_llm_retries_unavailable` attempts on `Unavailable`, one retry
    /// with a "return valid JSON" nudge on `ParseError`. `Refusal` never
    /// retries.
    async fn call_llm(&self, prompt: &str, correlation_id: CorrelationId) -> Result<Value, PipelineError> {
        let options = LlmOptions { timeout: self.config.llm_timeout, ..LlmOptions::default() };

        let mut unavailable_attempts = 0u32;
        let mut parse_attempts = 0u32;
        let mut current_prompt = prompt.to_string();

        loop {
            match self.llm.generate_json(&current_prompt, &options).await {
                Ok(value) => return Ok(value),
                Err(err @ LlmError::Unavailable { .. }) => {
                    if unavailable_attempts >= self.config.max_llm_retries_unavailable {
                        return Err(PipelineError::LlmUnavailable { source: err, correlation_id });
                    }
                    let backoff = Duration::from_millis(200 * 2u64.pow(unavailable_attempts));
                    tokio::time::sleep(backoff).await;
                    unavailable_attempts += 1;
                }
                Err(err @ LlmError::ParseError { .. }) => {
                    if parse_attempts >= self.config.max_llm_retries_parse {
                        return Err(PipelineError::LlmParseError { source: err, correlation_id });
                    }
                    current_prompt = format!("{current_prompt}\n\nYour previous response was not valid JSON. Return a single valid JSON object only.");
                    parse_attempts += 1;
                }
                Err(err @ LlmError::Refusal { .. }) => {
                    return Err(PipelineError::LlmRefusal { source: err, correlation_id });
                }
            }
        }
    }

    /// Builds a follow-up prompt nudging the LLM to fix the specific
    /// validation errors from the prior attempt (spec §4.12 step 6).
    fn correction_prompt(&self, previous_prompt: &str, diagnostics: &[ValidationError]) -> String {
        let issues: Vec<String> = diagnostics.iter().map(|d| format!("- {} ({:?}): {}", d.path, d.kind, d.message)).collect();
        format!("{previous_prompt}\n\nYour previous response had these problems:\n{}\n\nReturn a corrected JSON object.", issues.join("\n"))
    }
}

fn explanations_for(report: &ComplexityReport) -> Vec<String> {
    let mut explanations = vec![format!("complexity: {:?} (score {})", report.band, report.score)];
    explanations.extend(report.warnings.iter().cloned());
    explanations
}
