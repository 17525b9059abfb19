//! nl2sql CLI - natural-language-to-SQL inference pipeline driver

mod cli;
mod input;
mod output;

use anyhow::{bail, Context, Result};
use clap::Parser;
use nl2sql_core::context::HistoryTurn;
use nl2sql_core::llm::{LlmProvider, MockLlmProvider};
use nl2sql_core::stores::{InMemoryConversationStore, InMemorySchemaCache, NullRagStore};
use nl2sql_core::{Orchestrator, PipelineConfig, PipelineRequest, PipelineResponse};
use std::fs;
use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::Arc;

use cli::{Args, OutputFormat};
use output::{format_json, format_text};

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("nl2sql: error: {e:#}");
            ExitCode::from(1)
        }
    }
}

async fn run() -> Result<()> {
    #[cfg(feature = "tracing")]
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).with_writer(io::stderr).init();

    let args = Args::parse();

    let question = input::read_question(args.question.clone())?;
    let schema = input::read_schema(&args.schema)?;
    let database_id = args.database_id.clone().unwrap_or_else(|| schema.db_id.clone());

    let llm = build_llm_provider(&args)?;

    let conversation_store = Arc::new(InMemoryConversationStore::new());
    if let (Some(history_path), Some(conversation_id)) = (&args.history, &args.conversation_id) {
        for entry in input::read_history(history_path)? {
            conversation_store.append(
                conversation_id,
                HistoryTurn { question: entry.question, sql: entry.sql, recorded_at: chrono::Utc::now() },
            );
        }
    }

    let orchestrator = Orchestrator::new(
        PipelineConfig::default(),
        llm,
        None,
        Arc::new(InMemorySchemaCache::new()),
        conversation_store,
        Arc::new(NullRagStore),
    );

    let request = PipelineRequest {
        question,
        conversation_id: args.conversation_id.clone(),
        database_id,
        schema,
        dialect: args.dialect.into(),
    };

    let response = orchestrator.execute(request).await.context("Pipeline run failed")?;

    if !args.quiet {
        print_diagnostics_to_stderr(&response);
    }

    let output_str = match args.format {
        OutputFormat::Json => format_json(&response, args.compact),
        OutputFormat::Text => format_text(&response),
    };

    write_output(&args.output, &output_str)
}

fn build_llm_provider(args: &Args) -> Result<Arc<dyn LlmProvider>> {
    if let Some(path) = &args.mock_response {
        let response = input::read_mock_response(path)?;
        return Ok(Arc::new(MockLlmProvider::new().with_default(response)));
    }

    #[cfg(feature = "http")]
    if let Some(endpoint) = &args.llm_endpoint {
        let api_key = args.llm_api_key.clone().unwrap_or_default();
        return Ok(Arc::new(nl2sql_core::llm::HttpLlmProvider::new(endpoint.clone(), api_key, args.llm_model.clone())));
    }

    bail!("no language model configured: pass --llm-endpoint (with --llm-api-key) or --mock-response for an offline demo")
}

fn write_output(path: &Option<std::path::PathBuf>, content: &str) -> Result<()> {
    if let Some(path) = path {
        fs::write(path, content).with_context(|| format!("Failed to write to {}", path.display()))?;
    } else {
        io::stdout().write_all(content.as_bytes()).context("Failed to write to stdout")?;
        if !content.ends_with('\n') {
            println!();
        }
    }
    Ok(())
}

fn print_diagnostics_to_stderr(response: &PipelineResponse) {
    let stderr = io::stderr();
    let mut handle = stderr.lock();
    for explanation in &response.explanations {
        let _ = writeln!(handle, "nl2sql: info: {explanation}");
    }
    for ambiguity in &response.ambiguities {
        let _ = writeln!(handle, "nl2sql: warning: ambiguous: {ambiguity}");
    }
    for question in &response.questions {
        let _ = writeln!(handle, "nl2sql: question: {question}");
    }
    for fix in &response.suggested_fixes {
        let _ = writeln!(handle, "nl2sql: suggestion: {fix}");
    }
}
