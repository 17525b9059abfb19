//! CLI argument parsing using clap.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// nl2sql - natural-language-to-SQL inference pipeline
#[derive(Parser, Debug)]
#[command(name = "nl2sql")]
#[command(about = "Turn a natural-language question into parameterized SQL", long_about = None)]
#[command(version)]
pub struct Args {
    /// The question to translate (reads from stdin if omitted)
    #[arg(value_name = "QUESTION")]
    pub question: Option<String>,

    /// Schema JSON file describing the target database
    #[arg(short, long, value_name = "FILE")]
    pub schema: PathBuf,

    /// Database identifier to report in errors (defaults to the schema's own db_id)
    #[arg(long, value_name = "ID")]
    pub database_id: Option<String>,

    /// SQL dialect the compiler should quote identifiers for
    #[arg(short, long, default_value = "postgres", value_enum)]
    pub dialect: DialectArg,

    /// Output format
    #[arg(short, long, default_value = "text", value_enum)]
    pub format: OutputFormat,

    /// Output file (defaults to stdout)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Prior conversation turns as a JSON file (array of {"question", "sql"})
    #[arg(long, value_name = "FILE")]
    pub history: Option<PathBuf>,

    /// Conversation identifier; required for --history to take effect and
    /// for this turn to be appended to the in-memory conversation store
    #[arg(long, value_name = "ID")]
    pub conversation_id: Option<String>,

    /// Chat-completions endpoint for the HTTP LLM provider
    #[arg(long, value_name = "URL", env = "NL2SQL_LLM_ENDPOINT")]
    pub llm_endpoint: Option<String>,

    /// API key for the HTTP LLM provider
    #[arg(long, value_name = "KEY", env = "NL2SQL_LLM_API_KEY")]
    pub llm_api_key: Option<String>,

    /// Model name for the HTTP LLM provider
    #[arg(long, value_name = "MODEL", default_value = "gpt-4o-mini")]
    pub llm_model: String,

    /// Use a deterministic offline mock instead of a real LLM, returning the
    /// IR JSON read from this file for every prompt
    #[arg(long, value_name = "FILE", conflicts_with = "llm_endpoint")]
    pub mock_response: Option<PathBuf>,

    /// Suppress explanations and suggested fixes on stderr
    #[arg(short, long)]
    pub quiet: bool,

    /// Compact JSON output (no pretty-printing)
    #[arg(short, long)]
    pub compact: bool,
}

/// SQL dialect options
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DialectArg {
    Mysql,
    Postgres,
    Sqlite,
}

impl From<DialectArg> for nl2sql_core::ir::Dialect {
    fn from(d: DialectArg) -> Self {
        match d {
            DialectArg::Mysql => nl2sql_core::ir::Dialect::MySql,
            DialectArg::Postgres => nl2sql_core::ir::Dialect::Postgres,
            DialectArg::Sqlite => nl2sql_core::ir::Dialect::Sqlite,
        }
    }
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary
    Text,
    /// JSON output
    Json,
}
