//! Input handling: reading the question, schema, conversation history, and
//! (for offline demos) the mock LLM response from disk or stdin.

use anyhow::{Context, Result};
use nl2sql_core::schema::Schema;
use serde::Deserialize;
use std::io::{self, Read};
use std::path::Path;

/// Reads the question from the positional argument, or from stdin when it
/// was omitted.
pub fn read_question(question: Option<String>) -> Result<String> {
    match question {
        Some(q) => Ok(q),
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf).context("Failed to read question from stdin")?;
            Ok(buf.trim().to_string())
        }
    }
}

/// Parses a [`Schema`] from a JSON file.
pub fn read_schema(path: &Path) -> Result<Schema> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read schema file: {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse schema JSON: {}", path.display()))
}

/// One prior turn as it appears in a `--history` file.
#[derive(Debug, Deserialize)]
pub struct HistoryEntry {
    pub question: String,
    pub sql: String,
}

/// Parses a `--history` file into the entries the conversation store should
/// be preloaded with.
pub fn read_history(path: &Path) -> Result<Vec<HistoryEntry>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read history file: {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse history JSON: {}", path.display()))
}

/// Parses a `--mock-response` file into the canned IR JSON the mock LLM
/// provider should return for every prompt.
pub fn read_mock_response(path: &Path) -> Result<serde_json::Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read mock response file: {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse mock response JSON: {}", path.display()))
}
