//! The Context Resolver (spec §4.8): detects pronoun/back-reference
//! follow-ups and folds the most recent turn's question into the current
//! one so the Prompt Assembler and LLM see a self-contained question.
//!
//! Pure function of `(current, history)`: no network I/O, no mutation of
//! the conversation store (that's [`crate::stores::ConversationStore`]'s
//! job, driven by the orchestrator).

const PRONOUN_MARKERS: &[&str] = &["their", "those", "them", "it", "this", "that", "these"];
const CONNECTIVE_OPENERS: &[&str] = &["and ", "now ", "also "];

/// One prior turn, as needed to resolve a follow-up (spec §4.8).
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryTurn {
    pub question: String,
    pub sql: String,
    pub recorded_at: chrono::DateTime<chrono::Utc>,
}

/// Whether `question` looks like a follow-up of the immediately preceding
/// turn, and if so, the question with that turn's context prepended.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedQuestion {
    pub resolved: String,
    pub is_follow_up: bool,
}

/// Resolves `question` against `history` (most recent turn last).
///
/// A follow-up is detected when the question contains a pronoun/back-
/// reference marker, or opens with a connective ("and ...", "now ...",
/// "also ..."), and there is a prior turn to anchor it to (spec §4.8). In
/// that case the resolved question is `"{prior question} -- {question}"`;
/// otherwise `question` passes through unchanged.
pub fn resolve(question: &str, history: &[HistoryTurn]) -> ResolvedQuestion {
    let Some(last) = history.last() else {
        return ResolvedQuestion { resolved: question.to_string(), is_follow_up: false };
    };

    if !looks_like_follow_up(question) {
        return ResolvedQuestion { resolved: question.to_string(), is_follow_up: false };
    }

    ResolvedQuestion {
        resolved: format!("{} -- {}", last.question, question),
        is_follow_up: true,
    }
}

fn looks_like_follow_up(question: &str) -> bool {
    let lower = question.to_ascii_lowercase();
    let has_pronoun = PRONOUN_MARKERS.iter().any(|marker| contains_word(&lower, marker));
    let has_connective_opener = CONNECTIVE_OPENERS.iter().any(|opener| lower.starts_with(opener));
    has_pronoun || has_connective_opener
}

fn contains_word(haystack: &str, word: &str) -> bool {
    haystack.split(|c: char| !c.is_alphanumeric()).any(|tok| tok == word)
}
