//! Narrow, optional collaborators the orchestrator consults but never
//! requires (spec §6.5): a schema cache, a conversation store, and a RAG
//! (similar-example) store. The pipeline degrades gracefully when any of
//! these is absent — a cache miss just means re-converting the schema, an
//! empty conversation store means no context resolution, no RAG store
//! means no examples block.

use crate::context::HistoryTurn;
use crate::prompt::RagExample;
use crate::schema::{CanonicalSchema, SchemaFingerprint};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Caches a schema's canonical view by fingerprint so repeated requests
/// against the same database skip re-conversion (spec §4.1, §6.5).
pub trait SchemaCache: Send + Sync {
    fn get(&self, fingerprint: SchemaFingerprint) -> Option<CanonicalSchema>;
    fn put(&self, fingerprint: SchemaFingerprint, schema: CanonicalSchema, ttl: Duration);
}

/// Persists conversation turns across requests so the Context Resolver has
/// history to resolve follow-ups against (spec §4.8, §6.5).
pub trait ConversationStore: Send + Sync {
    fn get(&self, conversation_id: &str) -> Vec<HistoryTurn>;
    fn append(&self, conversation_id: &str, turn: HistoryTurn);
    fn clear(&self, conversation_id: &str);
}

/// Retrieves prior `(question, sql)` pairs semantically similar to the
/// current question, for the Prompt Assembler's RAG block (spec §4.4,
/// §6.5). Ranking/embedding is the implementor's concern; this trait only
/// names the contract.
pub trait RagStore: Send + Sync {
    fn similar(&self, question: &str, fingerprint: SchemaFingerprint, k: usize) -> Vec<RagExample>;
}

struct CacheEntry {
    schema: CanonicalSchema,
    expires_at: Instant,
}

/// A process-local, `Mutex`-guarded [`SchemaCache`]. Suitable for a single
/// embedder instance; multi-instance deployments should back this trait
/// with a shared store instead.
#[derive(Default)]
pub struct InMemorySchemaCache {
    entries: Mutex<HashMap<SchemaFingerprint, CacheEntry>>,
}

impl InMemorySchemaCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SchemaCache for InMemorySchemaCache {
    fn get(&self, fingerprint: SchemaFingerprint) -> Option<CanonicalSchema> {
        let mut entries = self.entries.lock().expect("schema cache mutex poisoned");
        match entries.get(&fingerprint) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.schema.clone()),
            Some(_) => {
                entries.remove(&fingerprint);
                None
            }
            None => None,
        }
    }

    fn put(&self, fingerprint: SchemaFingerprint, schema: CanonicalSchema, ttl: Duration) {
        let mut entries = self.entries.lock().expect("schema cache mutex poisoned");
        entries.insert(fingerprint, CacheEntry { schema, expires_at: Instant::now() + ttl });
    }
}

/// A process-local [`ConversationStore`] backed by an in-memory map.
#[derive(Default)]
pub struct InMemoryConversationStore {
    turns: Mutex<HashMap<String, Vec<HistoryTurn>>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConversationStore for InMemoryConversationStore {
    fn get(&self, conversation_id: &str) -> Vec<HistoryTurn> {
        self.turns.lock().expect("conversation store mutex poisoned").get(conversation_id).cloned().unwrap_or_default()
    }

    fn append(&self, conversation_id: &str, turn: HistoryTurn) {
        self.turns
            .lock()
            .expect("conversation store mutex poisoned")
            .entry(conversation_id.to_string())
            .or_default()
            .push(turn);
    }

    fn clear(&self, conversation_id: &str) {
        self.turns.lock().expect("conversation store mutex poisoned").remove(conversation_id);
    }
}

/// A [`RagStore`] that always returns no examples, for embedders without a
/// feedback/similarity backend wired up yet.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRagStore;

impl RagStore for NullRagStore {
    fn similar(&self, _question: &str, _fingerprint: SchemaFingerprint, _k: usize) -> Vec<RagExample> {
        Vec::new()
    }
}
