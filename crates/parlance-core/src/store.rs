//! Collaborator contracts consumed by the resolution engine.
//!
//! Bots, intents and knowledge chunks are owned by an external store and
//! read as per-request snapshots. The conversation log is append-only and
//! the unrecognized-query log only ever increments.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::error::{ParlanceError, Result};
use crate::types::{Bot, ConversationMessage, Intent, KnowledgeChunk, UnrecognizedQuery};

/// Read access to bot configuration, intents and processed knowledge.
#[async_trait]
pub trait BotStore: Send + Sync {
    /// Look up a bot by ID. `Ok(None)` when it does not exist.
    async fn find_bot(&self, bot_id: Uuid) -> Result<Option<Bot>>;

    /// Active intents of a bot, in no particular order.
    async fn find_active_intents(&self, bot_id: Uuid) -> Result<Vec<Intent>>;

    /// Active, fully processed knowledge chunks of a bot, in storage order.
    async fn find_active_completed_chunks(&self, bot_id: Uuid) -> Result<Vec<KnowledgeChunk>>;
}

/// Per-session message log.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// The last `limit` messages of a session, oldest first.
    async fn load_recent_messages(
        &self,
        bot_id: Uuid,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationMessage>>;

    /// Append a message to a session's log.
    async fn append_message(
        &self,
        bot_id: Uuid,
        session_id: &str,
        message: ConversationMessage,
    ) -> Result<()>;
}

/// Sink for utterances no strategy could answer.
#[async_trait]
pub trait UnrecognizedQueryStore: Send + Sync {
    /// Insert the text or bump its occurrence counter if already recorded.
    async fn record_or_increment(&self, bot_id: Uuid, text: &str) -> Result<()>;

    /// Recorded queries of a bot, most frequent first.
    async fn list(&self, bot_id: Uuid, limit: usize) -> Result<Vec<UnrecognizedQuery>>;
}

// =============================================================================
// MemoryStore
// =============================================================================

#[derive(Default)]
struct MemoryState {
    bots: HashMap<Uuid, Bot>,
    intents: HashMap<Uuid, Vec<Intent>>,
    chunks: HashMap<Uuid, Vec<KnowledgeChunk>>,
    messages: HashMap<(Uuid, String), Vec<ConversationMessage>>,
    unrecognized: HashMap<Uuid, Vec<UnrecognizedQuery>>,
}

/// In-process implementation of every store contract.
///
/// Backs tests and single-process deployments that seed bots at startup.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut MemoryState) -> T,
    {
        let mut state = self
            .state
            .lock()
            .map_err(|e| ParlanceError::Storage(format!("memory store lock poisoned: {}", e)))?;
        Ok(f(&mut state))
    }

    /// Insert or replace a bot.
    pub fn insert_bot(&self, bot: Bot) -> Result<()> {
        self.with_state(|s| {
            s.bots.insert(bot.id, bot);
        })
    }

    /// Add an intent to a bot.
    pub fn insert_intent(&self, bot_id: Uuid, intent: Intent) -> Result<()> {
        self.with_state(|s| s.intents.entry(bot_id).or_default().push(intent))
    }

    /// Append a knowledge chunk to a bot, preserving insertion order.
    pub fn insert_chunk(&self, bot_id: Uuid, chunk: KnowledgeChunk) -> Result<()> {
        self.with_state(|s| s.chunks.entry(bot_id).or_default().push(chunk))
    }
}

#[async_trait]
impl BotStore for MemoryStore {
    async fn find_bot(&self, bot_id: Uuid) -> Result<Option<Bot>> {
        self.with_state(|s| s.bots.get(&bot_id).cloned())
    }

    async fn find_active_intents(&self, bot_id: Uuid) -> Result<Vec<Intent>> {
        self.with_state(|s| {
            s.intents
                .get(&bot_id)
                .map(|intents| intents.iter().filter(|i| i.is_active).cloned().collect())
                .unwrap_or_default()
        })
    }

    async fn find_active_completed_chunks(&self, bot_id: Uuid) -> Result<Vec<KnowledgeChunk>> {
        self.with_state(|s| s.chunks.get(&bot_id).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn load_recent_messages(
        &self,
        bot_id: Uuid,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationMessage>> {
        self.with_state(|s| {
            s.messages
                .get(&(bot_id, session_id.to_string()))
                .map(|log| log[log.len().saturating_sub(limit)..].to_vec())
                .unwrap_or_default()
        })
    }

    async fn append_message(
        &self,
        bot_id: Uuid,
        session_id: &str,
        message: ConversationMessage,
    ) -> Result<()> {
        self.with_state(|s| {
            s.messages
                .entry((bot_id, session_id.to_string()))
                .or_default()
                .push(message)
        })
    }
}

#[async_trait]
impl UnrecognizedQueryStore for MemoryStore {
    async fn record_or_increment(&self, bot_id: Uuid, text: &str) -> Result<()> {
        let now = Utc::now();
        self.with_state(|s| {
            let entries = s.unrecognized.entry(bot_id).or_default();
            if let Some(existing) = entries.iter_mut().find(|q| q.text == text) {
                existing.occurrences += 1;
                existing.last_seen = now;
            } else {
                entries.push(UnrecognizedQuery {
                    bot_id,
                    text: text.to_string(),
                    occurrences: 1,
                    first_seen: now,
                    last_seen: now,
                });
            }
        })
    }

    async fn list(&self, bot_id: Uuid, limit: usize) -> Result<Vec<UnrecognizedQuery>> {
        self.with_state(|s| {
            let mut entries = s.unrecognized.get(&bot_id).cloned().unwrap_or_default();
            entries.sort_by(|a, b| b.occurrences.cmp(&a.occurrences));
            entries.truncate(limit);
            entries
        })
    }
}
