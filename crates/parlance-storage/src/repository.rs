//! SQLite-backed implementations of the collaborator store contracts.
//!
//! `BotRepository` serves bots, intents and knowledge chunks,
//! `ConversationRepository` the per-session message log and
//! `UnrecognizedQueryRepository` the curation log.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::OptionalExtension;
use uuid::Uuid;

use parlance_core::error::{ParlanceError, Result};
use parlance_core::store::{BotStore, ConversationStore, UnrecognizedQueryStore};
use parlance_core::types::{
    Bot, ChunkMetadata, ConversationMessage, Intent, KnowledgeChunk, MessageResolution,
    RoutingConfig, Sender, UnrecognizedQuery,
};

use crate::db::{storage_err, Database};

/// Processing state of a stored knowledge chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStatus {
    Pending,
    Completed,
    Failed,
}

impl ChunkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkStatus::Pending => "pending",
            ChunkStatus::Completed => "completed",
            ChunkStatus::Failed => "failed",
        }
    }
}

// =============================================================================
// BotRepository
// =============================================================================

/// Repository for bots and the intents and knowledge they own.
pub struct BotRepository {
    db: Arc<Database>,
}

impl BotRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert or replace a bot.
    pub fn save_bot(&self, bot: &Bot) -> Result<()> {
        let routing = serde_json::to_string(&bot.routing)?;
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO bots (id, name, description, persona, tone, fallback_message, is_active, routing)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    description = excluded.description,
                    persona = excluded.persona,
                    tone = excluded.tone,
                    fallback_message = excluded.fallback_message,
                    is_active = excluded.is_active,
                    routing = excluded.routing",
                rusqlite::params![
                    bot.id.to_string(),
                    bot.name,
                    bot.description,
                    bot.persona,
                    bot.tone,
                    bot.fallback_message,
                    bot.is_active as i32,
                    routing,
                ],
            )
            .map_err(storage_err("Failed to save bot"))?;
            Ok(())
        })
    }

    /// Insert or replace an intent, keyed by bot and intent name.
    pub fn save_intent(&self, bot_id: Uuid, intent: &Intent) -> Result<()> {
        let phrases = serde_json::to_string(&intent.training_phrases)?;
        let responses = serde_json::to_string(&intent.responses)?;
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO intents
                    (bot_id, name, display_name, training_phrases, responses, priority, is_active)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    bot_id.to_string(),
                    intent.name,
                    intent.display_name,
                    phrases,
                    responses,
                    intent.priority,
                    intent.is_active as i32,
                ],
            )
            .map_err(storage_err("Failed to save intent"))?;
            Ok(())
        })
    }

    /// Append knowledge chunks for a bot in the given status.
    pub fn save_chunks(
        &self,
        bot_id: Uuid,
        chunks: &[KnowledgeChunk],
        status: ChunkStatus,
    ) -> Result<()> {
        let mut rows = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let embedding = chunk
                .embedding
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?;
            rows.push((chunk, embedding));
        }

        self.db.with_conn(|conn| {
            let tx = conn
                .unchecked_transaction()
                .map_err(storage_err("Failed to begin transaction"))?;
            {
                let mut stmt = tx
                    .prepare(
                        "INSERT INTO knowledge_chunks
                            (id, bot_id, text, title, source, chunk_index, embedding, status)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    )
                    .map_err(storage_err("Failed to prepare chunk insert"))?;
                for (chunk, embedding) in &rows {
                    stmt.execute(rusqlite::params![
                        chunk.id.to_string(),
                        bot_id.to_string(),
                        chunk.text,
                        chunk.metadata.title,
                        chunk.metadata.source,
                        chunk.metadata.chunk_index as i64,
                        embedding,
                        status.as_str(),
                    ])
                    .map_err(storage_err("Failed to save chunk"))?;
                }
            }
            tx.commit().map_err(storage_err("Failed to commit chunks"))?;
            Ok(())
        })
    }

    /// IDs of every active bot.
    pub fn list_active_bot_ids(&self) -> Result<Vec<Uuid>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT id FROM bots WHERE is_active = 1 ORDER BY name")
                .map_err(storage_err("Failed to prepare bot query"))?;
            let ids = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(storage_err("Failed to query bots"))?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(storage_err("Failed to read bot"))?;
            ids.iter().map(|id| parse_uuid(id)).collect()
        })
    }
}

#[async_trait]
impl BotStore for BotRepository {
    async fn find_bot(&self, bot_id: Uuid) -> Result<Option<Bot>> {
        self.db.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, name, description, persona, tone, fallback_message, is_active, routing
                     FROM bots WHERE id = ?1",
                    rusqlite::params![bot_id.to_string()],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                            row.get::<_, String>(4)?,
                            row.get::<_, String>(5)?,
                            row.get::<_, i32>(6)?,
                            row.get::<_, String>(7)?,
                        ))
                    },
                )
                .optional()
                .map_err(storage_err("Failed to load bot"))?;

            let Some((id, name, description, persona, tone, fallback_message, active, routing)) =
                row
            else {
                return Ok(None);
            };

            let routing: RoutingConfig = serde_json::from_str(&routing)?;
            Ok(Some(Bot {
                id: parse_uuid(&id)?,
                name,
                description,
                persona,
                tone,
                fallback_message,
                is_active: active != 0,
                routing,
            }))
        })
    }

    async fn find_active_intents(&self, bot_id: Uuid) -> Result<Vec<Intent>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT name, display_name, training_phrases, responses, priority
                     FROM intents WHERE bot_id = ?1 AND is_active = 1",
                )
                .map_err(storage_err("Failed to prepare intent query"))?;

            let rows = stmt
                .query_map(rusqlite::params![bot_id.to_string()], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, i32>(4)?,
                    ))
                })
                .map_err(storage_err("Failed to query intents"))?;

            let mut intents = Vec::new();
            for row in rows {
                let (name, display_name, phrases, responses, priority) =
                    row.map_err(storage_err("Failed to read intent"))?;
                intents.push(Intent {
                    name,
                    display_name,
                    training_phrases: serde_json::from_str(&phrases)?,
                    responses: serde_json::from_str(&responses)?,
                    priority,
                    is_active: true,
                });
            }
            Ok(intents)
        })
    }

    async fn find_active_completed_chunks(&self, bot_id: Uuid) -> Result<Vec<KnowledgeChunk>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, text, title, source, chunk_index, embedding
                     FROM knowledge_chunks
                     WHERE bot_id = ?1 AND is_active = 1 AND status = 'completed'
                     ORDER BY seq ASC",
                )
                .map_err(storage_err("Failed to prepare chunk query"))?;

            let rows = stmt
                .query_map(rusqlite::params![bot_id.to_string()], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, Option<String>>(5)?,
                    ))
                })
                .map_err(storage_err("Failed to query chunks"))?;

            let mut chunks = Vec::new();
            for row in rows {
                let (id, text, title, source, chunk_index, embedding) =
                    row.map_err(storage_err("Failed to read chunk"))?;
                chunks.push(KnowledgeChunk {
                    id: parse_uuid(&id)?,
                    text,
                    metadata: ChunkMetadata {
                        title,
                        source,
                        chunk_index: chunk_index.max(0) as usize,
                    },
                    embedding: embedding.map(|e| serde_json::from_str(&e)).transpose()?,
                });
            }
            Ok(chunks)
        })
    }
}

// =============================================================================
// ConversationRepository
// =============================================================================

/// Repository for the append-only per-session message log.
pub struct ConversationRepository {
    db: Arc<Database>,
}

impl ConversationRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ConversationStore for ConversationRepository {
    async fn load_recent_messages(
        &self,
        bot_id: Uuid,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationMessage>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT sender, text, timestamp, resolution FROM messages
                     WHERE bot_id = ?1 AND session_id = ?2
                     ORDER BY seq DESC
                     LIMIT ?3",
                )
                .map_err(storage_err("Failed to prepare message query"))?;

            let rows = stmt
                .query_map(
                    rusqlite::params![bot_id.to_string(), session_id, limit as i64],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, i64>(2)?,
                            row.get::<_, Option<String>>(3)?,
                        ))
                    },
                )
                .map_err(storage_err("Failed to query messages"))?;

            let mut messages = Vec::new();
            for row in rows {
                let (sender, text, timestamp, resolution) =
                    row.map_err(storage_err("Failed to read message"))?;
                let resolution: Option<MessageResolution> = resolution
                    .map(|r| serde_json::from_str(&r))
                    .transpose()?;
                messages.push(ConversationMessage {
                    sender: sender
                        .parse::<Sender>()
                        .map_err(ParlanceError::Storage)?,
                    text,
                    timestamp: from_millis(timestamp),
                    resolution,
                });
            }
            messages.reverse();
            Ok(messages)
        })
    }

    async fn append_message(
        &self,
        bot_id: Uuid,
        session_id: &str,
        message: ConversationMessage,
    ) -> Result<()> {
        let resolution = message
            .resolution
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (bot_id, session_id, sender, text, timestamp, resolution)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    bot_id.to_string(),
                    session_id,
                    message.sender.as_str(),
                    message.text,
                    message.timestamp.timestamp_millis(),
                    resolution,
                ],
            )
            .map_err(storage_err("Failed to append message"))?;
            Ok(())
        })
    }
}

// =============================================================================
// UnrecognizedQueryRepository
// =============================================================================

/// Repository for utterances no strategy could answer.
pub struct UnrecognizedQueryRepository {
    db: Arc<Database>,
}

impl UnrecognizedQueryRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UnrecognizedQueryStore for UnrecognizedQueryRepository {
    async fn record_or_increment(&self, bot_id: Uuid, text: &str) -> Result<()> {
        let now = Utc::now().timestamp_millis();
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO unrecognized_queries (bot_id, text, occurrences, first_seen, last_seen)
                 VALUES (?1, ?2, 1, ?3, ?3)
                 ON CONFLICT(bot_id, text) DO UPDATE SET
                    occurrences = occurrences + 1,
                    last_seen = excluded.last_seen",
                rusqlite::params![bot_id.to_string(), text, now],
            )
            .map_err(storage_err("Failed to record unrecognized query"))?;
            Ok(())
        })
    }

    async fn list(&self, bot_id: Uuid, limit: usize) -> Result<Vec<UnrecognizedQuery>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT text, occurrences, first_seen, last_seen
                     FROM unrecognized_queries
                     WHERE bot_id = ?1
                     ORDER BY occurrences DESC, last_seen DESC
                     LIMIT ?2",
                )
                .map_err(storage_err("Failed to prepare unrecognized query list"))?;

            let rows = stmt
                .query_map(rusqlite::params![bot_id.to_string(), limit as i64], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                })
                .map_err(storage_err("Failed to list unrecognized queries"))?;

            let mut queries = Vec::new();
            for row in rows {
                let (text, occurrences, first_seen, last_seen) =
                    row.map_err(storage_err("Failed to read unrecognized query"))?;
                queries.push(UnrecognizedQuery {
                    bot_id,
                    text,
                    occurrences: occurrences.max(0) as u64,
                    first_seen: from_millis(first_seen),
                    last_seen: from_millis(last_seen),
                });
            }
            Ok(queries)
        })
    }
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| ParlanceError::Storage(format!("Invalid UUID: {}", e)))
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}
