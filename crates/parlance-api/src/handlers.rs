//! Route handler functions for all API endpoints.
//!
//! Each handler extracts path, query and body parameters via axum
//! extractors, calls into AppState services, and returns JSON.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use parlance_core::store::BotStore;
use parlance_core::types::{
    Bot, ChunkMetadata, ConversationMessage, Intent, KnowledgeChunk, RouterResult, RoutingConfig,
    UnrecognizedQuery,
};
use parlance_storage::ChunkStatus;
use parlance_vector::{DocumentInput, IngestResult};

use crate::error::ApiError;
use crate::state::AppState;

const DEFAULT_UNRECOGNIZED_LIMIT: usize = 50;
const MAX_UNRECOGNIZED_LIMIT: usize = 500;

// =============================================================================
// Request / response types
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub generation_enabled: bool,
    pub ingestion_enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    pub message: String,
    /// When present, the exchange is appended to this session's log and
    /// earlier turns are used as generation context.
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UnrecognizedParams {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UnrecognizedResponse {
    pub queries: Vec<UnrecognizedQuery>,
}

/// Body of `PUT /bots/{bot_id}`; the ID comes from the path.
#[derive(Debug, Deserialize)]
pub struct BotRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub persona: String,
    #[serde(default)]
    pub tone: String,
    pub fallback_message: Option<String>,
    pub is_active: Option<bool>,
    #[serde(default)]
    pub routing: RoutingConfig,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DocumentResponse {
    pub status: String,
    pub chunks: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

// =============================================================================
// Handlers
// =============================================================================

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        generation_enabled: state.router.has_generator(),
        ingestion_enabled: state.ingestion.is_some(),
    })
}

/// POST /bots/{bot_id}/resolve - resolve one utterance.
pub async fn resolve(
    State(state): State<AppState>,
    Path(bot_id): Path<Uuid>,
    Json(body): Json<ResolveRequest>,
) -> Result<Json<RouterResult>, ApiError> {
    let session_id = body.session_id.as_deref();
    let result = state
        .router
        .resolve(bot_id, &body.message, session_id)
        .await?;

    if let Some(session_id) = session_id {
        let exchange = [
            ConversationMessage::user(body.message.trim()),
            ConversationMessage::bot(result.response_text.clone(), Some(result.resolution())),
        ];
        for message in exchange {
            if let Err(e) = state
                .conversations
                .append_message(bot_id, session_id, message)
                .await
            {
                warn!(%bot_id, session_id, error = %e, "Failed to append conversation message");
            }
        }
    }

    Ok(Json(result))
}

/// GET /bots/{bot_id}/unrecognized - curation list, most frequent first.
pub async fn unrecognized(
    State(state): State<AppState>,
    Path(bot_id): Path<Uuid>,
    Query(params): Query<UnrecognizedParams>,
) -> Result<Json<UnrecognizedResponse>, ApiError> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_UNRECOGNIZED_LIMIT)
        .min(MAX_UNRECOGNIZED_LIMIT);
    let queries = state.unrecognized.list(bot_id, limit).await?;
    Ok(Json(UnrecognizedResponse { queries }))
}

/// PUT /bots/{bot_id} - create or replace a bot.
pub async fn put_bot(
    State(state): State<AppState>,
    Path(bot_id): Path<Uuid>,
    Json(body): Json<BotRequest>,
) -> Result<Json<Bot>, ApiError> {
    if body.name.trim().is_empty() {
        return Err(ApiError::BadRequest("'name' must not be empty".to_string()));
    }
    let mut bot = Bot::new(body.name);
    bot.id = bot_id;
    bot.description = body.description;
    bot.persona = body.persona;
    bot.tone = body.tone;
    if let Some(message) = body.fallback_message {
        bot.fallback_message = message;
    }
    bot.is_active = body.is_active.unwrap_or(true);
    bot.routing = body.routing;

    state.bots.save_bot(&bot)?;
    info!(%bot_id, mode = bot.routing.mode.as_str(), "Bot saved");
    Ok(Json(bot))
}

/// POST /bots/{bot_id}/intents - create or replace an intent by name.
pub async fn put_intent(
    State(state): State<AppState>,
    Path(bot_id): Path<Uuid>,
    Json(intent): Json<Intent>,
) -> Result<(StatusCode, Json<Intent>), ApiError> {
    if intent.name.trim().is_empty() {
        return Err(ApiError::BadRequest("'name' must not be empty".to_string()));
    }
    require_bot(&state, bot_id).await?;
    state.bots.save_intent(bot_id, &intent)?;
    Ok((StatusCode::CREATED, Json(intent)))
}

/// POST /bots/{bot_id}/documents - chunk and store extracted document text.
///
/// With an embedding pipeline the chunks are also embedded, and indexed
/// only after they are saved; without one they are stored for lexical
/// retrieval only.
pub async fn ingest_document(
    State(state): State<AppState>,
    Path(bot_id): Path<Uuid>,
    Json(document): Json<DocumentInput>,
) -> Result<(StatusCode, Json<DocumentResponse>), ApiError> {
    require_bot(&state, bot_id).await?;

    let outcome = match &state.ingestion {
        Some(pipeline) => pipeline.prepare(bot_id, document).await?,
        None => chunk_without_embeddings(&state, document),
    };

    let chunks = match outcome {
        IngestResult::Stored { chunks } => chunks,
        IngestResult::Skipped { reason } => {
            return Ok((
                StatusCode::OK,
                Json(DocumentResponse {
                    status: "skipped".to_string(),
                    chunks: 0,
                    reason: Some(reason),
                }),
            ));
        }
    };

    state
        .bots
        .save_chunks(bot_id, &chunks, ChunkStatus::Completed)?;
    if let Some(pipeline) = &state.ingestion {
        pipeline.index(bot_id, &chunks).await?;
    }
    Ok((
        StatusCode::CREATED,
        Json(DocumentResponse {
            status: "stored".to_string(),
            chunks: chunks.len(),
            reason: None,
        }),
    ))
}

async fn require_bot(state: &AppState, bot_id: Uuid) -> Result<Bot, ApiError> {
    state
        .bots
        .find_bot(bot_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("bot not found: {}", bot_id)))
}

fn chunk_without_embeddings(state: &AppState, document: DocumentInput) -> IngestResult {
    if document.text.trim().is_empty() {
        return IngestResult::Skipped {
            reason: "Empty document text".to_string(),
        };
    }
    let chunks = state
        .chunker
        .split(&document.text)
        .into_iter()
        .enumerate()
        .map(|(chunk_index, text)| KnowledgeChunk {
            id: Uuid::new_v4(),
            text,
            metadata: ChunkMetadata {
                title: document.title.clone(),
                source: document.source.clone(),
                chunk_index,
            },
            embedding: None,
        })
        .collect();
    IngestResult::Stored { chunks }
}
