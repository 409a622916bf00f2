//! Parlance application binary - composition root.
//!
//! 1. Parse CLI arguments and load configuration from TOML
//! 2. Initialize tracing
//! 3. Open the SQLite database
//! 4. Build whichever providers are configured (generation, embeddings)
//! 5. Assemble the router and start the axum API server

mod cli;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};

use parlance_api::{start_server, AppState};
use parlance_chat::{build_provider, GenerativeResponder, Router};
use parlance_core::config::{EmbeddingConfig, GenerationConfig, ParlanceConfig};
use parlance_core::store::BotStore;
use parlance_storage::{BotRepository, ConversationRepository, Database, UnrecognizedQueryRepository};
use parlance_vector::{
    EmbeddingProvider, IngestionPipeline, OpenAiEmbeddingProvider, RateLimitedEmbedder,
    RecursiveChunker, VectorIndex, VectorRecord, VectorRetriever, VectorSearchParams, VectorStore,
};

use cli::CliArgs;

/// Expand ~ to the home directory in a path string.
fn resolve_data_dir(data_dir: &str) -> PathBuf {
    match data_dir.strip_prefix("~/") {
        Some(rest) => {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(rest)
        }
        None => PathBuf::from(data_dir),
    }
}

/// Generative responder from the `generation` section, if a primary
/// provider is configured and its key resolves.
fn build_generator(config: &GenerationConfig) -> Option<GenerativeResponder> {
    let primary_config = config.primary.as_ref()?;
    let primary = match build_provider(primary_config) {
        Ok(provider) => provider,
        Err(e) => {
            warn!(error = %e, "Primary generation provider unavailable, generation disabled");
            return None;
        }
    };
    info!(
        provider = primary.name(),
        model = primary.model(),
        "Primary generation provider ready"
    );

    let mut responder =
        GenerativeResponder::new(primary, Duration::from_secs(config.request_timeout_secs))
            .with_history_turns(config.history_turns);

    if let Some(secondary_config) = &config.secondary {
        match build_provider(secondary_config) {
            Ok(secondary) => {
                info!(
                    provider = secondary.name(),
                    model = secondary.model(),
                    "Secondary generation provider ready"
                );
                responder = responder.with_secondary(secondary);
            }
            Err(e) => warn!(error = %e, "Secondary generation provider unavailable"),
        }
    }
    Some(responder)
}

fn build_embedder(config: &EmbeddingConfig) -> Option<Arc<dyn EmbeddingProvider>> {
    let api_key = match config.api_key() {
        Ok(key) => key,
        Err(e) => {
            warn!(error = %e, "Embedding provider unavailable, vector search disabled");
            return None;
        }
    };
    let provider = OpenAiEmbeddingProvider::new(
        config.model.clone(),
        config.endpoint.clone(),
        api_key,
        config.dimensions,
    )
    .with_prefixes(config.query_prefix.clone(), config.document_prefix.clone());
    info!(model = %config.model, dims = config.dimensions, "Embedding provider ready");
    Some(Arc::new(provider))
}

/// Load persisted chunk embeddings of every active bot into the index.
async fn warm_vector_index(bots: &BotRepository, index: &VectorIndex, dims: usize) {
    let bot_ids = match bots.list_active_bot_ids() {
        Ok(ids) => ids,
        Err(e) => {
            warn!(error = %e, "Failed to list bots for vector index warm-up");
            return;
        }
    };

    for bot_id in bot_ids {
        let chunks = match bots.find_active_completed_chunks(bot_id).await {
            Ok(chunks) => chunks,
            Err(e) => {
                warn!(%bot_id, error = %e, "Failed to load chunks for vector index");
                continue;
            }
        };
        let records: Vec<VectorRecord> = chunks
            .into_iter()
            .filter_map(|chunk| {
                let embedding = chunk.embedding.filter(|e| e.len() == dims)?;
                Some(VectorRecord {
                    id: chunk.id,
                    embedding,
                    text: chunk.text,
                    metadata: chunk.metadata,
                })
            })
            .collect();
        if records.is_empty() {
            continue;
        }
        let count = records.len();
        match index.upsert(bot_id, records).await {
            Ok(()) => info!(%bot_id, count, "Vector collection restored"),
            Err(e) => warn!(%bot_id, error = %e, "Failed to restore vector collection"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let mut config = ParlanceConfig::load_or_default(&config_file);
    if let Some(dir) = args.resolve_data_dir() {
        config.general.data_dir = dir;
    }
    if let Some(level) = args.log_level.clone() {
        config.general.log_level = level;
    }
    let port = args.resolve_port(config.general.port);

    // Tracing. RUST_LOG wins over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.general.log_level)),
        )
        .init();

    info!("Starting Parlance v{}", env!("CARGO_PKG_VERSION"));
    info!(path = %config_file.display(), "Configuration resolved");

    // Storage.
    let data_dir = resolve_data_dir(&config.general.data_dir);
    let db_path = data_dir.join("parlance.db");
    let db = Arc::new(Database::new(&db_path)?);
    info!(path = %db_path.display(), "SQLite database opened");

    let bots = Arc::new(BotRepository::new(Arc::clone(&db)));
    let mut router = Router::new(
        bots.clone(),
        Arc::new(ConversationRepository::new(Arc::clone(&db))),
        Arc::new(UnrecognizedQueryRepository::new(Arc::clone(&db))),
    )
    .with_settings(config.routing.clone())
    .with_lexical_strategy(config.retrieval.lexical_strategy)
    .with_grounding_limit(config.retrieval.grounding_limit);

    // Generation.
    match build_generator(&config.generation) {
        Some(generator) => router = router.with_generator(generator),
        None => info!("No generative provider configured, routing degrades to intent_only"),
    }

    // Embeddings and vector search.
    let chunker = RecursiveChunker::new(config.ingestion.chunk_size, config.ingestion.chunk_overlap);
    let mut pipeline = None;
    if let Some(embedding) = config.embedding.as_ref() {
        if let Some(embedder) = build_embedder(embedding) {
            let index = Arc::new(VectorIndex::new());
            warm_vector_index(&bots, &index, embedding.dimensions).await;

            router = router.with_vector_retriever(
                VectorRetriever::new(
                    Arc::clone(&embedder),
                    index.clone(),
                    Duration::from_secs(config.retrieval.embedding_timeout_secs),
                ),
                VectorSearchParams {
                    limit: config.retrieval.vector_limit,
                    min_score: config.retrieval.vector_min_score,
                },
            );

            let throttled: Arc<dyn EmbeddingProvider> = Arc::new(
                RateLimitedEmbedder::from_requests_per_minute(embedder, embedding.requests_per_minute),
            );
            pipeline = Some(IngestionPipeline::new(chunker.clone(), throttled, index));
        }
    }

    let mut state = AppState::new(db, router).with_chunker(chunker);
    if let Some(pipeline) = pipeline {
        state = state.with_ingestion(pipeline);
    }

    start_server(port, state).await?;
    Ok(())
}
