//! Application state shared across all route handlers.

use std::sync::Arc;
use std::time::Instant;

use parlance_chat::Router;
use parlance_core::store::{ConversationStore, UnrecognizedQueryStore};
use parlance_storage::{BotRepository, ConversationRepository, Database, UnrecognizedQueryRepository};
use parlance_vector::{IngestionPipeline, RecursiveChunker};

/// Shared application state. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<Router>,
    /// Bot, intent and chunk persistence.
    pub bots: Arc<BotRepository>,
    pub conversations: Arc<dyn ConversationStore>,
    pub unrecognized: Arc<dyn UnrecognizedQueryStore>,
    /// Splits documents when no embedding pipeline is configured.
    pub chunker: RecursiveChunker,
    /// Embeds and indexes documents. `None` without an embedding provider.
    pub ingestion: Option<Arc<IngestionPipeline>>,
    pub start_time: Instant,
}

impl AppState {
    /// State backed by `database`, resolving through `router`.
    pub fn new(database: Arc<Database>, router: Router) -> Self {
        Self {
            router: Arc::new(router),
            bots: Arc::new(BotRepository::new(Arc::clone(&database))),
            conversations: Arc::new(ConversationRepository::new(Arc::clone(&database))),
            unrecognized: Arc::new(UnrecognizedQueryRepository::new(database)),
            chunker: RecursiveChunker::default(),
            ingestion: None,
            start_time: Instant::now(),
        }
    }

    pub fn with_chunker(mut self, chunker: RecursiveChunker) -> Self {
        self.chunker = chunker;
        self
    }

    pub fn with_ingestion(mut self, pipeline: IngestionPipeline) -> Self {
        self.ingestion = Some(Arc::new(pipeline));
        self
    }
}
