//! Knowledge ingestion pipeline.
//!
//! Documents arrive as already-extracted text and go through:
//! 1. Validation
//! 2. Recursive chunking with overlap
//! 3. Embedding generation (rate-limited by the provider wrapper)
//! 4. Upsert into the bot's vector collection
//!
//! Steps 1-3 happen in `prepare` and step 4 in `index`, so callers can
//! persist the embedded chunks in between. A chunk only becomes searchable
//! once it has been saved.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use parlance_core::types::{ChunkMetadata, KnowledgeChunk};

use crate::chunker::RecursiveChunker;
use crate::embedding::EmbeddingProvider;
use crate::error::VectorError;
use crate::index::{VectorRecord, VectorStore};

/// Plain text of a source document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentInput {
    pub title: String,
    #[serde(default)]
    pub source: String,
    pub text: String,
}

/// Result of an ingestion attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IngestResult {
    /// Chunks were embedded and stored, in document order.
    Stored { chunks: Vec<KnowledgeChunk> },
    /// Nothing was stored (e.g., empty text).
    Skipped { reason: String },
}

/// Chunks, embeds and stores documents for one vector store.
pub struct IngestionPipeline {
    chunker: RecursiveChunker,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
}

impl IngestionPipeline {
    pub fn new(
        chunker: RecursiveChunker,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        Self {
            chunker,
            embedder,
            store,
        }
    }

    /// Chunk and embed one document without touching the vector store.
    ///
    /// The returned chunks carry their embeddings; pass them to `index`
    /// once they are persisted.
    pub async fn prepare(
        &self,
        bot_id: Uuid,
        document: DocumentInput,
    ) -> Result<IngestResult, VectorError> {
        if document.text.trim().is_empty() {
            debug!(%bot_id, title = %document.title, "Skipping document with empty text");
            return Ok(IngestResult::Skipped {
                reason: "Empty document text".to_string(),
            });
        }

        let texts = self.chunker.split(&document.text);
        if texts.is_empty() {
            return Ok(IngestResult::Skipped {
                reason: "Document produced no chunks".to_string(),
            });
        }

        let embeddings = self.embedder.embed_batch(&texts).await?;
        if embeddings.len() != texts.len() {
            return Err(VectorError::Embedding(format!(
                "expected {} embeddings, received {}",
                texts.len(),
                embeddings.len()
            )));
        }

        let chunks: Vec<KnowledgeChunk> = texts
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(chunk_index, (text, embedding))| KnowledgeChunk {
                id: Uuid::new_v4(),
                text,
                metadata: ChunkMetadata {
                    title: document.title.clone(),
                    source: document.source.clone(),
                    chunk_index,
                },
                embedding: Some(embedding),
            })
            .collect();

        debug!(
            %bot_id,
            title = %document.title,
            chunks = chunks.len(),
            model = self.embedder.model_name(),
            "Document embedded"
        );
        Ok(IngestResult::Stored { chunks })
    }

    /// Make embedded chunks searchable in the bot's collection.
    ///
    /// Chunks without an embedding are left out.
    pub async fn index(&self, bot_id: Uuid, chunks: &[KnowledgeChunk]) -> Result<(), VectorError> {
        let records: Vec<VectorRecord> = chunks
            .iter()
            .filter_map(|c| {
                Some(VectorRecord {
                    id: c.id,
                    embedding: c.embedding.clone()?,
                    text: c.text.clone(),
                    metadata: c.metadata.clone(),
                })
            })
            .collect();
        let count = records.len();
        self.store.upsert(bot_id, records).await?;
        info!(%bot_id, chunks = count, "Chunks indexed");
        Ok(())
    }
}
