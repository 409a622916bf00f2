//! Vector knowledge retrieval: embed the query, then search the bot's collection.
//!
//! Retrieval is best-effort. A failing or slow embedding provider or vector
//! store yields an empty result set, which callers treat as "no retrieval".

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::embedding::EmbeddingProvider;
use crate::error::VectorError;
use crate::index::{ScoredChunk, VectorStore};

/// Result limit and score floor for a search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VectorSearchParams {
    pub limit: usize,
    pub min_score: f64,
}

impl Default for VectorSearchParams {
    fn default() -> Self {
        Self {
            limit: 5,
            min_score: 0.5,
        }
    }
}

/// Combines an embedding provider with a vector store.
#[derive(Clone)]
pub struct VectorRetriever {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    timeout: Duration,
}

impl VectorRetriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        timeout: Duration,
    ) -> Self {
        Self {
            embedder,
            store,
            timeout,
        }
    }

    /// Chunks relevant to `query`, best first, never below `params.min_score`.
    ///
    /// Never fails: provider errors and timeouts are logged and produce an
    /// empty list.
    pub async fn retrieve(
        &self,
        bot_id: Uuid,
        query: &str,
        params: VectorSearchParams,
    ) -> Vec<ScoredChunk> {
        match tokio::time::timeout(self.timeout, self.search(bot_id, query, params)).await {
            Ok(Ok(hits)) => {
                debug!(%bot_id, hits = hits.len(), "Vector retrieval complete");
                hits
            }
            Ok(Err(e)) => {
                warn!(%bot_id, error = %e, "Vector retrieval failed");
                Vec::new()
            }
            Err(_) => {
                warn!(
                    %bot_id,
                    error = %VectorError::Timeout(self.timeout),
                    "Vector retrieval failed"
                );
                Vec::new()
            }
        }
    }

    async fn search(
        &self,
        bot_id: Uuid,
        query: &str,
        params: VectorSearchParams,
    ) -> Result<Vec<ScoredChunk>, VectorError> {
        if query.trim().is_empty() || params.limit == 0 {
            return Ok(Vec::new());
        }
        let query_vec = self.embedder.embed_query(query).await?;
        let mut hits = self
            .store
            .search(bot_id, &query_vec, params.limit, params.min_score)
            .await?;

        // Stores are trusted to rank, but the floor and order are enforced here too.
        hits.retain(|h| h.score >= params.min_score);
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(params.limit);
        Ok(hits)
    }
}
