//! Per-bot vector collections with brute-force cosine similarity search.
//!
//! Every bot owns a dedicated collection. Search is O(n) over that
//! collection, which is acceptable for knowledge bases of a few thousand
//! chunks. Remote stores implement `VectorStore` the same way.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use parlance_core::types::ChunkMetadata;

use crate::error::VectorError;

/// A chunk and its embedding, ready to be stored.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub id: Uuid,
    pub embedding: Vec<f32>,
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// A single hit returned from a vector search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk_id: Uuid,
    /// Cosine similarity score.
    pub score: f64,
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// Size information about a bot's collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionStats {
    pub count: usize,
}

/// Storage and nearest-neighbour search over per-bot collections.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or replace records in the bot's collection.
    async fn upsert(&self, bot_id: Uuid, records: Vec<VectorRecord>) -> Result<(), VectorError>;

    /// Up to `limit` records scoring at least `min_score`, best first.
    async fn search(
        &self,
        bot_id: Uuid,
        query: &[f32],
        limit: usize,
        min_score: f64,
    ) -> Result<Vec<ScoredChunk>, VectorError>;

    async fn stats(&self, bot_id: Uuid) -> Result<CollectionStats, VectorError>;
}

#[derive(Debug, Clone)]
struct VectorEntry {
    embedding: Vec<f32>,
    text: String,
    metadata: ChunkMetadata,
}

#[derive(Debug, Default)]
struct Collection {
    /// Fixed by the first record stored.
    dimensions: Option<usize>,
    entries: HashMap<Uuid, VectorEntry>,
}

/// In-memory vector store keyed by bot.
///
/// Thread-safe via interior RwLock; cloning shares the same collections.
#[derive(Debug, Clone, Default)]
pub struct VectorIndex {
    collections: Arc<RwLock<HashMap<Uuid, Collection>>>,
}

impl VectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned<E: std::fmt::Display>(e: E) -> VectorError {
        VectorError::Index(format!("Lock poisoned: {}", e))
    }

    /// Total number of vectors across every collection.
    pub fn len(&self) -> usize {
        self.collections
            .read()
            .map(|c| c.values().map(|col| col.entries.len()).sum())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl VectorStore for VectorIndex {
    async fn upsert(&self, bot_id: Uuid, records: Vec<VectorRecord>) -> Result<(), VectorError> {
        let mut collections = self.collections.write().map_err(Self::poisoned)?;
        let collection = collections.entry(bot_id).or_default();

        let expected = collection
            .dimensions
            .or_else(|| records.first().map(|r| r.embedding.len()));
        if let Some(expected) = expected {
            if let Some(bad) = records.iter().find(|r| r.embedding.len() != expected) {
                return Err(VectorError::DimensionMismatch {
                    expected,
                    actual: bad.embedding.len(),
                });
            }
            collection.dimensions = Some(expected);
        }

        for record in records {
            collection.entries.insert(
                record.id,
                VectorEntry {
                    embedding: record.embedding,
                    text: record.text,
                    metadata: record.metadata,
                },
            );
        }
        Ok(())
    }

    async fn search(
        &self,
        bot_id: Uuid,
        query: &[f32],
        limit: usize,
        min_score: f64,
    ) -> Result<Vec<ScoredChunk>, VectorError> {
        let collections = self.collections.read().map_err(Self::poisoned)?;
        let Some(collection) = collections.get(&bot_id) else {
            return Ok(Vec::new());
        };

        if let Some(expected) = collection.dimensions {
            if expected != query.len() {
                return Err(VectorError::DimensionMismatch {
                    expected,
                    actual: query.len(),
                });
            }
        }

        let mut scored: Vec<ScoredChunk> = collection
            .entries
            .iter()
            .filter_map(|(id, entry)| {
                let score = cosine_similarity(query, &entry.embedding);
                (score >= min_score).then(|| ScoredChunk {
                    chunk_id: *id,
                    score,
                    text: entry.text.clone(),
                    metadata: entry.metadata.clone(),
                })
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored)
    }

    async fn stats(&self, bot_id: Uuid) -> Result<CollectionStats, VectorError> {
        let collections = self.collections.read().map_err(Self::poisoned)?;
        Ok(CollectionStats {
            count: collections.get(&bot_id).map_or(0, |c| c.entries.len()),
        })
    }
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 on length mismatch or if either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (*x as f64) * (*y as f64))
        .sum();

    let mag_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let mag_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}
