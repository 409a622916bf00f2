//! Parlance Vector crate - embedding providers, per-bot vector index,
//! vector knowledge retrieval, document chunking, and the ingestion pipeline.
//!
//! Every provider sits behind a trait so the router can run with, without,
//! or against test doubles of the embedding and vector-store capabilities.

pub mod chunker;
pub mod embedding;
pub mod error;
pub mod index;
pub mod pipeline;
pub mod rate_limit;
pub mod search;

pub use chunker::RecursiveChunker;
pub use embedding::{EmbeddingProvider, MockEmbedding, OpenAiEmbeddingProvider};
pub use error::VectorError;
pub use index::{CollectionStats, ScoredChunk, VectorIndex, VectorRecord, VectorStore};
pub use pipeline::{DocumentInput, IngestResult, IngestionPipeline};
pub use rate_limit::RateLimitedEmbedder;
pub use search::{VectorRetriever, VectorSearchParams};
