//! Embedding provider trait and implementations.
//!
//! - `OpenAiEmbeddingProvider` talks to any OpenAI-compatible `/embeddings`
//!   endpoint (OpenAI, Ollama's `/v1`, vLLM, ...). Optional prefixes let
//!   asymmetric models tell queries from documents.
//! - `MockEmbedding` provides deterministic hashed bag-of-words vectors for
//!   testing, so texts that share words land close together.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::VectorError;

/// Service for generating text embeddings.
///
/// `embed` is used for documents at ingestion time and `embed_query` for
/// user queries; providers with a query-specific strategy override the latter.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding for a document text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, VectorError>;

    /// Generate an embedding for a search query.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, VectorError> {
        self.embed(text).await
    }

    /// Generate embeddings for several document texts, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, VectorError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }

    /// Dimensionality of the vectors produced.
    fn dimensions(&self) -> usize;

    /// Model identifier, for logs and metadata.
    fn model_name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// OpenAiEmbeddingProvider
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: Option<usize>,
}

/// Embedding provider for OpenAI-compatible HTTP endpoints.
pub struct OpenAiEmbeddingProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    dims: usize,
    query_prefix: Option<String>,
    document_prefix: Option<String>,
}

impl OpenAiEmbeddingProvider {
    /// Create a new provider.
    ///
    /// `endpoint` defaults to `https://api.openai.com/v1`. `api_key` may be
    /// `None` for local servers that do not authenticate.
    pub fn new(
        model: impl Into<String>,
        endpoint: Option<String>,
        api_key: Option<String>,
        dims: usize,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key,
            model: model.into(),
            dims,
            query_prefix: None,
            document_prefix: None,
        }
    }

    /// Set the prefixes prepended to queries and documents.
    pub fn with_prefixes(
        mut self,
        query_prefix: Option<String>,
        document_prefix: Option<String>,
    ) -> Self {
        self.query_prefix = query_prefix;
        self.document_prefix = document_prefix;
        self
    }

    fn prefixed(prefix: &Option<String>, text: &str) -> String {
        match prefix {
            Some(p) => format!("{}{}", p, text),
            None => text.to_string(),
        }
    }

    async fn request(&self, input: Vec<String>) -> Result<Vec<Vec<f32>>, VectorError> {
        let expected = input.len();
        let url = format!("{}/embeddings", self.endpoint);
        let body = EmbeddingRequest {
            model: &self.model,
            input,
        };

        let mut request = self.client.post(&url).json(&body);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(VectorError::Embedding(format!(
                "embedding API error {status}: {body}"
            )));
        }

        let parsed: EmbeddingResponse = response.json().await?;
        let vectors = order_embeddings(parsed.data);
        if vectors.len() != expected {
            return Err(VectorError::Embedding(format!(
                "expected {} embeddings, received {}",
                expected,
                vectors.len()
            )));
        }
        debug!(model = %self.model, count = vectors.len(), "Embeddings received");
        Ok(vectors)
    }

    async fn embed_one(&self, text: String) -> Result<Vec<f32>, VectorError> {
        self.request(vec![text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| VectorError::Embedding("empty embedding response".to_string()))
    }
}

/// Restore input order when the server reports per-item indexes.
fn order_embeddings(mut data: Vec<EmbeddingData>) -> Vec<Vec<f32>> {
    if data.iter().all(|d| d.index.is_some()) {
        data.sort_by_key(|d| d.index);
    }
    data.into_iter().map(|d| d.embedding).collect()
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, VectorError> {
        self.embed_one(Self::prefixed(&self.document_prefix, text))
            .await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, VectorError> {
        self.embed_one(Self::prefixed(&self.query_prefix, text)).await
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, VectorError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let input = texts
            .iter()
            .map(|t| Self::prefixed(&self.document_prefix, t))
            .collect();
        self.request(input).await
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// ---------------------------------------------------------------------------
// MockEmbedding
// ---------------------------------------------------------------------------

/// Mock embedding service that hashes each lowercase word into a bucket.
///
/// Identical inputs always produce identical unit vectors, and texts sharing
/// words have a high cosine similarity, which is enough to exercise ranking
/// and thresholds without a real model.
#[derive(Debug, Clone)]
pub struct MockEmbedding {
    dims: usize,
}

impl MockEmbedding {
    pub fn new() -> Self {
        Self::with_dimensions(384)
    }

    pub fn with_dimensions(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    fn hash_to_vector(&self, text: &str) -> Vec<f32> {
        let mut result = vec![0.0f32; self.dims];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            let bucket = (hasher.finish() % self.dims as u64) as usize;
            result[bucket] += 1.0;
        }

        let norm: f32 = result.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for val in &mut result {
                *val /= norm;
            }
        }
        result
    }
}

impl Default for MockEmbedding {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, VectorError> {
        if text.trim().is_empty() {
            return Err(VectorError::Embedding(
                "Cannot embed empty text".to_string(),
            ));
        }
        Ok(self.hash_to_vector(text))
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn model_name(&self) -> &str {
        "mock-bag-of-words"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dot(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    async fn test_mock_embedding_dimension() {
        let service = MockEmbedding::new();
        let vec = service.embed("hello world").await.unwrap();
        assert_eq!(vec.len(), 384);
        assert_eq!(service.dimensions(), 384);
    }

    #[tokio::test]
    async fn test_mock_embedding_zero_dimensions_clamped() {
        let service = MockEmbedding::with_dimensions(0);
        assert_eq!(service.dimensions(), 1);
        let vec = service.embed("hello world").await.unwrap();
        assert_eq!(vec.len(), 1);
    }

    #[tokio::test]
    async fn test_mock_embedding_deterministic() {
        let service = MockEmbedding::new();
        let v1 = service.embed("same text").await.unwrap();
        let v2 = service.embed("same text").await.unwrap();
        assert_eq!(v1, v2);
    }

    #[tokio::test]
    async fn test_mock_embedding_unit_length() {
        let service = MockEmbedding::with_dimensions(64);
        let v = service.embed("refund policy for damaged items").await.unwrap();
        assert!((dot(&v, &v) - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_mock_embedding_shared_words_are_closer() {
        let service = MockEmbedding::with_dimensions(256);
        let query = service.embed("refund policy").await.unwrap();
        let related = service.embed("our refund policy explained").await.unwrap();
        let unrelated = service.embed("opening hours on sunday").await.unwrap();
        assert!(dot(&query, &related) > dot(&query, &unrelated));
    }

    #[tokio::test]
    async fn test_mock_embedding_empty_text() {
        let service = MockEmbedding::new();
        assert!(service.embed("").await.is_err());
        assert!(service.embed("   ").await.is_err());
    }

    #[tokio::test]
    async fn test_default_embed_batch_preserves_order() {
        let service = MockEmbedding::with_dimensions(32);
        let texts = vec!["alpha".to_string(), "beta".to_string()];
        let batch = service.embed_batch(&texts).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0], service.embed("alpha").await.unwrap());
        assert_eq!(batch[1], service.embed("beta").await.unwrap());
    }

    #[test]
    fn test_openai_provider_defaults() {
        let provider = OpenAiEmbeddingProvider::new("text-embedding-3-small", None, None, 1536);
        assert_eq!(provider.endpoint, "https://api.openai.com/v1");
        assert_eq!(provider.dimensions(), 1536);
        assert_eq!(provider.model_name(), "text-embedding-3-small");
    }

    #[test]
    fn test_openai_provider_trims_endpoint_slash() {
        let provider = OpenAiEmbeddingProvider::new(
            "nomic-embed-text",
            Some("http://localhost:11434/v1/".to_string()),
            None,
            768,
        );
        assert_eq!(provider.endpoint, "http://localhost:11434/v1");
    }

    #[test]
    fn test_prefixes_applied() {
        let query = Some("search_query: ".to_string());
        assert_eq!(
            OpenAiEmbeddingProvider::prefixed(&query, "refunds"),
            "search_query: refunds"
        );
        assert_eq!(OpenAiEmbeddingProvider::prefixed(&None, "refunds"), "refunds");
    }

    #[test]
    fn test_order_embeddings_by_index() {
        let data: EmbeddingResponse = serde_json::from_str(
            r#"{"data":[
                {"embedding":[2.0],"index":1},
                {"embedding":[1.0],"index":0}
            ]}"#,
        )
        .unwrap();
        assert_eq!(order_embeddings(data.data), vec![vec![1.0], vec![2.0]]);
    }

    #[test]
    fn test_order_embeddings_without_index() {
        let data: EmbeddingResponse =
            serde_json::from_str(r#"{"data":[{"embedding":[3.0]},{"embedding":[4.0]}]}"#)
                .unwrap();
        assert_eq!(order_embeddings(data.data), vec![vec![3.0], vec![4.0]]);
    }
}
