//! Serialized, rate-limited embedding calls.
//!
//! Providers enforce a requests-per-minute ceiling. `RateLimitedEmbedder`
//! turns that ceiling into a fixed minimum interval between calls and
//! serializes every caller behind one lock, so concurrent ingestions share
//! the same budget instead of each assuming it owns it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;
use tracing::debug;

use crate::embedding::EmbeddingProvider;
use crate::error::VectorError;

/// Wraps an embedding provider with a fixed inter-call delay.
pub struct RateLimitedEmbedder {
    inner: Arc<dyn EmbeddingProvider>,
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl RateLimitedEmbedder {
    /// Create a wrapper spacing calls at least `min_interval` apart.
    pub fn new(inner: Arc<dyn EmbeddingProvider>, min_interval: Duration) -> Self {
        Self {
            inner,
            min_interval,
            last_call: Mutex::new(None),
        }
    }

    /// Create a wrapper from a requests-per-minute ceiling. Zero disables spacing.
    pub fn from_requests_per_minute(inner: Arc<dyn EmbeddingProvider>, rpm: u32) -> Self {
        let min_interval = if rpm == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(60_000 / u64::from(rpm))
        };
        Self::new(inner, min_interval)
    }

    /// Take the lock and sleep until the interval since the previous call has elapsed.
    ///
    /// The caller holds the returned guard for the duration of its provider
    /// call and stamps it afterwards.
    async fn wait_turn(&self) -> MutexGuard<'_, Option<Instant>> {
        let last = self.last_call.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                let wait = self.min_interval - elapsed;
                debug!(wait_ms = wait.as_millis() as u64, "Embedding rate limit wait");
                tokio::time::sleep(wait).await;
            }
        }
        last
    }
}

#[async_trait]
impl EmbeddingProvider for RateLimitedEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, VectorError> {
        let mut turn = self.wait_turn().await;
        let result = self.inner.embed(text).await;
        *turn = Some(Instant::now());
        result
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, VectorError> {
        let mut turn = self.wait_turn().await;
        let result = self.inner.embed_query(text).await;
        *turn = Some(Instant::now());
        result
    }

    /// One provider call per text, each waiting its turn.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, VectorError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}
