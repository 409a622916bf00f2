//! Fire-and-forget logging of utterances nothing could answer.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use parlance_core::store::UnrecognizedQueryStore;

/// Records unanswered utterances without blocking the response path.
#[derive(Clone)]
pub struct UnrecognizedQueryLogger {
    store: Arc<dyn UnrecognizedQueryStore>,
}

impl UnrecognizedQueryLogger {
    pub fn new(store: Arc<dyn UnrecognizedQueryStore>) -> Self {
        Self { store }
    }

    /// Spawn a detached write. Failures are logged and dropped.
    ///
    /// The handle is returned for tests; callers normally ignore it.
    pub fn record(&self, bot_id: Uuid, text: &str) -> JoinHandle<()> {
        let store = Arc::clone(&self.store);
        let text = text.trim().to_string();
        tokio::spawn(async move {
            match store.record_or_increment(bot_id, &text).await {
                Ok(()) => debug!(%bot_id, "Unrecognized query recorded"),
                Err(e) => warn!(%bot_id, error = %e, "Failed to record unrecognized query"),
            }
        })
    }
}
