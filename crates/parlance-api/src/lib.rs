//! Parlance API crate - axum HTTP surface over the resolution engine.
//!
//! Exposes utterance resolution, the unrecognized-query curation list,
//! bot and intent provisioning, and document ingestion.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::{create_router, start_server};
pub use state::AppState;
