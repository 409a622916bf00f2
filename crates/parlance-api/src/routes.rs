//! Router setup with all API routes and middleware.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use parlance_core::error::ParlanceError;

use crate::handlers;
use crate::state::AppState;

/// Create the axum Router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    // Chat widgets call the API from arbitrary origins.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/bots/{bot_id}", put(handlers::put_bot))
        .route("/bots/{bot_id}/resolve", post(handlers::resolve))
        .route("/bots/{bot_id}/unrecognized", get(handlers::unrecognized))
        .route("/bots/{bot_id}/intents", post(handlers::put_intent))
        .route(
            "/bots/{bot_id}/documents",
            post(handlers::ingest_document).layer(DefaultBodyLimit::max(8 * 1024 * 1024)),
        )
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve the API on `127.0.0.1:{port}` until the process exits.
pub async fn start_server(port: u16, state: AppState) -> Result<(), ParlanceError> {
    let addr = format!("127.0.0.1:{}", port);
    let router = create_router(state);

    tracing::info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}
