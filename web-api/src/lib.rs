//! HTTP surface over the search pipeline.

pub mod error;
pub mod handlers;

pub use error::{ApiError, ApiJson};

use axum::routing::{get, post};
use axum::Router;
use search_service::SearchPipeline;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<SearchPipeline>,
}

impl AppState {
    pub fn new(pipeline: SearchPipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/search", post(handlers::search))
        .route("/summarize/:post_id", post(handlers::summarize))
        .route("/ask", post(handlers::ask))
        .route("/health", get(handlers::health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
