use crate::error::{ApiError, ApiJson};
use crate::AppState;
use axum::extract::{Path, Query, State};
use axum::Json;
use search_service::{
    AnswerResponse, AskRequest, HealthReport, SearchRequest, SearchResponse, SummaryResponse,
};
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Default, Deserialize)]
pub struct ModelParam {
    pub model: Option<String>,
}

/// POST /search
pub async fn search(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
    info!("Search request: '{}'", request.query);
    state
        .pipeline
        .search(request)
        .await
        .map(Json)
        .map_err(ApiError::from_search)
}

/// POST /summarize/:post_id
pub async fn summarize(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    Query(params): Query<ModelParam>,
) -> Result<Json<SummaryResponse>, ApiError> {
    state
        .pipeline
        .summarize(&post_id, params.model.as_deref())
        .await
        .map(Json)
        .map_err(ApiError::from_post_route)
}

/// POST /ask
pub async fn ask(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<AskRequest>,
) -> Result<Json<AnswerResponse>, ApiError> {
    state
        .pipeline
        .ask(request)
        .await
        .map(Json)
        .map_err(ApiError::from_post_route)
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthReport> {
    Json(state.pipeline.health().await)
}
