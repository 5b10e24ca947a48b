use axum::extract::rejection::JsonRejection;
use axum::extract::FromRequest;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use threadscout_core::{CoreError, ErrorExt, RedditApiError};

pub const SEARCH_FAILED: &str = "An error occurred while processing your search. Please try again.";
pub const REQUEST_FAILED: &str = "An error occurred while processing your request. Please try again.";

/// Error body is always `{"detail": "..."}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    /// Search only reports bad input; everything else is one generic message.
    pub fn from_search(error: CoreError) -> Self {
        match error {
            CoreError::InvalidInput { message } => Self::new(StatusCode::BAD_REQUEST, message),
            other => {
                other.log_error();
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, SEARCH_FAILED)
            }
        }
    }

    /// Post routes also distinguish posts that do not exist.
    pub fn from_post_route(error: CoreError) -> Self {
        match error {
            CoreError::InvalidInput { message } => Self::new(StatusCode::BAD_REQUEST, message),
            CoreError::NotFound { .. } | CoreError::RedditApi(RedditApiError::PostNotFound { .. }) => {
                error.log_warn();
                Self::new(StatusCode::NOT_FOUND, error.user_friendly_message())
            }
            other => {
                other.log_error();
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, REQUEST_FAILED)
            }
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!("Rejected request body: {}", rejection.body_text());
        Self::new(rejection.status(), rejection.body_text())
    }
}

/// `Json` whose rejections use the `{"detail": ...}` body.
#[derive(Debug, FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}
