use crate::error::*;
use std::fmt::Display;
use tracing::{error, warn};

/// Classification shared by every error in the workspace. Only the code,
/// the message and retryability differ per type; logging is uniform.
pub trait ErrorExt: Display {
    fn error_code(&self) -> &'static str;

    fn user_friendly_message(&self) -> String;

    /// Logged with every error so transient upstream trouble is easy to
    /// tell apart from bad input or bad config.
    fn is_retryable(&self) -> bool {
        false
    }

    fn log_error(&self) -> &Self
    where
        Self: Sized,
    {
        error!(
            code = self.error_code(),
            retryable = self.is_retryable(),
            "{}",
            self
        );
        self
    }

    fn log_warn(&self) -> &Self
    where
        Self: Sized,
    {
        warn!(code = self.error_code(), "{}", self);
        self
    }
}

impl CoreError {
    /// True when the failure came from an upstream deadline rather than a
    /// refusal or a bad response.
    pub fn is_timeout(&self) -> bool {
        match self {
            CoreError::Llm(LlmError::RequestTimeout { .. }) => true,
            CoreError::RedditApi(RedditApiError::RequestTimeout) => true,
            CoreError::Network(e) => e.is_timeout(),
            _ => false,
        }
    }
}

impl ErrorExt for CoreError {
    /// Wrapped errors report their own, more specific code.
    fn error_code(&self) -> &'static str {
        match self {
            CoreError::RedditApi(e) => e.error_code(),
            CoreError::Llm(e) => e.error_code(),
            CoreError::Index(e) => e.error_code(),
            CoreError::Config(e) => e.error_code(),
            CoreError::Serialization(_) => "SERIALIZATION",
            CoreError::Network(_) => "NETWORK",
            CoreError::InvalidInput { .. } => "INVALID_INPUT",
            CoreError::NotFound { .. } => "NOT_FOUND",
            CoreError::Internal { .. } => "INTERNAL",
            CoreError::RequestFailed { .. } => "REQUEST_FAILED",
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            CoreError::RedditApi(e) => e.user_friendly_message(),
            CoreError::Llm(e) => e.user_friendly_message(),
            CoreError::Index(e) => e.user_friendly_message(),
            CoreError::Config(e) => e.user_friendly_message(),
            CoreError::Network(_) => "Could not reach an upstream service.".to_string(),
            CoreError::InvalidInput { message } => message.clone(),
            CoreError::NotFound { resource } => format!("{} not found", resource),
            _ => "Something went wrong. Please try again later.".to_string(),
        }
    }

    fn is_retryable(&self) -> bool {
        match self {
            CoreError::RedditApi(e) => e.is_retryable(),
            CoreError::Llm(e) => e.is_retryable(),
            CoreError::Index(e) => e.is_retryable(),
            CoreError::Network(_) => true,
            CoreError::RequestFailed { status_code, .. } => {
                matches!(status_code, Some(429) | Some(500..=599))
            }
            _ => false,
        }
    }
}

impl ErrorExt for RedditApiError {
    fn error_code(&self) -> &'static str {
        match self {
            RedditApiError::AuthenticationFailed { .. } => "REDDIT_AUTH_FAILED",
            RedditApiError::RateLimitExceeded { .. } => "REDDIT_RATE_LIMIT",
            RedditApiError::Forbidden { .. } => "REDDIT_FORBIDDEN",
            RedditApiError::PostNotFound { .. } => "REDDIT_POST_NOT_FOUND",
            RedditApiError::InvalidToken => "REDDIT_INVALID_TOKEN",
            RedditApiError::CircuitOpen { .. } => "REDDIT_CIRCUIT_OPEN",
            RedditApiError::RequestTimeout => "REDDIT_TIMEOUT",
            RedditApiError::InvalidResponse { .. } => "REDDIT_INVALID_RESPONSE",
            RedditApiError::ServerError { .. } => "REDDIT_SERVER_ERROR",
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            RedditApiError::PostNotFound { post_id } => format!("Post {} not found", post_id),
            RedditApiError::AuthenticationFailed { .. } | RedditApiError::InvalidToken => {
                "Reddit rejected the configured credentials".to_string()
            }
            RedditApiError::RateLimitExceeded { retry_after } => {
                format!("Reddit is rate limiting us; retry in {}s", retry_after)
            }
            _ => "Reddit is not responding right now".to_string(),
        }
    }

    fn is_retryable(&self) -> bool {
        match self {
            RedditApiError::RateLimitExceeded { .. }
            | RedditApiError::RequestTimeout
            | RedditApiError::CircuitOpen { .. } => true,
            RedditApiError::ServerError { status_code } => *status_code >= 500,
            _ => false,
        }
    }
}

impl ErrorExt for LlmError {
    fn error_code(&self) -> &'static str {
        match self {
            LlmError::ModelNotAvailable { .. } => "LLM_MODEL_NOT_AVAILABLE",
            LlmError::ServiceUnavailable { .. } => "LLM_SERVICE_UNAVAILABLE",
            LlmError::RequestTimeout { .. } => "LLM_TIMEOUT",
            LlmError::RequestFailed { .. } => "LLM_REQUEST_FAILED",
            LlmError::InvalidResponseFormat { .. } => "LLM_INVALID_RESPONSE",
            LlmError::MalformedOutput { .. } => "LLM_MALFORMED_OUTPUT",
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            LlmError::ModelNotAvailable { model } => {
                format!("Model '{}' is not pulled on the Ollama host", model)
            }
            LlmError::ServiceUnavailable { provider } | LlmError::RequestTimeout { provider } => {
                format!("{} is not responding", provider)
            }
            _ => "The language model returned an unusable reply".to_string(),
        }
    }

    fn is_retryable(&self) -> bool {
        match self {
            LlmError::ServiceUnavailable { .. } | LlmError::RequestTimeout { .. } => true,
            LlmError::RequestFailed { status_code, .. } => *status_code >= 500,
            _ => false,
        }
    }
}

impl ErrorExt for IndexError {
    fn error_code(&self) -> &'static str {
        match self {
            IndexError::EmbeddingFailed { .. } => "INDEX_EMBEDDING_FAILED",
            IndexError::EmbeddingCountMismatch { .. } => "INDEX_EMBEDDING_COUNT",
            IndexError::DimensionMismatch { .. } => "INDEX_DIMENSION_MISMATCH",
            IndexError::PersistenceFailed { .. } => "INDEX_PERSISTENCE_FAILED",
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            IndexError::DimensionMismatch { .. } => {
                "Stored vectors were built with a different embedding model".to_string()
            }
            _ => "Semantic ranking is unavailable; results are ranked by engagement".to_string(),
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(self, IndexError::EmbeddingFailed { .. })
    }
}

impl ErrorExt for ConfigError {
    fn error_code(&self) -> &'static str {
        match self {
            ConfigError::FileNotFound { .. } => "CONFIG_FILE_NOT_FOUND",
            ConfigError::Unreadable { .. } => "CONFIG_UNREADABLE",
            ConfigError::MissingField { .. } => "CONFIG_MISSING_FIELD",
            ConfigError::InvalidValue { .. } => "CONFIG_INVALID_VALUE",
            ConfigError::ValidationFailed { .. } => "CONFIG_VALIDATION_FAILED",
            ConfigError::Parse(_) => "CONFIG_PARSE_ERROR",
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            ConfigError::FileNotFound { path } => format!("Config file {} does not exist", path),
            ConfigError::Unreadable { path, source } => {
                format!("Config file {} could not be read: {}", path, source)
            }
            ConfigError::MissingField { field } => format!("Config is missing '{}'", field),
            ConfigError::InvalidValue { field, value } => {
                format!("Config value '{}' is not valid for '{}'", value, field)
            }
            ConfigError::ValidationFailed { reason } => reason.clone(),
            ConfigError::Parse(e) => format!("Config file is not valid TOML: {}", e),
        }
    }
}
