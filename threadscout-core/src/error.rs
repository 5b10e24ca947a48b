use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("reddit: {0}")]
    RedditApi(#[from] RedditApiError),

    #[error("language model: {0}")]
    Llm(#[from] LlmError),

    #[error("vector index: {0}")]
    Index(#[from] IndexError),

    #[error("config: {0}")]
    Config(#[from] ConfigError),

    #[error("malformed JSON: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("http: {0}")]
    Network(#[from] reqwest::Error),

    #[error("{message}")]
    InvalidInput { message: String },

    #[error("{resource} not found")]
    NotFound { resource: String },

    #[error("internal: {message}")]
    Internal { message: String },

    #[error("request failed: {message}")]
    RequestFailed {
        message: String,
        status_code: Option<u16>,
    },
}

#[derive(Error, Debug, Clone)]
pub enum RedditApiError {
    #[error("token exchange failed: {reason}")]
    AuthenticationFailed { reason: String },

    #[error("rate limited for {retry_after}s")]
    RateLimitExceeded { retry_after: u64 },

    #[error("{resource} is forbidden")]
    Forbidden { resource: String },

    #[error("post {post_id} not found")]
    PostNotFound { post_id: String },

    #[error("access token rejected")]
    InvalidToken,

    #[error("{transport} transport is cooling down")]
    CircuitOpen { transport: String },

    #[error("request timed out")]
    RequestTimeout,

    #[error("unexpected response: {details}")]
    InvalidResponse { details: String },

    #[error("server returned {status_code}")]
    ServerError { status_code: u16 },
}

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("model {model} is not pulled")]
    ModelNotAvailable { model: String },

    #[error("{provider} is unreachable")]
    ServiceUnavailable { provider: String },

    #[error("{provider} timed out")]
    RequestTimeout { provider: String },

    #[error("{provider} returned status {status_code}")]
    RequestFailed { provider: String, status_code: u16 },

    #[error("{provider} sent an unreadable reply")]
    InvalidResponseFormat { provider: String },

    #[error("model output rejected: {reason}")]
    MalformedOutput { reason: String },
}

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("embedding failed: {reason}")]
    EmbeddingFailed { reason: String },

    #[error("embedder returned {returned} vectors for {requested} inputs")]
    EmbeddingCountMismatch { requested: usize, returned: usize },

    #[error("vector has {actual} dimensions, index uses {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("cannot persist index at {path}")]
    PersistenceFailed { path: String },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{path} does not exist")]
    FileNotFound { path: String },

    #[error("cannot read {path}: {source}")]
    Unreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{field} is required")]
    MissingField { field: String },

    #[error("{value:?} is not a valid {field}")]
    InvalidValue { field: String, value: String },

    #[error("{reason}")]
    ValidationFailed { reason: String },

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),
}
