use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub reddit: RedditConfig,
    pub llm: LlmConfig,
    pub search: SearchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// Where the vector index is persisted. `None` keeps it in memory only.
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedditConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub user_agent: String,
    /// Courtesy spacing between unauthenticated requests.
    pub min_request_delay_ms: u64,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub embedding_model: String,
    pub generation_timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub default_limit: usize,
    pub semantic_limit: usize,
    pub min_similarity: f64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8000".to_string(),
            data_dir: Some(PathBuf::from("./data")),
        }
    }
}

impl Default for RedditConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            user_agent: "RedditAgent/1.0".to_string(),
            min_request_delay_ms: 2000,
            request_timeout_secs: 30,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "llama2".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            generation_timeout_secs: 60,
            connect_timeout_secs: 15,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            semantic_limit: 5,
            min_similarity: 0.3,
        }
    }
}

impl RedditConfig {
    /// Both halves of the app credentials, if configured.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.client_id.as_deref(), self.client_secret.as_deref()) {
            (Some(id), Some(secret)) if !id.is_empty() && !secret.is_empty() => Some((id, secret)),
            _ => None,
        }
    }
}

impl AppConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ConfigError::FileNotFound {
                path: path.display().to_string(),
            },
            _ => ConfigError::Unreadable {
                path: path.display().to_string(),
                source: e,
            },
        })?;
        debug!("Loaded configuration file {}", path.display());
        Self::from_toml_str(&raw)
    }

    /// File (if any), then environment overrides, then validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        info!(
            "Configuration loaded (reddit api: {}, model: {})",
            if config.reddit.credentials().is_some() {
                "enabled"
            } else {
                "scrape only"
            },
            config.llm.model
        );
        Ok(config)
    }

    /// Applies overrides from a variable lookup. Taking the lookup as a
    /// closure keeps tests away from the process environment.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(id) = lookup("REDDIT_CLIENT_ID") {
            self.reddit.client_id = Some(id);
        }
        if let Some(secret) = lookup("REDDIT_CLIENT_SECRET") {
            self.reddit.client_secret = Some(secret);
        }
        if let Some(agent) = lookup("REDDIT_USER_AGENT") {
            self.reddit.user_agent = agent;
        }
        if let Some(url) = lookup("OLLAMA_BASE_URL") {
            self.llm.base_url = url;
        }
        if let Some(model) = lookup("OLLAMA_MODEL") {
            self.llm.model = model;
        }
        if let Some(model) = lookup("OLLAMA_EMBEDDING_MODEL") {
            self.llm.embedding_model = model;
        }
        if let Some(dir) = lookup("THREADSCOUT_DATA_DIR") {
            self.server.data_dir = if dir.is_empty() {
                None
            } else {
                Some(PathBuf::from(dir))
            };
        }
        if let Some(addr) = lookup("THREADSCOUT_BIND_ADDR") {
            self.server.bind_addr = addr;
        }
        if let Some(delay) = lookup("THREADSCOUT_MIN_REQUEST_DELAY_MS") {
            self.reddit.min_request_delay_ms =
                delay.parse().map_err(|_| ConfigError::InvalidValue {
                    field: "reddit.min_request_delay_ms".to_string(),
                    value: delay.clone(),
                })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reddit.user_agent.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "reddit.user_agent".to_string(),
            });
        }
        if self.llm.base_url.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "llm.base_url".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.search.min_similarity) {
            return Err(ConfigError::InvalidValue {
                field: "search.min_similarity".to_string(),
                value: self.search.min_similarity.to_string(),
            });
        }
        if self.search.semantic_limit == 0 || self.search.default_limit == 0 {
            return Err(ConfigError::ValidationFailed {
                reason: "search limits must be greater than zero".to_string(),
            });
        }
        if self.reddit.client_id.is_some() != self.reddit.client_secret.is_some() {
            return Err(ConfigError::ValidationFailed {
                reason: "REDDIT_CLIENT_ID and REDDIT_CLIENT_SECRET must be set together"
                    .to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorExt;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.bind_addr, "127.0.0.1:8000");
        assert_eq!(config.reddit.user_agent, "RedditAgent/1.0");
        assert_eq!(config.llm.base_url, "http://localhost:11434");
        assert_eq!(config.llm.generation_timeout_secs, 60);
        assert_eq!(config.llm.connect_timeout_secs, 15);
        assert_eq!(config.search.min_similarity, 0.3);
        assert!(config.reddit.credentials().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let config = AppConfig::from_toml_str(
            r#"
            [llm]
            model = "mistral"

            [search]
            semantic_limit = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.llm.model, "mistral");
        assert_eq!(config.llm.base_url, "http://localhost:11434");
        assert_eq!(config.search.semantic_limit, 3);
        assert_eq!(config.search.default_limit, 10);
    }

    #[test]
    fn test_invalid_toml() {
        let result = AppConfig::from_toml_str("[llm\nmodel = ");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("REDDIT_CLIENT_ID", "id"),
            ("REDDIT_CLIENT_SECRET", "secret"),
            ("OLLAMA_MODEL", "llama3"),
            ("THREADSCOUT_DATA_DIR", ""),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config
            .apply_env(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.reddit.credentials(), Some(("id", "secret")));
        assert_eq!(config.llm.model, "llama3");
        assert!(config.server.data_dir.is_none());
    }

    #[test]
    fn test_bad_delay_value() {
        let mut config = AppConfig::default();
        let result = config.apply_env(|key| {
            (key == "THREADSCOUT_MIN_REQUEST_DELAY_MS").then(|| "soon".to_string())
        });
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_half_credentials_rejected() {
        let mut config = AppConfig::default();
        config.reddit.client_id = Some("id".to_string());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationFailed { .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = AppConfig::from_file(&dir.path().join("absent.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound { .. })));
    }

    #[test]
    fn test_unreadable_path_is_not_reported_missing() {
        let dir = tempfile::tempdir().unwrap();
        // A directory exists but cannot be read as a file.
        let error = AppConfig::from_file(dir.path()).unwrap_err();
        assert!(matches!(error, ConfigError::Unreadable { .. }));
        assert_eq!(error.error_code(), "CONFIG_UNREADABLE");
    }
}
