pub mod rewriter;
pub mod synthesizer;

pub use rewriter::{QueryRewriter, RewriteSource, RewrittenQuery};
pub use synthesizer::AnswerSynthesizer;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use threadscout_core::{CoreError, LlmConfig, LlmError};
use tracing::{debug, error, warn};

const PROVIDER: &str = "ollama";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SamplingOptions {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub num_predict: u32,
    pub stop: Vec<String>,
}

impl Default for SamplingOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.9,
            top_k: 40,
            num_predict: 1000,
            stop: vec!["[END]".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    /// Overrides the client's default model.
    pub model: Option<String>,
    pub options: SamplingOptions,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: None,
            options: SamplingOptions::default(),
        }
    }

    pub fn with_model(mut self, model: Option<&str>) -> Self {
        self.model = model.map(str::to_string);
        self
    }
}

/// Completion-style text generation.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Returns the trimmed completion for one prompt.
    async fn generate(&self, request: GenerationRequest) -> Result<String, CoreError>;

    /// True when the service answers at all.
    async fn check_health(&self) -> bool;
}

#[derive(Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: &'a SamplingOptions,
}

#[derive(Deserialize)]
struct OllamaGenerateResponse {
    response: String,
}

#[derive(Debug)]
pub struct OllamaClient {
    http_client: Client,
    base_url: String,
    default_model: String,
}

impl OllamaClient {
    pub fn new(config: &LlmConfig) -> Result<Self, CoreError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.generation_timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            default_model: config.model.clone(),
        })
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    fn request_error(&self, error: reqwest::Error) -> CoreError {
        if error.is_timeout() {
            warn!("Ollama request timed out");
            CoreError::Llm(LlmError::RequestTimeout {
                provider: PROVIDER.to_string(),
            })
        } else if error.is_connect() {
            error!("Cannot reach Ollama at {}: {}", self.base_url, error);
            CoreError::Llm(LlmError::ServiceUnavailable {
                provider: PROVIDER.to_string(),
            })
        } else {
            CoreError::Network(error)
        }
    }
}

#[async_trait]
impl TextGenerator for OllamaClient {
    async fn generate(&self, request: GenerationRequest) -> Result<String, CoreError> {
        let model = request.model.as_deref().unwrap_or(&self.default_model);
        let body = OllamaGenerateRequest {
            model,
            prompt: &request.prompt,
            stream: false,
            options: &request.options,
        };

        debug!("Generating with {} ({} prompt chars)", model, request.prompt.len());
        let response = self
            .http_client
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            error!("Ollama API error: {} - {}", status, detail);
            return Err(CoreError::Llm(if status == StatusCode::NOT_FOUND {
                LlmError::ModelNotAvailable {
                    model: model.to_string(),
                }
            } else {
                LlmError::RequestFailed {
                    provider: PROVIDER.to_string(),
                    status_code: status.as_u16(),
                }
            }));
        }

        let parsed: OllamaGenerateResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                self.request_error(e)
            } else {
                CoreError::Llm(LlmError::InvalidResponseFormat {
                    provider: PROVIDER.to_string(),
                })
            }
        })?;

        Ok(parsed.response.trim().to_string())
    }

    async fn check_health(&self) -> bool {
        match self
            .http_client
            .get(format!("{}/api/version", self.base_url))
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!("Ollama health check failed: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_request_body() {
        let options = SamplingOptions::default();
        let body = OllamaGenerateRequest {
            model: "llama2",
            prompt: "hello",
            stream: false,
            options: &options,
        };

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["stream"], false);
        assert_eq!(json["options"]["top_k"], 40);
        assert_eq!(json["options"]["num_predict"], 1000);
        assert_eq!(json["options"]["stop"][0], "[END]");
    }

    #[test]
    fn test_model_override() {
        let request = GenerationRequest::new("hi").with_model(Some("mistral"));
        assert_eq!(request.model.as_deref(), Some("mistral"));
        assert_eq!(GenerationRequest::new("hi").with_model(None).model, None);
    }

    #[test]
    fn test_client_trims_base_url() {
        let config = LlmConfig {
            base_url: "http://localhost:11434/".to_string(),
            ..LlmConfig::default()
        };
        let client = OllamaClient::new(&config).unwrap();
        assert_eq!(client.base_url, "http://localhost:11434");
        assert_eq!(client.default_model(), "llama2");
    }

    #[tokio::test]
    async fn test_health_check_unreachable() {
        let config = LlmConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            connect_timeout_secs: 1,
            ..LlmConfig::default()
        };
        let client = OllamaClient::new(&config).unwrap();
        assert!(!client.check_health().await);
    }
}
