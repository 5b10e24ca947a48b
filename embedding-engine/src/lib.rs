pub mod index;
pub mod ranker;
pub mod scoring;

pub use index::{document_representation, enhance_query, InMemoryVectorIndex, Neighbor, VectorIndex};
pub use ranker::{Ranking, RankingApproach, SemanticRanker};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use threadscout_core::{CoreError, IndexError, LlmConfig};
use tracing::debug;

/// nomic-embed-text has an 8k token window; this keeps dense text under it.
const MAX_EMBED_CHARS: usize = 3_000;
const EMBED_BATCH_SIZE: usize = 32;

/// Text to vector conversion.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// One vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CoreError>;
}

#[derive(Serialize)]
struct OllamaEmbedRequest<'a> {
    model: &'a str,
    input: Vec<String>,
    truncate: bool,
}

#[derive(Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Embeddings from Ollama's `/api/embed`.
#[derive(Debug)]
pub struct OllamaEmbedder {
    http_client: Client,
    base_url: String,
    model: String,
}

impl OllamaEmbedder {
    pub fn new(config: &LlmConfig) -> Result<Self, CoreError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.generation_timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.embedding_model.clone(),
        })
    }
}

fn embedding_failed(reason: impl Into<String>) -> CoreError {
    CoreError::Index(IndexError::EmbeddingFailed {
        reason: reason.into(),
    })
}

fn truncate_for_embedding(text: &str) -> String {
    text.chars().take(MAX_EMBED_CHARS).collect()
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CoreError> {
        let url = format!("{}/api/embed", self.base_url);
        let mut embeddings = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(EMBED_BATCH_SIZE) {
            let request = OllamaEmbedRequest {
                model: &self.model,
                input: chunk.iter().map(|t| truncate_for_embedding(t)).collect(),
                truncate: true,
            };

            let response = self
                .http_client
                .post(&url)
                .json(&request)
                .send()
                .await
                .map_err(|e| embedding_failed(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(embedding_failed(format!(
                    "embed API returned {}: {}",
                    status, body
                )));
            }

            let parsed: OllamaEmbedResponse = response
                .json()
                .await
                .map_err(|e| embedding_failed(format!("unreadable embed response: {}", e)))?;
            embeddings.extend(parsed.embeddings);
        }

        if embeddings.len() != texts.len() {
            return Err(CoreError::Index(IndexError::EmbeddingCountMismatch {
                requested: texts.len(),
                returned: embeddings.len(),
            }));
        }

        debug!("Embedded {} texts with {}", texts.len(), self.model);
        Ok(embeddings)
    }
}

/// Cosine similarity; 0.0 for empty, mismatched or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (dot, norm_a, norm_b) = a
        .iter()
        .zip(b)
        .fold((0.0f32, 0.0f32, 0.0f32), |(dot, na, nb), (x, y)| {
            (dot + x * y, na + x * x, nb + y * y)
        });

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}
