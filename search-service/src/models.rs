use chrono::{DateTime, Utc};
use embedding_engine::RankingApproach;
use llm_interface::RewriteSource;
use reddit_client::discovery::DiscoverySource;
use reddit_client::TransportHealth;
use serde::{Deserialize, Serialize};
use threadscout_core::{Post, ScoredCandidate};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub subreddit: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    /// Generation model override.
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AskRequest {
    pub post_id: String,
    pub question: String,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PostResult {
    #[serde(flatten)]
    pub post: Post,
    pub relevance_score: f64,
    pub engagement_score: f64,
    pub time_relevance: f64,
    pub rank_score: f64,
}

impl From<ScoredCandidate> for PostResult {
    fn from(candidate: ScoredCandidate) -> Self {
        Self {
            post: candidate.post,
            relevance_score: candidate.similarity,
            engagement_score: candidate.engagement_score,
            time_relevance: candidate.time_relevance,
            rank_score: candidate.rank_score,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingApproach {
    SemanticSearch,
    BasicRanking,
    NoResults,
}

impl From<RankingApproach> for ProcessingApproach {
    fn from(approach: RankingApproach) -> Self {
        match approach {
            RankingApproach::Semantic => ProcessingApproach::SemanticSearch,
            RankingApproach::Unscored | RankingApproach::Engagement => {
                ProcessingApproach::BasicRanking
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchMetadata {
    pub total_posts_found: usize,
    pub processing_approach: ProcessingApproach,
    /// `None` when nothing was found to rank.
    pub ranking: Option<RankingApproach>,
    pub rewrite_source: RewriteSource,
    pub subreddit: Option<String>,
    pub subreddits_searched: Vec<String>,
    pub discovery: Option<DiscoverySource>,
    pub failed_subreddits: usize,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub original_query: String,
    pub rewritten_query: String,
    pub posts: Vec<PostResult>,
    pub summary: String,
    pub metadata: SearchMetadata,
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryResponse {
    pub summary: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnswerResponse {
    pub answer: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub ollama_reachable: bool,
    pub transports: Vec<TransportHealth>,
    pub indexed_posts: usize,
}
