use crate::index::{enhance_query, VectorIndex};
use crate::scoring::{
    boosted_similarity, engagement_score, fallback_rank_key, score_candidate, time_relevance,
    SimilaritySignals,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use threadscout_core::{CoreError, Outcome, Post, ScoredCandidate};
use tracing::{info, warn};

pub const DEFAULT_SEMANTIC_LIMIT: usize = 5;
pub const DEFAULT_MIN_SIMILARITY: f64 = 0.3;

const MAX_NEIGHBORS: usize = 20;
const UNSCORED_LIMIT: usize = 5;

/// How a result list was ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingApproach {
    /// Vector similarity blended with engagement and recency.
    Semantic,
    /// Nothing cleared the similarity threshold; first posts by rank score.
    Unscored,
    /// The index failed; posts ordered by votes and comments.
    Engagement,
}

#[derive(Debug, Clone)]
pub struct Ranking {
    pub candidates: Vec<ScoredCandidate>,
    pub approach: RankingApproach,
}

pub struct SemanticRanker {
    index: Arc<dyn VectorIndex>,
    limit: usize,
    min_similarity: f64,
}

impl SemanticRanker {
    pub fn new(index: Arc<dyn VectorIndex>, limit: usize, min_similarity: f64) -> Self {
        Self {
            index,
            limit,
            min_similarity,
        }
    }

    pub fn with_defaults(index: Arc<dyn VectorIndex>) -> Self {
        Self::new(index, DEFAULT_SEMANTIC_LIMIT, DEFAULT_MIN_SIMILARITY)
    }

    /// Nearest indexed posts above the similarity floor, boosted and sorted
    /// by similarity.
    pub async fn semantic_search(
        &self,
        query: &str,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<ScoredCandidate>, CoreError> {
        let fetch = (limit * 3).min(MAX_NEIGHBORS);
        let neighbors = self.index.query(&enhance_query(query), fetch).await?;

        let mut candidates: Vec<ScoredCandidate> = neighbors
            .into_iter()
            .filter_map(|neighbor| {
                let base_similarity = 1.0 - neighbor.distance;
                if base_similarity < self.min_similarity {
                    return None;
                }
                let signals = SimilaritySignals {
                    base_similarity,
                    document_words: neighbor.document.split_whitespace().count(),
                    engagement: engagement_score(neighbor.post.score, neighbor.post.num_comments),
                    time_relevance: time_relevance(neighbor.post.created_utc, now),
                    title: &neighbor.post.title,
                    is_original_content: neighbor.post.is_original_content,
                };
                let similarity = boosted_similarity(&signals, query);
                Some(score_candidate(neighbor.post, similarity, now))
            })
            .collect();

        candidates.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        candidates.truncate(limit);
        Ok(candidates)
    }

    /// Indexes `posts` and ranks them against `query`. Index failures fall
    /// back to engagement ordering instead of failing the search.
    pub async fn rank(&self, query: &str, posts: &[Post]) -> Outcome<Ranking> {
        if posts.is_empty() {
            return Outcome::Empty;
        }
        let now = Utc::now();

        let semantic = match self.index.upsert(posts).await {
            Ok(()) => self.semantic_search(query, self.limit, now).await,
            Err(e) => Err(e),
        };

        match semantic {
            Ok(mut candidates) if !candidates.is_empty() => {
                sort_by_rank(&mut candidates);
                info!("Ranked {} posts semantically", candidates.len());
                Outcome::Success(Ranking {
                    candidates,
                    approach: RankingApproach::Semantic,
                })
            }
            Ok(_) => {
                let mut candidates: Vec<ScoredCandidate> = posts
                    .iter()
                    .take(UNSCORED_LIMIT)
                    .map(|post| score_candidate(post.clone(), 0.0, now))
                    .collect();
                sort_by_rank(&mut candidates);
                Outcome::degraded(
                    Ranking {
                        candidates,
                        approach: RankingApproach::Unscored,
                    },
                    "no posts cleared the similarity threshold",
                )
            }
            Err(e) => {
                warn!("Vector index unavailable, ranking by engagement: {}", e);
                Outcome::degraded(
                    Ranking {
                        candidates: engagement_fallback(posts, now),
                        approach: RankingApproach::Engagement,
                    },
                    e.to_string(),
                )
            }
        }
    }
}

fn sort_by_rank(candidates: &mut [ScoredCandidate]) {
    candidates.sort_by(|a, b| b.rank_score.total_cmp(&a.rank_score));
}

/// First posts ordered by `score + 2 * comments`.
pub fn engagement_fallback(posts: &[Post], now: DateTime<Utc>) -> Vec<ScoredCandidate> {
    let mut head: Vec<&Post> = posts.iter().take(UNSCORED_LIMIT).collect();
    head.sort_by(|a, b| fallback_rank_key(b).total_cmp(&fallback_rank_key(a)));
    head.into_iter()
        .map(|post| score_candidate(post.clone(), 0.0, now))
        .collect()
}
