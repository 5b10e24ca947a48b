//! Relevance signals for ranked posts.
//!
//! All functions are pure; callers pass `now` so ages are computed once per
//! query.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use threadscout_core::{Post, ScoredCandidate};

const SHORT_DOCUMENT_WORDS: usize = 20;
const LONG_DOCUMENT_WORDS: usize = 1000;

const MAX_ENGAGEMENT_BOOST: f64 = 0.2;
const TITLE_BOOST: f64 = 0.1;
const ORIGINAL_CONTENT_BOOST: f64 = 1.1;

const DECAY_RATE: f64 = 0.3;
const DECAY_PERIOD_HOURS: f64 = 168.0;
const MIN_TIME_RELEVANCE: f64 = 0.7;

const SIMILARITY_WEIGHT: f64 = 0.6;
const ENGAGEMENT_WEIGHT: f64 = 0.3;
const TIME_WEIGHT: f64 = 0.1;

/// Penalizes very short and very long documents. Zero words means unknown.
pub fn length_factor(word_count: usize) -> f64 {
    if word_count == 0 {
        1.0
    } else if word_count < SHORT_DOCUMENT_WORDS {
        0.8
    } else if word_count > LONG_DOCUMENT_WORDS {
        0.9
    } else {
        1.0
    }
}

/// Log-scaled blend of votes and comments, comments weighted higher.
pub fn engagement_score(score: i64, num_comments: u64) -> f64 {
    let log_score = (score.max(0) as f64).ln_1p();
    let log_comments = (num_comments as f64).ln_1p();
    (log_score + 1.2 * log_comments) / 2.2
}

/// 1.0 for fresh posts, decaying linearly to 0.7 over one week.
pub fn time_relevance(created: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    let Some(created) = created else {
        return 1.0;
    };
    let age_hours = (now - created).num_seconds() as f64 / 3600.0;
    if age_hours <= 0.0 {
        return 1.0;
    }
    let factor = 1.0 - DECAY_RATE * (age_hours / DECAY_PERIOD_HOURS).min(1.0);
    factor.max(MIN_TIME_RELEVANCE)
}

/// Share of query terms that also appear in the title.
pub fn title_match_ratio(query: &str, title: &str) -> f64 {
    let query_lower = query.to_lowercase();
    let query_terms: HashSet<&str> = query_lower.split_whitespace().collect();
    if query_terms.is_empty() {
        return 0.0;
    }
    let title_lower = title.to_lowercase();
    let title_terms: HashSet<&str> = title_lower.split_whitespace().collect();
    query_terms.intersection(&title_terms).count() as f64 / query_terms.len() as f64
}

/// Everything the similarity boost looks at besides the query.
#[derive(Debug, Clone, Copy)]
pub struct SimilaritySignals<'a> {
    pub base_similarity: f64,
    pub document_words: usize,
    pub engagement: f64,
    pub time_relevance: f64,
    pub title: &'a str,
    pub is_original_content: bool,
}

/// Applies length, engagement, recency, title and OC adjustments to a raw
/// similarity. The result is always within [0, 1].
pub fn boosted_similarity(signals: &SimilaritySignals<'_>, query: &str) -> f64 {
    let mut score = signals.base_similarity * length_factor(signals.document_words);

    if signals.engagement > 0.0 {
        let boost = (signals.engagement.ln_1p() / 100.0).min(MAX_ENGAGEMENT_BOOST);
        score = (score * (1.0 + boost)).min(1.0);
    }

    score *= signals.time_relevance;

    let ratio = title_match_ratio(query, signals.title);
    if ratio > 0.0 {
        score = (score * (1.0 + ratio * TITLE_BOOST)).min(1.0);
    }

    if signals.is_original_content {
        score = (score * ORIGINAL_CONTENT_BOOST).min(1.0);
    }

    score.clamp(0.0, 1.0)
}

/// The ordering key for final results.
pub fn rank_score(similarity: f64, engagement: f64, time_relevance: f64) -> f64 {
    let engagement = engagement.max(0.0);
    let engagement_norm = engagement / (1.0 + engagement);
    (SIMILARITY_WEIGHT * similarity + ENGAGEMENT_WEIGHT * engagement_norm + TIME_WEIGHT * time_relevance)
        .clamp(0.0, 1.0)
}

/// Ordering used when no similarity is available.
pub fn fallback_rank_key(post: &Post) -> f64 {
    post.score as f64 + 2.0 * post.num_comments as f64
}

/// Wraps a post with its signals for one query.
pub fn score_candidate(post: Post, similarity: f64, now: DateTime<Utc>) -> ScoredCandidate {
    let engagement_score = engagement_score(post.score, post.num_comments);
    let time_relevance = time_relevance(post.created_utc, now);
    let similarity = similarity.clamp(0.0, 1.0);
    ScoredCandidate {
        rank_score: rank_score(similarity, engagement_score, time_relevance),
        post,
        similarity,
        engagement_score,
        time_relevance,
    }
}
