use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A Reddit submission as seen by the search pipeline, whichever transport
/// fetched it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub title: String,
    pub content: String,
    pub subreddit: String,
    pub author: String,
    pub score: i64,
    pub url: String,
    pub num_comments: u64,
    pub created_utc: Option<DateTime<Utc>>,
    pub fetched_at: DateTime<Utc>,
    #[serde(default)]
    pub is_self: bool,
    #[serde(default)]
    pub is_original_content: bool,
    #[serde(default)]
    pub has_awards: bool,
    #[serde(default)]
    pub upvote_ratio: Option<f64>,
}

impl Post {
    /// Minimal post, mostly useful for tests and fakes.
    pub fn new(id: impl Into<String>, title: impl Into<String>, subreddit: impl Into<String>) -> Self {
        let id = id.into();
        let subreddit = subreddit.into();
        Self {
            url: format!("https://www.reddit.com/r/{}/comments/{}", subreddit, id),
            id,
            title: title.into(),
            content: String::new(),
            subreddit,
            author: String::new(),
            score: 0,
            num_comments: 0,
            created_utc: None,
            fetched_at: Utc::now(),
            is_self: true,
            is_original_content: false,
            has_awards: false,
            upvote_ratio: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub post_id: String,
    pub content: String,
    pub author: String,
    pub score: i64,
    pub created_utc: Option<DateTime<Utc>>,
    pub fetched_at: DateTime<Utc>,
}

/// A post annotated with the signals computed for one query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredCandidate {
    #[serde(flatten)]
    pub post: Post,
    /// Boosted similarity, always within [0, 1].
    pub similarity: f64,
    pub engagement_score: f64,
    /// Recency factor within [0.7, 1.0].
    pub time_relevance: f64,
    /// Final ordering key.
    pub rank_score: f64,
}

/// Reddit's `t` search parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeFilter {
    Hour,
    Day,
    Week,
    Month,
    Year,
    All,
}

impl TimeFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeFilter::Hour => "hour",
            TimeFilter::Day => "day",
            TimeFilter::Week => "week",
            TimeFilter::Month => "month",
            TimeFilter::Year => "year",
            TimeFilter::All => "all",
        }
    }

    /// Maps the time phrases users write ("this week", "latest", ...) to the
    /// closest window Reddit supports. Reddit has no "yesterday", so it
    /// becomes a day.
    pub fn from_phrase(phrase: &str) -> Option<Self> {
        match phrase.trim().to_lowercase().as_str() {
            "today" | "yesterday" => Some(TimeFilter::Day),
            "this week" | "new" => Some(TimeFilter::Week),
            "this month" | "recent" | "latest" => Some(TimeFilter::Month),
            _ => None,
        }
    }
}

impl fmt::Display for TimeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters for one fan-out search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub text: String,
    pub subreddit: String,
    pub limit: usize,
    pub time_filter: Option<TimeFilter>,
}
