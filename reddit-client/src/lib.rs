pub mod api;
pub mod auth;
pub mod breaker;
pub mod discovery;
pub mod metrics;
pub mod rate_limiter;
pub mod scrape;


use crate::api::ApiTransport;
use crate::auth::RedditOAuth2Config;
use crate::discovery::{normalize_subreddit, DiscoverySource, SubredditDiscovery, MAX_SUBREDDITS};
use crate::breaker::BreakerState;
use crate::metrics::{AttemptResult, MetricsCollector, TransportStats};
use crate::rate_limiter::{RateLimitStatus, RequestPacer};
use crate::scrape::ScrapeTransport;
use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use threadscout_core::{
    first_non_empty, Comment, CoreError, Outcome, Post, RedditApiError, RedditConfig, SearchQuery,
    TimeFilter,
};
use tracing::{debug, info, warn};

/// One way of reaching Reddit.
#[async_trait]
pub trait PostSource: Send + Sync {
    /// Short label used in logs and metrics.
    fn name(&self) -> &'static str;

    async fn search(&self, query: &SearchQuery) -> Result<Vec<Post>, CoreError>;

    async fn fetch_post(&self, post_id: &str) -> Result<Post, CoreError>;

    async fn fetch_comments(&self, post_id: &str, limit: usize) -> Result<Vec<Comment>, CoreError>;

    /// Breaker and rate-limit state, for transports that have them.
    fn guard_status(&self) -> Option<GuardStatus> {
        None
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GuardStatus {
    pub breaker: BreakerState,
    pub rate_limit: RateLimitStatus,
}

/// One transport as reported on `/health`.
#[derive(Debug, Clone, Serialize)]
pub struct TransportHealth {
    pub name: &'static str,
    pub success_rate: f64,
    #[serde(flatten)]
    pub stats: TransportStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guard: Option<GuardStatus>,
}

/// Lookup of subreddit names for discovery.
#[async_trait]
pub trait SubredditDirectory: Send + Sync {
    /// Names returned by the subreddit search endpoint.
    async fn search_subreddits(&self, query: &str, limit: usize) -> Result<Vec<String>, CoreError>;

    /// Subreddits of the posts returned by a site-wide post search.
    async fn search_post_subreddits(&self, query: &str, limit: usize)
        -> Result<Vec<String>, CoreError>;
}

/// Posts from one subreddit and the transport that produced them.
#[derive(Debug, Clone)]
pub struct SubredditHits {
    pub subreddit: String,
    pub transport: &'static str,
    pub posts: Vec<Post>,
}

#[derive(Debug, Clone)]
pub struct SearchResults {
    /// Merged, deduplicated, sorted by score and truncated.
    pub posts: Vec<Post>,
    pub subreddits: Vec<String>,
    /// `None` when the caller named the subreddit.
    pub discovery: Option<DiscoverySource>,
    pub failed_subreddits: usize,
}

pub struct RedditClient {
    transports: Vec<Arc<dyn PostSource>>,
    discovery: SubredditDiscovery,
    metrics: Arc<MetricsCollector>,
}

impl RedditClient {
    /// `transports` are tried in order for every subreddit.
    pub fn new(
        transports: Vec<Arc<dyn PostSource>>,
        directory: Arc<dyn SubredditDirectory>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            transports,
            discovery: SubredditDiscovery::new(directory),
            metrics,
        }
    }

    /// API transport first when credentials exist, public JSON always.
    pub fn from_config(config: &RedditConfig) -> Result<Self, CoreError> {
        let timeout = Duration::from_secs(config.request_timeout_secs);
        let pacer = Arc::new(RequestPacer::reddit_public(Duration::from_millis(
            config.min_request_delay_ms,
        )));
        let scrape = Arc::new(ScrapeTransport::new(pacer, timeout)?);

        let mut transports: Vec<Arc<dyn PostSource>> = Vec::new();
        match config.credentials() {
            Some((client_id, client_secret)) => {
                let api = ApiTransport::new(
                    RedditOAuth2Config {
                        client_id: client_id.to_string(),
                        client_secret: client_secret.to_string(),
                        user_agent: config.user_agent.clone(),
                    },
                    timeout,
                )?;
                transports.push(Arc::new(api));
            }
            None => warn!("No Reddit API credentials configured, using public JSON only"),
        }
        transports.push(scrape.clone());

        Ok(Self::new(transports, scrape, Arc::new(MetricsCollector::new())))
    }

    pub fn transport_names(&self) -> Vec<&'static str> {
        self.transports.iter().map(|t| t.name()).collect()
    }

    /// Chain order, with counters for transports that have not been used yet
    /// left at zero.
    pub async fn transport_health(&self) -> Vec<TransportHealth> {
        let mut stats = self.metrics.snapshot().await;
        self.transports
            .iter()
            .map(|transport| {
                let stats = stats.remove(transport.name()).unwrap_or_default();
                TransportHealth {
                    name: transport.name(),
                    success_rate: stats.success_rate(),
                    stats,
                    guard: transport.guard_status(),
                }
            })
            .collect()
    }

    pub async fn discover_subreddits(&self, query: &str) -> discovery::Discovery {
        self.discovery.discover(query).await
    }

    /// Walks the transport chain for one subreddit until one returns posts.
    pub async fn search_subreddit(&self, query: SearchQuery) -> Outcome<SubredditHits> {
        let subreddit = query.subreddit.clone();
        let query = Arc::new(query);

        let outcome = first_non_empty(&self.transports, |transport| {
            let transport = Arc::clone(transport);
            let query = Arc::clone(&query);
            let metrics = Arc::clone(&self.metrics);
            async move {
                let started = Instant::now();
                let result = transport.search(&query).await;
                let attempt = match &result {
                    Ok(posts) if posts.is_empty() => AttemptResult::Empty,
                    Ok(_) => AttemptResult::Success,
                    Err(_) => AttemptResult::Failure,
                };
                metrics
                    .record(transport.name(), attempt, started.elapsed())
                    .await;
                result
            }
        })
        .await;

        let transports = &self.transports;
        outcome.map(|(position, posts)| SubredditHits {
            subreddit,
            transport: transports[position].name(),
            posts,
        })
    }

    /// Searches `subreddit` if given, otherwise the discovered subreddits,
    /// all in parallel. Failed subreddits contribute nothing.
    pub async fn search_posts(
        &self,
        query: &str,
        subreddit: Option<&str>,
        limit: usize,
        time_filter: Option<TimeFilter>,
    ) -> SearchResults {
        let (subreddits, discovery) = match subreddit {
            Some(name) => (vec![normalize_subreddit(name)], None),
            None => {
                let found = self.discover_subreddits(query).await;
                let names = found
                    .subreddits
                    .iter()
                    .map(|name| normalize_subreddit(name))
                    .collect();
                (names, Some(found.source))
            }
        };
        let subreddits: Vec<String> = subreddits.into_iter().take(MAX_SUBREDDITS).collect();
        info!("Searching {:?} for '{}'", subreddits, query);

        let searches = subreddits.iter().map(|name| {
            self.search_subreddit(SearchQuery {
                text: query.to_string(),
                subreddit: name.clone(),
                limit,
                time_filter,
            })
        });
        let outcomes = join_all(searches).await;

        let mut failed_subreddits = 0;
        let mut batches = Vec::with_capacity(outcomes.len());
        for (name, outcome) in subreddits.iter().zip(outcomes) {
            match outcome {
                Outcome::Success(hits) => batches.push(hits.posts),
                Outcome::Degraded { value, reason } => {
                    debug!("r/{} answered by {} ({})", name, value.transport, reason);
                    batches.push(value.posts);
                }
                Outcome::Empty => debug!("No posts found in r/{}", name),
                Outcome::Failed(e) => {
                    warn!("Search failed for r/{}: {}", name, e);
                    failed_subreddits += 1;
                }
            }
        }

        let posts = merge_posts(batches, limit);
        info!("Found {} posts across {} subreddits", posts.len(), subreddits.len());

        SearchResults {
            posts,
            subreddits,
            discovery,
            failed_subreddits,
        }
    }

    pub async fn fetch_post(&self, post_id: &str) -> Result<Post, CoreError> {
        check_post_id(post_id)?;
        let mut last_error = None;
        for transport in &self.transports {
            match transport.fetch_post(post_id).await {
                Ok(post) => return Ok(post),
                Err(e) => {
                    warn!("{} could not fetch post {}: {}", transport.name(), post_id, e);
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(no_transports))
    }

    pub async fn fetch_comments(
        &self,
        post_id: &str,
        limit: usize,
    ) -> Result<Vec<Comment>, CoreError> {
        check_post_id(post_id)?;
        let mut last_error = None;
        for transport in &self.transports {
            match transport.fetch_comments(post_id, limit).await {
                Ok(comments) => return Ok(comments),
                Err(e) => {
                    warn!(
                        "{} could not fetch comments for {}: {}",
                        transport.name(),
                        post_id,
                        e
                    );
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(no_transports))
    }
}

/// Reddit post ids are lowercase base36. Anything else cannot name a post
/// and is refused before it reaches a URL path.
pub fn check_post_id(post_id: &str) -> Result<(), CoreError> {
    let valid = !post_id.is_empty()
        && post_id
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit());
    if valid {
        Ok(())
    } else {
        Err(CoreError::RedditApi(RedditApiError::PostNotFound {
            post_id: post_id.to_string(),
        }))
    }
}

fn no_transports() -> CoreError {
    CoreError::Internal {
        message: "no Reddit transports configured".to_string(),
    }
}

/// Concatenates the batches, keeps the first occurrence of every id, sorts
/// by score (highest first) and truncates.
pub fn merge_posts(batches: Vec<Vec<Post>>, limit: usize) -> Vec<Post> {
    let mut seen = HashSet::new();
    let mut posts: Vec<Post> = batches
        .into_iter()
        .flatten()
        .filter(|post| seen.insert(post.id.clone()))
        .collect();

    posts.sort_by(|a, b| b.score.cmp(&a.score));
    posts.truncate(limit);
    posts
}
