use crate::auth::{AppTokenProvider, RedditOAuth2Config};
use crate::breaker::{BreakerState, CircuitBreaker};
use crate::rate_limiter::{RateLimitStatus, RateLimiter};
use crate::{check_post_id, GuardStatus, PostSource};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use threadscout_core::{Comment, CoreError, Post, RedditApiError, SearchQuery};
use tracing::{debug, error, info, warn};

const REDDIT_API_BASE: &str = "https://oauth.reddit.com";

/// Post bodies from the authenticated API are cut to this many characters.
pub const API_CONTENT_LIMIT: usize = 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListing<T> {
    pub kind: String,
    pub data: RedditListingData<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListingData<T> {
    pub children: Vec<RedditListingChild<T>>,
    #[serde(default)]
    pub after: Option<String>,
    #[serde(default)]
    pub before: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListingChild<T> {
    pub kind: String,
    pub data: T,
}

impl<T> RedditListing<T> {
    pub fn into_items(self) -> impl Iterator<Item = T> {
        self.data.children.into_iter().map(|child| child.data)
    }
}

// The public JSON endpoints omit fields freely, so everything but the id
// has a default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RedditPostData {
    pub id: String,
    pub title: String,
    pub selftext: String,
    pub author: String,
    pub subreddit: String,
    pub url: String,
    pub permalink: String,
    pub created_utc: Option<f64>,
    pub score: i64,
    pub num_comments: u64,
    pub over_18: bool,
    pub upvote_ratio: Option<f64>,
    pub is_self: bool,
    pub is_original_content: bool,
    pub total_awards_received: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RedditCommentData {
    pub id: String,
    pub body: String,
    pub author: String,
    pub score: i64,
    pub created_utc: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RedditSubredditData {
    pub display_name: String,
    pub over18: bool,
}

impl RedditPostData {
    pub fn into_post(self, content_limit: Option<usize>) -> Post {
        let url = if self.permalink.is_empty() {
            self.url
        } else {
            format!("https://www.reddit.com{}", self.permalink)
        };
        let content = match content_limit {
            Some(limit) => truncate_chars(&self.selftext, limit),
            None => self.selftext,
        };

        Post {
            id: self.id,
            title: self.title,
            content,
            subreddit: self.subreddit,
            author: self.author,
            score: self.score,
            url,
            num_comments: self.num_comments,
            created_utc: timestamp(self.created_utc),
            fetched_at: Utc::now(),
            is_self: self.is_self,
            is_original_content: self.is_original_content,
            has_awards: self.total_awards_received > 0,
            upvote_ratio: self.upvote_ratio,
        }
    }
}

impl RedditCommentData {
    pub fn into_comment(self, post_id: &str) -> Comment {
        Comment {
            id: self.id,
            post_id: post_id.to_string(),
            content: self.body,
            author: self.author,
            score: self.score,
            created_utc: timestamp(self.created_utc),
            fetched_at: Utc::now(),
        }
    }
}

fn timestamp(seconds: Option<f64>) -> Option<DateTime<Utc>> {
    seconds
        .filter(|s| *s > 0.0)
        .and_then(|s| DateTime::from_timestamp(s as i64, 0))
}

/// Cuts `text` to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => text[..byte_index].to_string(),
        None => text.to_string(),
    }
}

/// Splits a `/comments/<id>` response (a post listing followed by a comment
/// listing) into the post and up to `limit` top-level comments.
pub fn parse_thread(
    body: serde_json::Value,
    post_id: &str,
    limit: usize,
    content_limit: Option<usize>,
) -> Result<(Post, Vec<Comment>), CoreError> {
    let listings: Vec<RedditListing<serde_json::Value>> =
        serde_json::from_value(body).map_err(|e| {
            CoreError::RedditApi(RedditApiError::InvalidResponse {
                details: format!("unexpected thread shape for {}: {}", post_id, e),
            })
        })?;
    let mut listings = listings.into_iter();

    let post_data = listings
        .next()
        .and_then(|listing| listing.into_items().next())
        .ok_or_else(|| {
            CoreError::RedditApi(RedditApiError::PostNotFound {
                post_id: post_id.to_string(),
            })
        })?;
    let post: RedditPostData = serde_json::from_value(post_data)?;

    let comments = match listings.next() {
        Some(listing) => listing
            .data
            .children
            .into_iter()
            // "more" stubs carry no body
            .filter(|child| child.kind == "t1")
            .filter_map(|child| serde_json::from_value::<RedditCommentData>(child.data).ok())
            .take(limit)
            .map(|comment| comment.into_comment(post_id))
            .collect(),
        None => Vec::new(),
    };

    Ok((post.into_post(content_limit), comments))
}

/// Maps a non-success status to the matching error.
pub(crate) fn status_error(response: &Response, endpoint: &str) -> CoreError {
    let status = response.status();
    match status {
        StatusCode::TOO_MANY_REQUESTS => {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse::<u64>().ok())
                .unwrap_or(60);
            warn!("Rate limited on {}, retry after {} seconds", endpoint, retry_after);
            CoreError::RedditApi(RedditApiError::RateLimitExceeded { retry_after })
        }
        StatusCode::UNAUTHORIZED => CoreError::RedditApi(RedditApiError::InvalidToken),
        StatusCode::FORBIDDEN => CoreError::RedditApi(RedditApiError::Forbidden {
            resource: endpoint.to_string(),
        }),
        StatusCode::NOT_FOUND => CoreError::NotFound {
            resource: endpoint.to_string(),
        },
        s if s.is_server_error() => CoreError::RedditApi(RedditApiError::ServerError {
            status_code: s.as_u16(),
        }),
        s => CoreError::RequestFailed {
            message: format!("{} returned {}", endpoint, s),
            status_code: Some(s.as_u16()),
        },
    }
}

pub(crate) fn network_error(error: reqwest::Error) -> CoreError {
    if error.is_timeout() {
        CoreError::RedditApi(RedditApiError::RequestTimeout)
    } else {
        CoreError::Network(error)
    }
}

pub(crate) async fn decode<T: DeserializeOwned>(
    response: Response,
    endpoint: &str,
) -> Result<T, CoreError> {
    response.json::<T>().await.map_err(|e| {
        error!("Failed to parse response from {}: {}", endpoint, e);
        CoreError::RedditApi(RedditApiError::InvalidResponse {
            details: format!("Failed to parse response from {}", endpoint),
        })
    })
}

// Refusals about one resource say nothing about the transport's health.
fn counts_against_breaker(error: &CoreError) -> bool {
    !matches!(
        error,
        CoreError::NotFound { .. }
            | CoreError::RedditApi(RedditApiError::Forbidden { .. })
            | CoreError::RedditApi(RedditApiError::PostNotFound { .. })
    )
}

/// The authenticated transport: `oauth.reddit.com` with an application token.
#[derive(Debug)]
pub struct ApiTransport {
    http_client: Client,
    auth: AppTokenProvider,
    rate_limiter: RateLimiter,
    breaker: Mutex<CircuitBreaker>,
    user_agent: String,
}

impl ApiTransport {
    pub fn new(config: RedditOAuth2Config, timeout: Duration) -> Result<Self, CoreError> {
        let http_client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(timeout)
            .build()?;
        let user_agent = config.user_agent.clone();
        let auth = AppTokenProvider::new(config, http_client.clone())?;

        Ok(Self {
            http_client,
            auth,
            rate_limiter: RateLimiter::reddit_oauth(),
            breaker: Mutex::new(CircuitBreaker::reddit_api()),
            user_agent,
        })
    }

    pub fn breaker_state(&self) -> BreakerState {
        self.breaker.lock().state()
    }

    pub fn rate_limit_status(&self) -> RateLimitStatus {
        self.rate_limiter.status()
    }

    async fn make_request(
        &self,
        endpoint: &str,
        query_params: &[(&str, String)],
    ) -> Result<Response, CoreError> {
        let allowed = self.breaker.lock().allow_request();
        if !allowed {
            debug!("Circuit breaker open, skipping API call to {}", endpoint);
            return Err(CoreError::RedditApi(RedditApiError::CircuitOpen {
                transport: self.name().to_string(),
            }));
        }

        let result = self.send(endpoint, query_params).await;
        {
            let mut breaker = self.breaker.lock();
            match &result {
                Err(e) if counts_against_breaker(e) => breaker.record_failure(),
                _ => breaker.record_success(),
            }
        }
        result
    }

    async fn send(
        &self,
        endpoint: &str,
        query_params: &[(&str, String)],
    ) -> Result<Response, CoreError> {
        let waited = self.rate_limiter.acquire().await;
        debug!("Rate limit token for {} after {:?}", endpoint, waited);
        let access_token = self.auth.access_token().await?;

        let url = format!("{}{}", REDDIT_API_BASE, endpoint);
        debug!("Making Reddit API request: GET {}", endpoint);
        let response = self
            .http_client
            .get(&url)
            .bearer_auth(access_token)
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .query(query_params)
            .send()
            .await
            .map_err(|e| {
                error!("Network error for GET {}: {}", endpoint, e);
                network_error(e)
            })?;

        if response.status().is_success() {
            return Ok(response);
        }

        error!(
            "Request failed with status: {} for {}",
            response.status(),
            endpoint
        );
        if response.status() == StatusCode::UNAUTHORIZED {
            self.auth.invalidate();
        }
        Err(status_error(&response, endpoint))
    }

    async fn fetch_thread(
        &self,
        post_id: &str,
        limit: usize,
    ) -> Result<(Post, Vec<Comment>), CoreError> {
        check_post_id(post_id)?;
        let endpoint = format!("/comments/{}", post_id);
        let params = [("limit", limit.to_string()), ("raw_json", "1".to_string())];
        let response = self.make_request(&endpoint, &params).await?;
        let body: serde_json::Value = decode(response, &endpoint).await?;
        parse_thread(body, post_id, limit, Some(API_CONTENT_LIMIT))
    }
}

#[async_trait]
impl PostSource for ApiTransport {
    fn name(&self) -> &'static str {
        "api"
    }

    fn guard_status(&self) -> Option<GuardStatus> {
        Some(GuardStatus {
            breaker: self.breaker_state(),
            rate_limit: self.rate_limit_status(),
        })
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<Post>, CoreError> {
        let endpoint = format!("/r/{}/search", query.subreddit);
        let mut params = vec![
            ("q", query.text.clone()),
            ("restrict_sr", "1".to_string()),
            ("sort", "relevance".to_string()),
            ("limit", query.limit.to_string()),
            ("raw_json", "1".to_string()),
        ];
        if let Some(filter) = query.time_filter {
            params.push(("t", filter.as_str().to_string()));
        }

        let response = self.make_request(&endpoint, &params).await?;
        let listing: RedditListing<RedditPostData> = decode(response, &endpoint).await?;

        let posts: Vec<Post> = listing
            .into_items()
            .take(query.limit)
            .map(|data| data.into_post(Some(API_CONTENT_LIMIT)))
            .collect();

        info!("API search found {} posts in r/{}", posts.len(), query.subreddit);
        Ok(posts)
    }

    async fn fetch_post(&self, post_id: &str) -> Result<Post, CoreError> {
        let (post, _) = self.fetch_thread(post_id, 1).await?;
        Ok(post)
    }

    async fn fetch_comments(&self, post_id: &str, limit: usize) -> Result<Vec<Comment>, CoreError> {
        let (_, comments) = self.fetch_thread(post_id, limit).await?;
        Ok(comments)
    }
}
