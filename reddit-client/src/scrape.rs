use crate::api::{
    decode, network_error, parse_thread, status_error, RedditListing, RedditPostData,
    RedditSubredditData,
};
use crate::rate_limiter::RequestPacer;
use crate::{check_post_id, PostSource, SubredditDirectory};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use threadscout_core::{Comment, CoreError, Post, SearchQuery};
use tracing::{debug, info, warn};

const REDDIT_PUBLIC_BASE: &str = "https://www.reddit.com";

const BROWSER_USER_AGENTS: [&str; 5] = [
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.3.1 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Edge/122.0.2365.66",
];

pub fn random_user_agent() -> &'static str {
    BROWSER_USER_AGENTS[fastrand::usize(..BROWSER_USER_AGENTS.len())]
}

/// The unauthenticated transport over Reddit's public `.json` endpoints.
/// Every request waits on the shared pacer first.
#[derive(Debug)]
pub struct ScrapeTransport {
    http_client: Client,
    pacer: Arc<RequestPacer>,
}

impl ScrapeTransport {
    pub fn new(pacer: Arc<RequestPacer>, timeout: Duration) -> Result<Self, CoreError> {
        let http_client = Client::builder().timeout(timeout).build()?;
        Ok(Self { http_client, pacer })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, CoreError> {
        self.pacer.wait().await;

        let url = format!("{}{}", REDDIT_PUBLIC_BASE, path);
        debug!("Fetching public JSON: {}", path);
        let response = self
            .http_client
            .get(&url)
            .header(reqwest::header::USER_AGENT, random_user_agent())
            .query(params)
            .send()
            .await
            .map_err(network_error)?;

        if !response.status().is_success() {
            warn!("Public request {} returned {}", path, response.status());
            return Err(status_error(&response, path));
        }

        decode(response, path).await
    }
}

/// Keeps link posts and self-posts that have a body.
fn has_meaningful_content(post: &Post) -> bool {
    !post.is_self || !post.content.is_empty()
}

#[async_trait]
impl PostSource for ScrapeTransport {
    fn name(&self) -> &'static str {
        "scrape"
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<Post>, CoreError> {
        let path = format!("/r/{}/search.json", query.subreddit);
        let mut params = vec![
            ("q", query.text.clone()),
            ("limit", query.limit.to_string()),
            ("restrict_sr", "1".to_string()),
            ("raw_json", "1".to_string()),
        ];
        if let Some(filter) = query.time_filter {
            params.push(("t", filter.as_str().to_string()));
        }

        let listing: RedditListing<RedditPostData> = self.get_json(&path, &params).await?;
        let posts: Vec<Post> = listing
            .into_items()
            .map(|data| data.into_post(None))
            .filter(has_meaningful_content)
            .take(query.limit)
            .collect();

        info!(
            "Scraping search found {} posts in r/{}",
            posts.len(),
            query.subreddit
        );
        Ok(posts)
    }

    async fn fetch_post(&self, post_id: &str) -> Result<Post, CoreError> {
        check_post_id(post_id)?;
        let path = format!("/comments/{}.json", post_id);
        let body: serde_json::Value = self
            .get_json(&path, &[("limit", "1".to_string()), ("raw_json", "1".to_string())])
            .await?;
        let (post, _) = parse_thread(body, post_id, 1, None)?;
        Ok(post)
    }

    async fn fetch_comments(&self, post_id: &str, limit: usize) -> Result<Vec<Comment>, CoreError> {
        check_post_id(post_id)?;
        let path = format!("/comments/{}.json", post_id);
        let body: serde_json::Value = self
            .get_json(&path, &[("limit", limit.to_string()), ("raw_json", "1".to_string())])
            .await?;
        let (_, comments) = parse_thread(body, post_id, limit, None)?;
        Ok(comments)
    }
}

#[async_trait]
impl SubredditDirectory for ScrapeTransport {
    async fn search_subreddits(&self, query: &str, limit: usize) -> Result<Vec<String>, CoreError> {
        let listing: RedditListing<RedditSubredditData> = self
            .get_json(
                "/subreddits/search.json",
                &[("q", query.to_string()), ("limit", limit.to_string())],
            )
            .await?;

        Ok(listing
            .into_items()
            .filter(|sub| !sub.over18)
            .map(|sub| sub.display_name)
            .collect())
    }

    async fn search_post_subreddits(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<String>, CoreError> {
        let listing: RedditListing<RedditPostData> = self
            .get_json(
                "/search.json",
                &[
                    ("q", query.to_string()),
                    ("sort", "relevance".to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;

        Ok(listing
            .into_items()
            .filter(|post| !post.over_18)
            .map(|post| post.subreddit)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_user_agent_is_a_browser() {
        for _ in 0..20 {
            assert!(random_user_agent().starts_with("Mozilla/5.0"));
        }
    }

    #[test]
    fn test_empty_self_posts_are_skipped() {
        let mut self_post = Post::new("a", "Question?", "rust");
        assert!(!has_meaningful_content(&self_post));

        self_post.content = "details".to_string();
        assert!(has_meaningful_content(&self_post));

        let mut link_post = Post::new("b", "Article", "rust");
        link_post.is_self = false;
        assert!(has_meaningful_content(&link_post));
    }
}
