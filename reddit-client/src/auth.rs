use oauth2::basic::BasicClient;
use oauth2::{AuthUrl, ClientId, ClientSecret, HttpRequest, HttpResponse, TokenResponse, TokenUrl};
use parking_lot::Mutex;
use std::time::{Duration, Instant};
use threadscout_core::{CoreError, RedditApiError};
use tracing::{debug, info, warn};

const AUTHORIZE_URL: &str = "https://www.reddit.com/api/v1/authorize";
const ACCESS_TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";

// Tokens are refreshed this long before Reddit would reject them.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct RedditOAuth2Config {
    pub client_id: String,
    pub client_secret: String,
    pub user_agent: String,
}

#[derive(Debug, Clone)]
pub struct RedditToken {
    pub access_token: String,
    pub expires_at: Instant,
}

impl RedditToken {
    pub fn new(access_token: String, expires_in: Duration) -> Self {
        Self {
            access_token,
            expires_at: Instant::now() + expires_in,
        }
    }

    pub fn is_valid(&self) -> bool {
        Instant::now() + EXPIRY_MARGIN < self.expires_at
    }
}

/// Application-only OAuth2 tokens (client-credentials grant), cached until
/// they are close to expiry.
pub struct AppTokenProvider {
    oauth_client: BasicClient,
    http_client: reqwest::Client,
    user_agent: String,
    cached: Mutex<Option<RedditToken>>,
}

impl AppTokenProvider {
    pub fn new(config: RedditOAuth2Config, http_client: reqwest::Client) -> Result<Self, CoreError> {
        let auth_url = AuthUrl::new(AUTHORIZE_URL.to_string()).map_err(invalid_url)?;
        let token_url = TokenUrl::new(ACCESS_TOKEN_URL.to_string()).map_err(invalid_url)?;

        let oauth_client = BasicClient::new(
            ClientId::new(config.client_id),
            Some(ClientSecret::new(config.client_secret)),
            auth_url,
            Some(token_url),
        );

        Ok(Self {
            oauth_client,
            http_client,
            user_agent: config.user_agent,
            cached: Mutex::new(None),
        })
    }

    pub async fn access_token(&self) -> Result<String, CoreError> {
        let cached = self.cached.lock().clone().filter(|t| t.is_valid());
        if let Some(token) = cached {
            return Ok(token.access_token);
        }

        debug!("Requesting application token from Reddit");
        let http_client = self.http_client.clone();
        let user_agent = self.user_agent.clone();
        let response = self
            .oauth_client
            .exchange_client_credentials()
            .request_async(|request| send_token_request(http_client, user_agent, request))
            .await
            .map_err(|e| {
                warn!("Reddit token request failed: {}", e);
                CoreError::RedditApi(RedditApiError::AuthenticationFailed {
                    reason: e.to_string(),
                })
            })?;

        let expires_in = response
            .expires_in()
            .unwrap_or_else(|| Duration::from_secs(3600));
        let token = RedditToken::new(response.access_token().secret().clone(), expires_in);
        info!("Obtained Reddit application token (expires in {:?})", expires_in);

        let access_token = token.access_token.clone();
        *self.cached.lock() = Some(token);
        Ok(access_token)
    }

    /// Drops the cached token after Reddit rejected it.
    pub fn invalidate(&self) {
        *self.cached.lock() = None;
    }
}

impl std::fmt::Debug for AppTokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppTokenProvider")
            .field("user_agent", &self.user_agent)
            .field("has_token", &self.cached.lock().is_some())
            .finish()
    }
}

// Reddit refuses token requests without a descriptive User-Agent, which the
// stock oauth2 client does not send.
async fn send_token_request(
    http_client: reqwest::Client,
    user_agent: String,
    request: HttpRequest,
) -> Result<HttpResponse, reqwest::Error> {
    let response = http_client
        .request(request.method, request.url.as_str())
        .headers(request.headers)
        .header(reqwest::header::USER_AGENT, user_agent)
        .body(request.body)
        .send()
        .await?;

    let status_code = response.status();
    let headers = response.headers().clone();
    let body = response.bytes().await?.to_vec();

    Ok(HttpResponse {
        status_code,
        headers,
        body,
    })
}

fn invalid_url(error: oauth2::url::ParseError) -> CoreError {
    CoreError::Internal {
        message: format!("invalid OAuth endpoint: {}", error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_validity() {
        let fresh = RedditToken::new("abc".to_string(), Duration::from_secs(3600));
        assert!(fresh.is_valid());

        let nearly_expired = RedditToken::new("abc".to_string(), Duration::from_secs(30));
        assert!(!nearly_expired.is_valid());
    }

    #[tokio::test]
    async fn test_cached_token_is_reused() {
        let provider = AppTokenProvider::new(
            RedditOAuth2Config {
                client_id: "id".to_string(),
                client_secret: "secret".to_string(),
                user_agent: "test-agent/1.0".to_string(),
            },
            reqwest::Client::new(),
        )
        .unwrap();

        *provider.cached.lock() = Some(RedditToken::new(
            "cached-token".to_string(),
            Duration::from_secs(3600),
        ));

        assert_eq!(provider.access_token().await.unwrap(), "cached-token");

        provider.invalidate();
        assert!(provider.cached.lock().is_none());
    }
}
