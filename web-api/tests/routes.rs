use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use embedding_engine::{Embedder, InMemoryVectorIndex};
use llm_interface::{GenerationRequest, TextGenerator};
use reddit_client::metrics::MetricsCollector;
use reddit_client::{PostSource, RedditClient, SubredditDirectory};
use search_service::SearchPipeline;
use serde_json::{json, Value};
use std::sync::Arc;
use threadscout_core::{Comment, CoreError, Post, RedditApiError, SearchConfig, SearchQuery};
use tower::ServiceExt;
use web_api::{router, AppState};

struct OnePost;

fn the_post() -> Post {
    let mut post = Post::new("abc123", "Which async runtime do you use?", "rust");
    post.content = "Mostly tokio here.".to_string();
    post.score = 120;
    post.num_comments = 45;
    post
}

#[async_trait]
impl PostSource for OnePost {
    fn name(&self) -> &'static str {
        "fixture"
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<Post>, CoreError> {
        if query.subreddit == "rust" {
            Ok(vec![the_post()])
        } else {
            Ok(Vec::new())
        }
    }

    async fn fetch_post(&self, post_id: &str) -> Result<Post, CoreError> {
        if post_id == "abc123" {
            Ok(the_post())
        } else {
            Err(CoreError::RedditApi(RedditApiError::PostNotFound {
                post_id: post_id.to_string(),
            }))
        }
    }

    async fn fetch_comments(&self, post_id: &str, _limit: usize) -> Result<Vec<Comment>, CoreError> {
        self.fetch_post(post_id).await?;
        Ok(Vec::new())
    }
}

struct NoDirectory;

#[async_trait]
impl SubredditDirectory for NoDirectory {
    async fn search_subreddits(&self, _query: &str, _limit: usize) -> Result<Vec<String>, CoreError> {
        Ok(Vec::new())
    }

    async fn search_post_subreddits(
        &self,
        _query: &str,
        _limit: usize,
    ) -> Result<Vec<String>, CoreError> {
        Ok(Vec::new())
    }
}

struct EchoModel;

#[async_trait]
impl TextGenerator for EchoModel {
    async fn generate(&self, request: GenerationRequest) -> Result<String, CoreError> {
        if request.prompt.starts_with("Extract") {
            Ok("async runtime, tokio".to_string())
        } else {
            Ok(format!("reply from {}", request.model.as_deref().unwrap_or("default")))
        }
    }

    async fn check_health(&self) -> bool {
        true
    }
}

struct FlatEmbedder;

#[async_trait]
impl Embedder for FlatEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CoreError> {
        Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
    }
}

fn app() -> axum::Router {
    let reddit = Arc::new(RedditClient::new(
        vec![Arc::new(OnePost) as Arc<dyn PostSource>],
        Arc::new(NoDirectory),
        Arc::new(MetricsCollector::new()),
    ));
    let pipeline = SearchPipeline::new(
        reddit,
        Arc::new(EchoModel),
        Arc::new(InMemoryVectorIndex::new(Arc::new(FlatEmbedder))),
        &SearchConfig::default(),
    );
    router(AppState::new(pipeline))
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn read_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_search_route() {
    let response = app()
        .oneshot(post_json(
            "/search",
            json!({ "query": "best async runtime in r/rust", "limit": 5 }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["original_query"], "best async runtime in r/rust");
    assert_eq!(body["rewritten_query"], "async runtime, tokio");
    assert_eq!(body["summary"], "reply from default");
    assert_eq!(body["posts"][0]["id"], "abc123");
    assert_eq!(body["posts"][0]["num_comments"], 45);
    assert!(body["posts"][0]["relevance_score"].is_number());
    assert_eq!(body["metadata"]["processing_approach"], "semantic_search");
    assert_eq!(body["metadata"]["subreddit"], "rust");
}

#[tokio::test]
async fn test_search_without_results() {
    let response = app()
        .oneshot(post_json("/search", json!({ "query": "anything at all" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["posts"], json!([]));
    assert_eq!(
        body["summary"],
        "No relevant discussions found. Try adjusting your search terms or exploring a different subreddit."
    );
}

#[tokio::test]
async fn test_empty_query_is_bad_request() {
    let response = app()
        .oneshot(post_json("/search", json!({ "query": "  " })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json(response).await;
    assert!(body["detail"].is_string());
}

#[tokio::test]
async fn test_malformed_body_uses_detail_shape() {
    let response = app()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/search")
                .header("content-type", "application/json")
                .body(Body::from("{\"query\": "))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json(response).await;
    assert!(body["detail"].is_string());
}

#[tokio::test]
async fn test_missing_field_uses_detail_shape() {
    let response = app()
        .oneshot(post_json("/ask", json!({ "post_id": "abc123" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = read_json(response).await;
    assert!(body["detail"].as_str().unwrap().contains("question"));
}

#[tokio::test]
async fn test_summarize_route() {
    let response = app()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/summarize/abc123?model=mistral")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await, json!({ "summary": "reply from mistral" }));
}

#[tokio::test]
async fn test_summarize_unknown_post() {
    let response = app()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/summarize/nope")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_invalid_post_id_is_not_found() {
    let response = app()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/summarize/ABC..x")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = read_json(response).await;
    assert_eq!(body["detail"], "Post ABC..x not found");
}

#[tokio::test]
async fn test_ask_route() {
    let response = app()
        .oneshot(post_json(
            "/ask",
            json!({ "post_id": "abc123", "question": "Which runtime wins?" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await, json!({ "answer": "reply from default" }));
}

#[tokio::test]
async fn test_health_route() {
    let response = app()
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["ollama_reachable"], true);
    assert_eq!(body["transports"][0]["name"], "fixture");
    assert_eq!(body["transports"][0]["total_requests"], 0);
    assert_eq!(body["transports"][0]["success_rate"], 0.0);
}
