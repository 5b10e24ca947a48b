//! The request pipeline behind every search:
//! rewrite the query, fan out over Reddit, rank, then synthesize an answer.
//!
//! Every external dependency degrades instead of failing the request; the
//! only errors that escape are invalid input and unreachable posts.

pub mod models;

pub use models::{
    AnswerResponse, AskRequest, HealthReport, PostResult, ProcessingApproach, SearchMetadata,
    SearchRequest, SearchResponse, SummaryResponse,
};

use chrono::Utc;
use embedding_engine::{
    InMemoryVectorIndex, OllamaEmbedder, Ranking, RankingApproach, SemanticRanker, VectorIndex,
};
use llm_interface::rewriter::{subreddit_mention, time_phrase_in};
use llm_interface::synthesizer::{ContextPost, QUESTION_ERROR_ANSWER, SUMMARY_ERROR_ANSWER};
use llm_interface::{AnswerSynthesizer, OllamaClient, QueryRewriter, TextGenerator};
use reddit_client::discovery::normalize_subreddit;
use reddit_client::RedditClient;
use std::sync::Arc;
use threadscout_core::{AppConfig, CoreError, Outcome, SearchConfig, TimeFilter};
use tracing::{info, warn};

pub const NO_RESULTS_SUMMARY: &str =
    "No relevant discussions found. Try adjusting your search terms or exploring a different subreddit.";

const MAX_LIMIT: usize = 100;
const SUMMARY_COMMENTS: usize = 25;

pub struct SearchPipeline {
    reddit: Arc<RedditClient>,
    generator: Arc<dyn TextGenerator>,
    index: Arc<dyn VectorIndex>,
    rewriter: QueryRewriter,
    ranker: SemanticRanker,
    synthesizer: AnswerSynthesizer,
    default_limit: usize,
}

impl SearchPipeline {
    pub fn new(
        reddit: Arc<RedditClient>,
        generator: Arc<dyn TextGenerator>,
        index: Arc<dyn VectorIndex>,
        config: &SearchConfig,
    ) -> Self {
        Self {
            rewriter: QueryRewriter::new(generator.clone()),
            synthesizer: AnswerSynthesizer::new(generator.clone()),
            ranker: SemanticRanker::new(
                index.clone(),
                config.semantic_limit,
                config.min_similarity,
            ),
            reddit,
            generator,
            index,
            default_limit: config.default_limit,
        }
    }

    /// Builds the production clients: Reddit transports, Ollama for text
    /// and embeddings, and the vector index under the data directory.
    pub fn from_config(config: &AppConfig) -> Result<Self, CoreError> {
        let reddit = Arc::new(RedditClient::from_config(&config.reddit)?);
        let generator: Arc<dyn TextGenerator> = Arc::new(OllamaClient::new(&config.llm)?);
        let embedder = Arc::new(OllamaEmbedder::new(&config.llm)?);
        let index: Arc<dyn VectorIndex> = match &config.server.data_dir {
            Some(dir) => Arc::new(InMemoryVectorIndex::open(embedder, dir)?),
            None => Arc::new(InMemoryVectorIndex::new(embedder)),
        };

        info!(
            "Search pipeline ready (transports: {:?}, model: {})",
            reddit.transport_names(),
            config.llm.model
        );
        Ok(Self::new(reddit, generator, index, &config.search))
    }

    pub async fn search(&self, request: SearchRequest) -> Result<SearchResponse, CoreError> {
        let query = request.query.trim().to_string();
        if query.is_empty() {
            return Err(CoreError::InvalidInput {
                message: "query must not be empty".to_string(),
            });
        }
        let limit = request
            .limit
            .unwrap_or(self.default_limit)
            .clamp(1, MAX_LIMIT);
        let model = request.model.as_deref();

        let subreddit = request
            .subreddit
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .or_else(|| subreddit_mention(&query))
            .map(|name| normalize_subreddit(name.trim_start_matches("r/")));
        if let Some(name) = &subreddit {
            info!("Searching within r/{}", name);
        }

        let time_filter = time_phrase_in(&query).and_then(|phrase| {
            info!("Detected time period in query: {}", phrase);
            TimeFilter::from_phrase(&phrase)
        });

        let rewritten = self.rewriter.rewrite(&query, model).await;
        info!("Using search terms: \"{}\"", rewritten.text);

        let results = self
            .reddit
            .search_posts(&rewritten.text, subreddit.as_deref(), limit, time_filter)
            .await;
        info!("Found {} relevant discussions", results.posts.len());

        let mut metadata = SearchMetadata {
            total_posts_found: results.posts.len(),
            processing_approach: ProcessingApproach::NoResults,
            ranking: None,
            rewrite_source: rewritten.source,
            subreddit,
            subreddits_searched: results.subreddits,
            discovery: results.discovery,
            failed_subreddits: results.failed_subreddits,
            timestamp: Utc::now(),
        };

        if results.posts.is_empty() {
            return Ok(SearchResponse {
                original_query: query,
                rewritten_query: rewritten.text,
                posts: Vec::new(),
                summary: NO_RESULTS_SUMMARY.to_string(),
                metadata,
            });
        }

        let ranking = match self.ranker.rank(&rewritten.text, &results.posts).await {
            Outcome::Success(ranking) => ranking,
            Outcome::Degraded { value, reason } => {
                warn!("Falling back to basic ranking: {}", reason);
                value
            }
            Outcome::Empty | Outcome::Failed(_) => {
                // rank() only returns these for empty input, handled above
                Ranking {
                    candidates: Vec::new(),
                    approach: RankingApproach::Unscored,
                }
            }
        };
        metadata.processing_approach = ranking.approach.into();
        metadata.ranking = Some(ranking.approach);

        let with_similarity = ranking.approach == RankingApproach::Semantic;
        let context: Vec<ContextPost<'_>> = ranking
            .candidates
            .iter()
            .map(|c| (&c.post, with_similarity.then_some(c.similarity)))
            .collect();
        let summary = text_or(
            self.synthesizer.synthesize(&query, &context, model).await,
            SUMMARY_ERROR_ANSWER,
        );

        Ok(SearchResponse {
            original_query: query,
            rewritten_query: rewritten.text,
            posts: ranking.candidates.into_iter().map(PostResult::from).collect(),
            summary,
            metadata,
        })
    }

    /// Summary of one post and its top comments. Comment failures only
    /// narrow the context.
    pub async fn summarize(
        &self,
        post_id: &str,
        model: Option<&str>,
    ) -> Result<SummaryResponse, CoreError> {
        let post = self.reddit.fetch_post(post_id).await?;
        let comments = match self.reddit.fetch_comments(post_id, SUMMARY_COMMENTS).await {
            Ok(comments) => comments,
            Err(e) => {
                warn!("Summarizing {} without comments: {}", post_id, e);
                Vec::new()
            }
        };

        let summary = text_or(
            self.synthesizer.summarize_post(&post, &comments, model).await,
            SUMMARY_ERROR_ANSWER,
        );
        Ok(SummaryResponse { summary })
    }

    pub async fn ask(&self, request: AskRequest) -> Result<AnswerResponse, CoreError> {
        let question = request.question.trim();
        if question.is_empty() || request.post_id.trim().is_empty() {
            return Err(CoreError::InvalidInput {
                message: "post_id and question are required".to_string(),
            });
        }

        let post = self.reddit.fetch_post(request.post_id.trim()).await?;
        let answer = text_or(
            self.synthesizer
                .answer_question(&post, question, request.model.as_deref())
                .await,
            QUESTION_ERROR_ANSWER,
        );
        Ok(AnswerResponse { answer })
    }

    pub async fn health(&self) -> HealthReport {
        let ollama_reachable = self.generator.check_health().await;
        HealthReport {
            status: if ollama_reachable { "ok" } else { "degraded" },
            ollama_reachable,
            transports: self.reddit.transport_health().await,
            indexed_posts: self.index.len(),
        }
    }
}

fn text_or(outcome: Outcome<String>, fallback: &str) -> String {
    outcome.value().unwrap_or_else(|| fallback.to_string())
}
