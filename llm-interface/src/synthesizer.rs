use crate::{GenerationRequest, TextGenerator};
use std::sync::Arc;
use threadscout_core::{Comment, CoreError, Outcome, Post};
use tracing::{error, info, warn};

pub const NO_POSTS_ANSWER: &str = "No relevant posts found to synthesize an answer.";
pub const STILL_PROCESSING_ANSWER: &str = "I'm still processing your request. This might take a moment due to the complexity of your query. Please wait or try again with a simpler query.";
pub const SUMMARY_ERROR_ANSWER: &str =
    "Sorry, I encountered an error while trying to generate a summary.";
pub const QUESTION_ERROR_ANSWER: &str =
    "Sorry, I encountered an error while trying to answer your question.";

const CONTEXT_POSTS: usize = 5;
const SUMMARY_COMMENTS: usize = 10;
const COMMENT_CHARS: usize = 500;

const SYNTHESIS_PROMPT: &str = r#"You are a helpful assistant specializing in summarizing Reddit discussions. Given the following extracted key points and top comments, produce a clear and concise summary that highlights common themes, divergent opinions, and any consensus reached. Maintain the informal tone of Reddit while ensuring clarity and brevity.

CONTEXT:
{context}

REQUIREMENTS:
1. Highlight common themes and patterns
2. Note any significant disagreements or debates
3. Identify any consensus or widely supported views
4. Preserve Reddit's informal, authentic tone
5. Include relevant examples or specific experiences
6. Structure with clear sections:
   - Main Points
   - Areas of Agreement
   - Differing Views (if any)
7. Use **bold** for key insights
8. Keep it concise but informative
9. Add credibility markers (e.g., "Multiple users reported...")
10. Note if certain views are from specific subreddits"#;

/// A post handed to the synthesizer, with its similarity when it was ranked.
pub type ContextPost<'a> = (&'a Post, Option<f64>);

/// Numbered context block for the top posts.
pub fn build_context(posts: &[ContextPost<'_>]) -> String {
    posts
        .iter()
        .take(CONTEXT_POSTS)
        .enumerate()
        .map(|(i, (post, similarity))| {
            let relevance = similarity
                .map(|s| format!(" (Relevance: {:.2}%)", s * 100.0))
                .unwrap_or_default();
            let subreddit = if post.subreddit.is_empty() {
                String::new()
            } else {
                format!(" from r/{}", post.subreddit)
            };
            format!(
                "{}. Title: {}{}{}\nContent: {}\n",
                i + 1,
                post.title,
                relevance,
                subreddit,
                post.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn build_synthesis_prompt(posts: &[ContextPost<'_>]) -> String {
    SYNTHESIS_PROMPT.replace("{context}", &build_context(posts))
}

fn post_context(post: &Post) -> String {
    format!("Title: {}\n\nContent: {}", post.title, post.content)
}

pub fn build_summary_prompt(post: &Post, comments: &[Comment]) -> String {
    let mut prompt = format!(
        "Summarize the following Reddit post and its top comments. Keep Reddit's informal tone, \
         point out where commenters agree or disagree, and use **bold** for key insights. \
         Keep it to a few short paragraphs.\n\nPOST (r/{}):\n{}\n",
        post.subreddit,
        post_context(post)
    );

    if !comments.is_empty() {
        prompt.push_str("\nTOP COMMENTS:\n");
        let mut ranked: Vec<&Comment> = comments.iter().collect();
        ranked.sort_by(|a, b| b.score.cmp(&a.score));
        for comment in ranked.into_iter().take(SUMMARY_COMMENTS) {
            let text: String = comment.content.chars().take(COMMENT_CHARS).collect();
            prompt.push_str(&format!("- ({} points) {}\n", comment.score, text));
        }
    }
    prompt
}

pub fn build_question_prompt(post: &Post, question: &str) -> String {
    format!(
        "Answer the question using only the Reddit post below. If the post does not contain \
         the answer, say so briefly.\n\nPOST:\n{}\n\nQUESTION: {}",
        post_context(post),
        question
    )
}

/// Writes prose answers from ranked posts. Upstream failures become canned
/// replies carried in `Outcome::Degraded`, so callers always get text.
pub struct AnswerSynthesizer {
    generator: Arc<dyn TextGenerator>,
}

impl AnswerSynthesizer {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    pub async fn synthesize(
        &self,
        query: &str,
        posts: &[ContextPost<'_>],
        model: Option<&str>,
    ) -> Outcome<String> {
        if posts.is_empty() {
            return Outcome::degraded(NO_POSTS_ANSWER.to_string(), "no posts to summarize");
        }

        info!(
            "Synthesizing answer for '{}' from {} posts",
            query,
            posts.len().min(CONTEXT_POSTS)
        );
        self.run(build_synthesis_prompt(posts), model, SUMMARY_ERROR_ANSWER)
            .await
    }

    pub async fn summarize_post(
        &self,
        post: &Post,
        comments: &[Comment],
        model: Option<&str>,
    ) -> Outcome<String> {
        info!("Summarizing post {} with {} comments", post.id, comments.len());
        self.run(build_summary_prompt(post, comments), model, SUMMARY_ERROR_ANSWER)
            .await
    }

    pub async fn answer_question(
        &self,
        post: &Post,
        question: &str,
        model: Option<&str>,
    ) -> Outcome<String> {
        info!("Answering question about post {}", post.id);
        self.run(
            build_question_prompt(post, question),
            model,
            QUESTION_ERROR_ANSWER,
        )
        .await
    }

    async fn run(&self, prompt: String, model: Option<&str>, on_error: &str) -> Outcome<String> {
        let request = GenerationRequest::new(prompt).with_model(model);
        match self.generator.generate(request).await {
            Ok(text) => Outcome::Success(text),
            Err(e) => degrade(e, on_error),
        }
    }
}

fn degrade(error: CoreError, on_error: &str) -> Outcome<String> {
    if error.is_timeout() {
        warn!("Generation timed out");
        Outcome::degraded(STILL_PROCESSING_ANSWER.to_string(), error.to_string())
    } else {
        error!("Generation failed: {}", error);
        Outcome::degraded(on_error.to_string(), error.to_string())
    }
}
