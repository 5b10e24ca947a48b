//! Turns a free-text question into a short list of search keywords.
//!
//! The model is asked for comma-separated keywords, and its reply is scrubbed
//! of the chatty preambles small models like to add. Replies that still look
//! wrong are replaced by a local keyword extractor.

use crate::{GenerationRequest, TextGenerator};
use regex::Regex;
use serde::Serialize;
use std::sync::{Arc, OnceLock};
use threadscout_core::LlmError;
use tracing::{debug, info, warn};

const STOP_WORDS: [&str; 19] = [
    "a", "an", "the", "and", "or", "but", "is", "are", "on", "of", "what", "which", "who", "whom",
    "whose", "why", "how", "when", "where",
];

const MAX_KEYWORD_WORDS: usize = 15;

macro_rules! cached_regex {
    ($name:ident, $pattern:expr) => {
        fn $name() -> &'static Regex {
            static PATTERN: OnceLock<Regex> = OnceLock::new();
            PATTERN.get_or_init(|| Regex::new($pattern).expect("valid rewriter pattern"))
        }
    };
}

cached_regex!(placeholder, r"(?i)\bterm\d\b|\bkeyword\d\b");
cached_regex!(time_phrase, r"(?i)\b(today|yesterday|this week|this month|recent|latest|new)\b");
cached_regex!(subreddit_reference, r"(?i)(?:r/|subreddit\s+)(\w+)");
cached_regex!(long_word, r"\b\w{3,}\b");
cached_regex!(ai_topic, r"\b(ai|artificial intelligence|machine learning)\b");
cached_regex!(
    polite_preamble,
    r"(?is)^(Sure|Here|I'll|These|Following|Best|Top|Absolutely|Certainly|Definitely|Let me|I'd|I've|I have|I think|I will|I would|Here's|Based on|As requested).+?:"
);
cached_regex!(
    search_preamble,
    r"(?is)^.+?(search terms|keywords|searching|search on|search in|search for|to find|finding posts|find relevant|find information).+?:"
);
cached_regex!(label_preamble, r"(?is)^.*?(Output|Terms|Results|Keywords).*?:");
cached_regex!(
    count_preamble,
    r"(?is)^.*?(\d+)\s*(simple|effective|useful|key|important|main|relevant|primary|essential).*:"
);
cached_regex!(heading, r"(?s)^.*?:(\s*)");
cached_regex!(opener, r"(?i)^(Sure\s*,?\s*|Okay\s*,?\s*|Here\s*,?\s*|Well\s*,?\s*)");
cached_regex!(list_marker, r"(?m)^\d+[\.\)]\s*");
cached_regex!(inline_list_marker, r"\n+\d+[\.\)]\s*");
cached_regex!(newlines, r"\n+");
cached_regex!(stray_chars, r"[^\w\s,]");
cached_regex!(comma_spacing, r"\s*,\s*");
cached_regex!(trailing_comma, r",\s*$");
cached_regex!(double_comma, r",\s*,");

/// Which path produced the keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RewriteSource {
    Model,
    Heuristic,
    Passthrough,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RewrittenQuery {
    pub text: String,
    pub source: RewriteSource,
}

pub fn mentions_time(query: &str) -> bool {
    time_phrase().is_match(query)
}

/// The first time phrase in the query, lower-cased.
pub fn time_phrase_in(query: &str) -> Option<String> {
    time_phrase()
        .captures(query)
        .map(|captures| captures[1].to_lowercase())
}

/// The subreddit named by `r/name` or `subreddit name`, as written.
pub fn subreddit_mention(query: &str) -> Option<String> {
    subreddit_reference()
        .captures(query)
        .map(|captures| captures[1].to_string())
}

/// Rule-based keywords: longer words minus stop words, plus topic, time and
/// subreddit hints.
pub fn extract_keywords(query: &str) -> Vec<String> {
    let lowered = query.to_lowercase();
    let mut keywords: Vec<String> = long_word()
        .find_iter(&lowered)
        .map(|m| m.as_str())
        .filter(|word| !STOP_WORDS.contains(word))
        .map(str::to_string)
        .collect();

    if ai_topic().is_match(&lowered)
        && !keywords
            .iter()
            .any(|k| k == "artificial intelligence" || k == "ai")
    {
        keywords.push("artificial intelligence".to_string());
    }

    if mentions_time(query) {
        keywords.push("recent".to_string());
    }

    if let Some(subreddit) = subreddit_mention(query) {
        let subreddit = subreddit.to_lowercase();
        if !keywords.contains(&subreddit) {
            keywords.push(format!("r/{}", subreddit));
        }
    }

    keywords
}

pub fn build_prompt(query: &str) -> String {
    format!(
        r#"Extract 3-5 search keywords from: "{}"

OUTPUT FORMAT: keyword1, keyword2, keyword3

EXAMPLES:
"What are the most recommended productivity apps according to r/productivity?"
productivity apps, recommended apps, top productivity tools

"What are the top discussions about artificial intelligence on Reddit this week?"
artificial intelligence, AI discussions, machine learning, neural networks, AI ethics"#,
        query
    )
}

/// Cleans a model reply into `a, b, c` form, or rejects it.
pub fn clean_model_output(raw: &str) -> Result<String, LlmError> {
    let cleaned = raw.trim();

    if placeholder().is_match(cleaned) || cleaned.to_lowercase().contains("search terms") {
        return Err(LlmError::MalformedOutput {
            reason: "reply contains placeholder keywords".to_string(),
        });
    }

    let mut cleaned = cleaned.to_string();
    for preamble in [
        polite_preamble(),
        search_preamble(),
        label_preamble(),
        count_preamble(),
    ] {
        cleaned = preamble.replace_all(&cleaned, "").into_owned();
    }

    let steps: [(&Regex, &str); 9] = [
        (heading(), ""),
        (opener(), ""),
        (list_marker(), ""),
        (inline_list_marker(), ", "),
        (newlines(), ", "),
        (stray_chars(), ""),
        (comma_spacing(), ", "),
        (trailing_comma(), ""),
        (double_comma(), ","),
    ];
    for (pattern, replacement) in steps {
        cleaned = pattern.replace_all(&cleaned, replacement).into_owned();
    }
    let cleaned = cleaned.trim().to_string();

    if cleaned.split_whitespace().count() > MAX_KEYWORD_WORDS
        || cleaned.starts_with("Sure")
        || cleaned.contains("Here are")
        || cleaned.split(',').count() < 2
    {
        return Err(LlmError::MalformedOutput {
            reason: format!("reply does not look like a keyword list: {:?}", cleaned),
        });
    }

    Ok(cleaned)
}

pub struct QueryRewriter {
    generator: Arc<dyn TextGenerator>,
}

impl QueryRewriter {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Never fails: bad or slow model replies fall back to the extractor,
    /// other upstream errors hand back the query unchanged.
    pub async fn rewrite(&self, query: &str, model: Option<&str>) -> RewrittenQuery {
        let request = GenerationRequest::new(build_prompt(query)).with_model(model);

        let reply = match self.generator.generate(request).await {
            Ok(reply) => reply,
            Err(e) if e.is_timeout() => {
                warn!("Query rewrite timed out, extracting keywords locally");
                return heuristic(query);
            }
            Err(e) => {
                warn!("Query rewrite failed, using the original query: {}", e);
                return RewrittenQuery {
                    text: query.to_string(),
                    source: RewriteSource::Passthrough,
                };
            }
        };

        match clean_model_output(&reply) {
            Ok(mut keywords) => {
                let lowered = keywords.to_lowercase();
                if mentions_time(query) && !lowered.contains("recent") && !lowered.contains("latest")
                {
                    keywords.push_str(", recent posts");
                }
                info!("Rewrote query to '{}'", keywords);
                RewrittenQuery {
                    text: keywords,
                    source: RewriteSource::Model,
                }
            }
            Err(e) => {
                debug!("Discarding model keywords: {}", e);
                heuristic(query)
            }
        }
    }
}

fn heuristic(query: &str) -> RewrittenQuery {
    let text = extract_keywords(query).join(", ");
    info!("Extracted keywords '{}'", text);
    RewrittenQuery {
        text,
        source: RewriteSource::Heuristic,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use threadscout_core::CoreError;

    struct ScriptedGenerator {
        reply: fn() -> Result<String, CoreError>,
    }

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        async fn generate(&self, _request: GenerationRequest) -> Result<String, CoreError> {
            (self.reply)()
        }

        async fn check_health(&self) -> bool {
            true
        }
    }

    fn rewriter(reply: fn() -> Result<String, CoreError>) -> QueryRewriter {
        QueryRewriter::new(Arc::new(ScriptedGenerator { reply }))
    }

    #[test]
    fn test_strips_conversational_prefix() {
        assert_eq!(
            clean_model_output("Sure, here are your keywords: AI, machine learning, neural nets")
                .unwrap(),
            "AI, machine learning, neural nets"
        );
    }

    #[test]
    fn test_numbered_list_becomes_commas() {
        assert_eq!(
            clean_model_output("1. rust async\n2. tokio runtime\n3. futures").unwrap(),
            "rust async, tokio runtime, futures"
        );
    }

    #[test]
    fn test_rejects_placeholders() {
        assert!(clean_model_output("keyword1, keyword2").is_err());
        assert!(clean_model_output("Good search terms would be cats, dogs").is_err());
    }

    #[test]
    fn test_rejects_single_term_and_long_replies() {
        assert!(clean_model_output("pasta").is_err());
        let rambling = "one two three four five six seven eight, nine ten eleven twelve thirteen fourteen fifteen sixteen";
        assert!(clean_model_output(rambling).is_err());
    }

    #[test]
    fn test_extract_keywords() {
        assert_eq!(
            extract_keywords("What are the latest AI breakthroughs?"),
            vec!["latest", "breakthroughs", "artificial intelligence", "recent"]
        );
        assert_eq!(
            extract_keywords("best pasta recipes in r/Cooking"),
            vec!["best", "pasta", "recipes", "cooking"]
        );
        assert_eq!(
            extract_keywords("tips from subreddit homelab"),
            vec!["tips", "from", "subreddit", "homelab"]
        );
    }

    #[test]
    fn test_extract_keywords_adds_missing_subreddit() {
        assert_eq!(
            extract_keywords("anyone on r/rustlang?"),
            vec!["anyone", "rustlang"]
        );
        assert_eq!(extract_keywords("ask r/ml"), vec!["ask", "r/ml"]);
    }

    #[test]
    fn test_ai_needs_word_boundary() {
        assert!(!extract_keywords("fair rain")
            .contains(&"artificial intelligence".to_string()));
    }

    #[test]
    fn test_query_hints() {
        assert_eq!(subreddit_mention("posts in subreddit rust"), Some("rust".to_string()));
        assert_eq!(subreddit_mention("see R/Cooking"), Some("Cooking".to_string()));
        assert_eq!(time_phrase_in("What happened This Week?"), Some("this week".to_string()));
        assert!(!mentions_time("newer is better"));
    }

    #[tokio::test]
    async fn test_rewrite_uses_model_reply() {
        let rewriter = rewriter(|| Ok("Keywords: rust, borrow checker, lifetimes".to_string()));
        let result = rewriter.rewrite("how does the borrow checker work", None).await;
        assert_eq!(result.source, RewriteSource::Model);
        assert_eq!(result.text, "rust, borrow checker, lifetimes");
    }

    #[tokio::test]
    async fn test_rewrite_appends_recency() {
        let rewriter = rewriter(|| Ok("gpu prices, graphics cards".to_string()));
        let result = rewriter.rewrite("gpu prices today", None).await;
        assert_eq!(result.text, "gpu prices, graphics cards, recent posts");
    }

    #[tokio::test]
    async fn test_rewrite_placeholder_falls_back_to_extractor() {
        let rewriter = rewriter(|| Ok("keyword1, keyword2".to_string()));
        let result = rewriter.rewrite("best pasta recipes", None).await;
        assert_eq!(result.source, RewriteSource::Heuristic);
        assert_eq!(result.text, "best, pasta, recipes");
    }

    #[tokio::test]
    async fn test_rewrite_timeout_falls_back_to_extractor() {
        let rewriter = rewriter(|| {
            Err(CoreError::Llm(LlmError::RequestTimeout {
                provider: "ollama".to_string(),
            }))
        });
        let result = rewriter.rewrite("best pasta recipes", None).await;
        assert_eq!(result.source, RewriteSource::Heuristic);
    }

    #[tokio::test]
    async fn test_rewrite_error_passes_query_through() {
        let rewriter = rewriter(|| {
            Err(CoreError::Llm(LlmError::ServiceUnavailable {
                provider: "ollama".to_string(),
            }))
        });
        let result = rewriter.rewrite("best pasta recipes", None).await;
        assert_eq!(result.source, RewriteSource::Passthrough);
        assert_eq!(result.text, "best pasta recipes");
    }
}
