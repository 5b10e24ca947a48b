//! Picks the subreddits a query should be searched in.
//!
//! Steps run in order and the first one that yields names wins: explicit
//! `r/name` mentions, the subreddit directory (topped up from a post
//! search), then a fixed topic list.

use crate::SubredditDirectory;
use regex::Regex;
use serde::Serialize;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

pub const MAX_SUBREDDITS: usize = 5;

const DIRECTORY_LIMIT: usize = 5;
const POST_SEARCH_LIMIT: usize = 10;

const DENYLIST: [&str; 9] = [
    "nsfw",
    "porn",
    "gonewild",
    "memes",
    "dankmemes",
    "circlejerk",
    "shitpost",
    "funny",
    "onlyfans",
];

const FOOD_TERMS: [&str; 12] = [
    "food", "recipe", "cook", "meal", "dish", "pasta", "pizza", "dinner", "lunch", "breakfast",
    "kitchen", "chef",
];

const FOOD_SUBREDDITS: [&str; 5] = ["Cooking", "food", "recipes", "AskCulinary", "EatCheapAndHealthy"];
const GENERAL_SUBREDDITS: [&str; 3] = ["AskReddit", "explainlikeimfive", "NoStupidQuestions"];

fn mention_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)r/(\w+)").expect("valid subreddit mention pattern"))
}

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("valid subreddit name pattern"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoverySource {
    Explicit,
    Directory,
    TopicFallback,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Discovery {
    pub subreddits: Vec<String>,
    pub source: DiscoverySource,
}

/// `r/name` mentions in order of appearance, without duplicates.
pub fn explicit_mentions(query: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for capture in mention_pattern().captures_iter(query) {
        let name = &capture[1];
        if !found.iter().any(|existing| existing.eq_ignore_ascii_case(name)) {
            found.push(name.to_string());
        }
        if found.len() == MAX_SUBREDDITS {
            break;
        }
    }
    found
}

/// Rejects malformed names and anything matching the NSFW/meme denylist.
pub fn is_valid_subreddit(name: &str) -> bool {
    if !name_pattern().is_match(name) {
        return false;
    }
    let lowered = name.to_lowercase();
    !DENYLIST.iter().any(|pattern| lowered.contains(pattern))
}

pub fn topic_fallback(query: &str) -> Vec<String> {
    let lowered = query.to_lowercase();
    let list: &[&str] = if FOOD_TERMS.iter().any(|term| lowered.contains(term)) {
        &FOOD_SUBREDDITS
    } else {
        &GENERAL_SUBREDDITS
    };
    list.iter().map(|name| name.to_string()).collect()
}

/// Reddit is case-insensitive for most names but its search is not for
/// r/Cooking.
pub fn normalize_subreddit(name: &str) -> String {
    if name.eq_ignore_ascii_case("cooking") {
        "Cooking".to_string()
    } else {
        name.to_string()
    }
}

pub struct SubredditDiscovery {
    directory: Arc<dyn SubredditDirectory>,
}

impl SubredditDiscovery {
    pub fn new(directory: Arc<dyn SubredditDirectory>) -> Self {
        Self { directory }
    }

    pub async fn discover(&self, query: &str) -> Discovery {
        let mentioned = explicit_mentions(query);
        if !mentioned.is_empty() {
            debug!("Directly mentioned subreddits in query: {:?}", mentioned);
            return Discovery {
                subreddits: mentioned,
                source: DiscoverySource::Explicit,
            };
        }

        let mut found: Vec<String> = Vec::new();

        match self.directory.search_subreddits(query, DIRECTORY_LIMIT).await {
            Ok(names) => add_valid(&mut found, names),
            Err(e) => warn!("Subreddit directory search failed: {}", e),
        }

        if found.len() < MAX_SUBREDDITS {
            match self
                .directory
                .search_post_subreddits(query, POST_SEARCH_LIMIT)
                .await
            {
                Ok(names) => add_valid(&mut found, names),
                Err(e) => warn!("Post search for subreddit discovery failed: {}", e),
            }
        }

        if !found.is_empty() {
            info!("Discovered subreddits: {:?}", found);
            return Discovery {
                subreddits: found,
                source: DiscoverySource::Directory,
            };
        }

        let fallback = topic_fallback(query);
        info!("Using fallback subreddits: {:?}", fallback);
        Discovery {
            subreddits: fallback,
            source: DiscoverySource::TopicFallback,
        }
    }
}

fn add_valid(found: &mut Vec<String>, names: Vec<String>) {
    for name in names {
        if found.len() == MAX_SUBREDDITS {
            break;
        }
        let duplicate = found
            .iter()
            .any(|existing| existing.eq_ignore_ascii_case(&name));
        if is_valid_subreddit(&name) && !duplicate {
            found.push(name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_mentions() {
        assert_eq!(
            explicit_mentions("tell me about r/MachineLearning"),
            vec!["MachineLearning"]
        );
        assert_eq!(
            explicit_mentions("compare R/rust and r/golang and r/Rust"),
            vec!["rust", "golang"]
        );
        assert!(explicit_mentions("no mentions here").is_empty());
    }

    #[test]
    fn test_explicit_mentions_capped() {
        let query = "r/a1 r/a2 r/a3 r/a4 r/a5 r/a6 r/a7";
        assert_eq!(explicit_mentions(query).len(), MAX_SUBREDDITS);
    }

    #[test]
    fn test_subreddit_validation() {
        assert!(is_valid_subreddit("rust"));
        assert!(is_valid_subreddit("Ask_Science2"));
        assert!(!is_valid_subreddit("bad-name"));
        assert!(!is_valid_subreddit(""));
        assert!(!is_valid_subreddit("FunnyAnimals"));
        assert!(!is_valid_subreddit("programmerhumorNSFW"));
    }

    #[test]
    fn test_topic_fallback() {
        assert_eq!(
            topic_fallback("best pasta recipes"),
            vec!["Cooking", "food", "recipes", "AskCulinary", "EatCheapAndHealthy"]
        );
        assert_eq!(
            topic_fallback("why is the sky blue"),
            vec!["AskReddit", "explainlikeimfive", "NoStupidQuestions"]
        );
    }

    #[test]
    fn test_normalize_subreddit() {
        assert_eq!(normalize_subreddit("cooking"), "Cooking");
        assert_eq!(normalize_subreddit("COOKING"), "Cooking");
        assert_eq!(normalize_subreddit("rust"), "rust");
    }
}
