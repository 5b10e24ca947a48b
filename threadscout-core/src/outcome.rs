//! Explicit results for integration boundaries that degrade instead of failing.
//!
//! Every external call in the search path (Reddit transports, discovery
//! steps, the language model, the vector index) is allowed to fail without
//! failing the request. `Outcome` keeps the difference between "the upstream
//! answered with nothing", "the upstream broke" and "we answered with a
//! simpler heuristic" visible to callers instead of burying it in a log line.

use crate::CoreError;
use std::future::Future;
use tracing::{debug, warn};

#[derive(Debug)]
pub enum Outcome<T> {
    /// The primary source produced a usable value.
    Success(T),
    /// A simpler fallback produced the value.
    Degraded { value: T, reason: String },
    /// Every source answered, none had anything.
    Empty,
    /// The last source failed and nothing else was available.
    Failed(CoreError),
}

impl<T> Outcome<T> {
    pub fn degraded(value: T, reason: impl Into<String>) -> Self {
        Outcome::Degraded {
            value,
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Outcome::Degraded { .. })
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Outcome::Empty)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }

    /// Returns the value for `Success` and `Degraded`.
    pub fn value(self) -> Option<T> {
        match self {
            Outcome::Success(value) | Outcome::Degraded { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn err(self) -> Option<CoreError> {
        match self {
            Outcome::Failed(error) => Some(error),
            _ => None,
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Outcome<U> {
        match self {
            Outcome::Success(value) => Outcome::Success(f(value)),
            Outcome::Degraded { value, reason } => Outcome::Degraded {
                value: f(value),
                reason,
            },
            Outcome::Empty => Outcome::Empty,
            Outcome::Failed(error) => Outcome::Failed(error),
        }
    }
}

/// Tries each source in order and returns the first non-empty list.
///
/// The returned index identifies the source that answered. Results from
/// sources after the first are reported as `Degraded`. When no source has
/// anything the outcome is `Empty` if the last source answered cleanly and
/// `Failed` if it errored.
pub async fn first_non_empty<S, T, F, Fut>(
    sources: &[S],
    mut attempt: F,
) -> Outcome<(usize, Vec<T>)>
where
    F: FnMut(&S) -> Fut,
    Fut: Future<Output = Result<Vec<T>, CoreError>>,
{
    let mut last_error = None;

    for (position, source) in sources.iter().enumerate() {
        match attempt(source).await {
            Ok(items) if !items.is_empty() => {
                return if position == 0 {
                    Outcome::Success((position, items))
                } else {
                    let reason = match last_error.take() {
                        Some(error) => format!("source {} failed: {}", position - 1, error),
                        None => format!("source {} returned nothing", position - 1),
                    };
                    Outcome::degraded((position, items), reason)
                };
            }
            Ok(_) => {
                debug!("Fallback source {} returned nothing", position);
                last_error = None;
            }
            Err(error) => {
                warn!("Fallback source {} failed: {}", position, error);
                last_error = Some(error);
            }
        }
    }

    match last_error {
        Some(error) => Outcome::Failed(error),
        None => Outcome::Empty,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RedditApiError;

    #[tokio::test]
    async fn test_first_source_wins() {
        let sources = vec![vec![1, 2], vec![3]];
        let outcome =
            first_non_empty(&sources, |s| std::future::ready(Ok(s.clone()))).await;

        assert!(outcome.is_success());
        assert_eq!(outcome.value(), Some((0, vec![1, 2])));
    }

    #[tokio::test]
    async fn test_falls_through_empty_and_failed_sources() {
        let sources = vec![0, 1, 2];
        let outcome = first_non_empty(&sources, |s| {
            let result = match *s {
                0 => Err(CoreError::RedditApi(RedditApiError::RequestTimeout)),
                1 => Ok(Vec::new()),
                _ => Ok(vec!["found"]),
            };
            std::future::ready(result)
        })
        .await;

        assert!(outcome.is_degraded());
        assert_eq!(outcome.value(), Some((2, vec!["found"])));
    }

    #[tokio::test]
    async fn test_empty_versus_failed() {
        let sources = vec![0, 1];
        let empty: Outcome<(usize, Vec<u8>)> =
            first_non_empty(&sources, |_| std::future::ready(Ok(Vec::new()))).await;
        assert!(empty.is_empty());

        let failed: Outcome<(usize, Vec<u8>)> = first_non_empty(&sources, |s| {
            let result = if *s == 0 {
                Ok(Vec::new())
            } else {
                Err(CoreError::Internal {
                    message: "boom".to_string(),
                })
            };
            std::future::ready(result)
        })
        .await;
        assert!(failed.is_failed());
        assert!(failed.err().unwrap().to_string().contains("boom"));
    }

    #[test]
    fn test_map_keeps_reason() {
        let outcome = Outcome::degraded(2, "fallback").map(|v| v * 10);
        match outcome {
            Outcome::Degraded { value, reason } => {
                assert_eq!(value, 20);
                assert_eq!(reason, "fallback");
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }
}
