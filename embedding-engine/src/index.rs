//! Vector index over Reddit posts.
//!
//! Posts are stored as tagged text documents so the embedding sees title,
//! body, community and engagement together. The in-memory index keeps one
//! entry per post id and can mirror itself to a JSON file.

use crate::{cosine_similarity, Embedder};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use threadscout_core::{CoreError, IndexError, Post};
use tracing::{debug, info, warn};

const INDEX_FILE: &str = "index.json";
const INDEX_TMP_FILE: &str = "index.json.tmp";

/// A stored post and its cosine distance to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub post: Post,
    pub document: String,
    /// `1 - cosine similarity`, within [0, 2].
    pub distance: f64,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Inserts posts, replacing entries that share an id.
    async fn upsert(&self, posts: &[Post]) -> Result<(), CoreError>;

    /// The `k` nearest posts to `text`, closest first.
    async fn query(&self, text: &str, k: usize) -> Result<Vec<Neighbor>, CoreError>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub fn document_representation(post: &Post) -> String {
    let mut parts = vec![
        format!("[TITLE] {} [/TITLE]", post.title),
        format!("[CONTENT] {} [/CONTENT]", post.content),
        format!("[SUBREDDIT] r/{} [/SUBREDDIT]", post.subreddit),
        format!("[AUTHOR] u/{} [/AUTHOR]", post.author),
    ];

    if post.score != 0 {
        parts.push(format!("[SCORE] {} [/SCORE]", post.score));
    }
    if post.num_comments != 0 {
        parts.push(format!("[COMMENTS] {} [/COMMENTS]", post.num_comments));
    }
    if post.has_awards {
        parts.push("[AWARDED] true [/AWARDED]".to_string());
    }
    if post.is_original_content {
        parts.push("[OC] true [/OC]".to_string());
    }

    parts.join("\n")
}

/// Normalizes a query for embedding and strips Reddit-specific noise.
pub fn enhance_query(query: &str) -> String {
    let query = query
        .trim()
        .to_lowercase()
        .replace("reddit", "")
        .replace("subreddit", "")
        .replace("r/", "")
        .replace("u/", "");
    format!("[QUERY] {} [/QUERY]", query)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    post: Post,
    document: String,
    embedding: Vec<f32>,
}

/// Entries are keyed by post id, so re-indexing a post replaces it. Nothing
/// is ever evicted; the index grows with the number of distinct posts seen.
pub struct InMemoryVectorIndex {
    embedder: Arc<dyn Embedder>,
    entries: RwLock<HashMap<String, IndexEntry>>,
    persist_path: Option<PathBuf>,
    /// Serializes snapshot writes so two upserts never share the temp file.
    write_lock: tokio::sync::Mutex<()>,
}

impl InMemoryVectorIndex {
    /// Index that lives only in memory.
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            entries: RwLock::new(HashMap::new()),
            persist_path: None,
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Loads `<data_dir>/index.json` if present and writes back after every
    /// upsert. Writes go to a temp file that is renamed over the old one, so
    /// a crash mid-write leaves the previous snapshot intact. An unreadable
    /// file is logged and starts an empty index.
    pub fn open(embedder: Arc<dyn Embedder>, data_dir: &Path) -> Result<Self, CoreError> {
        std::fs::create_dir_all(data_dir).map_err(|_| persistence_failed(data_dir))?;
        let persist_path = data_dir.join(INDEX_FILE);

        let entries = if persist_path.exists() {
            let data =
                std::fs::read_to_string(&persist_path).map_err(|_| persistence_failed(&persist_path))?;
            match serde_json::from_str::<Vec<IndexEntry>>(&data) {
                Ok(entries) => entries
                    .into_iter()
                    .map(|entry| (entry.post.id.clone(), entry))
                    .collect(),
                Err(e) => {
                    warn!(
                        "Index file {} is corrupt, starting empty: {}",
                        persist_path.display(),
                        e
                    );
                    HashMap::new()
                }
            }
        } else {
            HashMap::new()
        };

        info!(
            "Opened vector index at {} with {} posts",
            persist_path.display(),
            entries.len()
        );
        Ok(Self {
            embedder,
            entries: RwLock::new(entries),
            persist_path: Some(persist_path),
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    fn dimension(&self) -> Option<usize> {
        self.entries.read().values().next().map(|e| e.embedding.len())
    }

    async fn persist(&self) -> Result<(), CoreError> {
        let Some(path) = &self.persist_path else {
            return Ok(());
        };
        let _guard = self.write_lock.lock().await;
        let data = {
            let entries = self.entries.read();
            let mut snapshot: Vec<&IndexEntry> = entries.values().collect();
            snapshot.sort_by(|a, b| a.post.id.cmp(&b.post.id));
            serde_json::to_string(&snapshot)?
        };

        let tmp_path = path.with_file_name(INDEX_TMP_FILE);
        tokio::fs::write(&tmp_path, data)
            .await
            .map_err(|_| persistence_failed(&tmp_path))?;
        tokio::fs::rename(&tmp_path, path)
            .await
            .map_err(|_| persistence_failed(path))
    }
}

fn persistence_failed(path: &Path) -> CoreError {
    CoreError::Index(IndexError::PersistenceFailed {
        path: path.display().to_string(),
    })
}

fn check_dimension(expected: Option<usize>, actual: usize) -> Result<(), CoreError> {
    match expected {
        Some(expected) if expected != actual => {
            Err(CoreError::Index(IndexError::DimensionMismatch { expected, actual }))
        }
        _ => Ok(()),
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn upsert(&self, posts: &[Post]) -> Result<(), CoreError> {
        if posts.is_empty() {
            return Ok(());
        }

        let documents: Vec<String> = posts.iter().map(document_representation).collect();
        let embeddings = self.embedder.embed(&documents).await?;
        if embeddings.len() != posts.len() {
            return Err(CoreError::Index(IndexError::EmbeddingCountMismatch {
                requested: posts.len(),
                returned: embeddings.len(),
            }));
        }

        let mut expected = self.dimension();
        for embedding in &embeddings {
            check_dimension(expected, embedding.len())?;
            expected = Some(embedding.len());
        }

        {
            let mut entries = self.entries.write();
            for ((post, document), embedding) in posts.iter().zip(documents).zip(embeddings) {
                let entry = IndexEntry {
                    post: post.clone(),
                    document,
                    embedding,
                };
                entries.insert(post.id.clone(), entry);
            }
            debug!("Index now holds {} posts", entries.len());
        }

        self.persist().await
    }

    async fn query(&self, text: &str, k: usize) -> Result<Vec<Neighbor>, CoreError> {
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let query_embedding = self
            .embedder
            .embed(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                CoreError::Index(IndexError::EmbeddingCountMismatch {
                    requested: 1,
                    returned: 0,
                })
            })?;
        check_dimension(self.dimension(), query_embedding.len())?;

        let entries = self.entries.read();
        let mut neighbors: Vec<Neighbor> = entries
            .values()
            .map(|entry| Neighbor {
                post: entry.post.clone(),
                document: entry.document.clone(),
                distance: 1.0 - cosine_similarity(&query_embedding, &entry.embedding) as f64,
            })
            .collect();

        neighbors.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| a.post.id.cmp(&b.post.id))
        });
        neighbors.truncate(k);
        Ok(neighbors)
    }

    fn len(&self) -> usize {
        self.entries.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// One axis per topic word; unrelated text lands on the last axis.
    struct TopicEmbedder;

    #[async_trait]
    impl Embedder for TopicEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CoreError> {
            Ok(texts
                .iter()
                .map(|text| {
                    let text = text.to_lowercase();
                    let mut vector = vec![0.0f32; 4];
                    for (axis, topic) in ["rust", "pasta", "guitar"].iter().enumerate() {
                        if text.contains(topic) {
                            vector[axis] = 1.0;
                        }
                    }
                    if vector.iter().all(|v| *v == 0.0) {
                        vector[3] = 1.0;
                    }
                    vector
                })
                .collect())
        }
    }

    struct BrokenEmbedder;

    #[async_trait]
    impl Embedder for BrokenEmbedder {
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, CoreError> {
            Err(CoreError::Index(IndexError::EmbeddingFailed {
                reason: "offline".to_string(),
            }))
        }
    }

    fn post(id: &str, title: &str) -> Post {
        Post::new(id, title, "test")
    }

    #[test]
    fn test_document_representation() {
        let mut p = Post::new("a", "Rust tips", "rust");
        p.content = "Use clippy".to_string();
        p.author = "ferris".to_string();
        assert_eq!(
            document_representation(&p),
            "[TITLE] Rust tips [/TITLE]\n[CONTENT] Use clippy [/CONTENT]\n\
             [SUBREDDIT] r/rust [/SUBREDDIT]\n[AUTHOR] u/ferris [/AUTHOR]"
        );

        p.score = 42;
        p.num_comments = 7;
        p.has_awards = true;
        p.is_original_content = true;
        let document = document_representation(&p);
        assert!(document.ends_with(
            "[SCORE] 42 [/SCORE]\n[COMMENTS] 7 [/COMMENTS]\n[AWARDED] true [/AWARDED]\n[OC] true [/OC]"
        ));
    }

    #[test]
    fn test_enhance_query() {
        assert_eq!(
            enhance_query("  Best Reddit posts in r/Rust "),
            "[QUERY] best  posts in rust [/QUERY]"
        );
        assert_eq!(enhance_query("subreddit u/spez"), "[QUERY] sub spez [/QUERY]");
    }

    #[tokio::test]
    async fn test_query_orders_by_distance() {
        let index = InMemoryVectorIndex::new(Arc::new(TopicEmbedder));
        index
            .upsert(&[
                post("p1", "Pasta night"),
                post("r1", "Rust borrow checker"),
                post("g1", "Guitar strings"),
            ])
            .await
            .unwrap();

        let neighbors = index.query("rust", 2).await.unwrap();
        assert_eq!(neighbors.len(), 2);
        assert_eq!(neighbors[0].post.id, "r1");
        assert!(neighbors[0].distance.abs() < 1e-6);
        assert!((neighbors[1].distance - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_id() {
        let index = InMemoryVectorIndex::new(Arc::new(TopicEmbedder));
        index.upsert(&[post("a", "Pasta night")]).await.unwrap();
        index.upsert(&[post("a", "Rust night")]).await.unwrap();

        assert_eq!(index.len(), 1);
        let neighbors = index.query("rust", 5).await.unwrap();
        assert_eq!(neighbors[0].post.title, "Rust night");
    }

    #[test]
    fn test_empty_index_skips_embedding() {
        let index = InMemoryVectorIndex::new(Arc::new(BrokenEmbedder));
        assert!(index.is_empty());
        assert!(tokio_test::block_on(index.query("anything", 5))
            .unwrap()
            .is_empty());
        assert!(tokio_test::block_on(index.upsert(&[])).is_ok());
        assert!(tokio_test::block_on(index.upsert(&[post("a", "x")])).is_err());
    }

    #[tokio::test]
    async fn test_persists_and_reloads() {
        let dir = TempDir::new().unwrap();
        {
            let index = InMemoryVectorIndex::open(Arc::new(TopicEmbedder), dir.path()).unwrap();
            index
                .upsert(&[post("r1", "Rust"), post("p1", "Pasta")])
                .await
                .unwrap();
        }

        let reopened = InMemoryVectorIndex::open(Arc::new(TopicEmbedder), dir.path()).unwrap();
        assert_eq!(reopened.len(), 2);
        let neighbors = reopened.query("pasta", 1).await.unwrap();
        assert_eq!(neighbors[0].post.id, "p1");
    }

    #[tokio::test]
    async fn test_corrupt_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(INDEX_FILE), "{\"truncated\": [").unwrap();
        let index = InMemoryVectorIndex::open(Arc::new(TopicEmbedder), dir.path()).unwrap();
        assert!(index.is_empty());

        // The next upsert replaces the corrupt file with a readable snapshot.
        index.upsert(&[post("g1", "Guitar")]).await.unwrap();
        let reopened = InMemoryVectorIndex::open(Arc::new(TopicEmbedder), dir.path()).unwrap();
        assert_eq!(reopened.len(), 1);
    }

    #[tokio::test]
    async fn test_snapshot_write_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let index = InMemoryVectorIndex::open(Arc::new(TopicEmbedder), dir.path()).unwrap();
        index.upsert(&[post("r1", "Rust")]).await.unwrap();
        index.upsert(&[post("r1", "Rust again")]).await.unwrap();

        assert!(dir.path().join(INDEX_FILE).exists());
        assert!(!dir.path().join(INDEX_TMP_FILE).exists());

        let data = std::fs::read_to_string(dir.path().join(INDEX_FILE)).unwrap();
        let stored: Vec<IndexEntry> = serde_json::from_str(&data).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].post.title, "Rust again");
    }
}
