//! Chunk persistence and the search providers built on it.
//!
//! A store keeps each document's chunk set with optional embeddings and a
//! small metadata row. The same backend answers lexical, semantic and
//! metadata lookups through separate traits so callers can mix providers.

mod memory;
mod sqlite;

pub use memory::MemoryChunkStore;
pub use sqlite::SqliteChunkStore;

use crate::chunking::Chunk;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A chunk together with its embedding, as persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredChunk {
    pub chunk: Chunk,
    /// Empty when embeddings are disabled.
    pub embedding: Vec<f32>,
}

impl StoredChunk {
    pub fn new(chunk: Chunk, embedding: Vec<f32>) -> Self {
        Self { chunk, embedding }
    }

    /// A chunk stored without an embedding.
    pub fn text_only(chunk: Chunk) -> Self {
        Self {
            chunk,
            embedding: Vec::new(),
        }
    }
}

/// Descriptive fields for a document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub channel_or_show_title: Option<String>,
    pub duration_seconds: Option<f64>,
}

/// Summary of an indexed document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexedDocument {
    pub document_id: String,
    #[serde(flatten)]
    pub metadata: DocumentMetadata,
    pub chunk_count: usize,
    pub indexed_at: DateTime<Utc>,
}

/// A lexical match for one chunk. Higher `rank_score` is better.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LexicalHit {
    pub chunk_index: usize,
    pub rank_score: f64,
}

/// A semantic match for one chunk, scored by cosine similarity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SemanticHit {
    pub chunk_index: usize,
    pub similarity: f64,
}

/// Persistent chunk sets keyed by document id.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Replace a document's chunk set and metadata. Returns chunks written.
    async fn replace_document(
        &self,
        document_id: &str,
        metadata: &DocumentMetadata,
        chunks: &[StoredChunk],
    ) -> Result<usize>;

    /// All chunks of a document, ordered by index. Empty when unknown.
    async fn chunks(&self, document_id: &str) -> Result<Vec<Chunk>>;

    /// Whether a document has at least one stored chunk.
    async fn is_indexed(&self, document_id: &str) -> Result<bool>;

    /// Indexed documents, most recent first.
    async fn list_documents(&self) -> Result<Vec<IndexedDocument>>;

    /// Delete a document, returning the number of chunks removed.
    async fn delete_document(&self, document_id: &str) -> Result<usize>;
}

/// Full-text ranking over one document's chunks.
#[async_trait]
pub trait LexicalSearch: Send + Sync {
    /// At most `limit` hits, best first.
    async fn search(&self, document_id: &str, query: &str, limit: usize)
        -> Result<Vec<LexicalHit>>;
}

/// Vector similarity over one document's chunks.
#[async_trait]
pub trait SemanticSearch: Send + Sync {
    /// At most `limit` hits with similarity at or above `min_similarity`, best first.
    async fn similarity_search(
        &self,
        document_id: &str,
        vector: &[f32],
        limit: usize,
        min_similarity: f64,
    ) -> Result<Vec<SemanticHit>>;
}

/// Document metadata lookup.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// `None` when the document is unknown.
    async fn metadata(&self, document_id: &str) -> Result<Option<DocumentMetadata>>;
}

/// Compute cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// Lowercased word terms of a query, without stopwords or single letters.
pub fn query_terms(query: &str) -> Vec<String> {
    const STOPWORDS: &[&str] = &[
        "a", "an", "and", "are", "as", "at", "be", "by", "did", "do", "does", "for", "from",
        "how", "in", "is", "it", "of", "on", "or", "the", "to", "was", "were", "what", "when",
        "where", "which", "who", "why", "with",
    ];

    let mut terms: Vec<String> = Vec::new();
    for word in query
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .map(|w| w.trim_matches('\'').to_lowercase())
    {
        if word.chars().count() < 2 || STOPWORDS.contains(&word.as_str()) {
            continue;
        }
        if !terms.contains(&word) {
            terms.push(word);
        }
    }
    terms
}

/// Lowest score a lexical match can carry after normalization.
pub(crate) const MATCH_FLOOR: f64 = 0.1;

/// Scale a match's relevance against the best match of the same query into
/// `[MATCH_FLOOR, 1]`.
///
/// Absolute BM25 values collapse toward zero for terms present in most rows,
/// so only the relative order within one result set carries signal.
pub(crate) fn relative_relevance(raw: f64, best: f64) -> f64 {
    if !(best.is_finite() && best > 0.0) {
        return 1.0;
    }
    let share = (raw / best).clamp(0.0, 1.0);
    MATCH_FLOOR + (1.0 - MATCH_FLOOR) * share
}

/// Best first; equal scores keep ascending chunk order.
pub(crate) fn by_score_then_index(a: (f64, usize), b: (f64, usize)) -> Ordering {
    b.0.partial_cmp(&a.0)
        .unwrap_or(Ordering::Equal)
        .then(a.1.cmp(&b.1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 0.001);

        let c = vec![0.0, 1.0, 0.0];
        assert!((cosine_similarity(&a, &c)).abs() < 0.001);

        let d = vec![-1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &d) + 1.0).abs() < 0.001);

        assert_eq!(cosine_similarity(&a, &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_query_terms() {
        assert_eq!(
            query_terms("What did Elon say about the AI? AI!"),
            vec!["elon", "say", "about", "ai"]
        );
        assert_eq!(query_terms("Qu'est-ce que Zürich?"), vec!["qu'est", "ce", "que", "zürich"]);
        assert!(query_terms("? . a").is_empty());
    }

    #[test]
    fn test_relative_relevance() {
        assert!((relative_relevance(2.0, 2.0) - 1.0).abs() < 1e-9);
        assert!((relative_relevance(1.0, 2.0) - 0.55).abs() < 1e-9);
        assert!((relative_relevance(0.0, 2.0) - MATCH_FLOOR).abs() < 1e-9);
        // Clamped IDF leaves tiny raw scores that still rank as matches.
        assert!((relative_relevance(1.1e-6, 1.1e-6) - 1.0).abs() < 1e-9);
        assert!(relative_relevance(9.1e-7, 1.1e-6) > 0.8);
        assert_eq!(relative_relevance(0.0, 0.0), 1.0);
    }

    #[test]
    fn test_score_ordering_ties_by_index() {
        let mut hits = vec![(0.5, 3), (0.9, 2), (0.5, 1)];
        hits.sort_by(|a, b| by_score_then_index(*a, *b));
        assert_eq!(hits, vec![(0.9, 2), (0.5, 1), (0.5, 3)]);
    }
}
