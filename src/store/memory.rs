//! In-memory chunk store.
//!
//! Useful for testing and single-session use. Lexical relevance is the share
//! of query terms found in a chunk.

use super::{
    by_score_then_index, cosine_similarity, query_terms, ChunkStore, DocumentMetadata,
    IndexedDocument, LexicalHit, LexicalSearch, MetadataProvider, SemanticHit, SemanticSearch,
    StoredChunk,
};
use crate::chunking::Chunk;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

struct MemoryDocument {
    metadata: DocumentMetadata,
    chunks: Vec<StoredChunk>,
    indexed_at: DateTime<Utc>,
}

/// In-memory chunk store.
pub struct MemoryChunkStore {
    documents: RwLock<HashMap<String, MemoryDocument>>,
}

impl MemoryChunkStore {
    /// Create a new in-memory chunk store.
    pub fn new() -> Self {
        Self {
            documents: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, MemoryDocument>> {
        self.documents.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, MemoryDocument>> {
        self.documents.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for MemoryChunkStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChunkStore for MemoryChunkStore {
    async fn replace_document(
        &self,
        document_id: &str,
        metadata: &DocumentMetadata,
        chunks: &[StoredChunk],
    ) -> Result<usize> {
        let mut sorted = chunks.to_vec();
        sorted.sort_by_key(|c| c.chunk.index);

        self.write().insert(
            document_id.to_string(),
            MemoryDocument {
                metadata: metadata.clone(),
                chunks: sorted,
                indexed_at: Utc::now(),
            },
        );
        Ok(chunks.len())
    }

    async fn chunks(&self, document_id: &str) -> Result<Vec<Chunk>> {
        Ok(self
            .read()
            .get(document_id)
            .map(|doc| doc.chunks.iter().map(|c| c.chunk.clone()).collect())
            .unwrap_or_default())
    }

    async fn is_indexed(&self, document_id: &str) -> Result<bool> {
        Ok(self
            .read()
            .get(document_id)
            .is_some_and(|doc| !doc.chunks.is_empty()))
    }

    async fn list_documents(&self) -> Result<Vec<IndexedDocument>> {
        let mut documents: Vec<IndexedDocument> = self
            .read()
            .iter()
            .map(|(id, doc)| IndexedDocument {
                document_id: id.clone(),
                metadata: doc.metadata.clone(),
                chunk_count: doc.chunks.len(),
                indexed_at: doc.indexed_at,
            })
            .collect();

        documents.sort_by(|a, b| {
            b.indexed_at
                .cmp(&a.indexed_at)
                .then(a.document_id.cmp(&b.document_id))
        });
        Ok(documents)
    }

    async fn delete_document(&self, document_id: &str) -> Result<usize> {
        Ok(self
            .write()
            .remove(document_id)
            .map(|doc| doc.chunks.len())
            .unwrap_or(0))
    }
}

#[async_trait]
impl LexicalSearch for MemoryChunkStore {
    async fn search(
        &self,
        document_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<LexicalHit>> {
        let terms = query_terms(query);
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let documents = self.read();
        let Some(doc) = documents.get(document_id) else {
            return Ok(Vec::new());
        };

        let mut hits: Vec<(f64, usize)> = doc
            .chunks
            .iter()
            .filter_map(|stored| {
                let text = stored.chunk.text.to_lowercase();
                let words: Vec<&str> = text
                    .split(|c: char| !c.is_alphanumeric() && c != '\'')
                    .collect();
                let matched = terms
                    .iter()
                    .filter(|t| words.contains(&t.as_str()))
                    .count();
                (matched > 0).then(|| (matched as f64 / terms.len() as f64, stored.chunk.index))
            })
            .collect();

        hits.sort_by(|a, b| by_score_then_index(*a, *b));
        hits.truncate(limit);

        Ok(hits
            .into_iter()
            .map(|(rank_score, chunk_index)| LexicalHit {
                chunk_index,
                rank_score,
            })
            .collect())
    }
}

#[async_trait]
impl SemanticSearch for MemoryChunkStore {
    async fn similarity_search(
        &self,
        document_id: &str,
        vector: &[f32],
        limit: usize,
        min_similarity: f64,
    ) -> Result<Vec<SemanticHit>> {
        let documents = self.read();
        let Some(doc) = documents.get(document_id) else {
            return Ok(Vec::new());
        };

        let mut hits: Vec<(f64, usize)> = doc
            .chunks
            .iter()
            .filter(|c| !c.embedding.is_empty())
            .map(|c| {
                (
                    cosine_similarity(vector, &c.embedding) as f64,
                    c.chunk.index,
                )
            })
            .filter(|(score, _)| *score >= min_similarity)
            .collect();

        hits.sort_by(|a, b| by_score_then_index(*a, *b));
        hits.truncate(limit);

        Ok(hits
            .into_iter()
            .map(|(similarity, chunk_index)| SemanticHit {
                chunk_index,
                similarity,
            })
            .collect())
    }
}

#[async_trait]
impl MetadataProvider for MemoryChunkStore {
    async fn metadata(&self, document_id: &str) -> Result<Option<DocumentMetadata>> {
        Ok(self.read().get(document_id).map(|doc| doc.metadata.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(text: &str, index: usize, total: usize, embedding: Vec<f32>) -> StoredChunk {
        StoredChunk::new(Chunk::new(text, index, total), embedding)
    }

    async fn seeded() -> MemoryChunkStore {
        let store = MemoryChunkStore::new();
        store
            .replace_document(
                "ep1",
                &DocumentMetadata {
                    title: Some("Episode One".to_string()),
                    ..Default::default()
                },
                &[
                    stored("We talked about rockets and Mars.", 1, 3, vec![0.0, 1.0, 0.0]),
                    stored("Welcome to the show about rockets.", 0, 3, vec![1.0, 0.0, 0.0]),
                    stored("Thanks for listening.", 2, 3, vec![]),
                ],
            )
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_chunks_are_ordered_by_index() {
        let store = seeded().await;
        let chunks = store.chunks("ep1").await.unwrap();
        let indices: Vec<usize> = chunks.iter().map(|c| c.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert!(store.is_indexed("ep1").await.unwrap());
        assert!(!store.is_indexed("missing").await.unwrap());
        assert!(store.chunks("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lexical_scores_share_of_terms() {
        let store = seeded().await;
        let hits = store.search("ep1", "rockets on Mars", 10).await.unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk_index, 1);
        assert!((hits[0].rank_score - 1.0).abs() < 1e-9);
        assert_eq!(hits[1].chunk_index, 0);
        assert!((hits[1].rank_score - 0.5).abs() < 1e-9);

        assert!(store.search("ep1", "the of", 10).await.unwrap().is_empty());
        assert!(store.search("other", "rockets", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_similarity_search_skips_missing_embeddings() {
        let store = seeded().await;
        let hits = store
            .similarity_search("ep1", &[1.0, 0.2, 0.0], 10, 0.0)
            .await
            .unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk_index, 0);

        let strict = store
            .similarity_search("ep1", &[1.0, 0.0, 0.0], 10, 0.5)
            .await
            .unwrap();
        assert_eq!(strict.len(), 1);
    }

    #[tokio::test]
    async fn test_metadata_and_delete() {
        let store = seeded().await;
        let meta = store.metadata("ep1").await.unwrap().unwrap();
        assert_eq!(meta.title.as_deref(), Some("Episode One"));

        let listed = store.list_documents().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].chunk_count, 3);

        assert_eq!(store.delete_document("ep1").await.unwrap(), 3);
        assert_eq!(store.delete_document("ep1").await.unwrap(), 0);
        assert!(store.metadata("ep1").await.unwrap().is_none());
    }

    #[test]
    fn test_metadata_lookup_from_sync_context() {
        let store = tokio_test::block_on(seeded());
        let metadata = tokio_test::block_on(store.metadata("ep1")).unwrap().unwrap();
        assert_eq!(metadata.title.as_deref(), Some("Episode One"));
        assert!(tokio_test::block_on(store.metadata("missing")).unwrap().is_none());
    }
}
