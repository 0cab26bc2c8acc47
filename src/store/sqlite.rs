//! SQLite-based chunk store.
//!
//! Chunks live in a plain table with their embeddings as little-endian BLOBs;
//! an FTS5 table shares their rowids for lexical ranking. Cosine similarity is
//! computed in Rust.

use super::{
    by_score_then_index, cosine_similarity, query_terms, relative_relevance, ChunkStore,
    DocumentMetadata, IndexedDocument, LexicalHit, LexicalSearch, MetadataProvider, SemanticHit,
    SemanticSearch, StoredChunk,
};
use crate::chunking::Chunk;
use crate::error::{HearsayError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, instrument};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS documents (
        document_id TEXT PRIMARY KEY,
        title TEXT,
        channel_title TEXT,
        duration_seconds REAL,
        chunk_count INTEGER NOT NULL,
        indexed_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS chunks (
        document_id TEXT NOT NULL,
        chunk_index INTEGER NOT NULL,
        total_chunks INTEGER NOT NULL,
        content TEXT NOT NULL,
        word_count INTEGER NOT NULL,
        embedding BLOB,
        PRIMARY KEY (document_id, chunk_index)
    );

    CREATE INDEX IF NOT EXISTS idx_documents_indexed_at ON documents(indexed_at);

    CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts
        USING fts5(content, tokenize='unicode61');
"#;

/// SQLite-based chunk store.
pub struct SqliteChunkStore {
    conn: Mutex<Connection>,
}

impl SqliteChunkStore {
    /// Open or create a store at `path`.
    #[instrument(skip_all)]
    pub fn new(path: &Path) -> Result<Self> {
        // Create parent directories if needed
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // Enable WAL mode for better concurrent performance
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;

        info!("Initialized SQLite chunk store at {:?}", path);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| HearsayError::Store(format!("Failed to acquire lock: {}", e)))
    }

    /// Serialize embedding to bytes.
    fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    /// Deserialize embedding from bytes.
    fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    fn delete_rows(conn: &Connection, document_id: &str) -> Result<usize> {
        conn.execute(
            "DELETE FROM chunks_fts WHERE rowid IN (SELECT rowid FROM chunks WHERE document_id = ?1)",
            params![document_id],
        )?;
        let deleted = conn.execute(
            "DELETE FROM chunks WHERE document_id = ?1",
            params![document_id],
        )?;
        conn.execute(
            "DELETE FROM documents WHERE document_id = ?1",
            params![document_id],
        )?;
        Ok(deleted)
    }

    /// Build an FTS5 expression matching any query term.
    ///
    /// Terms are quoted so punctuation in questions never reaches the parser.
    fn match_expression(query: &str) -> Option<String> {
        let terms = query_terms(query);
        if terms.is_empty() {
            return None;
        }
        Some(
            terms
                .iter()
                .map(|t| format!("\"{}\"", t.replace('"', "")))
                .collect::<Vec<_>>()
                .join(" OR "),
        )
    }
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[async_trait]
impl ChunkStore for SqliteChunkStore {
    #[instrument(skip(self, metadata, chunks), fields(chunks = chunks.len()))]
    async fn replace_document(
        &self,
        document_id: &str,
        metadata: &DocumentMetadata,
        chunks: &[StoredChunk],
    ) -> Result<usize> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;

        Self::delete_rows(&tx, document_id)?;

        tx.execute(
            r#"
            INSERT INTO documents
            (document_id, title, channel_title, duration_seconds, chunk_count, indexed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                document_id,
                metadata.title,
                metadata.channel_or_show_title,
                metadata.duration_seconds,
                chunks.len() as i64,
                Utc::now().to_rfc3339(),
            ],
        )?;

        for stored in chunks {
            let embedding = if stored.embedding.is_empty() {
                None
            } else {
                Some(Self::embedding_to_bytes(&stored.embedding))
            };

            tx.execute(
                r#"
                INSERT INTO chunks
                (document_id, chunk_index, total_chunks, content, word_count, embedding)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
                params![
                    document_id,
                    stored.chunk.index as i64,
                    stored.chunk.total_chunks as i64,
                    stored.chunk.text,
                    stored.chunk.word_count as i64,
                    embedding,
                ],
            )?;

            let rowid = tx.last_insert_rowid();
            tx.execute(
                "INSERT INTO chunks_fts (rowid, content) VALUES (?1, ?2)",
                params![rowid, stored.chunk.text],
            )?;
        }

        tx.commit()?;
        info!("Stored {} chunks for document {}", chunks.len(), document_id);
        Ok(chunks.len())
    }

    #[instrument(skip(self))]
    async fn chunks(&self, document_id: &str) -> Result<Vec<Chunk>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT content, chunk_index, total_chunks, word_count
            FROM chunks
            WHERE document_id = ?1
            ORDER BY chunk_index
            "#,
        )?;

        let rows = stmt.query_map(params![document_id], |row| {
            let index: i64 = row.get(1)?;
            let total: i64 = row.get(2)?;
            let words: i64 = row.get(3)?;
            Ok(Chunk {
                text: row.get(0)?,
                index: index as usize,
                total_chunks: total as usize,
                word_count: words as usize,
            })
        })?;

        let chunks = rows.collect::<std::result::Result<Vec<_>, _>>()?;
        debug!("Loaded {} chunks for document {}", chunks.len(), document_id);
        Ok(chunks)
    }

    async fn is_indexed(&self, document_id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM chunks WHERE document_id = ?1",
            params![document_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    #[instrument(skip(self))]
    async fn list_documents(&self) -> Result<Vec<IndexedDocument>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT document_id, title, channel_title, duration_seconds, chunk_count, indexed_at
            FROM documents
            ORDER BY indexed_at DESC, document_id
            "#,
        )?;

        let rows = stmt.query_map([], |row| {
            let chunk_count: i64 = row.get(4)?;
            let indexed_at: String = row.get(5)?;
            Ok(IndexedDocument {
                document_id: row.get(0)?,
                metadata: DocumentMetadata {
                    title: row.get(1)?,
                    channel_or_show_title: row.get(2)?,
                    duration_seconds: row.get(3)?,
                },
                chunk_count: chunk_count as usize,
                indexed_at: parse_timestamp(&indexed_at),
            })
        })?;

        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    #[instrument(skip(self))]
    async fn delete_document(&self, document_id: &str) -> Result<usize> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;
        let deleted = Self::delete_rows(&tx, document_id)?;
        tx.commit()?;

        info!("Deleted {} chunks for document {}", deleted, document_id);
        Ok(deleted)
    }
}

#[async_trait]
impl LexicalSearch for SqliteChunkStore {
    #[instrument(skip(self, query))]
    async fn search(
        &self,
        document_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<LexicalHit>> {
        let Some(expression) = Self::match_expression(query) else {
            return Ok(Vec::new());
        };

        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT c.chunk_index, bm25(chunks_fts) AS score
            FROM chunks_fts
            JOIN chunks c ON c.rowid = chunks_fts.rowid
            WHERE chunks_fts MATCH ?1 AND c.document_id = ?2
            ORDER BY score, c.chunk_index
            LIMIT ?3
            "#,
        )?;

        let rows = stmt.query_map(params![expression, document_id, limit as i64], |row| {
            let index: i64 = row.get(0)?;
            let bm25: f64 = row.get(1)?;
            Ok((index as usize, bm25))
        })?;

        // bm25() is lower-is-better and negative for matches.
        let raw: Vec<(usize, f64)> = rows.collect::<std::result::Result<Vec<_>, _>>()?;
        let best = raw.iter().map(|(_, bm25)| -bm25).fold(0.0_f64, f64::max);
        let mut hits: Vec<(f64, usize)> = raw
            .into_iter()
            .map(|(index, bm25)| (relative_relevance(-bm25, best), index))
            .collect();
        hits.sort_by(|a, b| by_score_then_index(*a, *b));

        debug!("Lexical search matched {} chunks", hits.len());
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
impl SemanticSearch for SqliteChunkStore {
    #[instrument(skip(self, vector))]
    async fn similarity_search(
        &self,
        document_id: &str,
        vector: &[f32],
        limit: usize,
        min_similarity: f64,
    ) -> Result<Vec<SemanticHit>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT chunk_index, embedding
            FROM chunks
            WHERE document_id = ?1 AND embedding IS NOT NULL
            "#,
        )?;

        let rows = stmt.query_map(params![document_id], |row| {
            let index: i64 = row.get(0)?;
            let bytes: Vec<u8> = row.get(1)?;
            Ok((index as usize, bytes))
        })?;

        let mut hits: Vec<(f64, usize)> = rows
            .collect::<std::result::Result<Vec<_>, _>>()?
            .into_iter()
            .map(|(index, bytes)| {
                let embedding = Self::bytes_to_embedding(&bytes);
                (cosine_similarity(vector, &embedding) as f64, index)
            })
            .filter(|(score, _)| *score >= min_similarity)
            .collect();

        // Sort by score descending
        hits.sort_by(|a, b| by_score_then_index(*a, *b));
        hits.truncate(limit);

        debug!("Found {} similar chunks", hits.len());
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
impl MetadataProvider for SqliteChunkStore {
    async fn metadata(&self, document_id: &str) -> Result<Option<DocumentMetadata>> {
        let conn = self.conn()?;
        let metadata = conn
            .query_row(
                "SELECT title, channel_title, duration_seconds FROM documents WHERE document_id = ?1",
                params![document_id],
                |row| {
                    Ok(DocumentMetadata {
                        title: row.get(0)?,
                        channel_or_show_title: row.get(1)?,
                        duration_seconds: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MATCH_FLOOR;

    fn stored(text: &str, index: usize, total: usize, embedding: Vec<f32>) -> StoredChunk {
        StoredChunk::new(Chunk::new(text, index, total), embedding)
    }

    async fn seeded() -> SqliteChunkStore {
        let store = SqliteChunkStore::in_memory().unwrap();
        let metadata = DocumentMetadata {
            title: Some("Rockets".to_string()),
            channel_or_show_title: Some("Space Talk".to_string()),
            duration_seconds: Some(3600.0),
        };
        store
            .replace_document(
                "ep1",
                &metadata,
                &[
                    stored("Welcome back to the show.", 0, 4, vec![1.0, 0.0, 0.0]),
                    stored("Today we discuss reusable rockets.", 1, 4, vec![0.0, 1.0, 0.0]),
                    stored("Landing a booster is hard.", 2, 4, vec![]),
                    stored("Thanks for listening everyone.", 3, 4, vec![0.0, 0.0, 1.0]),
                ],
            )
            .await
            .unwrap();
        store
            .replace_document(
                "ep2",
                &DocumentMetadata::default(),
                &[stored("Rockets rockets rockets.", 0, 1, vec![0.0, 1.0, 0.0])],
            )
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_round_trip_and_listing() {
        let store = seeded().await;

        let chunks = store.chunks("ep1").await.unwrap();
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[1].text, "Today we discuss reusable rockets.");
        assert_eq!(chunks[1].total_chunks, 4);
        assert_eq!(chunks[1].word_count, 5);

        let documents = store.list_documents().await.unwrap();
        assert_eq!(documents.len(), 2);
        let ep1 = documents.iter().find(|d| d.document_id == "ep1").unwrap();
        assert_eq!(ep1.chunk_count, 4);
        assert_eq!(ep1.metadata.channel_or_show_title.as_deref(), Some("Space Talk"));
    }

    #[tokio::test]
    async fn test_lexical_search_is_scoped_to_document() {
        let store = seeded().await;

        let hits = store.search("ep1", "What about rockets?", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk_index, 1);
        assert!((hits[0].rank_score - 1.0).abs() < 1e-9);

        let none = store.search("ep1", "\"unbalanced AND (", 10).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_common_term_still_scores_as_match() {
        let store = SqliteChunkStore::in_memory().unwrap();
        store
            .replace_document(
                "ep",
                &DocumentMetadata::default(),
                &[
                    stored("Welcome to the show about travel.", 0, 4, vec![]),
                    stored("Rockets are loud.", 1, 4, vec![]),
                    stored("Rockets burn fuel.", 2, 4, vec![]),
                    stored("Rockets rockets everywhere.", 3, 4, vec![]),
                ],
            )
            .await
            .unwrap();

        let hits = store.search("ep", "rockets", 10).await.unwrap();
        assert_eq!(hits.len(), 3);
        assert!(hits.iter().all(|h| h.chunk_index != 0));
        assert!((hits[0].rank_score - 1.0).abs() < 1e-9);
        assert!(hits.iter().all(|h| h.rank_score >= MATCH_FLOOR));
    }

    #[tokio::test]
    async fn test_similarity_search() {
        let store = seeded().await;

        let hits = store
            .similarity_search("ep1", &[0.0, 1.0, 0.0], 10, 0.5)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk_index, 1);
        assert!((hits[0].similarity - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_replace_and_delete() {
        let store = seeded().await;

        store
            .replace_document(
                "ep1",
                &DocumentMetadata::default(),
                &[stored("A single replacement chunk.", 0, 1, vec![])],
            )
            .await
            .unwrap();
        assert_eq!(store.chunks("ep1").await.unwrap().len(), 1);
        assert!(store.search("ep1", "rockets", 10).await.unwrap().is_empty());
        assert!(store.metadata("ep1").await.unwrap().unwrap().title.is_none());

        assert_eq!(store.delete_document("ep1").await.unwrap(), 1);
        assert!(!store.is_indexed("ep1").await.unwrap());
        assert!(store.metadata("ep1").await.unwrap().is_none());
        assert!(store.is_indexed("ep2").await.unwrap());
    }

    #[test]
    fn test_embedding_bytes_round_trip() {
        let embedding = vec![0.25f32, -1.5, 3.0];
        let bytes = SqliteChunkStore::embedding_to_bytes(&embedding);
        assert_eq!(bytes.len(), 12);
        assert_eq!(SqliteChunkStore::bytes_to_embedding(&bytes), embedding);
    }
}
