//! Hybrid lexical/semantic retriever with a sequential fallback.

use super::{SearchMethod, SearchOptions, SearchResult, SearchResultBatch, MAX_LIMIT};
use crate::cache::SessionCache;
use crate::chunking::Chunk;
use crate::embedding::Embedder;
use crate::error::{HearsayError, Result};
use crate::store::{ChunkStore, LexicalSearch, SemanticSearch};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Ranks a document's chunks against a question.
pub struct HybridRetriever {
    chunks: Arc<dyn ChunkStore>,
    lexical: Arc<dyn LexicalSearch>,
    semantic: Option<(Arc<dyn SemanticSearch>, Arc<dyn Embedder>)>,
    cache: Option<Arc<SessionCache>>,
    timeout: Duration,
}

impl HybridRetriever {
    /// Create a lexical-only retriever.
    pub fn new(chunks: Arc<dyn ChunkStore>, lexical: Arc<dyn LexicalSearch>) -> Self {
        Self {
            chunks,
            lexical,
            semantic: None,
            cache: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Enable semantic ranking.
    pub fn with_semantic(
        mut self,
        semantic: Arc<dyn SemanticSearch>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        self.semantic = Some((semantic, embedder));
        self
    }

    /// Read chunk sets from the session cache before the store.
    pub fn with_cache(mut self, cache: Arc<SessionCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Bound each provider call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn has_semantic(&self) -> bool {
        self.semantic.is_some()
    }

    /// Retrieve ranked chunks for a question.
    #[instrument(skip(self, question), fields(limit = options.limit))]
    pub async fn search(
        &self,
        document_id: &str,
        question: &str,
        options: &SearchOptions,
    ) -> Result<SearchResultBatch> {
        if document_id.trim().is_empty() {
            return Err(HearsayError::Validation("document id is empty".to_string()));
        }
        if question.trim().is_empty() {
            return Err(HearsayError::Validation("question is empty".to_string()));
        }
        if !(1..=MAX_LIMIT).contains(&options.limit) {
            return Err(HearsayError::Validation(format!(
                "limit must be between 1 and {}, got {}",
                MAX_LIMIT, options.limit
            )));
        }

        let chunks = self.load_chunks(document_id).await?;
        if chunks.is_empty() {
            return Err(HearsayError::NotFound(document_id.to_string()));
        }

        // Providers return the full candidate pool; `limit` applies after merging.
        let pool = MAX_LIMIT.max(options.limit);
        let lexical = bounded(
            "lexical search",
            self.timeout,
            self.lexical.search(document_id, question, pool),
        );
        let semantic = async {
            match &self.semantic {
                Some((search, embedder)) => {
                    bounded("semantic search", self.timeout, async {
                        let vector = embedder.embed(question).await?;
                        search
                            .similarity_search(document_id, &vector, pool, options.min_rank)
                            .await
                    })
                    .await
                }
                None => Vec::new(),
            }
        };
        let (lexical_hits, semantic_hits) = tokio::join!(lexical, semantic);

        let by_index: HashMap<usize, &Chunk> = chunks.iter().map(|c| (c.index, c)).collect();

        let lexical_scores: Vec<(usize, f64)> = lexical_hits
            .into_iter()
            .filter(|h| h.rank_score >= options.min_rank && by_index.contains_key(&h.chunk_index))
            .map(|h| (h.chunk_index, h.rank_score))
            .collect();
        let semantic_scores: Vec<(usize, f64)> = semantic_hits
            .into_iter()
            .filter(|h| h.similarity >= options.min_rank && by_index.contains_key(&h.chunk_index))
            .map(|h| (h.chunk_index, h.similarity))
            .collect();

        let method = match (lexical_scores.is_empty(), semantic_scores.is_empty()) {
            (false, false) => SearchMethod::Hybrid,
            (false, true) => SearchMethod::Lexical,
            (true, false) => SearchMethod::Semantic,
            (true, true) => return Ok(fallback(&chunks, options.limit)),
        };

        // A chunk found by both strategies keeps its higher score.
        let mut merged: HashMap<usize, f64> = HashMap::new();
        for (index, score) in lexical_scores.into_iter().chain(semantic_scores) {
            merged
                .entry(index)
                .and_modify(|best| {
                    if score > *best {
                        *best = score;
                    }
                })
                .or_insert(score);
        }

        let mut ranked: Vec<(usize, f64)> = merged.into_iter().collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        let total_results = ranked.len();
        ranked.truncate(options.limit);

        let results = ranked
            .into_iter()
            .filter_map(|(index, score)| {
                by_index
                    .get(&index)
                    .map(|chunk| to_result(chunk, score))
            })
            .collect::<Vec<_>>();

        info!(
            "{} search returned {} of {} candidates",
            method,
            results.len(),
            total_results
        );

        Ok(SearchResultBatch {
            results,
            total_results,
            search_method: method,
            chunks_searched: chunks.len(),
        })
    }

    async fn load_chunks(&self, document_id: &str) -> Result<Vec<Chunk>> {
        if let Some(cache) = &self.cache {
            if let Some(document) = cache.get(document_id) {
                debug!("Using cached chunks for {}", document_id);
                return Ok(document.chunks);
            }
        }
        self.chunks.chunks(document_id).await
    }
}

/// Run a provider call under a timeout. Failures count as no results.
async fn bounded<T, F>(operation: &str, timeout: Duration, call: F) -> Vec<T>
where
    F: Future<Output = Result<Vec<T>>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(Ok(hits)) => hits,
        Ok(Err(e)) => {
            warn!("{} failed: {}", operation, e);
            Vec::new()
        }
        Err(_) => {
            warn!("{}", HearsayError::timeout(operation, timeout));
            Vec::new()
        }
    }
}

fn fallback(chunks: &[Chunk], limit: usize) -> SearchResultBatch {
    warn!(
        "No qualifying matches; returning the first {} chunks in order",
        limit.min(chunks.len())
    );

    let mut ordered: Vec<&Chunk> = chunks.iter().collect();
    ordered.sort_by_key(|c| c.index);

    SearchResultBatch {
        results: ordered
            .into_iter()
            .take(limit)
            .map(|chunk| to_result(chunk, 0.0))
            .collect(),
        total_results: chunks.len(),
        search_method: SearchMethod::FallbackSequential,
        chunks_searched: chunks.len(),
    }
}

fn to_result(chunk: &Chunk, rank_score: f64) -> SearchResult {
    SearchResult {
        chunk_text: chunk.text.clone(),
        chunk_index: chunk.index,
        rank_score,
        word_count: chunk.word_count,
    }
}
