//! Passage retrieval for a single document.
//!
//! Lexical and semantic rankings are merged into one list. When neither
//! produces a usable match the first chunks of the document are returned so
//! a question can always be answered from something.

mod hybrid;

pub use hybrid::HybridRetriever;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Largest accepted `limit`.
pub const MAX_LIMIT: usize = 100;

/// Per-query retrieval knobs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SearchOptions {
    /// Maximum results returned, in `1..=100`.
    pub limit: usize,
    /// Scores below this are discarded.
    pub min_rank: f64,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: 5,
            min_rank: 0.01,
        }
    }
}

/// How a result list was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMethod {
    Lexical,
    Semantic,
    Hybrid,
    FallbackSequential,
}

impl fmt::Display for SearchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SearchMethod::Lexical => "lexical",
            SearchMethod::Semantic => "semantic",
            SearchMethod::Hybrid => "hybrid",
            SearchMethod::FallbackSequential => "fallback_sequential",
        };
        f.write_str(name)
    }
}

/// One retrieved chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub chunk_text: String,
    pub chunk_index: usize,
    pub rank_score: f64,
    pub word_count: usize,
}

/// A ranked result list with provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResultBatch {
    pub results: Vec<SearchResult>,
    /// Candidate count before `limit` was applied.
    pub total_results: usize,
    pub search_method: SearchMethod,
    /// Chunks in the searched document.
    pub chunks_searched: usize,
}
