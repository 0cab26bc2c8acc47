//! Transcript chunking for retrieval.
//!
//! Splits transcripts into bounded, sentence-aligned chunks and scores how
//! well a chunk set is sized for retrieval and generation.

mod quality;
mod segmenter;

pub use quality::{analyze, ChunkQualityReport, QualityAnalyzer, QualityThresholds};
pub use segmenter::{segment, Segmenter, SegmenterConfig, WORDS_PER_TOKEN};

use serde::{Deserialize, Serialize};

/// A bounded slice of one document's transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Text content of this chunk.
    pub text: String,
    /// Position of this chunk in its document, starting at 0.
    pub index: usize,
    /// Number of chunks in the document's chunk set.
    pub total_chunks: usize,
    /// Whitespace-delimited token count of `text`.
    pub word_count: usize,
}

impl Chunk {
    /// Create a chunk, counting its words.
    pub fn new(text: impl Into<String>, index: usize, total_chunks: usize) -> Self {
        let text = text.into();
        let word_count = count_words(&text);
        Self {
            text,
            index,
            total_chunks,
            word_count,
        }
    }
}

/// Count whitespace-delimited words.
pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}
