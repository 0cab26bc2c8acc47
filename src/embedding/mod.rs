//! Embedding generation for semantic search.

mod openai;

pub use openai::OpenAIEmbedder;

use crate::error::{HearsayError, Result};
use async_trait::async_trait;

/// Trait for embedding generation.
///
/// Implementations fail fast on empty input rather than sending it upstream.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate an embedding for a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Get the embedding dimensions.
    fn dimensions(&self) -> usize;
}

/// Reject empty or whitespace-only embedding input.
pub fn ensure_embeddable(text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(HearsayError::Validation(
            "cannot embed empty text".to_string(),
        ));
    }
    Ok(())
}
