//! Chunk set quality scoring.

use super::Chunk;
use crate::config::QualitySettings;
use serde::{Deserialize, Serialize};

/// Tokens per word used for token estimates.
const TOKENS_PER_WORD: f64 = 1.3;

/// Thresholds used to score a chunk set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityThresholds {
    pub min_chunk_words: usize,
    pub max_chunk_words: usize,
    pub max_variation: f64,
    pub ideal_min_chunks: usize,
    pub ideal_max_chunks: usize,
    pub max_chunks: usize,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            min_chunk_words: 50,
            max_chunk_words: 1000,
            max_variation: 0.5,
            ideal_min_chunks: 3,
            ideal_max_chunks: 20,
            max_chunks: 50,
        }
    }
}

impl From<&QualitySettings> for QualityThresholds {
    fn from(settings: &QualitySettings) -> Self {
        Self {
            min_chunk_words: settings.min_chunk_words,
            max_chunk_words: settings.max_chunk_words,
            max_variation: settings.max_variation,
            ideal_min_chunks: settings.ideal_min_chunks,
            ideal_max_chunks: settings.ideal_max_chunks,
            max_chunks: settings.max_chunks,
        }
    }
}

/// Aggregate statistics and a 0-100 score for one chunk set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkQualityReport {
    pub average_word_count: f64,
    pub min_word_count: usize,
    pub max_word_count: usize,
    pub total_word_count: usize,
    pub estimated_token_count: usize,
    pub quality_score: u8,
    pub suggestions: Vec<String>,
}

impl ChunkQualityReport {
    fn empty() -> Self {
        Self {
            average_word_count: 0.0,
            min_word_count: 0,
            max_word_count: 0,
            total_word_count: 0,
            estimated_token_count: 0,
            quality_score: 0,
            suggestions: vec!["No chunks were provided; the transcript may be empty.".to_string()],
        }
    }
}

/// Scores chunk sets against [`QualityThresholds`].
#[derive(Debug, Clone, Default)]
pub struct QualityAnalyzer {
    thresholds: QualityThresholds,
}

impl QualityAnalyzer {
    pub fn new(thresholds: QualityThresholds) -> Self {
        Self { thresholds }
    }

    /// Compute the report for a chunk set. Never fails.
    pub fn analyze(&self, chunks: &[Chunk]) -> ChunkQualityReport {
        if chunks.is_empty() {
            return ChunkQualityReport::empty();
        }

        let t = &self.thresholds;
        let counts: Vec<usize> = chunks.iter().map(|c| c.word_count).collect();
        let total: usize = counts.iter().sum();
        let min = counts.iter().copied().min().unwrap_or(0);
        let max = counts.iter().copied().max().unwrap_or(0);
        let mean = total as f64 / counts.len() as f64;

        let variance = counts
            .iter()
            .map(|&c| {
                let d = c as f64 - mean;
                d * d
            })
            .sum::<f64>()
            / counts.len() as f64;
        let variation = if mean > 0.0 { variance.sqrt() / mean } else { 0.0 };

        let mut score: i32 = 100;
        let mut suggestions = Vec::new();

        if min < t.min_chunk_words {
            score -= 20;
            suggestions.push(format!(
                "Some chunks are too small ({} words, minimum {}); consider a larger token budget.",
                min, t.min_chunk_words
            ));
        }
        if max > t.max_chunk_words {
            score -= 15;
            suggestions.push(format!(
                "Some chunks are too large ({} words, maximum {}); the transcript may lack sentence punctuation.",
                max, t.max_chunk_words
            ));
        }
        if variation > t.max_variation {
            score -= 10;
            suggestions.push(format!(
                "Chunk sizes vary widely (coefficient of variation {:.2}); retrieval quality may be uneven.",
                variation
            ));
        }
        if (t.ideal_min_chunks..=t.ideal_max_chunks).contains(&chunks.len()) {
            score += 5;
        }
        if chunks.len() > t.max_chunks {
            score -= 10;
            suggestions.push(format!(
                "Too many chunks ({}); consider a larger token budget.",
                chunks.len()
            ));
        }

        ChunkQualityReport {
            average_word_count: mean,
            min_word_count: min,
            max_word_count: max,
            total_word_count: total,
            estimated_token_count: (total as f64 * TOKENS_PER_WORD).ceil() as usize,
            quality_score: score.clamp(0, 100) as u8,
            suggestions,
        }
    }
}

/// Analyze a chunk set with default thresholds.
pub fn analyze(chunks: &[Chunk]) -> ChunkQualityReport {
    QualityAnalyzer::default().analyze(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks_with_words(sizes: &[usize]) -> Vec<Chunk> {
        sizes
            .iter()
            .enumerate()
            .map(|(i, &n)| Chunk::new(vec!["word"; n].join(" "), i, sizes.len()))
            .collect()
    }

    #[test]
    fn test_empty_set_scores_zero() {
        let report = analyze(&[]);
        assert_eq!(report.quality_score, 0);
        assert!(!report.suggestions.is_empty());
    }

    #[test]
    fn test_well_sized_set_is_clamped_to_hundred() {
        let report = analyze(&chunks_with_words(&[300, 310, 290, 305, 295]));
        assert_eq!(report.quality_score, 100);
        assert!(report.suggestions.is_empty());
        assert_eq!(report.total_word_count, 1500);
        assert_eq!(report.estimated_token_count, 1950);
        assert_eq!(report.min_word_count, 290);
        assert_eq!(report.max_word_count, 310);
    }

    #[test]
    fn test_penalties_are_cumulative() {
        // Tiny and huge chunks together: too small, too large, high variance.
        let report = analyze(&chunks_with_words(&[10, 1200]));
        assert_eq!(report.quality_score, 100 - 20 - 15 - 10);
        assert_eq!(report.suggestions.len(), 3);
    }

    #[test]
    fn test_small_chunks_in_ideal_range() {
        let report = analyze(&chunks_with_words(&[40, 40, 40]));
        assert_eq!(report.quality_score, 100 - 20 + 5);
    }

    #[test]
    fn test_too_many_chunks() {
        let sizes = vec![100; 60];
        let report = analyze(&chunks_with_words(&sizes));
        assert_eq!(report.quality_score, 90);
        assert!(report.suggestions[0].contains("Too many chunks"));
    }

    #[test]
    fn test_token_estimate_rounds_up() {
        let report = analyze(&chunks_with_words(&[1]));
        assert_eq!(report.estimated_token_count, 2);
    }

    #[test]
    fn test_custom_thresholds() {
        let analyzer = QualityAnalyzer::new(QualityThresholds {
            min_chunk_words: 5,
            ..QualityThresholds::default()
        });
        let report = analyzer.analyze(&chunks_with_words(&[10, 10, 10]));
        assert_eq!(report.quality_score, 100);
    }
}
