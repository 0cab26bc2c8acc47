//! Sentence-aligned segmentation with carry-forward overlap.
//!
//! Sentences are packed greedily into chunks under a word budget derived from
//! a token budget. Each chunk after the first is prefixed with the tail
//! sentences of its predecessor. A sentence longer than the budget is never
//! split; it becomes an oversized chunk of its own.

use super::{count_words, Chunk};
use crate::config::SegmenterSettings;
use crate::error::{HearsayError, Result};
use crate::transcript::Transcript;
use tracing::debug;

/// Words per token used to convert token budgets into word budgets.
pub const WORDS_PER_TOKEN: f64 = 0.75;

/// Token budgets for segmentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmenterConfig {
    pub max_tokens: usize,
    pub overlap_tokens: usize,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            max_tokens: 800,
            overlap_tokens: 50,
        }
    }
}

impl From<&SegmenterSettings> for SegmenterConfig {
    fn from(settings: &SegmenterSettings) -> Self {
        Self {
            max_tokens: settings.max_tokens,
            overlap_tokens: settings.overlap_tokens,
        }
    }
}

impl SegmenterConfig {
    fn max_words(&self) -> usize {
        (self.max_tokens as f64 * WORDS_PER_TOKEN).floor() as usize
    }

    fn overlap_words(&self) -> usize {
        (self.overlap_tokens as f64 * WORDS_PER_TOKEN).floor() as usize
    }
}

/// Splits transcript text into chunks.
#[derive(Debug, Clone, Default)]
pub struct Segmenter {
    config: SegmenterConfig,
}

impl Segmenter {
    pub fn new(config: SegmenterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> SegmenterConfig {
        self.config
    }

    /// Segment a transcript's full text.
    pub fn segment_transcript(&self, transcript: &Transcript) -> Result<Vec<Chunk>> {
        self.segment(&transcript.full_text)
    }

    /// Segment raw text into an indexed chunk set.
    pub fn segment(&self, text: &str) -> Result<Vec<Chunk>> {
        if self.config.max_tokens == 0 {
            return Err(HearsayError::Validation(
                "max_tokens must be greater than zero".to_string(),
            ));
        }

        let normalized = normalize_whitespace(text);
        let sentences = split_sentences(&normalized);
        if sentences.is_empty() {
            return Err(HearsayError::EmptyInput(
                "transcript contains no sentences".to_string(),
            ));
        }

        let max_words = self.config.max_words();
        let overlap_words = self.config.overlap_words();

        let mut texts: Vec<String> = Vec::new();
        let mut carried: Vec<String> = Vec::new();
        let mut current: Vec<String> = Vec::new();
        let mut current_words = 0usize;

        for sentence in sentences {
            let words = count_words(&sentence);

            if current_words + words > max_words && !current.is_empty() {
                texts.push(compose(&carried, &current));
                carried = overlap_tail(&current, overlap_words);
                current.clear();
                current_words = 0;
            }

            current_words += words;
            current.push(sentence);
        }

        if !current.is_empty() {
            texts.push(compose(&carried, &current));
        }

        let total_chunks = texts.len();
        let chunks: Vec<Chunk> = texts
            .into_iter()
            .enumerate()
            .map(|(index, text)| Chunk::new(text, index, total_chunks))
            .collect();

        debug!(
            "Segmented {} words into {} chunks (budget {} words, overlap {})",
            count_words(&normalized),
            chunks.len(),
            max_words,
            overlap_words
        );

        Ok(chunks)
    }
}

/// Segment text with explicit token budgets.
pub fn segment(text: &str, max_tokens: usize, overlap_tokens: usize) -> Result<Vec<Chunk>> {
    Segmenter::new(SegmenterConfig {
        max_tokens,
        overlap_tokens,
    })
    .segment(text)
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split on terminal punctuation, re-appending a period to every fragment.
fn split_sentences(text: &str) -> Vec<String> {
    text.split(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("{}.", s))
        .collect()
}

fn compose(carried: &[String], current: &[String]) -> String {
    carried
        .iter()
        .chain(current.iter())
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Tail sentences of a closed chunk that fit the overlap budget. Falls back to
/// the trailing words of the last sentence when no whole sentence fits.
fn overlap_tail(sentences: &[String], budget: usize) -> Vec<String> {
    if budget == 0 {
        return Vec::new();
    }

    let mut tail = Vec::new();
    let mut used = 0usize;
    for sentence in sentences.iter().rev() {
        let words = count_words(sentence);
        if used + words > budget {
            break;
        }
        used += words;
        tail.push(sentence.clone());
    }

    if tail.is_empty() {
        if let Some(last) = sentences.last() {
            let words: Vec<&str> = last.split_whitespace().collect();
            let start = words.len().saturating_sub(budget);
            tail.push(words[start..].join(" "));
        }
    }

    tail.reverse();
    tail
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Sentences of exactly seven words each.
    fn seven_word_sentences(n: usize) -> String {
        (0..n)
            .map(|i| format!("Sentence number {} has exactly seven words.", i))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn test_indices_are_dense_and_total_matches() {
        let chunks = segment(&seven_word_sentences(40), 40, 10).unwrap();
        let n = chunks.len();
        assert!(n > 1);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i);
            assert_eq!(chunk.total_chunks, n);
            assert_eq!(chunk.word_count, chunk.text.split_whitespace().count());
        }
    }

    #[test]
    fn test_chunks_respect_budget_plus_overlap() {
        // 40 tokens -> 30 words -> four sentences; 10 tokens -> 7 words of overlap.
        let chunks = segment(&seven_word_sentences(12), 40, 10).unwrap();
        assert_eq!(chunks[0].word_count, 28);
        for chunk in &chunks[1..] {
            assert!(chunk.word_count <= 28 + 7);
        }
    }

    #[test]
    fn test_next_chunk_starts_with_previous_tail() {
        let chunks = segment(&seven_word_sentences(12), 40, 10).unwrap();
        assert!(chunks[0].text.ends_with("Sentence number 3 has exactly seven words."));
        assert!(chunks[1]
            .text
            .starts_with("Sentence number 3 has exactly seven words. Sentence number 4"));
    }

    #[test]
    fn test_zero_overlap_does_not_duplicate() {
        let text = seven_word_sentences(20);
        let chunks = segment(&text, 40, 0).unwrap();
        let total: usize = chunks.iter().map(|c| c.word_count).sum();
        assert_eq!(total, text.split_whitespace().count());
    }

    #[test]
    fn test_no_sentence_is_lost() {
        let text = seven_word_sentences(33);
        let chunks = segment(&text, 40, 10).unwrap();
        let joined = chunks
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        for i in 0..33 {
            assert!(joined.contains(&format!("Sentence number {} has", i)));
        }
    }

    #[test]
    fn test_oversized_sentence_is_kept_whole() {
        let long = vec!["word"; 100].join(" ");
        let text = format!("Short intro here. {}. Short outro here.", long);
        let chunks = segment(&text, 40, 0).unwrap();

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1].word_count, 100);
        assert_eq!(chunks[2].text, "Short outro here.");
    }

    #[test]
    fn test_overlap_falls_back_to_trailing_words() {
        let long = vec!["alpha"; 40].join(" ");
        let text = format!("{} omega. Next sentence here.", long);
        let chunks = segment(&text, 40, 4).unwrap();

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].text, "alpha alpha omega. Next sentence here.");
    }

    #[test]
    fn test_terminal_punctuation_becomes_period() {
        let chunks = segment("Is this working?  Yes!\n\nIt is", 800, 50).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Is this working. Yes. It is.");
    }

    #[test]
    fn test_empty_input_is_rejected() {
        let err = segment("  ... !! ?  ", 800, 50).unwrap_err();
        assert!(matches!(err, HearsayError::EmptyInput(_)));
    }

    #[test]
    fn test_zero_budget_is_rejected() {
        let err = segment("Hello there.", 0, 0).unwrap_err();
        assert!(matches!(err, HearsayError::Validation(_)));
    }

    #[test]
    fn test_segment_transcript_uses_full_text() {
        use crate::transcript::TranscriptSegment;

        let transcript = Transcript::new(
            "ep",
            vec![
                TranscriptSegment::new("Welcome back", 0.0, 2.0),
                TranscriptSegment::new("to the show.", 2.0, 2.0),
            ],
        );
        let chunks = Segmenter::default().segment_transcript(&transcript).unwrap();
        assert_eq!(chunks[0].text, "Welcome back to the show.");
    }
}
