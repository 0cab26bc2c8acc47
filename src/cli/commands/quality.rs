//! Quality command implementation.

use crate::chunking::{QualityAnalyzer, Segmenter};
use crate::cli::Output;
use crate::config::Settings;
use crate::transcript::load_transcript;
use anyhow::{Context, Result};
use std::path::Path;

/// Segment a transcript file and print its quality report. Nothing is stored.
pub fn run_quality(path: &Path, settings: &Settings) -> Result<()> {
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("transcript");
    let transcript = load_transcript(name, path)
        .with_context(|| format!("Failed to load transcript from {}", path.display()))?;

    let segmenter = Segmenter::new((&settings.segmenter).into());
    let chunks = match segmenter.segment_transcript(&transcript) {
        Ok(chunks) => chunks,
        Err(e) => {
            Output::error(&format!("Failed to segment {}: {}", path.display(), e));
            return Err(e.into());
        }
    };

    let report = QualityAnalyzer::new((&settings.quality).into()).analyze(&chunks);

    Output::header(&format!("Chunk quality for {}", name));
    Output::kv("Chunks", &chunks.len().to_string());
    Output::kv(
        "Budget",
        &format!(
            "{} tokens, {} overlap",
            settings.segmenter.max_tokens, settings.segmenter.overlap_tokens
        ),
    );
    Output::quality_report(&report);

    Ok(())
}
