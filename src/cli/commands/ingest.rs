//! Ingest command implementation.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use crate::store::DocumentMetadata;
use crate::transcript::{format_timestamp, load_transcript};
use anyhow::{Context, Result};
use std::path::Path;

/// Run the ingest command.
pub async fn run_ingest(
    path: &Path,
    id: Option<String>,
    title: Option<String>,
    show: Option<String>,
    force: bool,
    settings: Settings,
) -> Result<()> {
    if let Err(e) = preflight::check(Operation::Ingest, &settings) {
        Output::error(&format!("{}", e));
        Output::info("Set embedding.provider = \"none\" to index without embeddings.");
        return Err(e.into());
    }

    let document_id = match id {
        Some(id) => id,
        None => path
            .file_stem()
            .and_then(|s| s.to_str())
            .map(str::to_string)
            .context("Could not derive a document id from the file name; pass --id")?,
    };

    let transcript = load_transcript(&document_id, path)
        .with_context(|| format!("Failed to load transcript from {}", path.display()))?;

    Output::info(&format!(
        "Loaded {} ({} words, {} segments)",
        document_id,
        transcript.word_count(),
        transcript.segments.len()
    ));
    if transcript.duration_seconds > 0.0 {
        Output::kv("Duration", &format_timestamp(transcript.duration_seconds));
    }

    let metadata = DocumentMetadata {
        title,
        channel_or_show_title: show,
        duration_seconds: (transcript.duration_seconds > 0.0).then_some(transcript.duration_seconds),
    };

    let orchestrator = Orchestrator::new(settings)?;
    let spinner = Output::spinner("Segmenting and indexing...");
    let result = orchestrator
        .process_document(&document_id, &transcript, metadata, force)
        .await;
    spinner.finish_and_clear();

    match result {
        Ok(result) if result.skipped => {
            Output::info(&format!(
                "{} is already indexed. Use --force to re-process.",
                result.document_id
            ));
        }
        Ok(result) => {
            Output::success(&format!(
                "Indexed {} chunks for {}",
                result.chunks_indexed,
                result.title.as_deref().unwrap_or(&result.document_id)
            ));
            if let Some(report) = &result.quality {
                Output::header("Chunk quality");
                Output::quality_report(report);
            }
        }
        Err(e) => {
            Output::error(&format!("Failed to ingest {}: {}", document_id, e));
            return Err(e.into());
        }
    }

    Ok(())
}
