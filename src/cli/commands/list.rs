//! List command implementation.

use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use anyhow::Result;

/// Run the list command.
pub async fn run_list(settings: Settings) -> Result<()> {
    let orchestrator = Orchestrator::new(settings)?;

    match orchestrator.list_documents().await {
        Ok(documents) => {
            if documents.is_empty() {
                Output::info("No documents indexed yet. Use 'hearsay ingest <file>' to add one.");
            } else {
                Output::header(&format!("Indexed Documents ({})", documents.len()));
                println!();

                for document in &documents {
                    Output::document_info(
                        document
                            .metadata
                            .title
                            .as_deref()
                            .unwrap_or(&document.document_id),
                        &document.document_id,
                        document.chunk_count,
                        document.metadata.duration_seconds,
                    );
                }

                let total_chunks: usize = documents.iter().map(|d| d.chunk_count).sum();
                println!();
                Output::kv("Total documents", &documents.len().to_string());
                Output::kv("Total chunks", &total_chunks.to_string());
            }
        }
        Err(e) => {
            Output::error(&format!("Failed to list documents: {}", e));
            return Err(e.into());
        }
    }

    Ok(())
}
