//! Search command implementation.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use crate::retrieval::{SearchMethod, SearchOptions};
use anyhow::Result;

/// Run the search command.
pub async fn run_search(
    document_id: &str,
    query: &str,
    limit: Option<usize>,
    min_rank: Option<f64>,
    json: bool,
    settings: Settings,
) -> Result<()> {
    if let Err(e) = preflight::check(Operation::Search, &settings) {
        Output::error(&format!("{}", e));
        return Err(e.into());
    }

    let options = SearchOptions {
        limit: limit.unwrap_or(settings.retrieval.limit),
        min_rank: min_rank.unwrap_or(settings.retrieval.min_rank),
    };

    let orchestrator = Orchestrator::new(settings)?;
    let spinner = Output::spinner("Searching...");
    let results = orchestrator.search(document_id, query, Some(options)).await;
    spinner.finish_and_clear();

    match results {
        Ok(batch) if json => {
            println!("{}", serde_json::to_string_pretty(&batch)?);
        }
        Ok(batch) => {
            if batch.search_method == SearchMethod::FallbackSequential {
                Output::warning("No matching passages; showing the opening chunks instead.");
            } else {
                Output::success(&format!(
                    "Found {} results ({} search)",
                    batch.total_results, batch.search_method
                ));
            }

            for result in &batch.results {
                Output::search_result(result.chunk_index, result.rank_score, &result.chunk_text);
            }
        }
        Err(e) => {
            Output::error(&format!("Search failed: {}", e));
            return Err(e.into());
        }
    }

    Ok(())
}
