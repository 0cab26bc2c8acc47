//! Ask command implementation.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::{AskRequest, Orchestrator};
use crate::rag::GenerationOptions;
use crate::retrieval::SearchOptions;
use anyhow::Result;

/// Run the ask command.
pub async fn run_ask(
    document_id: &str,
    question: &str,
    model: Option<String>,
    limit: Option<usize>,
    no_rewrite: bool,
    json: bool,
    settings: Settings,
) -> Result<()> {
    if let Err(e) = preflight::check(Operation::Ask, &settings) {
        Output::error(&format!("{}", e));
        return Err(e.into());
    }

    let mut request = AskRequest::new(document_id, question);
    request.enable_rewriting = !no_rewrite;
    if let Some(limit) = limit {
        request.search_options = Some(SearchOptions {
            limit,
            min_rank: settings.retrieval.min_rank,
        });
    }
    if let Some(model) = model {
        request.generation_options = Some(GenerationOptions {
            model,
            ..GenerationOptions::from(&settings.generation)
        });
    }

    let orchestrator = Orchestrator::new(settings)?;
    let spinner = Output::spinner("Searching transcript...");
    let outcome = orchestrator.ask(&request).await;
    spinner.finish_and_clear();

    match outcome {
        Ok(response) if json => {
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Ok(response) => {
            println!("\n{}\n", response.answer);

            if let Some(rewrite) = response.rewrite_metadata.as_ref().filter(|r| r.used_rewritten) {
                Output::kv("Interpreted as", &rewrite.rewritten);
            }
            if response
                .rewrite_metadata
                .as_ref()
                .is_some_and(|r| r.requires_real_time)
            {
                Output::warning("This question may need information newer than the episode.");
            }
            Output::kv(
                "Retrieval",
                &format!(
                    "{} ({} of {} chunks)",
                    response.search_metadata.method,
                    response.search_metadata.total_results,
                    response.search_metadata.chunks_searched
                ),
            );
            Output::kv(
                "Tokens",
                &response.generation_metadata.usage.total_tokens.to_string(),
            );
        }
        Err(failure) => {
            Output::error(&format!("Failed to answer: {}", failure.message));
            if json {
                println!("{}", serde_json::to_string_pretty(&failure)?);
            }
            return Err(failure.into());
        }
    }

    Ok(())
}
