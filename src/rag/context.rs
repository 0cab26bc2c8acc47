//! Context assembly for answer generation.

use crate::config::GenerationSettings;
use crate::retrieval::SearchResult;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Characters per estimated token.
pub const CHARS_PER_TOKEN: usize = 4;

/// Shortest context worth sending to a model.
pub const MIN_CONTEXT_CHARS: usize = 50;

/// Appended to a context cut at the budget.
pub const TRUNCATION_MARKER: &str = "\n\n[... context truncated to fit the model budget]";

/// Estimate tokens for a text, rounding up.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// How much of a model's context window the retrieved text may use.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelBudget {
    pub context_window_tokens: usize,
    pub usable_fraction: f64,
}

impl Default for ModelBudget {
    fn default() -> Self {
        Self {
            context_window_tokens: 128_000,
            usable_fraction: 0.6,
        }
    }
}

impl From<&GenerationSettings> for ModelBudget {
    fn from(settings: &GenerationSettings) -> Self {
        Self {
            context_window_tokens: settings.context_window_tokens,
            usable_fraction: settings.usable_fraction,
        }
    }
}

impl ModelBudget {
    pub fn usable_tokens(&self) -> usize {
        (self.context_window_tokens as f64 * self.usable_fraction.clamp(0.0, 1.0)).floor() as usize
    }

    pub fn char_budget(&self) -> usize {
        self.usable_tokens() * CHARS_PER_TOKEN
    }

    /// Whether a truncated context can still hold the minimum usable text.
    pub fn fits_minimum_context(&self) -> bool {
        self.char_budget() >= MIN_CONTEXT_CHARS + TRUNCATION_MARKER.chars().count()
    }
}

/// The context handed to a generator, or the reason there is none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssembledContext {
    pub context: String,
    pub is_valid: bool,
    pub estimated_tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    pub truncated: bool,
}

/// Joins retrieved chunks and checks them against a [`ModelBudget`].
#[derive(Debug, Clone, Default)]
pub struct ContextAssembler {
    budget: ModelBudget,
}

impl ContextAssembler {
    pub fn new(budget: ModelBudget) -> Self {
        Self { budget }
    }

    pub fn budget(&self) -> ModelBudget {
        self.budget
    }

    /// Join result texts with blank lines, then validate and bound the result.
    pub fn assemble(&self, results: &[SearchResult]) -> AssembledContext {
        let context = results
            .iter()
            .map(|r| r.chunk_text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");

        let chars = context.chars().count();
        if chars == 0 {
            return invalid(
                context,
                "No transcript text was retrieved. Make sure the document has been processed.",
            );
        }
        if chars < MIN_CONTEXT_CHARS {
            let suggestion = format!(
                "Retrieved context is too short to answer from ({} characters, need at least {}). Try a broader question.",
                chars, MIN_CONTEXT_CHARS
            );
            return invalid(context, &suggestion);
        }

        let estimated = estimate_tokens(&context);
        let usable = self.budget.usable_tokens();
        if estimated <= usable {
            return AssembledContext {
                context,
                is_valid: true,
                estimated_tokens: estimated,
                suggestion: None,
                truncated: false,
            };
        }

        let keep = self
            .budget
            .char_budget()
            .saturating_sub(TRUNCATION_MARKER.chars().count());
        if keep < MIN_CONTEXT_CHARS {
            let suggestion = format!(
                "Model budget of {} tokens cannot hold a usable context (need at least {} characters). Raise the context window.",
                usable, MIN_CONTEXT_CHARS
            );
            return invalid(context, &suggestion);
        }
        let mut truncated: String = context.chars().take(keep).collect();
        truncated.push_str(TRUNCATION_MARKER);

        warn!(
            "Context of ~{} tokens exceeds budget of {}; truncated to {} characters",
            estimated, usable, keep
        );

        let estimated_tokens = estimate_tokens(&truncated);
        debug!("Assembled context of ~{} tokens", estimated_tokens);

        AssembledContext {
            context: truncated,
            is_valid: true,
            estimated_tokens,
            suggestion: Some(
                "Context was truncated; ask a narrower question or lower the search limit."
                    .to_string(),
            ),
            truncated: true,
        }
    }
}

/// Assemble with an explicit budget.
pub fn assemble(results: &[SearchResult], budget: ModelBudget) -> AssembledContext {
    ContextAssembler::new(budget).assemble(results)
}

fn invalid(context: String, suggestion: &str) -> AssembledContext {
    let estimated_tokens = estimate_tokens(&context);
    AssembledContext {
        context,
        is_valid: false,
        estimated_tokens,
        suggestion: Some(suggestion.to_string()),
        truncated: false,
    }
}
