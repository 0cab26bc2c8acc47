//! Retrieval-augmented answering: bounded context assembly and generation.

pub mod context;
mod generation;

pub use context::{assemble, AssembledContext, ContextAssembler, ModelBudget};
pub use generation::{Generation, GenerationOptions, GenerationRequest, Generator, OpenAIGenerator};
