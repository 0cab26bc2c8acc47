//! Configuration module for Hearsay.
//!
//! Handles loading and managing application settings and prompt templates.

mod prompts;
mod settings;

pub use prompts::{AnswerPrompts, Prompts, RewritePrompts};
pub use settings::{
    CacheSettings, EmbeddingSettings, GeneralSettings, GenerationSettings, PromptSettings,
    QualitySettings, RetrievalSettings, RewriteSettings, SegmenterSettings, Settings,
    StoreSettings,
};
