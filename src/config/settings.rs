//! Configuration settings for Hearsay.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub segmenter: SegmenterSettings,
    pub quality: QualitySettings,
    pub retrieval: RetrievalSettings,
    pub rewrite: RewriteSettings,
    pub cache: CacheSettings,
    pub generation: GenerationSettings,
    pub embedding: EmbeddingSettings,
    pub store: StoreSettings,
    pub prompts: PromptSettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Directory for storing application data.
    pub data_dir: String,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            data_dir: "~/.hearsay".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Transcript segmentation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterSettings {
    /// Token budget per chunk.
    pub max_tokens: usize,
    /// Tokens carried over from the previous chunk.
    pub overlap_tokens: usize,
}

impl Default for SegmenterSettings {
    fn default() -> Self {
        Self {
            max_tokens: 800,
            overlap_tokens: 50,
        }
    }
}

/// Chunk quality scoring thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QualitySettings {
    pub min_chunk_words: usize,
    pub max_chunk_words: usize,
    /// Coefficient of variation above which chunk sizes are considered uneven.
    pub max_variation: f64,
    pub ideal_min_chunks: usize,
    pub ideal_max_chunks: usize,
    pub max_chunks: usize,
}

impl Default for QualitySettings {
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

/// Hybrid retrieval settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    /// Default number of chunks returned per question.
    pub limit: usize,
    /// Minimum rank score for a lexical or semantic match to count.
    pub min_rank: f64,
    /// Run embedding similarity search alongside lexical search.
    pub semantic_enabled: bool,
    /// Per-provider timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            limit: 5,
            min_rank: 0.01,
            semantic_enabled: true,
            timeout_ms: 5_000,
        }
    }
}

/// Query rewriting settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RewriteSettings {
    /// Rewrite ambiguous questions before retrieval.
    pub enabled: bool,
    /// Minimum confidence for a rewrite to be used.
    pub confidence_threshold: f32,
    /// Ask an LLM to refine ambiguous questions instead of the local heuristics.
    pub use_llm: bool,
    /// Model used when `use_llm` is set.
    pub model: String,
    /// Timeout for the refinement call in milliseconds.
    pub timeout_ms: u64,
    /// Questions longer than this are truncated before analysis.
    pub max_query_chars: usize,
}

impl Default for RewriteSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            confidence_threshold: 0.8,
            use_llm: false,
            model: "gpt-4o-mini".to_string(),
            timeout_ms: 3_000,
            max_query_chars: 2_000,
        }
    }
}

/// Session cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub capacity: usize,
    pub ttl_minutes: i64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            capacity: 25,
            ttl_minutes: 30,
        }
    }
}

/// Answer generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    /// LLM model for answer generation.
    pub model: String,
    /// Maximum completion tokens.
    pub max_tokens: u32,
    pub temperature: f32,
    /// Total context window of the model in tokens.
    pub context_window_tokens: usize,
    /// Share of the context window available to retrieved context.
    pub usable_fraction: f64,
    /// Timeout for the completion call in milliseconds.
    pub timeout_ms: u64,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            max_tokens: 1_000,
            temperature: 0.7,
            context_window_tokens: 128_000,
            usable_fraction: 0.6,
            timeout_ms: 60_000,
        }
    }
}

/// Embedding generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// Embedding provider (openai, none).
    pub provider: String,
    /// Embedding model to use.
    pub model: String,
    /// Embedding dimensions.
    pub dimensions: u32,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "text-embedding-3-small".to_string(),
            dimensions: 1536,
        }
    }
}

impl EmbeddingSettings {
    /// Whether semantic search has an embedding provider to work with.
    pub fn is_enabled(&self) -> bool {
        !matches!(self.provider.to_lowercase().as_str(), "" | "none" | "off")
    }
}

/// Chunk store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Store provider (sqlite, memory).
    pub provider: String,
    /// Path to SQLite database (for sqlite provider).
    pub sqlite_path: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            provider: "sqlite".to_string(),
            sqlite_path: "~/.hearsay/chunks.db".to_string(),
        }
    }
}

/// Prompt customization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct PromptSettings {
    /// Directory for custom prompts (overrides defaults).
    pub custom_dir: Option<String>,
    /// Custom variables available in all prompts as {{variable_name}}.
    pub variables: std::collections::HashMap<String, String>,
}

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> crate::error::Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    pub fn load_from(path: Option<&PathBuf>) -> crate::error::Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let settings: Settings = toml::from_str(&content)?;
            settings.validate()?;
            Ok(settings)
        } else {
            Ok(Settings::default())
        }
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::HearsayError;

        if self.segmenter.max_tokens == 0 {
            return Err(HearsayError::Config("segmenter.max_tokens must be positive".to_string()));
        }
        if !(1..=100).contains(&self.retrieval.limit) {
            return Err(HearsayError::Config(
                "retrieval.limit must be within 1..=100".to_string(),
            ));
        }
        if self.cache.capacity == 0 {
            return Err(HearsayError::Config("cache.capacity must be positive".to_string()));
        }
        if self.cache.ttl_minutes <= 0 {
            return Err(HearsayError::Config("cache.ttl_minutes must be positive".to_string()));
        }
        if !(0.0..=1.0).contains(&self.rewrite.confidence_threshold) {
            return Err(HearsayError::Config(
                "rewrite.confidence_threshold must be within 0.0..=1.0".to_string(),
            ));
        }
        if !(self.generation.usable_fraction > 0.0 && self.generation.usable_fraction <= 1.0) {
            return Err(HearsayError::Config(
                "generation.usable_fraction must be within (0.0, 1.0]".to_string(),
            ));
        }
        if !crate::rag::ModelBudget::from(&self.generation).fits_minimum_context() {
            return Err(HearsayError::Config(
                "generation.context_window_tokens is too small to hold a usable context".to_string(),
            ));
        }
        Ok(())
    }

    /// Save settings to the default configuration file.
    pub fn save(&self) -> crate::error::Result<()> {
        self.save_to(&Self::default_config_path())
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::HearsayError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hearsay")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    /// Get the expanded data directory path.
    pub fn data_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.data_dir)
    }

    /// Get the expanded SQLite database path.
    pub fn sqlite_path(&self) -> PathBuf {
        Self::expand_path(&self.store.sqlite_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_pipeline_constants() {
        let settings = Settings::default();
        assert_eq!(settings.segmenter.max_tokens, 800);
        assert_eq!(settings.segmenter.overlap_tokens, 50);
        assert_eq!(settings.cache.capacity, 25);
        assert_eq!(settings.cache.ttl_minutes, 30);
        assert!((settings.rewrite.confidence_threshold - 0.8).abs() < f32::EPSILON);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let settings: Settings = toml::from_str(
            r#"
            [retrieval]
            limit = 8

            [cache]
            capacity = 10
            "#,
        )
        .unwrap();

        assert_eq!(settings.retrieval.limit, 8);
        assert!((settings.retrieval.min_rank - 0.01).abs() < f64::EPSILON);
        assert_eq!(settings.cache.capacity, 10);
        assert_eq!(settings.cache.ttl_minutes, 30);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut settings = Settings::default();
        settings.generation.model = "gpt-4.1".to_string();
        settings.save_to(&path).unwrap();

        let loaded = Settings::load_from(Some(&path)).unwrap();
        assert_eq!(loaded.generation.model, "gpt-4.1");
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let mut settings = Settings::default();
        settings.cache.capacity = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.generation.usable_fraction = 1.5;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.generation.context_window_tokens = 10;
        settings.generation.usable_fraction = 1.0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_embedding_provider_toggle() {
        let mut settings = EmbeddingSettings::default();
        assert!(settings.is_enabled());
        settings.provider = "none".to_string();
        assert!(!settings.is_enabled());
    }
}
