//! Question-answering orchestrator for Hearsay.
//!
//! Owns the wiring between the core components: documents are segmented,
//! scored, embedded and persisted by [`Orchestrator::process_document`], and
//! questions flow through rewrite, retrieval, context assembly and generation
//! in [`Orchestrator::ask`].

use crate::cache::{CacheStats, ProcessedDocument, SessionCache};
use crate::chunking::{ChunkQualityReport, QualityAnalyzer, Segmenter};
use crate::config::{Prompts, Settings};
use crate::embedding::{Embedder, OpenAIEmbedder};
use crate::error::{ErrorKind, HearsayError, Result};
use crate::rag::{ContextAssembler, GenerationOptions, GenerationRequest, Generator, OpenAIGenerator};
use crate::retrieval::{HybridRetriever, SearchMethod, SearchOptions, SearchResultBatch};
use crate::rewrite::{
    ConversationTurn, IntentTag, OpenAIQueryRefiner, QueryRefiner, QueryRewriter, RewriteConfig,
    RewriteContext, RewriteResult,
};
use crate::store::{
    ChunkStore, DocumentMetadata, IndexedDocument, LexicalSearch, MemoryChunkStore,
    MetadataProvider, SemanticSearch, SqliteChunkStore, StoredChunk,
};
use crate::transcript::Transcript;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// External collaborators the orchestrator is built from.
pub struct Services {
    pub chunks: Arc<dyn ChunkStore>,
    pub lexical: Arc<dyn LexicalSearch>,
    pub semantic: Option<Arc<dyn SemanticSearch>>,
    pub metadata: Arc<dyn MetadataProvider>,
    pub embedder: Option<Arc<dyn Embedder>>,
    pub generator: Arc<dyn Generator>,
    pub refiner: Option<Arc<dyn QueryRefiner>>,
}

impl Services {
    /// Use one store for persistence, lexical, semantic and metadata lookups.
    pub fn from_store<S>(store: Arc<S>, generator: Arc<dyn Generator>) -> Self
    where
        S: ChunkStore + LexicalSearch + SemanticSearch + MetadataProvider + 'static,
    {
        Self {
            chunks: store.clone(),
            lexical: store.clone(),
            semantic: Some(store.clone()),
            metadata: store,
            embedder: None,
            generator,
            refiner: None,
        }
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn with_refiner(mut self, refiner: Arc<dyn QueryRefiner>) -> Self {
        self.refiner = Some(refiner);
        self
    }
}

/// The main orchestrator for the Hearsay pipeline.
pub struct Orchestrator {
    settings: Settings,
    prompts: Prompts,
    segmenter: Segmenter,
    analyzer: QualityAnalyzer,
    cache: Arc<SessionCache>,
    chunks: Arc<dyn ChunkStore>,
    metadata: Arc<dyn MetadataProvider>,
    embedder: Option<Arc<dyn Embedder>>,
    retriever: HybridRetriever,
    rewriter: QueryRewriter,
    assembler: ContextAssembler,
    generator: Arc<dyn Generator>,
}

impl Orchestrator {
    /// Create an orchestrator backed by the configured store and OpenAI providers.
    pub fn new(settings: Settings) -> Result<Self> {
        let prompts = Prompts::load(
            settings.prompts.custom_dir.as_deref(),
            Some(&settings.prompts.variables),
        )?;

        let generator: Arc<dyn Generator> = Arc::new(OpenAIGenerator::new()?);

        let mut services = match settings.store.provider.to_lowercase().as_str() {
            "memory" => {
                info!("Using in-memory chunk store");
                Services::from_store(Arc::new(MemoryChunkStore::new()), generator)
            }
            "sqlite" => Services::from_store(
                Arc::new(SqliteChunkStore::new(&settings.sqlite_path())?),
                generator,
            ),
            other => {
                return Err(HearsayError::Config(format!(
                    "Unknown store provider: {}",
                    other
                )))
            }
        };

        if settings.embedding.is_enabled() && settings.retrieval.semantic_enabled {
            info!("Using {} embeddings", settings.embedding.model);
            services = services.with_embedder(Arc::new(OpenAIEmbedder::with_config(
                &settings.embedding.model,
                settings.embedding.dimensions as usize,
            )?));
        }

        if settings.rewrite.use_llm {
            info!("Using {} for query refinement", settings.rewrite.model);
            services = services.with_refiner(Arc::new(OpenAIQueryRefiner::new(
                &settings.rewrite.model,
                prompts.clone(),
            )?));
        }

        Self::with_components(settings, prompts, services)
    }

    /// Create an orchestrator with custom components.
    pub fn with_components(settings: Settings, prompts: Prompts, services: Services) -> Result<Self> {
        settings.validate()?;

        let cache = Arc::new(SessionCache::with_limits(
            settings.cache.capacity,
            chrono::Duration::minutes(settings.cache.ttl_minutes),
        ));

        let mut retriever = HybridRetriever::new(services.chunks.clone(), services.lexical)
            .with_cache(cache.clone())
            .with_timeout(Duration::from_millis(settings.retrieval.timeout_ms));
        if let (Some(semantic), Some(embedder), true) = (
            services.semantic,
            services.embedder.clone(),
            settings.retrieval.semantic_enabled,
        ) {
            retriever = retriever.with_semantic(semantic, embedder);
        }

        let mut rewriter = QueryRewriter::new(RewriteConfig::from(&settings.rewrite))?;
        if let Some(refiner) = services.refiner {
            rewriter = rewriter.with_refiner(refiner);
        }

        Ok(Self {
            segmenter: Segmenter::new((&settings.segmenter).into()),
            analyzer: QualityAnalyzer::new((&settings.quality).into()),
            assembler: ContextAssembler::new((&settings.generation).into()),
            cache,
            chunks: services.chunks,
            metadata: services.metadata,
            embedder: services.embedder,
            retriever,
            rewriter,
            generator: services.generator,
            settings,
            prompts,
        })
    }

    /// Get the settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Get the session cache.
    pub fn cache(&self) -> Arc<SessionCache> {
        self.cache.clone()
    }

    /// Segment, score, embed and persist a transcript.
    ///
    /// Documents already cached or indexed are skipped unless `force` is set.
    #[instrument(skip(self, transcript, metadata), fields(document_id = %document_id))]
    pub async fn process_document(
        &self,
        document_id: &str,
        transcript: &Transcript,
        metadata: DocumentMetadata,
        force: bool,
    ) -> Result<ProcessResult> {
        if document_id.trim().is_empty() {
            return Err(HearsayError::Validation("document id is empty".to_string()));
        }

        let metadata = DocumentMetadata {
            title: metadata.title.or_else(|| transcript.title.clone()),
            ..metadata
        };

        if !force
            && (self.cache.has(document_id) || self.chunks.is_indexed(document_id).await?)
        {
            info!("Document {} is already processed, skipping", document_id);
            return Ok(ProcessResult {
                document_id: document_id.to_string(),
                title: metadata.title,
                chunks_indexed: 0,
                skipped: true,
                quality: None,
            });
        }

        let chunks = self.segmenter.segment_transcript(transcript)?;
        let quality = self.analyzer.analyze(&chunks);
        info!(
            "Segmented {} into {} chunks (quality {})",
            document_id,
            chunks.len(),
            quality.quality_score
        );

        let stored = self.embed_chunks(&chunks).await?;
        let indexed = self
            .chunks
            .replace_document(document_id, &metadata, &stored)
            .await?;

        self.cache.set(
            document_id,
            ProcessedDocument {
                document_id: document_id.to_string(),
                title: metadata.title.clone(),
                chunks,
                quality: quality.clone(),
                processed_at: Utc::now(),
            },
        );

        Ok(ProcessResult {
            document_id: document_id.to_string(),
            title: metadata.title,
            chunks_indexed: indexed,
            skipped: false,
            quality: Some(quality),
        })
    }

    /// Attach embeddings, degrading to text-only storage when the provider is down.
    async fn embed_chunks(&self, chunks: &[crate::chunking::Chunk]) -> Result<Vec<StoredChunk>> {
        let text_only = || chunks.iter().cloned().map(StoredChunk::text_only).collect();

        let Some(embedder) = &self.embedder else {
            return Ok(text_only());
        };

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        match embedder.embed_batch(&texts).await {
            Ok(embeddings) if embeddings.len() == chunks.len() => Ok(chunks
                .iter()
                .cloned()
                .zip(embeddings)
                .map(|(chunk, embedding)| StoredChunk::new(chunk, embedding))
                .collect()),
            Ok(embeddings) => {
                warn!(
                    "Embedder returned {} vectors for {} chunks; storing text only",
                    embeddings.len(),
                    chunks.len()
                );
                Ok(text_only())
            }
            Err(e) if e.is_recoverable() => {
                warn!("Embedding failed, storing text only: {}", e);
                Ok(text_only())
            }
            Err(e) => Err(e),
        }
    }

    /// Retrieve passages without generating an answer.
    pub async fn search(
        &self,
        document_id: &str,
        question: &str,
        options: Option<SearchOptions>,
    ) -> Result<SearchResultBatch> {
        let options = options.unwrap_or_else(|| self.default_search_options());
        self.retriever.search(document_id, question, &options).await
    }

    /// Answer a question about one document.
    #[instrument(skip(self, request), fields(document_id = %request.document_id))]
    pub async fn ask(&self, request: &AskRequest) -> std::result::Result<AskResponse, AskFailure> {
        let started = Instant::now();
        self.answer(request, started)
            .await
            .map_err(|(error, search_metadata)| {
                warn!("Question failed: {}", error);
                AskFailure::new(&error, elapsed_ms(started), search_metadata)
            })
    }

    async fn answer(
        &self,
        request: &AskRequest,
        started: Instant,
    ) -> std::result::Result<AskResponse, (HearsayError, Option<SearchMetadata>)> {
        request.validate().map_err(|e| (e, None))?;

        let metadata = self.document_metadata(&request.document_id).await;

        let rewrite = if request.enable_rewriting && self.settings.rewrite.enabled {
            let context = RewriteContext {
                conversation_history: request.conversation_history.clone(),
                episode_title: metadata.title.clone(),
                speakers: request.speakers.clone(),
                channel_title: metadata.channel_or_show_title.clone(),
            };
            Some(self.rewriter.rewrite(&request.question, &context).await)
        } else {
            None
        };
        let question = rewrite
            .as_ref()
            .map_or(request.question.as_str(), RewriteResult::effective_query);

        let options = request
            .search_options
            .unwrap_or_else(|| self.default_search_options());
        let batch = self
            .retriever
            .search(&request.document_id, question, &options)
            .await
            .map_err(|e| (e, None))?;

        let assembled = self.assembler.assemble(&batch.results);
        let search_metadata = SearchMetadata {
            method: batch.search_method,
            chunks_searched: batch.chunks_searched,
            total_results: batch.total_results,
            context_length: assembled.context.chars().count(),
        };

        if !assembled.is_valid {
            let reason = assembled
                .suggestion
                .unwrap_or_else(|| "Retrieved context is unusable".to_string());
            return Err((
                HearsayError::InsufficientContext(reason),
                Some(search_metadata),
            ));
        }

        let options = request
            .generation_options
            .clone()
            .unwrap_or_else(|| GenerationOptions::from(&self.settings.generation));
        let generation_request = GenerationRequest {
            system_prompt: self.prompts.answer.system.clone(),
            user_prompt: self.answer_prompt(&metadata, &assembled.context, question),
            options,
        };

        let timeout = Duration::from_millis(self.settings.generation.timeout_ms);
        let generation = match tokio::time::timeout(
            timeout,
            self.generator.complete(generation_request),
        )
        .await
        {
            Ok(Ok(generation)) => generation,
            Ok(Err(e)) => return Err((e, Some(search_metadata))),
            Err(_) => {
                return Err((
                    HearsayError::timeout("answer generation", timeout),
                    Some(search_metadata),
                ))
            }
        };

        debug!(
            "Answered with {} using {} chunks",
            generation.model_name,
            batch.results.len()
        );

        Ok(AskResponse {
            answer: generation.answer_text,
            search_metadata,
            rewrite_metadata: rewrite.map(RewriteMetadata::from),
            generation_metadata: GenerationMetadata {
                model: generation.model_name,
                usage: Usage {
                    prompt_tokens: generation.prompt_tokens,
                    completion_tokens: generation.completion_tokens,
                    total_tokens: generation.prompt_tokens + generation.completion_tokens,
                },
                processing_time_ms: elapsed_ms(started),
            },
        })
    }

    /// Metadata for a document, falling back to the cached title.
    async fn document_metadata(&self, document_id: &str) -> DocumentMetadata {
        let stored = match self.metadata.metadata(document_id).await {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!("Metadata lookup failed for {}: {}", document_id, e);
                None
            }
        };

        let mut metadata = stored.unwrap_or_default();
        if metadata.title.is_none() {
            metadata.title = self
                .cache
                .entry(document_id)
                .and_then(|entry| entry.payload.title);
        }
        metadata
    }

    fn answer_prompt(&self, metadata: &DocumentMetadata, context: &str, question: &str) -> String {
        let mut vars = HashMap::new();
        vars.insert(
            "title".to_string(),
            metadata.title.clone().unwrap_or_else(|| "Unknown".to_string()),
        );
        vars.insert(
            "channel".to_string(),
            metadata
                .channel_or_show_title
                .clone()
                .unwrap_or_else(|| "Unknown".to_string()),
        );
        vars.insert("context".to_string(), context.to_string());
        vars.insert("question".to_string(), question.to_string());

        self.prompts.render_with_custom(&self.prompts.answer.user, &vars)
    }

    fn default_search_options(&self) -> SearchOptions {
        SearchOptions {
            limit: self.settings.retrieval.limit,
            min_rank: self.settings.retrieval.min_rank,
        }
    }

    /// Quality report for a processed document.
    pub async fn quality(&self, document_id: &str) -> Result<ChunkQualityReport> {
        if let Some(entry) = self.cache.entry(document_id) {
            return Ok(entry.payload.quality);
        }

        let chunks = self.chunks.chunks(document_id).await?;
        if chunks.is_empty() {
            return Err(HearsayError::NotFound(document_id.to_string()));
        }
        Ok(self.analyzer.analyze(&chunks))
    }

    /// Indexed documents, most recent first.
    pub async fn list_documents(&self) -> Result<Vec<IndexedDocument>> {
        self.chunks.list_documents().await
    }

    /// Remove a document from the store and the session cache.
    pub async fn delete_document(&self, document_id: &str) -> Result<usize> {
        self.cache.remove(document_id);
        let removed = self.chunks.delete_document(document_id).await?;
        if removed == 0 {
            return Err(HearsayError::NotFound(document_id.to_string()));
        }
        info!("Deleted {} chunks for {}", removed, document_id);
        Ok(removed)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

/// Result of processing a document.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessResult {
    pub document_id: String,
    pub title: Option<String>,
    /// Number of chunks written to the store.
    pub chunks_indexed: usize,
    /// Whether processing was skipped (already processed).
    pub skipped: bool,
    pub quality: Option<ChunkQualityReport>,
}

/// A question bound to one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AskRequest {
    pub document_id: String,
    pub question: String,
    #[serde(default)]
    pub search_options: Option<SearchOptions>,
    #[serde(default)]
    pub generation_options: Option<GenerationOptions>,
    #[serde(default = "enabled")]
    pub enable_rewriting: bool,
    #[serde(default)]
    pub conversation_history: Vec<ConversationTurn>,
    /// Host first, then guests.
    #[serde(default)]
    pub speakers: Vec<String>,
}

fn enabled() -> bool {
    true
}

impl AskRequest {
    pub fn new(document_id: impl Into<String>, question: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            question: question.into(),
            search_options: None,
            generation_options: None,
            enable_rewriting: true,
            conversation_history: Vec::new(),
            speakers: Vec::new(),
        }
    }

    pub fn with_history(mut self, history: Vec<ConversationTurn>) -> Self {
        self.conversation_history = history;
        self
    }

    pub fn with_search_options(mut self, options: SearchOptions) -> Self {
        self.search_options = Some(options);
        self
    }

    fn validate(&self) -> Result<()> {
        if self.document_id.trim().is_empty() {
            return Err(HearsayError::Validation("documentId is required".to_string()));
        }
        if self.question.trim().is_empty() {
            return Err(HearsayError::Validation("question is required".to_string()));
        }
        Ok(())
    }
}

/// An answer with its provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AskResponse {
    pub answer: String,
    pub search_metadata: SearchMetadata,
    pub rewrite_metadata: Option<RewriteMetadata>,
    pub generation_metadata: GenerationMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchMetadata {
    pub method: SearchMethod,
    pub chunks_searched: usize,
    pub total_results: usize,
    /// Characters of assembled context.
    pub context_length: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewriteMetadata {
    pub original: String,
    pub rewritten: String,
    pub intent: IntentTag,
    pub confidence: f32,
    pub used_rewritten: bool,
    pub requires_real_time: bool,
}

impl From<RewriteResult> for RewriteMetadata {
    fn from(result: RewriteResult) -> Self {
        Self {
            original: result.original_query,
            rewritten: result.rewritten_query,
            intent: result.intent,
            confidence: result.confidence,
            used_rewritten: result.should_use_rewritten,
            requires_real_time: result.requires_real_time,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationMetadata {
    pub model: String,
    pub usage: Usage,
    pub processing_time_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A failed question, classified for the caller.
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[error("{message}")]
pub struct AskFailure {
    pub kind: ErrorKind,
    pub message: String,
    pub processing_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_metadata: Option<SearchMetadata>,
}

impl AskFailure {
    fn new(error: &HearsayError, processing_time_ms: u64, search_metadata: Option<SearchMetadata>) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
            processing_time_ms,
            search_metadata,
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
