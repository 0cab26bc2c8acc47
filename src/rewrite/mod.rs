//! Question rewriting and intent classification.
//!
//! Follow-up questions such as "what did he say about AI?" are resolved
//! against the conversation and episode details before retrieval. The
//! rewriter never fails: any problem yields the original question with zero
//! confidence.

mod heuristics;
mod refiner;

pub use refiner::{OpenAIQueryRefiner, QueryRefiner, RefinedQuery};

use crate::config::RewriteSettings;
use crate::error::Result;
use heuristics::{Analysis, Heuristics};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

/// What a question is asking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentTag {
    EpisodeContent,
    CurrentInfo,
    Summarize,
    FindQuote,
    FactCheck,
    Other,
}

impl IntentTag {
    /// Whether injecting resolved names helps retrieval for this intent.
    pub fn benefits_from_rewrite(self) -> bool {
        matches!(
            self,
            IntentTag::EpisodeContent | IntentTag::FindQuote | IntentTag::FactCheck
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            IntentTag::EpisodeContent => "episode_content",
            IntentTag::CurrentInfo => "current_info",
            IntentTag::Summarize => "summarize",
            IntentTag::FindQuote => "find_quote",
            IntentTag::FactCheck => "fact_check",
            IntentTag::Other => "other",
        }
    }
}

impl fmt::Display for IntentTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who said a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

/// One prior message in the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
        }
    }
}

/// Everything known about the conversation and the episode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RewriteContext {
    /// Oldest first.
    pub conversation_history: Vec<ConversationTurn>,
    pub episode_title: Option<String>,
    /// Host first, then guests.
    pub speakers: Vec<String>,
    pub channel_title: Option<String>,
}

/// Outcome of a rewrite attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewriteResult {
    pub original_query: String,
    pub rewritten_query: String,
    pub intent: IntentTag,
    pub confidence: f32,
    pub should_use_rewritten: bool,
    pub requires_real_time: bool,
    pub processing_time_ms: u64,
}

impl RewriteResult {
    /// The original question, untouched and untrusted.
    pub fn passthrough(question: &str, processing_time_ms: u64) -> Self {
        Self {
            original_query: question.to_string(),
            rewritten_query: question.to_string(),
            intent: IntentTag::Other,
            confidence: 0.0,
            should_use_rewritten: false,
            requires_real_time: false,
            processing_time_ms,
        }
    }

    /// The question retrieval should use.
    pub fn effective_query(&self) -> &str {
        if self.should_use_rewritten {
            &self.rewritten_query
        } else {
            &self.original_query
        }
    }
}

/// Rewriter tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct RewriteConfig {
    pub confidence_threshold: f32,
    pub max_query_chars: usize,
    pub timeout: Duration,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.8,
            max_query_chars: 2_000,
            timeout: Duration::from_millis(3_000),
        }
    }
}

impl From<&RewriteSettings> for RewriteConfig {
    fn from(settings: &RewriteSettings) -> Self {
        Self {
            confidence_threshold: settings.confidence_threshold,
            max_query_chars: settings.max_query_chars,
            timeout: Duration::from_millis(settings.timeout_ms),
        }
    }
}

/// Classifies questions and decides whether to trust a rewrite.
pub struct QueryRewriter {
    config: RewriteConfig,
    heuristics: Heuristics,
    refiner: Option<Arc<dyn QueryRefiner>>,
}

impl QueryRewriter {
    pub fn new(config: RewriteConfig) -> Result<Self> {
        Ok(Self {
            config,
            heuristics: Heuristics::new()?,
            refiner: None,
        })
    }

    /// Consult a refiner for ambiguous questions.
    pub fn with_refiner(mut self, refiner: Arc<dyn QueryRefiner>) -> Self {
        self.refiner = Some(refiner);
        self
    }

    pub fn config(&self) -> &RewriteConfig {
        &self.config
    }

    /// Rewrite a question. Never fails.
    #[instrument(skip_all, fields(chars = question.len()))]
    pub async fn rewrite(&self, question: &str, context: &RewriteContext) -> RewriteResult {
        let started = Instant::now();

        if question.trim().is_empty() {
            debug!("Empty question; passing through");
            return RewriteResult::passthrough(question, elapsed_ms(started));
        }

        let trimmed = question.trim();
        let bounded = truncate_chars(trimmed, self.config.max_query_chars);
        // Text past the analysis bound is carried through any rewrite unchanged.
        let tail = &trimmed[bounded.len()..];
        let analysis = self.heuristics.analyze(bounded, context);

        let mut result = if analysis.is_ambiguous() {
            match &self.refiner {
                Some(refiner) => {
                    match self.refine(refiner.as_ref(), question, bounded, tail, context, &analysis).await {
                        Some(result) => result,
                        // Fail open, keeping the locally classified intent.
                        None => self.decide(question, question.to_string(), analysis.intent, 0.0),
                    }
                }
                None => self.from_analysis(question, tail, analysis),
            }
        } else {
            self.from_analysis(question, tail, analysis)
        };

        result.processing_time_ms = elapsed_ms(started);
        debug!(
            "Rewrite intent={} confidence={:.2} used={}",
            result.intent, result.confidence, result.should_use_rewritten
        );
        result
    }

    fn from_analysis(&self, question: &str, tail: &str, analysis: Analysis) -> RewriteResult {
        let confidence = analysis.confidence();
        let changed = analysis.resolved > 0;
        let rewritten = if changed {
            analysis.rewritten + tail
        } else {
            question.to_string()
        };

        self.decide(question, rewritten, analysis.intent, confidence)
    }

    async fn refine(
        &self,
        refiner: &dyn QueryRefiner,
        question: &str,
        bounded: &str,
        tail: &str,
        context: &RewriteContext,
        analysis: &Analysis,
    ) -> Option<RewriteResult> {
        let refined = match tokio::time::timeout(self.config.timeout, refiner.refine(bounded, context)).await {
            Ok(Ok(refined)) => refined,
            Ok(Err(e)) => {
                warn!("Query refinement failed, using original question: {}", e);
                return None;
            }
            Err(_) => {
                warn!(
                    "Query refinement timed out after {:?}, using original question",
                    self.config.timeout
                );
                return None;
            }
        };

        // Without every reference resolvable locally, the refiner is guessing.
        let confidence = if analysis.all_resolved() {
            refined.confidence
        } else {
            refined.confidence.min(analysis.confidence())
        };

        Some(self.decide(
            question,
            refined.rewritten_query + tail,
            refined.intent,
            confidence,
        ))
    }

    fn decide(
        &self,
        original: &str,
        rewritten: String,
        intent: IntentTag,
        confidence: f32,
    ) -> RewriteResult {
        let confidence = confidence.clamp(0.0, 1.0);
        let should_use_rewritten = confidence >= self.config.confidence_threshold
            && intent.benefits_from_rewrite()
            && rewritten != original;

        RewriteResult {
            original_query: original.to_string(),
            rewritten_query: rewritten,
            intent,
            confidence,
            should_use_rewritten,
            requires_real_time: intent == IntentTag::CurrentInfo,
            processing_time_ms: 0,
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

/// Longest prefix of at most `max_chars` characters.
fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((offset, _)) => &text[..offset],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HearsayError;
    use async_trait::async_trait;

    fn rewriter() -> QueryRewriter {
        QueryRewriter::new(RewriteConfig::default()).unwrap()
    }

    fn musk_history() -> RewriteContext {
        RewriteContext {
            conversation_history: vec![
                ConversationTurn::user("Who is on this episode?"),
                ConversationTurn::assistant("The guest is Elon Musk, talking about Tesla."),
            ],
            ..Default::default()
        }
    }

    struct FixedRefiner(RefinedQuery);

    #[async_trait]
    impl QueryRefiner for FixedRefiner {
        async fn refine(&self, _: &str, _: &RewriteContext) -> Result<RefinedQuery> {
            Ok(self.0.clone())
        }
    }

    struct BrokenRefiner;

    #[async_trait]
    impl QueryRefiner for BrokenRefiner {
        async fn refine(&self, _: &str, _: &RewriteContext) -> Result<RefinedQuery> {
            Err(HearsayError::Upstream("model unavailable".to_string()))
        }
    }

    struct SlowRefiner;

    #[async_trait]
    impl QueryRefiner for SlowRefiner {
        async fn refine(&self, question: &str, _: &RewriteContext) -> Result<RefinedQuery> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(RefinedQuery {
                rewritten_query: question.to_string(),
                intent: IntentTag::Other,
                confidence: 1.0,
            })
        }
    }

    #[tokio::test]
    async fn test_pronoun_rewritten_from_history() {
        let result = rewriter()
            .rewrite("What did he say about AI?", &musk_history())
            .await;

        assert!(result.should_use_rewritten);
        assert!(result.rewritten_query.contains("Elon Musk"));
        assert_eq!(result.intent, IntentTag::EpisodeContent);
        assert_eq!(result.effective_query(), result.rewritten_query);
        assert!(!result.requires_real_time);
    }

    #[tokio::test]
    async fn test_specific_question_not_rewritten() {
        let question = "What are Elon Musk's specific predictions for AGI timelines in 2024?";
        let result = rewriter().rewrite(question, &RewriteContext::default()).await;

        assert!(!result.should_use_rewritten);
        assert_eq!(result.rewritten_query, question);
        assert!(result.confidence < 0.8);
        assert_eq!(result.effective_query(), question);
    }

    #[tokio::test]
    async fn test_pronoun_without_context_never_rewritten() {
        let result = rewriter()
            .rewrite("What did she say about it?", &RewriteContext::default())
            .await;

        assert!(!result.should_use_rewritten);
        assert_eq!(result.rewritten_query, result.original_query);
    }

    #[tokio::test]
    async fn test_empty_input_fails_open() {
        let result = rewriter().rewrite("   ", &musk_history()).await;
        assert_eq!(result.rewritten_query, "   ");
        assert_eq!(result.confidence, 0.0);
        assert!(!result.should_use_rewritten);
    }

    #[tokio::test]
    async fn test_current_info_requires_real_time() {
        let result = rewriter()
            .rewrite("What is the Tesla stock price right now?", &RewriteContext::default())
            .await;
        assert_eq!(result.intent, IntentTag::CurrentInfo);
        assert!(result.requires_real_time);
        assert!(!result.should_use_rewritten);
    }

    #[tokio::test]
    async fn test_long_and_non_ascii_input() {
        let long = "ünïcødé 🎙️ ".repeat(5_000);
        let result = rewriter().rewrite(&long, &musk_history()).await;
        assert_eq!(result.original_query, long);
        assert!(!result.should_use_rewritten);

        let result = rewriter()
            .rewrite("¿Qué dijo él sobre la IA?", &musk_history())
            .await;
        assert!(!result.should_use_rewritten);
    }

    #[tokio::test]
    async fn test_refiner_result_used() {
        let rewriter = rewriter().with_refiner(Arc::new(FixedRefiner(RefinedQuery {
            rewritten_query: "What did Elon Musk say about artificial intelligence?".to_string(),
            intent: IntentTag::EpisodeContent,
            confidence: 0.95,
        })));

        let result = rewriter
            .rewrite("What did he say about AI?", &musk_history())
            .await;
        assert!(result.should_use_rewritten);
        assert_eq!(
            result.rewritten_query,
            "What did Elon Musk say about artificial intelligence?"
        );
        assert!((result.confidence - 0.95).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_refiner_capped_when_unresolvable() {
        let rewriter = rewriter().with_refiner(Arc::new(FixedRefiner(RefinedQuery {
            rewritten_query: "What did someone say about AI?".to_string(),
            intent: IntentTag::EpisodeContent,
            confidence: 0.99,
        })));

        let result = rewriter
            .rewrite("What did he say about AI?", &RewriteContext::default())
            .await;
        assert!(!result.should_use_rewritten);
        assert!(result.confidence < 0.8);
    }

    #[tokio::test]
    async fn test_refiner_failure_fails_open() {
        let result = rewriter()
            .with_refiner(Arc::new(BrokenRefiner))
            .rewrite("What did he say about AI?", &musk_history())
            .await;
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.rewritten_query, "What did he say about AI?");
        assert!(!result.should_use_rewritten);
    }

    #[tokio::test]
    async fn test_refiner_failure_keeps_heuristic_intent() {
        let result = rewriter()
            .with_refiner(Arc::new(BrokenRefiner))
            .rewrite("Who is he, right now?", &musk_history())
            .await;
        assert_eq!(result.intent, IntentTag::CurrentInfo);
        assert!(result.requires_real_time);
        assert_eq!(result.confidence, 0.0);
        assert!(!result.should_use_rewritten);
    }

    #[tokio::test]
    async fn test_long_follow_up_keeps_full_question() {
        let question = format!("What did he say about AI? {}", "Give every detail. ".repeat(200));
        assert!(question.chars().count() > 2_000);

        struct EchoRefiner;

        #[async_trait]
        impl QueryRefiner for EchoRefiner {
            async fn refine(&self, question: &str, _: &RewriteContext) -> Result<RefinedQuery> {
                Ok(RefinedQuery {
                    rewritten_query: question.replace("he", "Elon Musk"),
                    intent: IntentTag::EpisodeContent,
                    confidence: 0.95,
                })
            }
        }

        let refined = rewriter()
            .with_refiner(Arc::new(EchoRefiner))
            .rewrite(&question, &musk_history())
            .await;
        assert_eq!(refined.original_query, question);
        assert!(refined.rewritten_query.starts_with("What did Elon Musk say about AI?"));
        assert!(refined.rewritten_query.ends_with("Give every detail."));
        assert!(refined.rewritten_query.chars().count() > question.trim().chars().count());

        let local = rewriter().rewrite(&question, &musk_history()).await;
        assert_eq!(local.original_query, question);
        assert!(local.rewritten_query.starts_with("What did Elon Musk say about AI?"));
        assert!(local.rewritten_query.ends_with("Give every detail."));
    }

    #[tokio::test]
    async fn test_refiner_timeout_fails_open() {
        let rewriter = QueryRewriter::new(RewriteConfig {
            timeout: Duration::from_millis(20),
            ..RewriteConfig::default()
        })
        .unwrap()
        .with_refiner(Arc::new(SlowRefiner));

        let result = rewriter
            .rewrite("What did he say about AI?", &musk_history())
            .await;
        assert_eq!(result.confidence, 0.0);
        assert!(!result.should_use_rewritten);
    }

    #[tokio::test]
    async fn test_unambiguous_question_skips_refiner() {
        let result = rewriter()
            .with_refiner(Arc::new(BrokenRefiner))
            .rewrite("Summarize the discussion about batteries", &RewriteContext::default())
            .await;
        assert_eq!(result.intent, IntentTag::Summarize);
        assert!((result.confidence - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("hi", 10), "hi");
    }
}
