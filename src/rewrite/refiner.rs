//! LLM-backed question refinement.

use super::{IntentTag, RewriteContext, TurnRole};
use crate::config::Prompts;
use crate::error::{HearsayError, Result};
use crate::openai::create_client;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs, ResponseFormat,
};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, instrument};

/// A refined question as proposed by a provider.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RefinedQuery {
    pub rewritten_query: String,
    pub intent: IntentTag,
    pub confidence: f32,
}

impl RefinedQuery {
    /// Parse provider output, rejecting empty rewrites and out-of-range confidence.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw
            .trim()
            .trim_start_matches("```json")
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim();
        let refined: RefinedQuery = serde_json::from_str(trimmed)?;

        if refined.rewritten_query.trim().is_empty() {
            return Err(HearsayError::Upstream(
                "refiner returned an empty query".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&refined.confidence) {
            return Err(HearsayError::Upstream(format!(
                "refiner confidence {} is out of range",
                refined.confidence
            )));
        }
        Ok(refined)
    }
}

/// Rewrites a question with conversational context.
#[async_trait]
pub trait QueryRefiner: Send + Sync {
    async fn refine(&self, question: &str, context: &RewriteContext) -> Result<RefinedQuery>;
}

/// OpenAI chat-completion refiner.
pub struct OpenAIQueryRefiner {
    client: async_openai::Client<async_openai::config::OpenAIConfig>,
    model: String,
    prompts: Prompts,
}

impl OpenAIQueryRefiner {
    pub fn new(model: &str, prompts: Prompts) -> Result<Self> {
        Ok(Self {
            client: create_client()?,
            model: model.to_string(),
            prompts,
        })
    }

    fn user_prompt(&self, question: &str, context: &RewriteContext) -> String {
        let history = context
            .conversation_history
            .iter()
            .map(|turn| {
                let role = match turn.role {
                    TurnRole::User => "User",
                    TurnRole::Assistant => "Assistant",
                };
                format!("{}: {}", role, turn.content)
            })
            .collect::<Vec<_>>()
            .join("\n");

        let mut vars = HashMap::new();
        vars.insert(
            "episode_title".to_string(),
            context.episode_title.clone().unwrap_or_else(|| "unknown".to_string()),
        );
        vars.insert(
            "channel_title".to_string(),
            context.channel_title.clone().unwrap_or_else(|| "unknown".to_string()),
        );
        vars.insert(
            "speakers".to_string(),
            if context.speakers.is_empty() {
                "unknown".to_string()
            } else {
                context.speakers.join(", ")
            },
        );
        vars.insert(
            "history".to_string(),
            if history.is_empty() {
                "(none)".to_string()
            } else {
                history
            },
        );
        vars.insert("question".to_string(), question.to_string());

        self.prompts.render_with_custom(&self.prompts.rewrite.user, &vars)
    }
}

#[async_trait]
impl QueryRefiner for OpenAIQueryRefiner {
    #[instrument(skip(self, question, context))]
    async fn refine(&self, question: &str, context: &RewriteContext) -> Result<RefinedQuery> {
        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(self.prompts.rewrite.system.clone())
                .build()
                .map_err(|e| HearsayError::OpenAI(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(self.user_prompt(question, context))
                .build()
                .map_err(|e| HearsayError::OpenAI(e.to_string()))?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .temperature(0.0)
            .max_completion_tokens(200u32)
            .response_format(ResponseFormat::JsonObject)
            .build()
            .map_err(|e| HearsayError::OpenAI(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| HearsayError::OpenAI(format!("Query refinement failed: {}", e)))?;

        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| HearsayError::Upstream("refiner returned no content".to_string()))?;

        debug!("Refiner output: {}", content);
        RefinedQuery::parse(&content)
    }
}
