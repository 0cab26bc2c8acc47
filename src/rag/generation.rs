//! Answer generation providers.

use crate::config::GenerationSettings;
use crate::error::{HearsayError, Result};
use crate::openai::create_client;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Model parameters for one completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GenerationOptions {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self::from(&GenerationSettings::default())
    }
}

impl From<&GenerationSettings> for GenerationOptions {
    fn from(settings: &GenerationSettings) -> Self {
        Self {
            model: settings.model.clone(),
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
        }
    }
}

/// A fully rendered completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub options: GenerationOptions,
}

/// A completion and its token accounting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    pub answer_text: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub model_name: String,
}

/// Trait for answer generation.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn complete(&self, request: GenerationRequest) -> Result<Generation>;
}

/// OpenAI chat-completion generator.
pub struct OpenAIGenerator {
    client: async_openai::Client<async_openai::config::OpenAIConfig>,
}

impl OpenAIGenerator {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: create_client()?,
        })
    }
}

#[async_trait]
impl Generator for OpenAIGenerator {
    #[instrument(skip(self, request), fields(model = %request.options.model))]
    async fn complete(&self, request: GenerationRequest) -> Result<Generation> {
        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(request.system_prompt)
                .build()
                .map_err(|e| HearsayError::OpenAI(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(request.user_prompt)
                .build()
                .map_err(|e| HearsayError::OpenAI(e.to_string()))?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&request.options.model)
            .messages(messages)
            .temperature(request.options.temperature)
            .max_completion_tokens(request.options.max_tokens)
            .build()
            .map_err(|e| HearsayError::OpenAI(e.to_string()))?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            HearsayError::OpenAI(format!("Failed to generate response: {}", e))
        })?;

        let answer_text = response
            .choices
            .first()
            .and_then(|c| c.message.content.as_ref())
            .ok_or_else(|| HearsayError::Upstream("Empty response from LLM".to_string()))?
            .clone();

        let (prompt_tokens, completion_tokens) = response
            .usage
            .as_ref()
            .map(|u| (u.prompt_tokens, u.completion_tokens))
            .unwrap_or((0, 0));

        debug!(
            "Generated {} completion tokens from {} prompt tokens",
            completion_tokens, prompt_tokens
        );

        Ok(Generation {
            answer_text,
            prompt_tokens,
            completion_tokens,
            model_name: response.model,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_follow_settings() {
        let settings = GenerationSettings {
            model: "gpt-4.1-mini".to_string(),
            max_tokens: 256,
            temperature: 0.2,
            ..GenerationSettings::default()
        };
        let options = GenerationOptions::from(&settings);
        assert_eq!(options.model, "gpt-4.1-mini");
        assert_eq!(options.max_tokens, 256);
    }

    #[test]
    fn test_options_deserialize_camel_case_with_defaults() {
        let options: GenerationOptions =
            serde_json::from_str(r#"{"maxTokens": 64}"#).unwrap();
        assert_eq!(options.max_tokens, 64);
        assert_eq!(options.model, "gpt-4o-mini");
    }
}
