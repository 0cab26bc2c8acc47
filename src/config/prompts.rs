//! Prompt templates for Hearsay.
//!
//! Prompts can be customized by placing TOML files in the custom prompts directory.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Collection of all prompt templates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Prompts {
    pub answer: AnswerPrompts,
    pub rewrite: RewritePrompts,
    /// Custom variables from config, available in all prompts.
    #[serde(skip)]
    pub variables: std::collections::HashMap<String, String>,
}

/// Prompts for answer generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnswerPrompts {
    pub system: String,
    pub user: String,
}

impl Default for AnswerPrompts {
    fn default() -> Self {
        Self {
            system: r#"You answer questions about a single podcast episode or video using excerpts from its transcript.

Guidelines:
- Answer using only the provided transcript excerpts
- If the excerpts do not contain the answer, say so clearly
- Attribute statements to speakers when the transcript makes it clear who is talking
- Quote the transcript directly when asked for exact words
- Be concise but thorough"#
                .to_string(),

            user: r#"Episode: {{title}}
Show: {{channel}}

Transcript excerpts:
{{context}}

Question: {{question}}"#
                .to_string(),
        }
    }
}

/// Prompts for query refinement.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RewritePrompts {
    pub system: String,
    pub user: String,
}

impl Default for RewritePrompts {
    fn default() -> Self {
        Self {
            system: r#"You rewrite follow-up questions about a podcast episode so they can be understood without the conversation.

Replace pronouns and vague references ("he", "the guest", "this episode") with the names they refer to.
Do not add facts that are not present in the conversation or episode details.
Classify the intent as one of: episode_content, current_info, summarize, find_quote, fact_check, other.

Respond with a single JSON object:
{"rewritten_query": "...", "intent": "...", "confidence": 0.0}"#
                .to_string(),

            user: r#"Episode title: {{episode_title}}
Show: {{channel_title}}
Speakers: {{speakers}}

Conversation so far:
{{history}}

Question: {{question}}"#
                .to_string(),
        }
    }
}

impl Prompts {
    /// Load prompts from the default location, with optional custom directory and variables.
    pub fn load(
        custom_dir: Option<&str>,
        custom_variables: Option<&std::collections::HashMap<String, String>>,
    ) -> crate::error::Result<Self> {
        let mut prompts = Prompts::default();

        if let Some(vars) = custom_variables {
            prompts.variables = vars.clone();
        }

        if let Some(dir) = custom_dir {
            let custom_path = PathBuf::from(shellexpand::tilde(dir).to_string());

            let answer_path = custom_path.join("answer.toml");
            if answer_path.exists() {
                let content = std::fs::read_to_string(&answer_path)?;
                prompts.answer = toml::from_str(&content)?;
            }

            let rewrite_path = custom_path.join("rewrite.toml");
            if rewrite_path.exists() {
                let content = std::fs::read_to_string(&rewrite_path)?;
                prompts.rewrite = toml::from_str(&content)?;
            }
        }

        Ok(prompts)
    }

    /// Render a prompt template with the given variables.
    pub fn render(template: &str, vars: &std::collections::HashMap<String, String>) -> String {
        let mut result = template.to_string();
        for (key, value) in vars {
            result = result.replace(&format!("{{{{{}}}}}", key), value);
        }
        result
    }

    /// Render a prompt template with both provided variables and custom config variables.
    /// Provided variables take precedence over custom config variables.
    pub fn render_with_custom(
        &self,
        template: &str,
        vars: &std::collections::HashMap<String, String>,
    ) -> String {
        let mut merged = self.variables.clone();
        for (key, value) in vars {
            merged.insert(key.clone(), value.clone());
        }
        Self::render(template, &merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_prompts() {
        let prompts = Prompts::default();
        assert!(prompts.answer.user.contains("{{context}}"));
        assert!(prompts.rewrite.user.contains("{{question}}"));
    }

    #[test]
    fn test_provided_vars_override_custom() {
        let mut prompts = Prompts::default();
        prompts.variables.insert("title".to_string(), "Default".to_string());
        prompts.variables.insert("channel".to_string(), "The Show".to_string());

        let mut vars = HashMap::new();
        vars.insert("title".to_string(), "Episode 12".to_string());

        let rendered = prompts.render_with_custom("{{title}} on {{channel}}", &vars);
        assert_eq!(rendered, "Episode 12 on The Show");
    }

    #[test]
    fn test_load_custom_answer_prompt() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("answer.toml"),
            "system = \"Be brief.\"\nuser = \"{{question}}\"\n",
        )
        .unwrap();

        let prompts = Prompts::load(dir.path().to_str(), None).unwrap();
        assert_eq!(prompts.answer.system, "Be brief.");
        assert!(!prompts.rewrite.system.is_empty());
    }
}
