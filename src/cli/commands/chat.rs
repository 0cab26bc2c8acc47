//! Interactive follow-up questions about one document.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::{AskRequest, Orchestrator};
use crate::rag::GenerationOptions;
use crate::rewrite::ConversationTurn;
use anyhow::Result;
use console::style;
use std::io::{self, BufRead, Write};
use tracing::{info, info_span, Instrument};

/// Turns kept for pronoun resolution and refinement.
const MAX_HISTORY_TURNS: usize = 20;

/// Run the interactive chat command.
pub async fn run_chat(
    document_id: &str,
    model: Option<String>,
    speakers: Vec<String>,
    settings: Settings,
) -> Result<()> {
    if let Err(e) = preflight::check(Operation::Ask, &settings) {
        Output::error(&format!("{}", e));
        return Err(e.into());
    }

    let generation_options = model.map(|model| GenerationOptions {
        model,
        ..GenerationOptions::from(&settings.generation)
    });
    let orchestrator = Orchestrator::new(settings)?;
    let mut chat = ChatSession::new(document_id, speakers, generation_options);

    println!("\n{}", style(format!("Hearsay Chat: {}", document_id)).bold().cyan());
    println!(
        "{}\n",
        style("Type your questions, or 'exit' to quit. Use 'clear' to reset conversation.").dim()
    );

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("{} ", style("You:").green().bold());
        stdout.flush()?;

        let mut input = String::new();
        if stdin.lock().read_line(&mut input)? == 0 {
            break;
        }

        let input = input.trim();

        if input.is_empty() {
            continue;
        }

        if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
            Output::info("Goodbye!");
            break;
        }

        if input.eq_ignore_ascii_case("clear") {
            chat.clear_history();
            Output::info("Conversation history cleared.");
            continue;
        }

        let span = info_span!("chat", session = %chat.session_id, turn = chat.history.len() / 2);
        match orchestrator.ask(&chat.request(input)).instrument(span).await {
            Ok(response) => {
                if let Some(rewrite) = response.rewrite_metadata.as_ref().filter(|r| r.used_rewritten) {
                    println!("{}", style(format!("  ({})", rewrite.rewritten)).dim());
                }
                println!("\n{} {}\n", style("Hearsay:").cyan().bold(), response.answer);
                chat.record(input, &response.answer);
            }
            Err(failure) => {
                Output::error(&format!("Error: {}", failure.message));
            }
        }
    }

    info!("Chat session {} ended", chat.session_id);
    Ok(())
}

/// Conversation state carried between questions.
struct ChatSession {
    session_id: uuid::Uuid,
    document_id: String,
    speakers: Vec<String>,
    generation_options: Option<GenerationOptions>,
    history: Vec<ConversationTurn>,
}

impl ChatSession {
    fn new(
        document_id: &str,
        speakers: Vec<String>,
        generation_options: Option<GenerationOptions>,
    ) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4(),
            document_id: document_id.to_string(),
            speakers,
            generation_options,
            history: Vec::new(),
        }
    }

    /// Build the request for the next question.
    fn request(&self, question: &str) -> AskRequest {
        let mut request = AskRequest::new(&self.document_id, question)
            .with_history(self.history.clone());
        request.speakers = self.speakers.clone();
        request.generation_options = self.generation_options.clone();
        request
    }

    /// Remember an answered exchange.
    fn record(&mut self, question: &str, answer: &str) {
        self.history.push(ConversationTurn::user(question));
        self.history.push(ConversationTurn::assistant(answer));
        self.trim_history(MAX_HISTORY_TURNS);
    }

    fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Keep only the newest `max_turns` turns.
    fn trim_history(&mut self, max_turns: usize) {
        if self.history.len() > max_turns {
            let start = self.history.len() - max_turns;
            self.history.drain(..start);
        }
    }
}
