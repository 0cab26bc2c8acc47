//! CLI module for Hearsay.

pub mod commands;
mod output;
pub mod preflight;

pub use output::Output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Hearsay - Ask questions about podcasts and videos
///
/// Index transcripts, then ask follow-up questions about a single episode
/// with hybrid lexical and semantic retrieval.
#[derive(Parser, Debug)]
#[command(name = "hearsay")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Segment, score and index a transcript file (.json segments or plain text)
    Ingest {
        /// Transcript file
        path: PathBuf,

        /// Document id (defaults to the file stem)
        #[arg(long)]
        id: Option<String>,

        /// Episode title
        #[arg(long)]
        title: Option<String>,

        /// Channel or show title
        #[arg(long)]
        show: Option<String>,

        /// Force re-processing even if already indexed
        #[arg(short, long)]
        force: bool,
    },

    /// Ask a question about one document
    Ask {
        /// Document id
        document_id: String,

        /// The question to ask
        question: String,

        /// LLM model to use for answer generation
        #[arg(short, long)]
        model: Option<String>,

        /// Maximum number of chunks to retrieve
        #[arg(short, long)]
        limit: Option<usize>,

        /// Skip query rewriting
        #[arg(long)]
        no_rewrite: bool,

        /// Print the full response as JSON
        #[arg(long)]
        json: bool,
    },

    /// Retrieve passages from one document without generating an answer
    Search {
        /// Document id
        document_id: String,

        /// Search query
        query: String,

        /// Maximum number of results
        #[arg(short, long)]
        limit: Option<usize>,

        /// Minimum rank score (0.0-1.0)
        #[arg(short, long)]
        min_rank: Option<f64>,

        /// Print the result batch as JSON
        #[arg(long)]
        json: bool,
    },

    /// Start an interactive question session about one document
    Chat {
        /// Document id
        document_id: String,

        /// LLM model to use
        #[arg(short, long)]
        model: Option<String>,

        /// Speakers, host first (comma separated)
        #[arg(short, long, value_delimiter = ',')]
        speakers: Vec<String>,
    },

    /// List indexed documents
    List,

    /// Segment a transcript file and report chunk quality without indexing it
    Quality {
        /// Transcript file
        path: PathBuf,
    },

    /// Start HTTP API server for integration with other systems
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind to
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Write the current configuration to the config file
    Init,

    /// Open configuration file in editor
    Edit,

    /// Show configuration file path
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ask() {
        let cli = Cli::parse_from(["hearsay", "-vv", "ask", "ep-1", "What did he say?", "--limit", "3"]);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Ask {
                document_id,
                question,
                limit,
                no_rewrite,
                ..
            } => {
                assert_eq!(document_id, "ep-1");
                assert_eq!(question, "What did he say?");
                assert_eq!(limit, Some(3));
                assert!(!no_rewrite);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_chat_speakers() {
        let cli = Cli::parse_from(["hearsay", "chat", "ep-1", "--speakers", "Lex Fridman,Elon Musk"]);
        match cli.command {
            Commands::Chat { speakers, .. } => {
                assert_eq!(speakers, vec!["Lex Fridman", "Elon Musk"]);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
