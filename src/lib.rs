//! Hearsay - Ask questions about podcasts and videos
//!
//! A local-first library and CLI for answering questions about long-form
//! spoken content from its transcript.
//!
//! # Overview
//!
//! Hearsay allows you to:
//! - Segment transcripts into bounded, overlapping chunks and score the result
//! - Index chunks for lexical (SQLite FTS5) and semantic (embedding) search
//! - Rewrite ambiguous follow-up questions from the conversation so far
//! - Answer questions from a bounded context with an LLM
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - `config` - Configuration management
//! - `transcript` - Transcript loading
//! - `chunking` - Segmentation and chunk quality scoring
//! - `cache` - Session cache of processed documents
//! - `embedding` - Embedding generation
//! - `store` - Chunk persistence with lexical, semantic and metadata lookups
//! - `retrieval` - Hybrid retrieval with a sequential fallback
//! - `rewrite` - Intent classification and query rewriting
//! - `rag` - Context assembly and answer generation
//! - `orchestrator` - Pipeline coordination
//!
//! # Example
//!
//! ```rust,no_run
//! use hearsay::config::Settings;
//! use hearsay::orchestrator::{AskRequest, Orchestrator};
//! use hearsay::store::DocumentMetadata;
//! use hearsay::transcript::Transcript;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let orchestrator = Orchestrator::new(settings)?;
//!
//!     let transcript = Transcript::from_text("ep-42", "Welcome to the show. Today...");
//!     orchestrator
//!         .process_document("ep-42", &transcript, DocumentMetadata::default(), false)
//!         .await?;
//!
//!     let response = orchestrator
//!         .ask(&AskRequest::new("ep-42", "What is the episode about?"))
//!         .await?;
//!     println!("{}", response.answer);
//!
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod chunking;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod openai;
pub mod orchestrator;
pub mod rag;
pub mod retrieval;
pub mod rewrite;
pub mod store;
pub mod transcript;

pub use error::{HearsayError, Result};
