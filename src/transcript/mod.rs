//! Transcript input for Hearsay.
//!
//! Transcripts are produced upstream (captions, speech-to-text) and arrive as
//! JSON segment lists or plain text files.

mod models;

pub use models::{format_timestamp, Transcript, TranscriptSegment};

use crate::error::{HearsayError, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::debug;

/// On-disk transcript layouts accepted by [`load_transcript`].
#[derive(Deserialize)]
#[serde(untagged)]
enum TranscriptFile {
    Segments(Vec<TranscriptSegment>),
    Wrapped {
        #[serde(default)]
        title: Option<String>,
        segments: Vec<TranscriptSegment>,
    },
}

/// Parse a transcript from JSON text.
///
/// Accepts either a bare array of segments or an object with `segments` and
/// an optional `title`.
pub fn parse_transcript(document_id: &str, json: &str) -> Result<Transcript> {
    let file: TranscriptFile = serde_json::from_str(json).map_err(|e| {
        HearsayError::Validation(format!("Unrecognized transcript JSON: {}", e))
    })?;

    let transcript = match file {
        TranscriptFile::Segments(segments) => Transcript::new(document_id, segments),
        TranscriptFile::Wrapped { title, segments } => {
            Transcript::new(document_id, segments).with_title(title)
        }
    };

    debug!(
        "Parsed transcript {} with {} segments",
        document_id,
        transcript.segments.len()
    );
    Ok(transcript)
}

/// Load a transcript file. `.json` files are parsed as segment lists, anything
/// else is read as plain text.
pub fn load_transcript(document_id: &str, path: &Path) -> Result<Transcript> {
    let content = std::fs::read_to_string(path)?;

    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));

    if is_json {
        parse_transcript(document_id, &content)
    } else {
        Ok(Transcript::from_text(document_id, &content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_segment_array() {
        let json = r#"[
            {"text": "Welcome to the show.", "start": 0.0, "duration": 3.2},
            {"text": "Today we talk about batteries.", "start": 3.2, "duration": 4.0}
        ]"#;

        let transcript = parse_transcript("ep1", json).unwrap();
        assert_eq!(transcript.segments.len(), 2);
        assert!(transcript.title.is_none());
        assert!(transcript.full_text.contains("batteries"));
    }

    #[test]
    fn test_parse_wrapped_with_title() {
        let json = r#"{
            "title": "Episode 4",
            "segments": [{"text": "Hi.", "start_seconds": 0, "duration_seconds": 1}]
        }"#;

        let transcript = parse_transcript("ep4", json).unwrap();
        assert_eq!(transcript.title.as_deref(), Some("Episode 4"));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let err = parse_transcript("x", r#"{"nope": true}"#).unwrap_err();
        assert!(matches!(err, HearsayError::Validation(_)));
    }

    #[test]
    fn test_load_plain_text_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "First line.\nSecond line.").unwrap();

        let transcript = load_transcript("notes", &path).unwrap();
        assert_eq!(transcript.segments.len(), 1);
        assert_eq!(transcript.full_text, "First line.\nSecond line.");
    }
}
