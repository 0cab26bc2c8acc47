//! Data models for transcripts.

use serde::{Deserialize, Serialize};

/// A single timed unit of a transcript, as produced by the transcription source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    /// Transcribed text content.
    pub text: String,
    /// Start time in seconds.
    #[serde(alias = "start", alias = "offset")]
    pub start_seconds: f64,
    /// Duration in seconds.
    #[serde(alias = "duration", alias = "dur", default)]
    pub duration_seconds: f64,
}

impl TranscriptSegment {
    /// Create a new transcript segment.
    pub fn new(text: impl Into<String>, start_seconds: f64, duration_seconds: f64) -> Self {
        Self {
            text: text.into(),
            start_seconds,
            duration_seconds,
        }
    }

    /// End time of this segment in seconds.
    pub fn end_seconds(&self) -> f64 {
        self.start_seconds + self.duration_seconds
    }
}

/// A complete transcript for one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    /// Document this transcript belongs to.
    pub document_id: String,
    /// Title of the episode or video, when the source provided one.
    pub title: Option<String>,
    /// Individual transcript segments with timestamps.
    pub segments: Vec<TranscriptSegment>,
    /// Full transcript text (concatenated segments).
    pub full_text: String,
    /// Total duration in seconds.
    pub duration_seconds: f64,
}

impl Transcript {
    /// Create a new transcript from segments.
    pub fn new(document_id: impl Into<String>, segments: Vec<TranscriptSegment>) -> Self {
        let full_text = segments
            .iter()
            .map(|s| s.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        let duration_seconds = segments
            .iter()
            .map(TranscriptSegment::end_seconds)
            .fold(0.0f64, f64::max);

        Self {
            document_id: document_id.into(),
            title: None,
            segments,
            full_text,
            duration_seconds,
        }
    }

    /// Create an untimed transcript from plain text.
    pub fn from_text(document_id: impl Into<String>, text: &str) -> Self {
        Self::new(document_id, vec![TranscriptSegment::new(text, 0.0, 0.0)])
    }

    /// Attach a title.
    pub fn with_title(mut self, title: Option<String>) -> Self {
        self.title = title;
        self
    }

    /// Number of whitespace-delimited words in the transcript.
    pub fn word_count(&self) -> usize {
        self.full_text.split_whitespace().count()
    }
}

/// Format seconds as MM:SS or HH:MM:SS.
pub fn format_timestamp(seconds: f64) -> String {
    let total_seconds = seconds.max(0.0) as u32;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;

    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{:02}:{:02}", minutes, secs)
    }
}
