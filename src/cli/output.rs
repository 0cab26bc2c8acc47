//! CLI output formatting utilities.

use crate::chunking::ChunkQualityReport;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

/// Output helper for CLI formatting.
pub struct Output;

impl Output {
    /// Print an info message.
    pub fn info(msg: &str) {
        println!("{} {}", style(">>").cyan().bold(), msg);
    }

    /// Print a success message.
    pub fn success(msg: &str) {
        println!("{} {}", style(">>").green().bold(), msg);
    }

    /// Print a warning message.
    pub fn warning(msg: &str) {
        eprintln!("{} {}", style(">>").yellow().bold(), msg);
    }

    /// Print an error message.
    pub fn error(msg: &str) {
        eprintln!("{} {}", style(">>").red().bold(), msg);
    }

    /// Print a header.
    pub fn header(msg: &str) {
        println!("\n{}", style(msg).bold().underlined());
    }

    /// Print a key-value pair.
    pub fn kv(key: &str, value: &str) {
        println!("  {}: {}", style(key).dim(), value);
    }

    /// Print a list item.
    pub fn list_item(msg: &str) {
        println!("  {} {}", style("*").cyan(), msg);
    }

    /// Print document info.
    pub fn document_info(title: &str, id: &str, chunks: usize, duration: Option<f64>) {
        let duration_str = duration
            .filter(|d| *d > 0.0)
            .map(format_duration)
            .unwrap_or_else(|| "untimed".to_string());
        println!(
            "  {} {} ({}, {} chunks, {})",
            style("*").cyan(),
            style(title).bold(),
            style(id).dim(),
            chunks,
            duration_str
        );
    }

    /// Print search result.
    pub fn search_result(chunk_index: usize, score: f64, content: &str) {
        println!(
            "\n{} chunk {} (score: {:.2})",
            style(">>").green(),
            style(chunk_index).bold(),
            score
        );
        println!("   {}", content_preview(content, 200));
    }

    /// Print a chunk quality report.
    pub fn quality_report(report: &ChunkQualityReport) {
        let score = report.quality_score;
        let styled = match score {
            80..=100 => style(score).green().bold(),
            50..=79 => style(score).yellow().bold(),
            _ => style(score).red().bold(),
        };
        println!("  {}: {}/100", style("Quality score").dim(), styled);
        Self::kv("Total words", &report.total_word_count.to_string());
        Self::kv(
            "Words per chunk",
            &format!(
                "{:.0} avg ({}-{})",
                report.average_word_count, report.min_word_count, report.max_word_count
            ),
        );
        Self::kv("Estimated tokens", &report.estimated_token_count.to_string());
        for suggestion in &report.suggestions {
            Self::list_item(suggestion);
        }
    }

    /// Create a spinner.
    pub fn spinner(msg: &str) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb
    }
}

/// Format duration in seconds to a human-readable string.
fn format_duration(seconds: f64) -> String {
    let total_seconds = seconds as u32;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

/// Truncate content with ellipsis.
fn content_preview(content: &str, max_chars: usize) -> String {
    let content = content.replace('\n', " ");
    if content.chars().count() <= max_chars {
        content
    } else {
        let cut: String = content.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}
