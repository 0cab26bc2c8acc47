//! Local intent classification and reference resolution.
//!
//! Everything here is synchronous pattern matching: no provider is consulted.

use super::{IntentTag, RewriteContext};
use crate::error::{HearsayError, Result};
use regex::{Captures, Regex};

/// Words that may open a capitalized run without being part of a name.
const NAME_STOPWORDS: &[&str] = &[
    "a", "about", "after", "also", "an", "and", "are", "at", "before", "but", "can", "could",
    "did", "do", "does", "episode", "guest", "he", "hello", "hi", "his", "her", "host", "how",
    "i", "if", "in", "is", "it", "its", "let's", "my", "no", "ok", "okay", "on", "our", "please",
    "podcast", "she", "should", "show", "so", "tell", "thanks", "that", "the", "their", "then",
    "these", "they", "this", "those", "video", "was", "we", "were", "what", "what's", "when",
    "where", "which", "who", "why", "will", "would", "yes", "you",
];

/// Words after "her" that mark it as an object rather than a possessive.
const OBJECT_FOLLOWERS: &[&str] = &[
    "a", "about", "after", "and", "as", "at", "before", "but", "for", "from", "if", "in", "into",
    "on", "or", "so", "than", "that", "the", "to", "when", "with",
];

/// Result of the local pass over one question.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Analysis {
    pub intent: IntentTag,
    pub rewritten: String,
    /// Ambiguous references detected.
    pub references: usize,
    /// References that had a substitute.
    pub resolved: usize,
    /// The substituted person appears in the speakers list.
    pub corroborated: bool,
    pub word_count: usize,
}

impl Analysis {
    pub fn is_ambiguous(&self) -> bool {
        self.references > 0
    }

    pub fn all_resolved(&self) -> bool {
        self.references > 0 && self.resolved == self.references
    }

    pub fn confidence(&self) -> f32 {
        if !self.is_ambiguous() {
            return 0.1;
        }

        let mut confidence: f32 = 0.5;
        if self.all_resolved() {
            confidence += 0.3;
        }
        if self.intent.benefits_from_rewrite() {
            confidence += 0.1;
        }
        if self.corroborated {
            confidence += 0.05;
        }
        if self.word_count > 20 {
            confidence -= 0.2;
        }
        confidence.clamp(0.0, 1.0)
    }
}

/// Compiled patterns for the local pass.
pub(crate) struct Heuristics {
    pronoun: Regex,
    episode_ref: Regex,
    show_ref: Regex,
    role_ref: Regex,
    proper_name: Regex,
    current_info: Regex,
    find_quote: Regex,
    fact_check: Regex,
    summarize: Regex,
    episode_content: Regex,
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| HearsayError::Config(format!("invalid pattern: {}", e)))
}

impl Heuristics {
    pub fn new() -> Result<Self> {
        Ok(Self {
            pronoun: compile(r"(?i)\b(he|she|they|him|her|them|his|hers|their|theirs)\b")?,
            episode_ref: compile(
                r"(?i)\b(?:this|that|the)\s+(?:episode|video|interview|conversation|talk)\b",
            )?,
            show_ref: compile(r"(?i)\b(?:this|that)\s+(?:podcast|show|channel)\b")?,
            role_ref: compile(r"(?i)\bthe\s+(host|guest|interviewer|interviewee)\b")?,
            proper_name: compile(r"\b\p{Lu}[\p{L}\p{N}'’-]*(?:\s+\p{Lu}[\p{L}\p{N}'’-]*)*")?,
            current_info: compile(
                r"(?i)\b(?:today|tonight|right now|currently|current|latest|this week|this month|this year|news|recent|recently|as of now|nowadays|stock price|weather)\b",
            )?,
            find_quote: compile(
                r"(?i)\b(?:quote|quotes|quoted|exact words|word for word|verbatim|exact|exactly|exact phrase)\b",
            )?,
            fact_check: compile(
                r"(?i)\b(?:is it true|is that true|true that|fact[- ]?check|accurate|accuracy|verify|correct that|really say|actually say|really said|actually said|was (?:he|she|they) right)\b",
            )?,
            summarize: compile(
                r"(?i)\b(?:summari[sz]e|summary|tl;?dr|overview|recap|main points|key points|takeaways|gist|in short)\b",
            )?,
            episode_content: compile(
                r"(?i)\b(?:say|said|says|talk|talked|talks|discuss|discussed|discusses|mention|mentioned|mentions|explain|explained|explains|argue|argued|according to|think|thinks|thought|opinion|views?|describe|described|claim|claimed|believe|believes|episode|guest|host|podcast|video|interview)\b",
            )?,
        })
    }

    /// Classify a question. Checks run from most to least specific.
    pub fn classify(&self, question: &str) -> IntentTag {
        let about_episode = self.episode_ref.is_match(question)
            || self.show_ref.is_match(question)
            || self.role_ref.is_match(question);

        if self.find_quote.is_match(question) {
            IntentTag::FindQuote
        } else if self.fact_check.is_match(question) {
            IntentTag::FactCheck
        } else if self.summarize.is_match(question) {
            IntentTag::Summarize
        } else if !about_episode && self.current_info.is_match(question) {
            IntentTag::CurrentInfo
        } else if about_episode || self.episode_content.is_match(question) {
            IntentTag::EpisodeContent
        } else {
            IntentTag::Other
        }
    }

    /// Detect references in `question` and substitute what the context resolves.
    pub fn analyze(&self, question: &str, context: &RewriteContext) -> Analysis {
        let intent = self.classify(question);
        let mut references = 0;
        let mut resolved = 0;
        let mut corroborated = false;
        let mut text = question.to_string();

        // Roles first so "the guest" is not left for pronoun handling.
        let role_count = self.role_ref.find_iter(&text).count();
        if role_count > 0 {
            references += role_count;
            let mut role_resolved = 0;
            text = self
                .role_ref
                .replace_all(&text, |caps: &Captures| {
                    let role = caps[1].to_lowercase();
                    let speaker = match role.as_str() {
                        "host" | "interviewer" => context.speakers.first(),
                        _ => context.speakers.get(1),
                    };
                    match speaker.map(|s| s.trim()).filter(|s| !s.is_empty()) {
                        Some(name) => {
                            role_resolved += 1;
                            name.to_string()
                        }
                        None => caps[0].to_string(),
                    }
                })
                .into_owned();
            resolved += role_resolved;
            if role_resolved > 0 {
                corroborated = true;
            }
        }

        // A name ahead of the first pronoun is what the pronoun refers to.
        let first_pronoun = self.pronoun.find(&text).map(|m| m.start());
        let names_subject = first_pronoun.is_some_and(|at| {
            self.name_spans(&text).iter().any(|(start, _)| *start < at)
        });
        let pronoun_count = if names_subject {
            0
        } else {
            self.pronoun.find_iter(&text).count()
        };
        if pronoun_count > 0 {
            references += pronoun_count;
            if let Some(person) = self.resolve_person(context) {
                text = self.substitute_pronouns(&text, &person);
                resolved += pronoun_count;
                if context
                    .speakers
                    .iter()
                    .any(|s| s.trim().eq_ignore_ascii_case(&person))
                {
                    corroborated = true;
                }
            }
        }

        let episode_title = non_empty(context.episode_title.as_deref());
        let channel_title = non_empty(context.channel_title.as_deref());

        let episode_count = self.episode_ref.find_iter(&text).count();
        if episode_count > 0 {
            references += episode_count;
            if let Some(title) = episode_title {
                text = self
                    .episode_ref
                    .replace_all(&text, format!("\"{}\"", title).as_str())
                    .into_owned();
                resolved += episode_count;
            }
        }

        let show_count = self.show_ref.find_iter(&text).count();
        if show_count > 0 {
            references += show_count;
            if let Some(name) = channel_title.or(episode_title) {
                text = self.show_ref.replace_all(&text, name).into_owned();
                resolved += show_count;
            }
        }

        Analysis {
            intent,
            rewritten: text,
            references,
            resolved,
            corroborated,
            word_count: question.split_whitespace().count(),
        }
    }

    /// The person a pronoun most likely refers to.
    ///
    /// The newest history turn that names someone wins; otherwise the guest,
    /// or the only speaker.
    fn resolve_person(&self, context: &RewriteContext) -> Option<String> {
        for turn in context.conversation_history.iter().rev() {
            let names = self.proper_names(&turn.content);
            let multi_word = names.iter().rev().find(|n| n.contains(' '));
            if let Some(name) = multi_word.or(names.last()) {
                return Some(name.clone());
            }
        }

        let speakers: Vec<&str> = context
            .speakers
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect();
        match speakers.as_slice() {
            [only] => Some(only.to_string()),
            [_, guest, ..] => Some(guest.to_string()),
            [] => None,
        }
    }

    /// Capitalized name phrases in `text`, in order of appearance.
    pub fn proper_names(&self, text: &str) -> Vec<String> {
        self.name_spans(text).into_iter().map(|(_, name)| name).collect()
    }

    /// Name phrases with their byte offsets.
    ///
    /// Leading stopwords are dropped. A lone word is skipped when it opens a
    /// sentence or is an all-caps acronym.
    fn name_spans(&self, text: &str) -> Vec<(usize, String)> {
        let mut names = Vec::new();

        for m in self.proper_name.find_iter(text) {
            let mut words: Vec<&str> = m.as_str().split_whitespace().collect();
            let mut skipped_leading = false;
            while let Some(first) = words.first() {
                if NAME_STOPWORDS.contains(&first.to_lowercase().as_str()) {
                    words.remove(0);
                    skipped_leading = true;
                } else {
                    break;
                }
            }
            let Some(first) = words.first() else {
                continue;
            };

            if words.len() == 1 {
                let acronym = !first.chars().any(char::is_lowercase);
                if acronym || (!skipped_leading && at_sentence_start(text, m.start())) {
                    continue;
                }
            }

            let name = strip_possessive(&words.join(" "));
            if !name.is_empty() {
                names.push((m.start(), name));
            }
        }
        names
    }

    fn substitute_pronouns(&self, text: &str, person: &str) -> String {
        self.pronoun
            .replace_all(text, |caps: &Captures| {
                let pronoun = caps[1].to_lowercase();
                let end = caps.get(0).map_or(text.len(), |m| m.end());
                match pronoun.as_str() {
                    "his" | "hers" | "their" | "theirs" => possessive(person),
                    "her" if is_possessive_her(&text[end..]) => possessive(person),
                    _ => person.to_string(),
                }
            })
            .into_owned()
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn possessive(name: &str) -> String {
    if name.ends_with('s') {
        format!("{}'", name)
    } else {
        format!("{}'s", name)
    }
}

fn strip_possessive(name: &str) -> String {
    name.trim_end_matches("'s")
        .trim_end_matches("’s")
        .trim_end_matches(['\'', '’', '-'])
        .to_string()
}

/// "her" followed directly by a word that is not a preposition or article.
fn is_possessive_her(rest: &str) -> bool {
    if !rest.starts_with(' ') {
        return false;
    }
    match rest.split_whitespace().next() {
        Some(next) => {
            let word = next.to_lowercase();
            word.chars().next().is_some_and(char::is_alphabetic)
                && !OBJECT_FOLLOWERS.contains(&word.trim_end_matches(|c: char| !c.is_alphanumeric()))
        }
        None => false,
    }
}

fn at_sentence_start(text: &str, offset: usize) -> bool {
    let before = text[..offset].trim_end();
    before.is_empty() || before.ends_with(['.', '!', '?', ':', '"', '“'])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewrite::ConversationTurn;

    fn heuristics() -> Heuristics {
        Heuristics::new().unwrap()
    }

    fn history(lines: &[&str]) -> RewriteContext {
        RewriteContext {
            conversation_history: lines.iter().map(|l| ConversationTurn::user(*l)).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_classify() {
        let h = heuristics();
        assert_eq!(h.classify("What did he say about AI?"), IntentTag::EpisodeContent);
        assert_eq!(h.classify("Give me the exact words he used"), IntentTag::FindQuote);
        assert_eq!(h.classify("Is it true that Mars has water?"), IntentTag::FactCheck);
        assert_eq!(h.classify("Can you summarize this?"), IntentTag::Summarize);
        assert_eq!(h.classify("What is the weather today?"), IntentTag::CurrentInfo);
        assert_eq!(
            h.classify("What did the guest say about news today?"),
            IntentTag::EpisodeContent
        );
        assert_eq!(h.classify("How tall is Everest?"), IntentTag::Other);
    }

    #[test]
    fn test_proper_names() {
        let h = heuristics();
        assert_eq!(
            h.proper_names("Tell me about the interview with Elon Musk."),
            vec!["Elon Musk"]
        );
        assert_eq!(
            h.proper_names("What are Elon Musk's specific predictions?"),
            vec!["Elon Musk"]
        );
        assert_eq!(h.proper_names("Yesterday we met Obama."), vec!["Obama"]);
        assert!(h.proper_names("What did he say?").is_empty());
        assert_eq!(h.proper_names("Parlons de Frédéric Chopin."), vec!["Frédéric Chopin"]);
    }

    #[test]
    fn test_pronoun_resolved_from_history() {
        let h = heuristics();
        let ctx = history(&["Tell me about the interview with Elon Musk."]);
        let analysis = h.analyze("What did he say about AI?", &ctx);

        assert_eq!(analysis.rewritten, "What did Elon Musk say about AI?");
        assert_eq!(analysis.references, 1);
        assert!(analysis.all_resolved());
        assert!(analysis.confidence() >= 0.8);
    }

    #[test]
    fn test_newest_turn_wins() {
        let h = heuristics();
        let ctx = history(&["Who is Sam Altman?", "And what about Lisa Su and AMD?"]);
        let analysis = h.analyze("What is her background?", &ctx);
        assert_eq!(analysis.rewritten, "What is Lisa Su's background?");
    }

    #[test]
    fn test_object_her_is_not_possessive() {
        let h = heuristics();
        let ctx = history(&["We heard from Jane Goodall."]);
        let analysis = h.analyze("Why did the crowd cheer for her at the end?", &ctx);
        assert_eq!(
            analysis.rewritten,
            "Why did the crowd cheer for Jane Goodall at the end?"
        );
    }

    #[test]
    fn test_unresolvable_pronoun_is_left_alone() {
        let h = heuristics();
        let analysis = h.analyze("What did he say about AI?", &RewriteContext::default());

        assert_eq!(analysis.rewritten, "What did he say about AI?");
        assert!(analysis.is_ambiguous());
        assert!(!analysis.all_resolved());
        assert!(analysis.confidence() < 0.8);
    }

    #[test]
    fn test_roles_and_episode_resolve_from_metadata() {
        let h = heuristics();
        let ctx = RewriteContext {
            episode_title: Some("Rockets and Rovers".to_string()),
            speakers: vec!["Lex Fridman".to_string(), "Elon Musk".to_string()],
            ..Default::default()
        };
        let analysis = h.analyze("What did the guest say in this episode?", &ctx);

        assert_eq!(
            analysis.rewritten,
            "What did Elon Musk say in \"Rockets and Rovers\"?"
        );
        assert!(analysis.corroborated);
        assert!((analysis.confidence() - 0.95).abs() < 1e-6);
    }

    #[test]
    fn test_pronoun_falls_back_to_guest() {
        let h = heuristics();
        let ctx = RewriteContext {
            speakers: vec!["Host Person".to_string(), "Guest Person".to_string()],
            ..Default::default()
        };
        let analysis = h.analyze("What did she mention about funding?", &ctx);
        assert_eq!(analysis.rewritten, "What did Guest Person mention about funding?");
        assert!(analysis.corroborated);
    }

    #[test]
    fn test_specific_question_is_not_ambiguous() {
        let h = heuristics();
        let analysis = h.analyze(
            "What are Elon Musk's specific predictions for AGI timelines in 2024?",
            &RewriteContext::default(),
        );
        assert!(!analysis.is_ambiguous());
        assert!((analysis.confidence() - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_named_subject_keeps_pronouns() {
        let h = heuristics();
        let ctx = history(&["Tell me about Sam Altman."]);
        let analysis = h.analyze("Did Elon Musk say he would retire?", &ctx);
        assert_eq!(analysis.rewritten, "Did Elon Musk say he would retire?");
        assert_eq!(analysis.references, 0);
    }

    #[test]
    fn test_long_question_penalty() {
        let h = heuristics();
        let ctx = history(&["Tell me about Elon Musk."]);
        let question = "So I was wondering, given everything that was covered so far, what did he say about the long term plans for building cities on other planets?";
        let analysis = h.analyze(question, &ctx);
        assert!(analysis.word_count > 20);
        assert!((analysis.confidence() - 0.7).abs() < 1e-6);
    }
}
