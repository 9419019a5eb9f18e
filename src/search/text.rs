//! Heuristic title, description and highlight extraction from raw text.
//!
//! Sentences end at `.`, `!` or `?` followed by whitespace or end of
//! text. The rules are approximate but deterministic.

use regex::{Regex, RegexBuilder};
use std::sync::OnceLock;

pub const MIN_TITLE_CHARS: usize = 10;
pub const MAX_TITLE_CHARS: usize = 100;
pub const DESCRIPTION_CHARS: usize = 200;
/// Sentences shorter than this are not used as fallback highlights
pub const MIN_HIGHLIGHT_CHARS: usize = 20;
pub const MAX_HIGHLIGHTS: usize = 3;

fn sentence_end() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[.!?]+(\s+|$)").expect("valid sentence regex"))
}

/// Split text into trimmed sentences, keeping terminal punctuation
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;

    for m in sentence_end().find_iter(text) {
        let end = m.start() + m.as_str().trim_end().len();
        let sentence = text[start..end].trim();
        if !sentence.is_empty() {
            sentences.push(sentence);
        }
        start = m.end();
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

fn is_well_formed(sentence: &str) -> bool {
    let len = sentence.chars().count();
    let starts_well = sentence
        .chars()
        .next()
        .map(|c| c.is_uppercase() || c.is_ascii_digit())
        .unwrap_or(false);
    (MIN_TITLE_CHARS..=MAX_TITLE_CHARS).contains(&len) && starts_well
}

/// First well-formed sentence without its terminal punctuation, or a
/// truncated prefix of the text when none qualifies
pub fn extract_title(text: &str) -> String {
    if let Some(sentence) = split_sentences(text).into_iter().find(|s| is_well_formed(s)) {
        return sentence.trim_end_matches(['.', '!', '?']).to_string();
    }

    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.is_empty() {
        return "Untitled".to_string();
    }
    truncate_at_word(&flat, 60)
}

/// Leading sentences up to about 200 characters, ending at a sentence
/// boundary when possible
pub fn extract_description(text: &str) -> String {
    let mut description = String::new();

    for sentence in split_sentences(text) {
        let extra = sentence.chars().count() + usize::from(!description.is_empty());
        if description.chars().count() + extra > DESCRIPTION_CHARS {
            break;
        }
        if !description.is_empty() {
            description.push(' ');
        }
        description.push_str(sentence);
    }

    if description.is_empty() {
        let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
        return truncate_at_word(&flat, DESCRIPTION_CHARS);
    }
    description
}

/// Sentences containing query tokens with matches wrapped in `<em>`.
///
/// When no sentence matches, the first substantial sentence is returned
/// unmarked as a semantic highlight.
pub fn extract_highlights(text: &str, tokens: &[String]) -> Vec<String> {
    let sentences = split_sentences(text);
    let matcher = token_matcher(tokens);

    let mut highlights = Vec::new();
    if let Some(matcher) = &matcher {
        for sentence in &sentences {
            if matcher.is_match(sentence) {
                highlights.push(matcher.replace_all(sentence, "<em>$0</em>").into_owned());
                if highlights.len() == MAX_HIGHLIGHTS {
                    break;
                }
            }
        }
    }

    if highlights.is_empty() {
        if let Some(sentence) = sentences
            .iter()
            .find(|s| s.chars().count() > MIN_HIGHLIGHT_CHARS)
        {
            highlights.push(truncate_at_word(sentence, DESCRIPTION_CHARS));
        }
    }
    highlights
}

/// Case-insensitive whole-word alternation of the tokens
fn token_matcher(tokens: &[String]) -> Option<Regex> {
    let words: Vec<String> = tokens
        .iter()
        .filter(|t| t.chars().count() >= 2)
        .map(|t| regex::escape(t))
        .collect();
    if words.is_empty() {
        return None;
    }

    RegexBuilder::new(&format!(r"\b(?:{})\b", words.join("|")))
        .case_insensitive(true)
        .build()
        .ok()
}

/// Cut at the last word boundary within `max` characters, adding an ellipsis
pub fn truncate_at_word(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }

    let cut: String = text.chars().take(max.saturating_sub(3)).collect();
    let trimmed = match cut.rfind(char::is_whitespace) {
        Some(idx) if idx > 0 => &cut[..idx],
        _ => cut.as_str(),
    };
    format!("{}...", trimmed.trim_end_matches([',', ';', ':', ' ']))
}
