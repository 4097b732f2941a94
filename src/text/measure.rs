//! Length and structure measurement.
//!
//! Budgets are in characters of visible body text: `[[TABLE:{..}]]` / `[[FIGURE:{..}]]`
//! markers and whitespace do not count, so CJK and Latin drafts are measured alike.

use regex::Regex;
use std::borrow::Cow;
use std::sync::OnceLock;

fn marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)\[\[\s*(?:FIGURE|TABLE)\s*:\s*\{.*?\}\s*\]\]").expect("valid marker regex")
    })
}

fn table_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)\[\[\s*TABLE\s*:\s*\{.*?\}\s*\]\]").expect("valid table regex"))
}

fn figure_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)\[\[\s*FIGURE\s*:\s*\{.*?\}\s*\]\]").expect("valid figure regex")
    })
}

fn citation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[\d{1,3}\]").expect("valid citation regex"))
}

fn paragraph_break_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n\s*\n+").expect("valid paragraph regex"))
}

/// Remove structured table/figure markers.
pub fn strip_markers(text: &str) -> Cow<'_, str> {
    marker_re().replace_all(text, "")
}

/// Visible body length: non-whitespace characters outside markers.
pub fn body_len(text: &str) -> usize {
    strip_markers(text)
        .chars()
        .filter(|c| !c.is_whitespace())
        .count()
}

/// Non-empty paragraphs separated by blank lines.
pub fn paragraphs(text: &str) -> Vec<&str> {
    paragraph_break_re()
        .split(text)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect()
}

pub fn count_tables(text: &str) -> usize {
    table_re().find_iter(text).count()
}

pub fn count_figures(text: &str) -> usize {
    figure_re().find_iter(text).count()
}

/// Number of `[n]` citation markers.
pub fn citation_count(text: &str) -> usize {
    citation_re().find_iter(text).count()
}

/// Whether `text` is a structured marker on its own.
pub fn is_marker(text: &str) -> bool {
    let trimmed = text.trim();
    marker_re()
        .find(trimmed)
        .map(|m| m.start() == 0 && m.end() == trimmed.len())
        .unwrap_or(false)
}

/// Cut `text` to at most `max_chars` visible characters, preferring a sentence end.
pub fn truncate_visible(text: &str, max_chars: usize) -> String {
    if body_len(text) <= max_chars {
        return text.trim().to_string();
    }
    let mut seen = 0usize;
    let mut cut = text.len();
    for (idx, ch) in text.char_indices() {
        if !ch.is_whitespace() {
            seen += 1;
        }
        if seen > max_chars {
            cut = idx;
            break;
        }
    }
    let head = &text[..cut];
    let sentence_end = head
        .char_indices()
        .filter(|(_, c)| matches!(c, '。' | '！' | '？' | '.' | '!' | '?' | '；' | ';'))
        .map(|(i, c)| i + c.len_utf8())
        .last();
    match sentence_end {
        Some(end) if end * 2 >= head.len() => head[..end].trim().to_string(),
        _ => head.trim_end().to_string(),
    }
}
