//! Section identity.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical `(level, title)` identifier of a document section.
///
/// Only levels 2 and 3 exist below the document title; anything else is clamped. The
/// string form `H{level}::{title}` is what appears in events.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub struct SectionToken {
    level: u8,
    title: String,
}

impl SectionToken {
    pub fn new(level: u8, title: impl Into<String>) -> Self {
        let title: String = title.into();
        Self {
            level: level.clamp(2, 3),
            title: title.trim().to_string(),
        }
    }

    pub fn h2(title: impl Into<String>) -> Self {
        Self::new(2, title)
    }

    pub fn h3(title: impl Into<String>) -> Self {
        Self::new(3, title)
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn encode(&self) -> String {
        format!("H{}::{}", self.level, self.title)
    }

    /// Parse `H2::Title`. A bare title is read as a level-2 section.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if let Some((prefix, title)) = raw.split_once("::") {
            if let Some(level) = prefix
                .strip_prefix('H')
                .or_else(|| prefix.strip_prefix('h'))
                .and_then(|l| l.parse::<u8>().ok())
            {
                return Self::new(level, title);
            }
        }
        Self::h2(raw)
    }

    /// Markdown heading line for this section.
    pub fn heading(&self) -> String {
        format!("{} {}", "#".repeat(self.level as usize), self.title)
    }
}

impl fmt::Display for SectionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl From<SectionToken> for String {
    fn from(token: SectionToken) -> Self {
        token.encode()
    }
}

impl From<String> for SectionToken {
    fn from(raw: String) -> Self {
        SectionToken::parse(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_and_parse_agree() {
        let token = SectionToken::h3("数据设计");
        assert_eq!(token.encode(), "H3::数据设计");
        assert_eq!(SectionToken::parse("H3::数据设计"), token);
    }

    #[test]
    fn levels_are_clamped() {
        assert_eq!(SectionToken::new(1, "A").level(), 2);
        assert_eq!(SectionToken::new(5, "A").level(), 3);
        assert_eq!(SectionToken::parse("H9::Deep").level(), 3);
    }

    #[test]
    fn bare_titles_parse_as_h2() {
        let token = SectionToken::parse("  Conclusion ");
        assert_eq!(token.level(), 2);
        assert_eq!(token.title(), "Conclusion");
        assert_eq!(token.heading(), "## Conclusion");
    }

    #[test]
    fn serializes_as_string() {
        let json = serde_json::to_string(&SectionToken::h2("背景")).unwrap();
        assert_eq!(json, "\"H2::背景\"");
        let back: SectionToken = serde_json::from_str(&json).unwrap();
        assert_eq!(back.title(), "背景");
    }
}
