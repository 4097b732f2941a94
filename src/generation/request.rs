//! Run inputs and outputs.

use serde::{Deserialize, Serialize};

use crate::progress::RunPhase;
use crate::text::SectionToken;

/// One outline entry: `(level, title)`, level 1 being a primary section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineItem {
    pub level: u8,
    pub title: String,
}

impl OutlineItem {
    pub fn new(level: u8, title: impl Into<String>) -> Self {
        Self {
            level,
            title: title.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub instruction: String,
    #[serde(default)]
    pub existing_text: String,
    #[serde(default)]
    pub required_outline: Vec<OutlineItem>,
    /// Materialize level-2 outline items as H3 sections instead of dropping them
    #[serde(default)]
    pub expand_outline: bool,
    #[serde(default)]
    pub required_h2: Vec<String>,
    #[serde(default)]
    pub title: Option<String>,
}

impl GenerationRequest {
    pub fn new(instruction: impl Into<String>) -> Self {
        Self {
            instruction: instruction.into(),
            ..Self::default()
        }
    }

    pub fn with_outline(mut self, outline: Vec<OutlineItem>, expand: bool) -> Self {
        self.required_outline = outline;
        self.expand_outline = expand;
        self
    }

    pub fn with_required_h2(mut self, titles: Vec<String>) -> Self {
        self.required_h2 = titles;
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseTiming {
    pub phase: RunPhase,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedDocument {
    pub run_id: String,
    pub title: String,
    pub text: String,
    pub problems: Vec<String>,
    /// Final section text in planning order
    pub sections: Vec<(SectionToken, String)>,
    pub phase_timings: Vec<PhaseTiming>,
}
