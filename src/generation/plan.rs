//! Document plan: the immutable per-section budget a run drafts against.

use serde::{Deserialize, Serialize};

use crate::text::sanitize::is_reference_section;
use crate::text::SectionToken;

/// Resolved numeric budget for one section, as published in the `targets` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionBudget {
    pub section: SectionToken,
    pub target_chars: usize,
    pub min_chars: usize,
    pub max_chars: usize,
    pub min_tables: usize,
    pub min_figures: usize,
}

/// Model-proposed structure for one section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructPlanItem {
    pub section: SectionToken,
    #[serde(default)]
    pub target_chars: Option<usize>,
    #[serde(default)]
    pub key_points: Vec<String>,
    #[serde(default)]
    pub evidence_queries: Vec<String>,
    #[serde(default)]
    pub min_tables: usize,
    #[serde(default)]
    pub min_figures: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSection {
    pub section: SectionToken,
    pub target_chars: usize,
    pub min_chars: usize,
    pub max_chars: usize,
    pub min_tables: usize,
    pub min_figures: usize,
    pub key_points: Vec<String>,
    pub evidence_queries: Vec<String>,
}

impl PlanSection {
    pub fn title(&self) -> &str {
        self.section.title()
    }

    pub fn is_reference(&self) -> bool {
        is_reference_section(self.section.title())
    }

    pub fn budget(&self) -> SectionBudget {
        SectionBudget {
            section: self.section.clone(),
            target_chars: self.target_chars,
            min_chars: self.min_chars,
            max_chars: self.max_chars,
            min_tables: self.min_tables,
            min_figures: self.min_figures,
        }
    }
}

/// Result of the optional instruction analysis step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstructionAnalysis {
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub doc_type: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentPlan {
    pub title: String,
    pub sections: Vec<PlanSection>,
    pub total_chars: usize,
    /// Expected outline in planning order, used to re-level headings at aggregation.
    pub expected_outline: Vec<SectionToken>,
    pub analysis: Option<InstructionAnalysis>,
    /// Model structured plan as published, when one was accepted.
    pub struct_plan: Vec<StructPlanItem>,
    /// Advisory problems recorded while planning.
    pub problems: Vec<String>,
}

impl DocumentPlan {
    pub fn tokens(&self) -> Vec<SectionToken> {
        self.sections.iter().map(|s| s.section.clone()).collect()
    }

    pub fn budgets(&self) -> Vec<SectionBudget> {
        self.sections.iter().map(PlanSection::budget).collect()
    }

    pub fn get(&self, token: &SectionToken) -> Option<&PlanSection> {
        self.sections.iter().find(|s| &s.section == token)
    }

    pub fn target_sum(&self) -> usize {
        self.sections.iter().map(|s| s.target_chars).sum()
    }
}
