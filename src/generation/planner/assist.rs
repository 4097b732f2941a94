//! Model-backed planning steps: instruction analysis, section list proposal and the
//! structured plan. Each call is bounded by the plan timeout; callers treat every failure
//! as advisory.

use serde::Deserialize;
use std::time::Duration;

use crate::error::ApiError;
use crate::generation::plan::{InstructionAnalysis, PlanSection, StructPlanItem};
use crate::generation::planner::budget;
use crate::generation::planner::outline::parse_model_outline;
use crate::generation::prompts::{
    analysis_prompt, extract_json, outline_prompt, struct_plan_prompt, PLANNER_SYSTEM,
};
use crate::provider::{chat, CompletionOptions, ModelProviderClient};
use crate::text::sanitize::clean_section_title;
use crate::text::SectionToken;

const MAX_PLAN_POINTS: usize = 6;
const MAX_MEDIA_FLOOR: usize = 3;

#[derive(Debug, Deserialize)]
struct RawStructItem {
    section: String,
    #[serde(default)]
    target_chars: Option<usize>,
    #[serde(default)]
    key_points: Vec<String>,
    #[serde(default)]
    evidence_queries: Vec<String>,
    #[serde(default)]
    min_tables: usize,
    #[serde(default)]
    min_figures: usize,
}

pub struct PlanAssistant<'a> {
    client: &'a dyn ModelProviderClient,
    timeout: Duration,
    temperature: f32,
}

impl<'a> PlanAssistant<'a> {
    pub fn new(client: &'a dyn ModelProviderClient, timeout: Duration, temperature: f32) -> Self {
        Self {
            client,
            timeout,
            temperature,
        }
    }

    async fn ask(&self, user: &str) -> Result<String, ApiError> {
        let options = CompletionOptions::default().with_temperature(self.temperature);
        tokio::time::timeout(self.timeout, chat(self.client, PLANNER_SYSTEM, user, options))
            .await
            .map_err(|_| ApiError::GenerationTimeout(self.timeout))?
    }

    pub async fn analyze(&self, instruction: &str) -> Result<InstructionAnalysis, ApiError> {
        let reply = self.ask(&analysis_prompt(instruction)).await?;
        let json = extract_json(&reply)
            .ok_or_else(|| ApiError::ProviderError("analysis reply has no JSON".to_string()))?;
        serde_json::from_str(json)
            .map_err(|e| ApiError::ProviderError(format!("invalid analysis JSON: {}", e)))
    }

    pub async fn outline(&self, title: &str, instruction: &str) -> Result<Vec<SectionToken>, ApiError> {
        let reply = self.ask(&outline_prompt(title, instruction)).await?;
        let sections = parse_model_outline(&reply);
        if sections.is_empty() {
            return Err(ApiError::ProviderError(
                "model proposed no sections".to_string(),
            ));
        }
        Ok(sections)
    }

    pub async fn struct_plan(
        &self,
        title: &str,
        instruction: &str,
        sections: &[PlanSection],
        total: usize,
    ) -> Result<Vec<(usize, RawPlanEntry)>, ApiError> {
        let reply = self
            .ask(&struct_plan_prompt(title, instruction, sections, total))
            .await?;
        let json = extract_json(&reply)
            .ok_or_else(|| ApiError::ProviderError("structured plan has no JSON".to_string()))?;
        let items: Vec<RawStructItem> = serde_json::from_str(json)
            .map_err(|e| ApiError::ProviderError(format!("invalid structured plan: {}", e)))?;

        let matched: Vec<(usize, RawPlanEntry)> = items
            .into_iter()
            .filter_map(|item| {
                let key = clean_section_title(&item.section).to_lowercase();
                let idx = sections
                    .iter()
                    .position(|s| clean_section_title(s.title()).to_lowercase() == key)?;
                Some((idx, RawPlanEntry::from(item)))
            })
            .collect();
        if matched.is_empty() {
            return Err(ApiError::ProviderError(
                "structured plan matched no planned section".to_string(),
            ));
        }
        Ok(matched)
    }
}

/// Structured plan entry matched to a planned section.
#[derive(Debug, Clone)]
pub struct RawPlanEntry {
    pub target_chars: Option<usize>,
    pub key_points: Vec<String>,
    pub evidence_queries: Vec<String>,
    pub min_tables: usize,
    pub min_figures: usize,
}

fn clean_list(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .take(MAX_PLAN_POINTS)
        .collect()
}

impl From<RawStructItem> for RawPlanEntry {
    fn from(item: RawStructItem) -> Self {
        Self {
            target_chars: item.target_chars.filter(|t| *t > 0),
            key_points: clean_list(item.key_points),
            evidence_queries: clean_list(item.evidence_queries),
            min_tables: item.min_tables.min(MAX_MEDIA_FLOOR),
            min_figures: item.min_figures.min(MAX_MEDIA_FLOOR),
        }
    }
}

/// Merge matched entries into the heuristic plan. Proposed targets are rescaled to the
/// total when they deviate by more than 5%; media floors only ever rise.
pub fn apply_struct_plan(
    sections: &mut [PlanSection],
    entries: Vec<(usize, RawPlanEntry)>,
    total: usize,
) -> Vec<StructPlanItem> {
    let mut proposed: Vec<usize> = sections.iter().map(|s| s.target_chars).collect();
    let mut any_target = false;
    for (idx, entry) in &entries {
        if let Some(target) = entry.target_chars {
            proposed[*idx] = target;
            any_target = true;
        }
    }
    if any_target {
        let rescaled = budget::rescale(&proposed, total);
        for (section, share) in sections.iter_mut().zip(rescaled) {
            let (target, min, max) = budget::bounds(section.title(), share);
            section.target_chars = target;
            section.min_chars = min;
            section.max_chars = max;
        }
    }

    let mut published = Vec::with_capacity(entries.len());
    for (idx, entry) in entries {
        let section = &mut sections[idx];
        if !entry.key_points.is_empty() {
            section.key_points = entry.key_points;
        }
        if !entry.evidence_queries.is_empty() {
            section.evidence_queries = entry.evidence_queries;
        }
        if !section.is_reference() {
            section.min_tables = section.min_tables.max(entry.min_tables);
            section.min_figures = section.min_figures.max(entry.min_figures);
        }
        published.push(StructPlanItem {
            section: section.section.clone(),
            target_chars: Some(section.target_chars),
            key_points: section.key_points.clone(),
            evidence_queries: section.evidence_queries.clone(),
            min_tables: section.min_tables,
            min_figures: section.min_figures,
        });
    }
    published
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MockProvider;

    fn planned() -> Vec<PlanSection> {
        budget::allocate(
            &[
                SectionToken::h2("背景"),
                SectionToken::h2("方案"),
                SectionToken::h2("参考文献"),
            ],
            1000,
        )
    }

    #[tokio::test]
    async fn struct_plan_matches_titles_and_rescales() {
        let reply = r#"Plan:
[{"section": "1. 背景", "target_chars": 100, "key_points": ["现状", " "], "min_tables": 9},
 {"section": "方案", "target_chars": 300, "evidence_queries": ["best practice"]},
 {"section": "不存在", "target_chars": 5000}]"#;
        let mock = MockProvider::new("m", vec![Ok(reply.to_string())]);
        let assistant = PlanAssistant::new(&mock, Duration::from_secs(5), 0.2);
        let mut sections = planned();
        let entries = assistant
            .struct_plan("t", "i", &sections, 1000)
            .await
            .unwrap();
        assert_eq!(entries.len(), 2);

        let published = apply_struct_plan(&mut sections, entries, 1000);
        assert_eq!(published.len(), 2);
        assert_eq!(sections[0].key_points, vec!["现状".to_string()]);
        assert_eq!(sections[0].min_tables, 3);
        assert_eq!(sections[1].evidence_queries, vec!["best practice".to_string()]);
        let sum: usize = sections.iter().map(|s| s.target_chars).sum();
        assert!((950..=1050).contains(&sum), "sum was {}", sum);
    }

    #[tokio::test]
    async fn analysis_parses_embedded_json() {
        let mock = MockProvider::new(
            "m",
            vec![Ok("```json\n{\"topic\":\"供应链\",\"doc_type\":\"report\",\"keywords\":[\"库存\"]}\n```".to_string())],
        );
        let assistant = PlanAssistant::new(&mock, Duration::from_secs(5), 0.2);
        let analysis = assistant.analyze("写报告").await.unwrap();
        assert_eq!(analysis.topic, "供应链");
        assert_eq!(analysis.keywords, vec!["库存".to_string()]);
    }

    #[tokio::test]
    async fn failures_surface_as_errors() {
        let mock = MockProvider::new("m", vec![Err("down".to_string()), Ok("nothing".to_string())]);
        let assistant = PlanAssistant::new(&mock, Duration::from_secs(5), 0.2);
        assert!(assistant.analyze("x").await.is_err());
        assert!(assistant.analyze("x").await.is_err());
    }
}
