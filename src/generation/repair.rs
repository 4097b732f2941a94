//! Validation and section-isolated repair.
//!
//! Sections flagged short are expanded by anchored continuation rounds; sections flagged
//! long are trimmed back to their ceiling. Each repair touches only its own section. A
//! global floor pass then pads round-robin until the document-wide minimum is met.

use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::config::GenerationSettings;
use crate::error::ApiError;
use crate::generation::model_pool::ModelPool;
use crate::generation::plan::{DocumentPlan, PlanSection};
use crate::generation::postprocess::{trim_to_max, Shaper};
use crate::generation::prompts::{continuation_prompt, extract_json, validation_prompt, REVIEWER_SYSTEM, WRITER_SYSTEM};
use crate::provider::{chat, CompletionOptions, ModelClientResolver, ModelProviderClient};
use crate::text::measure::body_len;
use crate::text::sanitize::{clean_section_title, sanitize_output_text, strip_inline_headings, strip_markdown_noise};

/// Characters of the current draft handed to a continuation round as its anchor.
const ANCHOR_CHARS: usize = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairAction {
    Expand,
    Trim,
}

#[derive(Debug, Default)]
pub struct RepairReport {
    pub expanded: Vec<usize>,
    pub trimmed: Vec<usize>,
    pub floor_iterations: usize,
    pub problems: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ValidationReply {
    #[serde(default)]
    issues: Vec<ValidationIssue>,
}

#[derive(Debug, Deserialize)]
struct ValidationIssue {
    section: String,
    #[serde(default)]
    issue: String,
    #[serde(default)]
    action: String,
}

/// Cheap length check over prose sections.
pub fn heuristic_issues(
    plan: &DocumentPlan,
    texts: &[String],
    enforce_min_length: bool,
) -> BTreeMap<usize, RepairAction> {
    let mut issues = BTreeMap::new();
    for (idx, (section, text)) in plan.sections.iter().zip(texts).enumerate() {
        if section.is_reference() {
            continue;
        }
        let len = body_len(text);
        if enforce_min_length && len < section.min_chars {
            issues.insert(idx, RepairAction::Expand);
        } else if section.max_chars > 0 && len > section.max_chars {
            issues.insert(idx, RepairAction::Trim);
        }
    }
    issues
}

fn parse_validation(raw: &str, plan: &DocumentPlan) -> Result<BTreeMap<usize, RepairAction>, ApiError> {
    let json = extract_json(raw)
        .ok_or_else(|| ApiError::ProviderError("validation reply has no JSON".to_string()))?;
    let reply: ValidationReply = serde_json::from_str(json)
        .map_err(|e| ApiError::ProviderError(format!("invalid validation JSON: {}", e)))?;

    let mut issues = BTreeMap::new();
    for issue in reply.issues {
        let key = clean_section_title(&issue.section).to_lowercase();
        let Some(idx) = plan
            .sections
            .iter()
            .position(|s| !s.is_reference() && clean_section_title(s.title()).to_lowercase() == key)
        else {
            continue;
        };
        let action = match (issue.action.to_lowercase().as_str(), issue.issue.to_lowercase().as_str()) {
            ("expand", _) | (_, "short") => RepairAction::Expand,
            ("trim", _) | (_, "long") => RepairAction::Trim,
            _ => continue,
        };
        issues.insert(idx, action);
    }
    Ok(issues)
}

pub struct RepairLoop<'a> {
    pub settings: &'a GenerationSettings,
    pub resolver: &'a dyn ModelClientResolver,
    pub pool: &'a ModelPool,
    /// Model used for the holistic validation call
    pub reviewer: Option<&'a dyn ModelProviderClient>,
    pub shaper: Shaper<'a>,
}

impl<'a> RepairLoop<'a> {
    /// Validate and repair `texts` (aligned with `plan.sections`) in place.
    pub async fn run(&self, plan: &DocumentPlan, texts: &mut [String]) -> RepairReport {
        let mut report = RepairReport::default();
        if self.settings.validate {
            let mut issues = heuristic_issues(plan, texts, self.settings.enforce_min_length);
            if self.settings.model_validation && !self.settings.strict {
                match self.model_issues(plan, texts).await {
                    Ok(flagged) => {
                        for (idx, action) in flagged {
                            if action == RepairAction::Expand && !self.settings.enforce_min_length {
                                continue;
                            }
                            issues.entry(idx).or_insert(action);
                        }
                    }
                    Err(err) => {
                        warn!(error = %err, "Model validation unavailable");
                        report
                            .problems
                            .push(format!("model validation unavailable, heuristic check used: {}", err));
                    }
                }
            }

            for (idx, action) in issues {
                let section = &plan.sections[idx];
                match action {
                    RepairAction::Expand => {
                        texts[idx] = self.expand(&plan.title, section, &texts[idx]).await;
                        report.expanded.push(idx);
                    }
                    RepairAction::Trim => {
                        texts[idx] = trim_to_max(&texts[idx], section.max_chars);
                        report.trimmed.push(idx);
                    }
                }
            }
        }

        if self.settings.min_total_chars > 0 {
            self.enforce_global_floor(plan, texts, &mut report);
        }
        if !report.expanded.is_empty() || !report.trimmed.is_empty() || report.floor_iterations > 0 {
            info!(
                expanded = report.expanded.len(),
                trimmed = report.trimmed.len(),
                floor_iterations = report.floor_iterations,
                "Sections repaired"
            );
        }
        report
    }

    async fn model_issues(
        &self,
        plan: &DocumentPlan,
        texts: &[String],
    ) -> Result<BTreeMap<usize, RepairAction>, ApiError> {
        let reviewer = self
            .reviewer
            .ok_or_else(|| ApiError::ProviderNotConfigured("no reviewer model".to_string()))?;
        let lengths: Vec<(PlanSection, usize)> = plan
            .sections
            .iter()
            .zip(texts)
            .filter(|(s, _)| !s.is_reference())
            .map(|(s, t)| (s.clone(), body_len(t)))
            .collect();
        let options = CompletionOptions::default().with_temperature(0.0);
        let prompt = validation_prompt(&plan.title, &lengths);
        let reply = tokio::time::timeout(
            self.settings.plan_timeout(),
            chat(reviewer, REVIEWER_SYSTEM, &prompt, options),
        )
            .await
            .map_err(|_| ApiError::GenerationTimeout(self.settings.plan_timeout()))??;
        parse_validation(&reply, plan)
    }

    /// Anchored top-up: continue from the current tail, never redraft. Any shortfall left
    /// after the rounds is met by deterministic padding; overshoot is cut back to the ceiling.
    async fn expand(&self, doc_title: &str, section: &PlanSection, text: &str) -> String {
        let mut current = text.trim().to_string();
        if !self.settings.fast_draft {
            for round in 1..=self.settings.expand_rounds {
                let len = body_len(&current);
                if len >= section.min_chars {
                    break;
                }
                match self.continue_section(doc_title, section, &current, section.min_chars - len).await {
                    Ok(addition) if !addition.is_empty() => {
                        debug!(section = %section.section, round, "Section expanded");
                        current.push_str("\n\n");
                        current.push_str(&addition);
                    }
                    Ok(_) => break,
                    Err(err) => {
                        warn!(section = %section.section, round, error = %err, "Expansion round failed");
                        break;
                    }
                }
            }
        }
        if body_len(&current) < section.min_chars {
            current = self.shaper.pad_text(&current, section, section.min_chars);
        } else if section.max_chars > 0 && body_len(&current) > section.max_chars {
            debug!(section = %section.section, max = section.max_chars, "Expansion overshot ceiling");
            current = trim_to_max(&current, section.max_chars);
        }
        current
    }

    async fn continue_section(
        &self,
        doc_title: &str,
        section: &PlanSection,
        current: &str,
        missing: usize,
    ) -> Result<String, ApiError> {
        let model = self.pool.next();
        let client = self.resolver.client_for(&model)?;
        let tail = anchor(current);
        let options = CompletionOptions::default().with_temperature(self.settings.temperature);
        let raw = chat(
            client.as_ref(),
            WRITER_SYSTEM,
            &continuation_prompt(doc_title, section, tail, missing),
            options,
        )
        .await?;
        let cleaned = strip_markdown_noise(&raw);
        let cleaned = strip_inline_headings(&cleaned, section.title());
        Ok(sanitize_output_text(&cleaned).trim().to_string())
    }

    /// Pad prose sections round-robin until the document reaches `min_total_chars`.
    fn enforce_global_floor(&self, plan: &DocumentPlan, texts: &mut [String], report: &mut RepairReport) {
        let target = self.settings.min_total_chars;
        let prose: Vec<usize> = plan
            .sections
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.is_reference())
            .map(|(idx, _)| idx)
            .collect();
        if prose.is_empty() {
            return;
        }
        let cap = 120usize.max(30 * plan.sections.len());
        let mut total: usize = texts.iter().map(|t| body_len(t)).sum();
        let mut points: Vec<usize> = vec![0; plan.sections.len()];
        let mut generic: Vec<usize> = vec![0; plan.sections.len()];

        let mut iterations = 0;
        while total < target && iterations < cap {
            let idx = prose[iterations % prose.len()];
            let section = &plan.sections[idx];
            let addition = match section.key_points.get(points[idx]) {
                Some(point) => {
                    points[idx] += 1;
                    self.shaper.filler.plan_point(section.title(), point)
                }
                None => {
                    // Continue after the paragraphs postprocessing already used.
                    let n = crate::text::paragraphs(&texts[idx]).len() + generic[idx];
                    generic[idx] += 1;
                    self.shaper.filler.paragraph(section.title(), n)
                }
            };
            total += body_len(&addition);
            texts[idx].push_str("\n\n");
            texts[idx].push_str(&addition);
            iterations += 1;
        }
        report.floor_iterations = iterations;
        if total < target {
            report.problems.push(format!(
                "document length {} is below the configured minimum {} after {} padding rounds",
                total, target, iterations
            ));
        }
    }
}

/// Tail of `text` used to anchor a continuation, cut on a char boundary.
fn anchor(text: &str) -> &str {
    let count = text.chars().count();
    if count <= ANCHOR_CHARS {
        return text;
    }
    let start = text
        .char_indices()
        .nth(count - ANCHOR_CHARS)
        .map(|(i, _)| i)
        .unwrap_or(0);
    &text[start..]
}
