//! Aggregation: ordered merge, heading normalization and the final self-check.

use tracing::{debug, info};

use crate::config::{EvidenceSettings, GenerationSettings};
use crate::generation::evidence::EvidenceSource;
use crate::generation::filler::ContentFiller;
use crate::generation::plan::DocumentPlan;
use crate::generation::planner::outline::fallback_skeleton;
use crate::generation::postprocess::trim_to_max;
use crate::text::measure::{body_len, citation_count};
use crate::text::sanitize::{
    clean_section_title, has_cjk, is_acknowledgement_section, is_disallowed_section,
    sanitize_output_text, strip_markdown_noise, wants_acknowledgement,
};
use crate::text::SectionToken;

/// Allowed relative deviation of the final length from the planned total.
const LENGTH_TOLERANCE: f64 = 0.10;

#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedDocument {
    pub text: String,
    /// Section text as it appears in the document, in planning order
    pub sections: Vec<(SectionToken, String)>,
    pub problems: Vec<String>,
}

/// `(level, title)` of a markdown heading line.
fn split_heading(line: &str) -> Option<(usize, &str)> {
    let trimmed = line.trim_start();
    let hashes = trimmed.chars().take_while(|c| *c == '#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &trimmed[hashes..];
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let title = rest.trim().trim_end_matches('#').trim();
    (!title.is_empty()).then_some((hashes, title))
}

fn title_key(title: &str) -> String {
    clean_section_title(title).to_lowercase()
}

/// Re-level headings: exactly one `#` title heading (prepended when missing), every other
/// heading at the level of its expected-outline entry. Headings are matched by title; an
/// unmatched heading takes the level of the next expected entry by position.
pub fn normalize_headings(text: &str, title: &str, expected: &[SectionToken]) -> String {
    let doc_key = title_key(title);
    let mut out: Vec<String> = Vec::new();
    let mut has_title = false;
    let mut position = 0usize;

    for line in text.lines() {
        let Some((hashes, heading)) = split_heading(line) else {
            out.push(line.to_string());
            continue;
        };
        let key = title_key(heading);
        if !has_title && (hashes == 1 || key == doc_key) {
            has_title = true;
            out.push(format!("# {}", heading));
            continue;
        }
        let level = match expected.iter().position(|t| title_key(t.title()) == key) {
            Some(idx) => {
                position = idx + 1;
                expected[idx].level() as usize
            }
            None => match expected.get(position) {
                Some(next) => {
                    position += 1;
                    next.level() as usize
                }
                None => hashes.clamp(2, 3),
            },
        };
        out.push(format!("{} {}", "#".repeat(level), heading));
    }

    let body = out.join("\n");
    if has_title {
        body
    } else {
        format!("# {}\n\n{}", title, body.trim_start())
    }
}

pub struct Aggregator<'a> {
    pub settings: &'a GenerationSettings,
    pub evidence: &'a EvidenceSettings,
    pub filler: &'a dyn ContentFiller,
}

impl<'a> Aggregator<'a> {
    /// Merge `texts` (aligned with `plan.sections`) into the final document.
    pub fn aggregate(
        &self,
        plan: &DocumentPlan,
        texts: &[String],
        instruction: &str,
        sources: &[EvidenceSource],
    ) -> AggregatedDocument {
        let mut problems = Vec::new();
        let allow_ack = self.settings.include_acknowledgements || wants_acknowledgement(instruction);

        let mut kept: Vec<(SectionToken, String)> = plan
            .sections
            .iter()
            .zip(texts)
            .filter(|(s, _)| !is_disallowed_section(s.title()))
            .filter(|(s, _)| allow_ack || !is_acknowledgement_section(s.title()))
            .map(|(s, t)| {
                let cleaned = sanitize_output_text(&strip_markdown_noise(t));
                (s.section.clone(), cleaned)
            })
            .collect();

        if self.settings.max_total_chars > 0 {
            trim_total(&mut kept, self.settings.max_total_chars);
        }

        let mut doc = format!("# {}\n", plan.title);
        for (token, body) in &kept {
            doc.push('\n');
            doc.push_str(&token.heading());
            doc.push_str("\n\n");
            if !body.is_empty() {
                doc.push_str(body);
                doc.push('\n');
            }
        }
        let expected: Vec<SectionToken> = plan
            .expected_outline
            .iter()
            .filter(|t| kept.iter().any(|(k, _)| k == *t))
            .cloned()
            .collect();
        let mut text = normalize_headings(doc.trim_end(), &plan.title, &expected);

        if !text.lines().any(|l| l.starts_with("## ")) {
            debug!("No section heading survived aggregation; using the fallback skeleton");
            problems.push("no section headings survived aggregation; fallback skeleton used".to_string());
            kept = self.skeleton(&plan.title, sources);
            text = format!("# {}\n", plan.title);
            for (token, body) in &kept {
                text.push_str(&format!("\n{}\n\n{}\n", token.heading(), body));
            }
            text = text.trim_end().to_string();
        }

        problems.extend(self.self_check(plan, &kept, &text, sources));
        info!(
            title = %plan.title,
            sections = kept.len(),
            chars = body_len(&text),
            problems = problems.len(),
            "Document aggregated"
        );
        AggregatedDocument {
            text,
            sections: kept,
            problems,
        }
    }

    fn skeleton(&self, title: &str, sources: &[EvidenceSource]) -> Vec<(SectionToken, String)> {
        fallback_skeleton(has_cjk(title))
            .into_iter()
            .map(|token| {
                let body = if crate::text::sanitize::is_reference_section(token.title()) {
                    self.filler.references(title, sources)
                } else {
                    format!(
                        "{}\n\n{}",
                        self.filler.paragraph(token.title(), 0),
                        self.filler.paragraph(token.title(), 1)
                    )
                };
                (token, body)
            })
            .collect()
    }

    fn self_check(
        &self,
        plan: &DocumentPlan,
        sections: &[(SectionToken, String)],
        text: &str,
        sources: &[EvidenceSource],
    ) -> Vec<String> {
        let mut problems = Vec::new();

        let total: usize = sections.iter().map(|(_, body)| body_len(body)).sum();
        if plan.total_chars > 0 {
            let deviation = (total as f64 - plan.total_chars as f64).abs() / plan.total_chars as f64;
            if deviation > LENGTH_TOLERANCE {
                problems.push(format!(
                    "document length {} deviates {:.0}% from the target {}",
                    total,
                    deviation * 100.0,
                    plan.total_chars
                ));
            }
        }

        let headings: Vec<String> = text
            .lines()
            .filter_map(split_heading)
            .map(|(_, title)| title_key(title))
            .collect();
        for token in &plan.expected_outline {
            if is_disallowed_section(token.title()) {
                continue;
            }
            if !headings.contains(&title_key(token.title())) {
                problems.push(format!("expected heading '{}' is missing", token.title()));
            }
        }

        for (token, body) in sections {
            let Some(section) = plan.get(token) else {
                continue;
            };
            let len = body_len(body);
            if len < section.min_chars {
                problems.push(format!(
                    "section '{}' is below its minimum length ({} < {})",
                    token.title(),
                    len,
                    section.min_chars
                ));
            }
        }

        if self.evidence.enabled {
            if sources.is_empty() {
                problems.push("evidence mode is enabled but no sources were retrieved".to_string());
            } else if self.evidence.require_citations && citation_count(&body_without_references(sections)) == 0 {
                problems.push("evidence sources were retrieved but the text cites none of them".to_string());
            }
        }
        problems
    }
}

fn body_without_references(sections: &[(SectionToken, String)]) -> String {
    sections
        .iter()
        .filter(|(t, _)| !crate::text::sanitize::is_reference_section(t.title()))
        .map(|(_, body)| body.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Scale every section down proportionally so the document fits `max_total`.
fn trim_total(sections: &mut [(SectionToken, String)], max_total: usize) {
    let total: usize = sections.iter().map(|(_, body)| body_len(body)).sum();
    if total <= max_total {
        return;
    }
    let ratio = max_total as f64 / total as f64;
    for (_, body) in sections.iter_mut() {
        let limit = (body_len(body) as f64 * ratio).floor() as usize;
        *body = trim_to_max(body, limit.max(1));
    }
}
