//! Section list resolution.

use std::collections::HashSet;

use crate::generation::request::OutlineItem;
use crate::text::sanitize::{
    clean_section_title, has_cjk, is_acknowledgement_section, is_disallowed_section,
    is_reference_section,
};
use crate::text::SectionToken;

const SKELETON_ZH: [&str; 7] = ["引言", "需求分析", "总体设计", "数据设计", "测试与结果", "结论", "参考文献"];
const SKELETON_EN: [&str; 7] = [
    "Introduction",
    "Requirement Analysis",
    "Overall Design",
    "Data Design",
    "Testing and Results",
    "Conclusion",
    "References",
];

/// Level-1 items become H2. Deeper items become H3 only when `expand` is set.
pub fn from_required_outline(items: &[OutlineItem], expand: bool) -> Vec<SectionToken> {
    items
        .iter()
        .filter_map(|item| {
            let title = clean_section_title(&item.title);
            if title.is_empty() {
                return None;
            }
            match item.level {
                0 | 1 => Some(SectionToken::h2(title)),
                _ if expand => Some(SectionToken::h3(title)),
                _ => None,
            }
        })
        .collect()
}

pub fn from_required_h2(titles: &[String]) -> Vec<SectionToken> {
    titles
        .iter()
        .map(|t| clean_section_title(t))
        .filter(|t| !t.is_empty())
        .map(SectionToken::h2)
        .collect()
}

/// Fixed outlines for document types recognizable from the instruction alone.
pub fn heuristic_outline(instruction: &str) -> Option<Vec<SectionToken>> {
    let t = instruction.to_lowercase();
    let zh = has_cjk(instruction);
    let titles: &[&str] = if t.contains("周报") || t.contains("weekly report") {
        if zh {
            &["本周工作", "问题与风险", "下周计划"]
        } else {
            &["This Week", "Issues and Risks", "Next Week"]
        }
    } else if t.contains("会议纪要") || t.contains("meeting minutes") {
        if zh {
            &["会议概况", "讨论要点", "决议事项", "后续行动"]
        } else {
            &["Meeting Overview", "Discussion", "Decisions", "Action Items"]
        }
    } else if t.contains("方案") || t.contains("proposal") {
        if zh {
            &["背景与目标", "总体方案", "实施计划", "风险与保障", "预期效果"]
        } else {
            &["Background and Goals", "Proposed Approach", "Implementation Plan", "Risks", "Expected Outcomes"]
        }
    } else {
        return None;
    };
    Some(titles.iter().map(|t| SectionToken::h2(*t)).collect())
}

/// Parse a model-proposed section list: markdown headings, bullets, numbered lines or a
/// JSON string array.
pub fn parse_model_outline(raw: &str) -> Vec<SectionToken> {
    if let Some(json) = crate::generation::prompts::extract_json(raw) {
        if let Ok(titles) = serde_json::from_str::<Vec<String>>(json) {
            return from_required_h2(&titles);
        }
    }
    raw.lines()
        .filter_map(|line| {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with("```") || trimmed.ends_with([':', '：']) {
                return None;
            }
            let level = if trimmed.starts_with("### ") { 3 } else { 2 };
            let title = clean_section_title(trimmed.trim_start_matches(['-', '*', ' ']));
            let len = title.chars().count();
            (1..=40).contains(&len).then(|| SectionToken::new(level, title))
        })
        .collect()
}

/// Remove disallowed and duplicate sections. The reference section, if any, is moved last.
pub fn filter_sections(sections: Vec<SectionToken>, allow_acknowledgements: bool) -> Vec<SectionToken> {
    let mut seen = HashSet::new();
    let mut kept = Vec::new();
    let mut references: Option<SectionToken> = None;
    for section in sections {
        let title = section.title();
        if title.is_empty() || is_disallowed_section(title) {
            continue;
        }
        if !allow_acknowledgements && is_acknowledgement_section(title) {
            continue;
        }
        let key = clean_section_title(title).to_lowercase();
        if !seen.insert(key) {
            continue;
        }
        if is_reference_section(title) {
            references.get_or_insert(SectionToken::h2(title));
        } else {
            kept.push(section);
        }
    }
    kept.extend(references);
    kept
}

/// Guarantee a terminal reference section.
pub fn ensure_references(mut sections: Vec<SectionToken>, cjk: bool) -> Vec<SectionToken> {
    if !sections.last().is_some_and(|s| is_reference_section(s.title())) {
        sections.retain(|s| !is_reference_section(s.title()));
        sections.push(SectionToken::h2(if cjk { "参考文献" } else { "References" }));
    }
    sections
}

pub fn fallback_skeleton(cjk: bool) -> Vec<SectionToken> {
    let titles = if cjk { SKELETON_ZH } else { SKELETON_EN };
    titles.iter().map(|t| SectionToken::h2(*t)).collect()
}

pub fn primary_count(sections: &[SectionToken]) -> usize {
    sections
        .iter()
        .filter(|s| s.level() == 2 && !is_reference_section(s.title()))
        .count()
}
