//! Character budget allocation.
//!
//! The total budget is split across sections by title-keyword weight with largest-remainder
//! apportionment, so shares always sum to the total exactly. Each share then becomes a
//! target with a prose floor and a ceiling.

use crate::generation::plan::PlanSection;
use crate::text::sanitize::is_reference_section;
use crate::text::SectionToken;

const MIN_TARGET: usize = 200;
const PROSE_MIN_FLOOR: usize = 220;
const REFERENCE_TARGET_RANGE: (usize, usize) = (220, 1200);
const WEIGHT_FLOOR: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SectionClass {
    References,
    Introduction,
    Method,
    Conclusion,
    Body,
}

fn classify(title: &str) -> SectionClass {
    if is_reference_section(title) {
        return SectionClass::References;
    }
    let t = title.to_lowercase();
    let has = |words: &[&str]| words.iter().any(|w| t.contains(w));
    if has(&["引言", "绪论", "背景", "概述", "introduction", "background", "overview"]) {
        SectionClass::Introduction
    } else if has(&[
        "方法", "设计", "实现", "架构", "方案", "method", "design", "implementation",
        "architecture", "plan",
    ]) {
        SectionClass::Method
    } else if has(&["结论", "总结", "conclusion", "summary"]) {
        SectionClass::Conclusion
    } else {
        SectionClass::Body
    }
}

pub fn section_weight(title: &str) -> f64 {
    let weight = match classify(title) {
        SectionClass::References => 0.4,
        SectionClass::Introduction => 0.8,
        SectionClass::Method => 1.2,
        SectionClass::Conclusion => 0.8,
        SectionClass::Body => 1.0,
    };
    f64::max(weight, WEIGHT_FLOOR)
}

/// Split `total` into integer shares proportional to `weights` (largest remainder).
pub fn apportion(total: usize, weights: &[f64]) -> Vec<usize> {
    if weights.is_empty() {
        return Vec::new();
    }
    let weights: Vec<f64> = weights.iter().map(|w| w.max(WEIGHT_FLOOR)).collect();
    let sum: f64 = weights.iter().sum();

    let exact: Vec<f64> = weights.iter().map(|w| total as f64 * w / sum).collect();
    let mut shares: Vec<usize> = exact.iter().map(|e| e.floor() as usize).collect();
    // Float rounding can overshoot by a unit; take it back from the largest share.
    while shares.iter().sum::<usize>() > total {
        if let Some(max) = shares.iter_mut().max() {
            *max -= 1;
        }
    }
    let assigned: usize = shares.iter().sum();
    let mut leftover = total - assigned;

    let mut order: Vec<usize> = (0..weights.len()).collect();
    order.sort_by(|&a, &b| {
        let ra = exact[a] - exact[a].floor();
        let rb = exact[b] - exact[b].floor();
        rb.partial_cmp(&ra)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(&b))
    });
    for idx in order.into_iter().cycle() {
        if leftover == 0 {
            break;
        }
        shares[idx] += 1;
        leftover -= 1;
    }
    shares
}

/// `(target, min_chars, max_chars)` for a section given its raw share.
pub fn bounds(title: &str, share: usize) -> (usize, usize, usize) {
    let class = classify(title);
    if class == SectionClass::References {
        let target = share.clamp(REFERENCE_TARGET_RANGE.0, REFERENCE_TARGET_RANGE.1);
        return (target, 0, target * 2);
    }
    let target = share.max(MIN_TARGET);
    let min_chars = PROSE_MIN_FLOOR.max((target as f64 * 0.7).round() as usize);
    let multiplier = match class {
        SectionClass::Introduction => 1.6,
        SectionClass::Method => 2.0,
        SectionClass::Conclusion => 1.6,
        _ => 1.8,
    };
    let max_chars = (min_chars + 300).max((target as f64 * multiplier).round() as usize);
    (target, min_chars, max_chars)
}

/// Table and figure floors implied by the title.
pub fn media_floors(title: &str) -> (usize, usize) {
    let t = title.to_lowercase();
    let tables = ["结果", "数据", "result", "data"].iter().any(|w| t.contains(w));
    let figures = ["架构", "流程", "architecture", "flow"]
        .iter()
        .any(|w| t.contains(w));
    (usize::from(tables), usize::from(figures))
}

/// Build plan sections for `sections` out of a `total` character budget.
pub fn allocate(sections: &[SectionToken], total: usize) -> Vec<PlanSection> {
    let weights: Vec<f64> = sections.iter().map(|s| section_weight(s.title())).collect();
    let shares = apportion(total, &weights);
    sections
        .iter()
        .zip(shares)
        .map(|(section, share)| {
            let (target_chars, min_chars, max_chars) = bounds(section.title(), share);
            let (min_tables, min_figures) = if is_reference_section(section.title()) {
                (0, 0)
            } else {
                media_floors(section.title())
            };
            PlanSection {
                section: section.clone(),
                target_chars,
                min_chars,
                max_chars,
                min_tables,
                min_figures,
                key_points: Vec::new(),
                evidence_queries: Vec::new(),
            }
        })
        .collect()
}

/// Rescale proposed targets to sum to `total` when they deviate by more than 5%.
pub fn rescale(targets: &[usize], total: usize) -> Vec<usize> {
    let sum: usize = targets.iter().sum();
    if sum == 0 || total == 0 {
        return targets.to_vec();
    }
    let deviation = (sum as f64 - total as f64).abs() / total as f64;
    if deviation <= 0.05 {
        return targets.to_vec();
    }
    let weights: Vec<f64> = targets.iter().map(|t| (*t).max(1) as f64).collect();
    apportion(total, &weights)
}
