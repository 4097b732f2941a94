//! Deterministic content filler.
//!
//! Used wherever text must exist without a model call: postprocess padding, fallback fills,
//! fast-draft mode and the global length floor. Output depends only on its inputs, so a
//! filled section is reproducible across runs.

use crate::generation::evidence::EvidenceSource;
use crate::text::sanitize::has_cjk;

pub trait ContentFiller: Send + Sync {
    /// The `index`-th generic paragraph for a section.
    fn paragraph(&self, section_title: &str, index: usize) -> String;

    /// A paragraph developing one planned key point.
    fn plan_point(&self, section_title: &str, point: &str) -> String;

    fn table_marker(&self, section_title: &str) -> String;

    fn figure_marker(&self, section_title: &str) -> String;

    /// Numbered reference list. Never empty, even without sources.
    fn references(&self, doc_title: &str, sources: &[EvidenceSource]) -> String;
}

const ZH_TEMPLATES: [&str; 4] = [
    "围绕“{t}”，需要首先明确目标、范围与约束条件，并结合实际业务场景梳理关键需求，为后续工作提供清晰的依据和统一的认识。",
    "在“{t}”方面，应当从流程、数据与组织三个层面进行分析，识别主要问题和潜在风险，并给出可度量的改进指标与阶段性里程碑。",
    "针对“{t}”，可以采用分步实施的策略：先建立基础能力和评估方法，再逐步优化细节，通过持续反馈保证方案的可行性与有效性。",
    "综合来看，“{t}”的推进需要兼顾成本、效率与质量，通过定期复盘总结经验，使相关措施能够稳定落地并持续产生价值。",
];

const EN_TEMPLATES: [&str; 4] = [
    "For {t}, the first step is to define goals, scope and constraints, and to ground the key requirements in concrete operating scenarios so later work rests on a shared understanding.",
    "Regarding {t}, the analysis should cover process, data and organization, identify the main problems and risks, and set measurable indicators together with staged milestones.",
    "A stepwise approach suits {t}: establish baseline capabilities and evaluation methods first, then refine the details while continuous feedback keeps the work feasible and effective.",
    "Overall, progress on {t} has to balance cost, efficiency and quality, with regular reviews that turn lessons learned into measures that hold up in daily operation.",
];

/// Cycles four fixed templates in the section's language.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateFiller;

impl ContentFiller for TemplateFiller {
    fn paragraph(&self, section_title: &str, index: usize) -> String {
        let templates = if has_cjk(section_title) {
            &ZH_TEMPLATES
        } else {
            &EN_TEMPLATES
        };
        templates[index % templates.len()].replace("{t}", section_title)
    }

    fn plan_point(&self, section_title: &str, point: &str) -> String {
        if has_cjk(section_title) || has_cjk(point) {
            format!(
                "关于{}，在“{}”中需要说明其具体内容、实施方式与预期效果，并明确相应的衡量标准。",
                point, section_title
            )
        } else {
            format!(
                "On {}, this part of {} describes what it involves, how it is carried out, and how its effect is measured.",
                point, section_title
            )
        }
    }

    fn table_marker(&self, section_title: &str) -> String {
        let (caption, columns, row) = if has_cjk(section_title) {
            (format!("{}关键指标", section_title), ["指标", "说明"], ["待补充", "待补充"])
        } else {
            (format!("{} key metrics", section_title), ["Metric", "Description"], ["TBD", "TBD"])
        };
        let value = serde_json::json!({
            "caption": caption,
            "columns": columns,
            "rows": [row],
        });
        format!("[[TABLE:{}]]", value)
    }

    fn figure_marker(&self, section_title: &str) -> String {
        let caption = if has_cjk(section_title) {
            format!("{}示意图", section_title)
        } else {
            format!("{} overview", section_title)
        };
        let value = serde_json::json!({ "type": "flow", "caption": caption });
        format!("[[FIGURE:{}]]", value)
    }

    fn references(&self, doc_title: &str, sources: &[EvidenceSource]) -> String {
        if sources.is_empty() {
            return if has_cjk(doc_title) {
                format!("[1] {}：相关资料待核实补充。", doc_title)
            } else {
                format!("[1] {}: sources pending verification.", doc_title)
            };
        }
        sources
            .iter()
            .enumerate()
            .map(|(idx, source)| {
                let title = if source.title.trim().is_empty() {
                    source.id.trim()
                } else {
                    source.title.trim()
                };
                if source.url.trim().is_empty() {
                    format!("[{}] {}", idx + 1, title)
                } else {
                    format!("[{}] {}. {}", idx + 1, title, source.url.trim())
                }
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}
