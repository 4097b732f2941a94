//! Deterministic section shaping.
//!
//! Every drafted section passes through here: model noise is removed, floors (paragraphs,
//! characters, tables, figures) are met by padding from the [`ContentFiller`], and the
//! ceiling is met by paragraph-wise trimming.

use crate::generation::evidence::EvidenceSource;
use crate::generation::filler::ContentFiller;
use crate::generation::plan::PlanSection;
use crate::text::measure::{body_len, count_figures, count_tables, is_marker, paragraphs, truncate_visible};
use crate::text::sanitize::{
    format_references, sanitize_output_text, strip_inline_headings, strip_markdown_noise,
    strip_reference_like_lines,
};

/// Upper bound on padding paragraphs added to one section.
const PAD_CAP: usize = 64;

/// Remaining budget below which a trailing paragraph is dropped rather than cut.
const MIN_TRUNCATED_PARAGRAPH: usize = 40;

pub struct Shaper<'a> {
    pub filler: &'a dyn ContentFiller,
    pub min_paragraphs: usize,
    pub doc_title: &'a str,
    pub sources: &'a [EvidenceSource],
}

fn prose_count(paras: &[String]) -> usize {
    paras.iter().filter(|p| !is_marker(p)).count()
}

fn joined_len(paras: &[String]) -> usize {
    paras.iter().map(|p| body_len(p)).sum()
}

impl<'a> Shaper<'a> {
    /// Clean a successful draft and bring it within its planned bounds.
    pub fn finalize(&self, raw: &str, section: &PlanSection) -> String {
        if section.is_reference() {
            return self.finalize_references(raw, section);
        }
        let cleaned = strip_markdown_noise(raw);
        let cleaned = strip_inline_headings(&cleaned, section.title());
        let cleaned = strip_reference_like_lines(&cleaned);
        let cleaned = sanitize_output_text(&cleaned);

        let mut paras: Vec<String> = paragraphs(&cleaned).into_iter().map(str::to_string).collect();
        self.pad(&mut paras, section, section.min_chars);

        let mut text = trim_to_max(&paras.join("\n\n"), section.max_chars);
        let tables = count_tables(&text);
        for _ in tables..section.min_tables {
            text.push_str("\n\n");
            text.push_str(&self.filler.table_marker(section.title()));
        }
        let figures = count_figures(&text);
        for _ in figures..section.min_figures {
            text.push_str("\n\n");
            text.push_str(&self.filler.figure_marker(section.title()));
        }
        text.trim().to_string()
    }

    fn finalize_references(&self, raw: &str, section: &PlanSection) -> String {
        let formatted = format_references(&sanitize_output_text(raw));
        let text = if formatted.trim().is_empty() {
            self.filler.references(self.doc_title, self.sources)
        } else {
            formatted
        };
        if section.max_chars == 0 || body_len(&text) <= section.max_chars {
            return text;
        }
        let mut kept: Vec<&str> = Vec::new();
        for entry in paragraphs(&text) {
            let next = kept.iter().map(|e| body_len(e)).sum::<usize>() + body_len(entry);
            if !kept.is_empty() && next > section.max_chars {
                break;
            }
            kept.push(entry);
        }
        kept.join("\n\n")
    }

    /// Pad until the paragraph floor and `min_chars` are both met: planned key points
    /// first, then generic filler.
    fn pad(&self, paras: &mut Vec<String>, section: &PlanSection, min_chars: usize) {
        let mut points = section.key_points.iter();
        let mut generic = prose_count(paras);
        for _ in 0..PAD_CAP {
            if prose_count(paras) >= self.min_paragraphs && joined_len(paras) >= min_chars {
                break;
            }
            let next = match points.next() {
                Some(point) => self.filler.plan_point(section.title(), point),
                None => {
                    let p = self.filler.paragraph(section.title(), generic);
                    generic += 1;
                    p
                }
            };
            paras.push(next);
        }
    }

    /// Text for a section whose attempts were all exhausted: the reference list, or one
    /// generic paragraph that the repair loop will later expand.
    pub fn fallback(&self, section: &PlanSection) -> String {
        if section.is_reference() {
            self.filler.references(self.doc_title, self.sources)
        } else {
            self.filler.paragraph(section.title(), 0)
        }
    }

    /// Fill a section without any model call.
    pub fn fill(&self, section: &PlanSection) -> String {
        self.finalize("", section)
    }

    /// Pad existing text up to `min_chars`.
    pub fn pad_text(&self, text: &str, section: &PlanSection, min_chars: usize) -> String {
        let mut paras: Vec<String> = paragraphs(text).into_iter().map(str::to_string).collect();
        self.pad(&mut paras, section, min_chars);
        paras.join("\n\n")
    }
}

/// Trim paragraph-wise so visible length stays within `max_chars`. Markers are kept.
pub fn trim_to_max(text: &str, max_chars: usize) -> String {
    if max_chars == 0 || body_len(text) <= max_chars {
        return text.trim().to_string();
    }
    let mut out: Vec<String> = Vec::new();
    let mut used = 0usize;
    let mut full = false;
    for para in paragraphs(text) {
        if is_marker(para) {
            out.push(para.to_string());
            continue;
        }
        if full {
            continue;
        }
        let len = body_len(para);
        if used + len <= max_chars {
            used += len;
            out.push(para.to_string());
            continue;
        }
        let remaining = max_chars - used;
        if remaining >= MIN_TRUNCATED_PARAGRAPH || out.iter().all(|p| is_marker(p)) {
            out.push(truncate_visible(para, remaining));
        }
        full = true;
    }
    out.join("\n\n")
}
