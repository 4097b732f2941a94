//! Prompt construction for every model-backed step.

use crate::generation::evidence::EvidencePack;
use crate::generation::plan::PlanSection;
use crate::text::SectionToken;

pub const WRITER_SYSTEM: &str = "You are a professional technical writer. Write in the same \
language as the user's instruction. Output only the requested section body: no headings, no \
preamble, no closing remarks, no code fences.";

pub const PLANNER_SYSTEM: &str = "You are a document planner. Answer with JSON only, no prose.";

pub const REVIEWER_SYSTEM: &str = "You are a strict document reviewer. Answer with JSON only.";

pub const SINGLE_PASS_SYSTEM: &str = "You are a professional technical writer. Write the complete \
document in Markdown in the same language as the instruction. Start with one '# ' title line \
and use '## ' for sections.";

fn outline_list(outline: &[SectionToken]) -> String {
    outline
        .iter()
        .map(|s| s.heading())
        .collect::<Vec<_>>()
        .join("\n")
}

/// First JSON object or array embedded in a model reply.
pub fn extract_json(raw: &str) -> Option<&str> {
    let start = raw.find(['{', '['])?;
    let closer = if raw[start..].starts_with('{') { '}' } else { ']' };
    let end = raw.rfind(closer)?;
    (end > start).then(|| &raw[start..=end])
}

pub fn section_prompt(
    doc_title: &str,
    instruction: &str,
    section: &PlanSection,
    evidence: &EvidencePack,
    outline: &[SectionToken],
) -> String {
    let mut prompt = format!(
        "Document title: {}\nInstruction: {}\n\nDocument outline:\n{}\n\n\
         Write the body of the section \"{}\".\n\
         Length: about {} characters, at least {} and at most {}.\n\
         Use at least 2 paragraphs separated by blank lines.\n",
        doc_title,
        instruction,
        outline_list(outline),
        section.title(),
        section.target_chars,
        section.min_chars,
        section.max_chars,
    );
    if section.min_tables > 0 {
        prompt.push_str(
            "Include a table as a single line: [[TABLE:{\"caption\":\"...\",\"columns\":[...],\"rows\":[[...]]}]]\n",
        );
    }
    if section.min_figures > 0 {
        prompt.push_str(
            "Include a figure as a single line: [[FIGURE:{\"type\":\"flow\",\"caption\":\"...\"}]]\n",
        );
    }
    if !section.key_points.is_empty() {
        prompt.push_str("Cover these points:\n");
        for point in &section.key_points {
            prompt.push_str(&format!("- {}\n", point));
        }
    }
    if !evidence.is_empty() {
        prompt.push_str(&format!(
            "\nSupporting material (cite as [n] where used):\n{}\n",
            evidence.summary
        ));
        for (idx, source) in evidence.sources.iter().enumerate() {
            prompt.push_str(&format!("[{}] {} {}\n", idx + 1, source.title, source.url));
        }
        if !evidence.allowed_urls.is_empty() {
            prompt.push_str("Do not cite any URL not listed above.\n");
        }
    }
    prompt
}

pub fn references_prompt(doc_title: &str, instruction: &str, evidence: &EvidencePack) -> String {
    let mut prompt = format!(
        "Document title: {}\nInstruction: {}\n\nWrite the reference list only, one entry per line, \
         numbered [1], [2], ...\n",
        doc_title, instruction
    );
    if !evidence.sources.is_empty() {
        prompt.push_str("Use exactly these sources:\n");
        for source in &evidence.sources {
            prompt.push_str(&format!("- {} {}\n", source.title, source.url));
        }
    }
    prompt
}

/// Anchored continuation: the model extends the existing draft instead of rewriting it.
pub fn continuation_prompt(doc_title: &str, section: &PlanSection, tail: &str, missing_chars: usize) -> String {
    format!(
        "Document title: {}\nSection: {}\n\nThe section currently ends with:\n\"\"\"\n{}\n\"\"\"\n\n\
         Continue the section from exactly this point with about {} more characters of new \
         content. Do not repeat existing text and do not add headings.",
        doc_title,
        section.title(),
        tail,
        missing_chars
    )
}

pub fn outline_prompt(doc_title: &str, instruction: &str) -> String {
    format!(
        "Title: {}\nInstruction: {}\n\nPropose the level-2 section titles for this document as a \
         JSON array of strings. Do not include abstract, keywords or table of contents.",
        doc_title, instruction
    )
}

pub fn analysis_prompt(instruction: &str) -> String {
    format!(
        "Instruction: {}\n\nReturn {{\"topic\": string, \"doc_type\": string, \"keywords\": [string]}}.",
        instruction
    )
}

pub fn struct_plan_prompt(doc_title: &str, instruction: &str, sections: &[PlanSection], total: usize) -> String {
    let listing = sections
        .iter()
        .map(|s| format!("- {} (about {} chars)", s.title(), s.target_chars))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Title: {}\nInstruction: {}\nTotal length: {} characters\nSections:\n{}\n\n\
         Return a JSON array with one object per section: {{\"section\": title, \"target_chars\": \
         number, \"key_points\": [string], \"evidence_queries\": [string], \"min_tables\": number, \
         \"min_figures\": number}}.",
        doc_title, instruction, total, listing
    )
}

pub fn validation_prompt(doc_title: &str, report: &[(PlanSection, usize)]) -> String {
    let listing = report
        .iter()
        .map(|(section, len)| {
            format!(
                "- {}: {} chars (allowed {}..{})",
                section.title(),
                len,
                section.min_chars,
                section.max_chars
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Document: {}\nSection lengths:\n{}\n\nReturn {{\"issues\": [{{\"section\": title, \"issue\": \
         \"short\"|\"long\", \"action\": \"expand\"|\"trim\"}}]}}. Return an empty list when every \
         section is acceptable.",
        doc_title, listing
    )
}

pub fn single_pass_prompt(instruction: &str, existing_text: &str, total_chars: usize) -> String {
    let mut prompt = format!(
        "Instruction: {}\nTarget length: about {} characters.\n",
        instruction, total_chars
    );
    if !existing_text.trim().is_empty() {
        prompt.push_str(&format!("\nExisting draft to build on:\n{}\n", existing_text));
    }
    prompt.push_str("\nEnd the document with a reference section.");
    prompt
}
