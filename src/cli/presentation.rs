//! CLI presentation: event lines, plan tables and cache summaries.

use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use owo_colors::OwoColorize;

use crate::error::ApiError;
use crate::generation::cache::CacheStats;
use crate::generation::plan::DocumentPlan;
use crate::generation::request::GeneratedDocument;
use crate::progress::{PhaseMark, ProgressEvent, SectionPhase};

/// Bold, underlined section heading.
pub fn format_heading(title: &str) -> String {
    format!("{}", title.bold().underline())
}

/// One event as a JSON line.
pub fn format_event_json(event: &ProgressEvent) -> Result<String, ApiError> {
    serde_json::to_string(event)
        .map_err(|e| ApiError::GenerationFailed(format!("event encoding failed: {}", e)))
}

/// One human-readable progress line, or `None` for events not shown in text mode.
pub fn format_event_line(event: &ProgressEvent) -> Option<String> {
    match event {
        ProgressEvent::State { name, phase } => {
            let name = serde_json::to_value(name)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default();
            Some(match phase {
                PhaseMark::Start => format!("{} {}", "▶".cyan(), name.bold()),
                PhaseMark::End => format!("{} {}", "■".cyan(), name.dimmed()),
            })
        }
        ProgressEvent::Plan { title, sections } => Some(format!(
            "  plan: {} ({} sections)",
            title.bold(),
            sections.len()
        )),
        ProgressEvent::Section {
            section,
            phase,
            attempt,
            error,
            ..
        } => match phase {
            SectionPhase::Start => Some(format!("  {} {}", "…".dimmed(), section.title())),
            SectionPhase::End => Some(format!("  {} {}", "✓".green(), section.title())),
            SectionPhase::Retry => Some(format!(
                "  {} {} attempt {} failed: {}",
                "!".yellow(),
                section.title(),
                attempt.unwrap_or_default(),
                error.as_deref().unwrap_or("unknown error")
            )),
            SectionPhase::Delta => None,
        },
        ProgressEvent::Progress {
            current,
            total,
            percent,
            elapsed_ms,
            ..
        } => Some(format!(
            "  [{}/{}] {}% {:.1}s",
            current,
            total,
            percent,
            *elapsed_ms as f64 / 1000.0
        )),
        ProgressEvent::Error { message } => Some(format!("{} {}", "error:".red().bold(), message)),
        ProgressEvent::Targets { .. }
        | ProgressEvent::Delta { .. }
        | ProgressEvent::StructPlan { .. }
        | ProgressEvent::Final { .. } => None,
    }
}

/// Final document followed by any advisory problems.
pub fn format_document(doc: &GeneratedDocument) -> String {
    let mut out = String::new();
    out.push('\n');
    out.push_str(&doc.text);
    out.push('\n');
    if !doc.problems.is_empty() {
        out.push_str(&format!("\n{}\n", format_heading("Problems")));
        for problem in &doc.problems {
            out.push_str(&format!("  - {}\n", problem.yellow()));
        }
    }
    out
}

pub fn format_plan_text(plan: &DocumentPlan) -> String {
    let mut out = String::new();
    out.push_str(&format!("{}\n\n", format_heading(&plan.title)));
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Section", "Level", "Target", "Min", "Max", "Tables", "Figures"]);
    for section in &plan.sections {
        table.add_row(vec![
            section.title().to_string(),
            format!("H{}", section.section.level()),
            section.target_chars.to_string(),
            section.min_chars.to_string(),
            section.max_chars.to_string(),
            section.min_tables.to_string(),
            section.min_figures.to_string(),
        ]);
    }
    out.push_str(&format!("{}\n", table));
    out.push_str(&format!(
        "\n  Total budget: {} (allocated {})\n",
        plan.total_chars,
        plan.target_sum()
    ));
    if !plan.problems.is_empty() {
        out.push_str(&format!("\n{}\n", format_heading("Problems")));
        for problem in &plan.problems {
            out.push_str(&format!("  - {}\n", problem));
        }
    }
    out
}

pub fn format_plan_json(plan: &DocumentPlan) -> Result<String, ApiError> {
    let value = serde_json::json!({
        "title": plan.title,
        "total_chars": plan.total_chars,
        "sections": plan.budgets(),
        "struct_plan": plan.struct_plan,
        "problems": plan.problems,
    });
    serde_json::to_string_pretty(&value)
        .map_err(|e| ApiError::GenerationFailed(format!("plan encoding failed: {}", e)))
}

pub fn format_models(provider: &str, models: &[String]) -> String {
    let mut out = format!("{}\n\n", format_heading(&format!("Models ({})", provider)));
    if models.is_empty() {
        out.push_str("No models reported.\n");
        return out;
    }
    for model in models {
        out.push_str(&format!("  {}\n", model));
    }
    out
}

pub fn format_cache_stats(stats: &CacheStats) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Path", "Entries", "Max entries", "Size (bytes)", "TTL (s)"]);
    table.add_row(vec![
        stats
            .path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(temporary)".to_string()),
        stats.entries.to_string(),
        stats.max_entries.to_string(),
        stats.size_on_disk.to_string(),
        stats.ttl_secs.to_string(),
    ]);
    format!("{}\n\n{}", format_heading("Section cache"), table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::SectionToken;

    #[test]
    fn deltas_are_hidden_in_text_mode() {
        let token = SectionToken::h2("背景");
        assert!(format_event_line(&ProgressEvent::section_delta(&token, "x")).is_none());
        let line = format_event_line(&ProgressEvent::section_retry(&token, 1, "timeout")).unwrap();
        assert!(line.contains("attempt 1 failed: timeout"));
    }

    #[test]
    fn json_lines_are_tagged() {
        let line = format_event_json(&ProgressEvent::Error {
            message: "boom".to_string(),
        })
        .unwrap();
        assert_eq!(line, r#"{"event":"error","message":"boom"}"#);
    }
}
