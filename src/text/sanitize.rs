//! Cleanup rules for model output and section titles.

use regex::Regex;
use std::sync::OnceLock;
use unicode_normalization::UnicodeNormalization;

/// Sections that never appear in generated documents.
const DISALLOWED_SECTIONS: &[&str] = &["摘要", "关键词", "目录", "abstract", "keywords", "table of contents"];

const ACK_SECTIONS: &[&str] = &["致谢", "鸣谢", "acknowledgements", "acknowledgments"];

/// Chat pleasantries that leak into drafts; whole lines containing them are dropped.
const BANNED_PHRASES: &[&str] = &[
    "如果您有任何",
    "如有任何",
    "您有任何",
    "需要进一步的信息",
    "需要进一步信息",
    "随时回来询问",
    "欢迎随时",
    "祝您",
    "期待着未来",
    "期待未来",
    "继续交流",
    "非常感谢",
    "感谢您",
    "不客气",
    "很高兴能为您提供帮助",
    "as an ai language model",
    "i hope this helps",
    "feel free to ask",
    "let me know if you",
];

fn heading_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*#{1,6}\s+(.+?)\s*#*\s*$").expect("valid heading regex"))
}

fn title_number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^\s*(?:第\s*[0-9一二三四五六七八九十百]+\s*[章节部分]\s*|[0-9]+(?:\.[0-9]+)*[.、)]?\s+|[一二三四五六七八九十]+\s*[、.]\s*|[(（][0-9一二三四五六七八九十]+[)）]\s*)",
        )
        .expect("valid numbering regex")
    })
}

fn list_prefix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(?:[-*\u{2022}]\s+|\d+[.)]\s*|\[\d+\]\s*)").expect("valid list regex")
    })
}

fn reference_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*\[\d+\]\s+.*(?:https?://|doi|出版社|journal|proceedings|\(\d{4}\)|,\s*\d{4})")
            .expect("valid reference regex")
    })
}

fn normalized(title: &str) -> String {
    title.nfkc().collect::<String>().trim().to_lowercase()
}

pub fn is_reference_section(title: &str) -> bool {
    let t = normalized(title);
    if t.is_empty() {
        return false;
    }
    t.contains("参考文献") || t.contains("参考资料") || t == "文献" || t.contains("references") || t == "bibliography"
}

pub fn is_acknowledgement_section(title: &str) -> bool {
    let t = normalized(&clean_section_title(title));
    ACK_SECTIONS.iter().any(|a| t == *a)
}

pub fn is_disallowed_section(title: &str) -> bool {
    let t = normalized(&clean_section_title(title));
    DISALLOWED_SECTIONS.iter().any(|d| t == *d)
}

/// Whether the instruction explicitly asks for an acknowledgements section.
pub fn wants_acknowledgement(instruction: &str) -> bool {
    let s = normalized(instruction);
    s.contains("致谢") || s.contains("鸣谢") || s.contains("acknowledg")
}

pub fn has_cjk(text: &str) -> bool {
    text.chars()
        .any(|c| ('\u{4e00}'..='\u{9fff}').contains(&c) || ('\u{3400}'..='\u{4dbf}').contains(&c))
}

/// Strip numbering ("第一章", "2.1", "三、"), markdown markers and trailing punctuation.
pub fn clean_section_title(title: &str) -> String {
    let t: String = title.nfkc().collect();
    let t = t.trim().trim_start_matches('#').trim();
    let t = title_number_re().replace(t, "");
    t.trim()
        .trim_matches(|c: char| matches!(c, '*' | '_' | '`'))
        .trim_end_matches(|c: char| matches!(c, ':' | '：' | '。' | '.' | '，' | ','))
        .trim()
        .to_string()
}

/// Remove code fences, emphasis markers and block quotes.
pub fn strip_markdown_noise(text: &str) -> String {
    text.lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .map(|line| {
            let line = line.trim_start_matches('>').trim_start_matches(' ');
            line.replace("**", "").replace("__", "")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Drop chat pleasantries and collapse runs of blank lines.
pub fn sanitize_output_text(text: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    let mut blank_run = 0usize;
    for line in text.lines() {
        let lower = line.to_lowercase();
        if BANNED_PHRASES.iter().any(|p| lower.contains(p)) {
            continue;
        }
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push(line.trim_end());
    }
    out.join("\n").trim().to_string()
}

/// Remove heading lines a model emitted inside a section body, including a restated
/// section title.
pub fn strip_inline_headings(text: &str, section_title: &str) -> String {
    let own = normalized(&clean_section_title(section_title));
    text.lines()
        .filter(|line| {
            if heading_line_re().is_match(line) {
                return false;
            }
            let plain = normalized(&clean_section_title(line));
            plain.is_empty() || plain != own
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Drop bibliography-style lines from prose sections; they belong in References.
pub fn strip_reference_like_lines(text: &str) -> String {
    text.lines()
        .filter(|line| {
            let t = line.trim();
            !(reference_line_re().is_match(t) || (is_reference_section(t) && t.chars().count() <= 12))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Normalize a reference list to `[n] entry` paragraphs.
pub fn format_references(text: &str) -> String {
    let cleaned = strip_markdown_noise(&text.replace('\r', ""));
    let mut entries: Vec<String> = Vec::new();
    for line in cleaned.lines() {
        let token = line.trim();
        if token.is_empty() || token.contains("引用格式") || token.contains("格式示例") {
            continue;
        }
        if heading_line_re().is_match(token)
            || (is_reference_section(token) && token.chars().count() <= 12)
        {
            continue;
        }
        let token = list_prefix_re().replace(token, "").trim().to_string();
        if token.is_empty() {
            continue;
        }
        let fragment = token.chars().count() <= 8
            || token.chars().all(|c| c.is_ascii_digit() || !c.is_alphanumeric());
        match entries.last_mut() {
            Some(last) if fragment => {
                let merged = format!("{} {}", last.trim_end_matches([',', '，']), token);
                *last = merged.trim().to_string();
            }
            _ => entries.push(token),
        }
    }
    entries
        .iter()
        .enumerate()
        .map(|(i, entry)| format!("[{}] {}", i + 1, entry))
        .collect::<Vec<_>>()
        .join("\n\n")
}
