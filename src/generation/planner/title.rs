//! Document title resolution.

use regex::Regex;
use std::sync::OnceLock;

const MAX_TITLE_CHARS: usize = 40;

/// Request phrasing stripped from the front of a derived title.
const LEADING_VERBS: &[&str] = &[
    "请帮我", "帮我", "请", "麻烦", "写一篇", "写一份", "写一个", "写篇", "写份", "撰写", "生成", "编写",
    "起草", "关于", "有关", "please ", "write ", "draft ", "generate ", "create ", "a ", "an ",
    "the ", "about ", "on ",
];

fn quoted_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"[“"《「『]([^”"》」』]{2,60})[”"》」』]"#).expect("valid quoted regex")
    })
}

fn report_like_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"([A-Za-z0-9一-鿿][A-Za-z0-9一-鿿 \-]{1,60}?)\s*(?:报告|论文|方案|(?i:report|paper|proposal))",
        )
        .expect("valid report regex")
    })
}

fn strip_request_phrasing(raw: &str) -> String {
    let mut t = raw.trim().to_string();
    loop {
        let Some(verb) = LEADING_VERBS.iter().find(|v| {
            t.get(..v.len())
                .is_some_and(|head| head.eq_ignore_ascii_case(v))
        }) else {
            break;
        };
        t = t[verb.len()..].trim_start().to_string();
    }
    t.trim_end_matches('的').trim().to_string()
}

fn existing_heading(existing_text: &str) -> Option<String> {
    existing_text.lines().find_map(|line| {
        let line = line.trim();
        line.strip_prefix("# ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
    })
}

fn from_instruction(instruction: &str) -> Option<String> {
    if let Some(caps) = quoted_re().captures(instruction) {
        let quoted = caps[1].trim();
        if !quoted.is_empty() {
            return Some(quoted.to_string());
        }
    }

    for caps in report_like_re().captures_iter(instruction) {
        let topic = strip_request_phrasing(&caps[1]);
        let len = topic.chars().count();
        if (2..=MAX_TITLE_CHARS).contains(&len) {
            return Some(topic);
        }
    }

    let first = instruction
        .split(['。', '！', '？', '.', '!', '?', '\n'])
        .map(str::trim)
        .find(|s| !s.is_empty())?;
    let first = strip_request_phrasing(first);
    let len = first.chars().count();
    (2..=MAX_TITLE_CHARS).contains(&len).then_some(first)
}

/// Resolve the document title: explicit title, existing `# ` heading, instruction
/// heuristics, then a timestamped default.
pub fn resolve_title(explicit: Option<&str>, existing_text: &str, instruction: &str) -> String {
    if let Some(title) = explicit.map(str::trim).filter(|t| !t.is_empty()) {
        return title.to_string();
    }
    if let Some(title) = existing_heading(existing_text) {
        return title;
    }
    if let Some(title) = from_instruction(instruction) {
        return title;
    }
    format!("Document {}", chrono::Local::now().format("%Y-%m-%d %H:%M"))
}
