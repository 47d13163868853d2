//! Cleanup of raw LLM replies into runnable Python.
//!
//! Models like to wrap code in Markdown fences, prepend "Here's the Python
//! code:" and append explanations. The pipeline below strips all of that:
//!
//! ```text
//! raw reply
//!     |  1. extract   python fence > first fence > code-looking lines > as-is
//!     |  2. normalize line endings
//!     |  3. drop leftover language tags, fence markers, <code> tags
//!     |  4. drop the provider's usual preface sentence
//!     v  5. trim
//! clean source
//! ```
//!
//! Every stage only removes text. `sanitize` repeats the pipeline until a
//! pass changes nothing, so its output is always a fixed point.

use std::sync::LazyLock;

use pulldown_cmark::{CodeBlockKind, Event, Parser, Tag, TagEnd};
use regex::Regex;

use crate::types::Provider;

/// Upper bound on pipeline passes. Real replies settle in two or three.
const MAX_PASSES: usize = 16;

/// Line prefixes that mark a line as Python when filtering prose.
const CODE_PREFIXES: &[&str] = &[
    "import ", "from ", "def ", "class ", "print(", "#", "if ", "for ", "while ", "try:",
    "except:", "finally:", "with ", "async ", "await ",
];

static PYTHON_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)```[ \t]*(?:python3?|py)[ \t]*\r?\n(.*?)```").expect("valid regex")
});
static ANY_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[\w+-]*[ \t]*\r?\n?(.*?)```").expect("valid regex")
});
static PYTHON_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^python[ \t]*$").expect("valid regex"));
static PYTHON_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^python:[ \t]*").expect("valid regex"));
static FENCE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*```[\w+-]*[ \t]*$").expect("valid regex"));
static CODE_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</?code>").expect("valid regex"));
static OPENAI_PREFACE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:here['’]s\s+(?:the|a)\s+)?python\s+code[^:\n]*:\s*").expect("valid regex")
});
static CLAUDE_PREFACE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^here['’]s\s+(?:a|the)\s+(?:python\s+)?(?:program|code)[^:\n]*:\s*")
        .expect("valid regex")
});

/// Turn a raw reply into clean Python source.
pub fn sanitize(raw: &str, provider: Provider) -> String {
    let mut current = raw.to_string();
    for _ in 0..MAX_PASSES {
        let next = format_code(&extract_python_code(&current), provider);
        if next == current {
            return next;
        }
        current = next;
    }
    tracing::debug!("sanitizer did not settle after {} passes", MAX_PASSES);
    current
}

/// Stage 1: pick the code out of a reply that may also contain prose.
pub fn extract_python_code(text: &str) -> String {
    if let Some(block) = find_fenced_block(text) {
        return block.trim().to_string();
    }
    filter_code_lines(text).unwrap_or_else(|| text.to_string())
}

/// Stages 2-5: scrub markup that survived extraction.
pub fn format_code(code: &str, provider: Provider) -> String {
    if code.is_empty() {
        return String::new();
    }
    let code = normalize_line_endings(code);
    let code = remove_markers(&code);
    let code = strip_preface(&code, provider);
    code.trim().to_string()
}

pub fn normalize_line_endings(code: &str) -> String {
    code.replace("\r\n", "\n").replace('\r', "\n")
}

fn remove_markers(code: &str) -> String {
    let code = PYTHON_LINE.replace_all(code, "");
    let code = PYTHON_PREFIX.replace_all(&code, "");
    let code = FENCE_LINE.replace_all(&code, "");
    let code = CODE_TAG.replace_all(&code, "");
    code.replace("```", "")
}

/// Remove one leading "Here's the Python code:" style sentence.
pub fn strip_preface(code: &str, provider: Provider) -> String {
    let preface = match provider {
        Provider::OpenAi | Provider::OpenAiCompatible => &OPENAI_PREFACE,
        Provider::Anthropic | Provider::GoogleGemini => &CLAUDE_PREFACE,
    };
    preface.replace(code, "").into_owned()
}

// --- Fenced blocks ---

fn is_python_tag(info: &str) -> bool {
    info.split_whitespace()
        .next()
        .map(|tag| {
            let tag = tag.to_ascii_lowercase();
            tag == "python" || tag == "python3" || tag == "py"
        })
        .unwrap_or(false)
}

/// Fenced blocks as CommonMark sees them, in document order.
fn markdown_blocks(text: &str) -> Vec<(String, String)> {
    let mut blocks = Vec::new();
    let mut current: Option<(String, String)> = None;

    for event in Parser::new(text) {
        match event {
            Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(info))) => {
                current = Some((info.into_string(), String::new()));
            }
            Event::Text(t) => {
                if let Some((_, body)) = current.as_mut() {
                    body.push_str(&t);
                }
            }
            Event::End(TagEnd::CodeBlock) => {
                if let Some(block) = current.take() {
                    blocks.push(block);
                }
            }
            _ => {}
        }
    }
    blocks
}

/// Find the block to keep: a python-tagged fence wins over an untagged one.
///
/// CommonMark only recognizes fences at the start of a line; the regexes
/// catch the ones models glue onto the end of a sentence.
fn find_fenced_block(text: &str) -> Option<String> {
    if !text.contains("```") && !text.contains("~~~") {
        return None;
    }
    let blocks = markdown_blocks(text);

    if let Some((_, body)) = blocks.iter().find(|(info, _)| is_python_tag(info)) {
        return Some(body.clone());
    }
    if let Some(caps) = PYTHON_FENCE.captures(text) {
        return Some(caps[1].to_string());
    }
    if let Some((_, body)) = blocks.into_iter().next() {
        return Some(body);
    }
    ANY_FENCE.captures(text).map(|caps| caps[1].to_string())
}

// --- Line heuristics ---

fn looks_like_code(trimmed: &str) -> bool {
    CODE_PREFIXES.iter().any(|p| trimmed.starts_with(*p)) || trimmed.contains(" = ")
}

/// Keep only the lines that look like Python.
///
/// Returns `None` when no line does; callers then keep the text as it is.
fn filter_code_lines(text: &str) -> Option<String> {
    let kept: Vec<&str> = text
        .lines()
        .filter(|line| looks_like_code(line.trim()))
        .collect();

    if kept.is_empty() {
        None
    } else {
        Some(kept.join("\n"))
    }
}
