//! Markdown extraction: pull the document out of the model's raw reply.
//!
//! Models are told to answer with bare Markdown, but they frequently wrap it
//! in a ```` ```markdown ```` fence anyway, or in an unlabelled fence. A reply
//! which is already plain Markdown passes through untouched:
//!
//! 1. a fence tagged `markdown`/`md` wins, its interior is taken as-is;
//! 2. otherwise an unlabelled fence is unwrapped only if its interior looks
//!    like Markdown (heading, list item, bold, link or table row);
//! 3. otherwise the trimmed reply is kept.
//!
//! Runs of three or more newlines are then collapsed to a single blank line.

use once_cell::sync::Lazy;
use regex::Regex;

static RE_MARKDOWN_HINTS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?m)^#{1,6}\s+\S",        // heading
        r"(?m)^\s*[-*+]\s+\S",      // bullet
        r"(?m)^\s*\d+\.\s+\S",      // numbered list
        r"\*\*[^*\n]+\*\*",         // bold
        r"\[[^\]\n]+\]\([^)\n]+\)", // link
        r"(?m)^\s*\|.*\|\s*$",      // table row
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static RE_BLANK_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

/// Extract clean Markdown from raw model output.
///
/// Pure and infallible; an empty reply yields an empty string.
pub fn extract_markdown(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let body = unwrap_fence(trimmed).unwrap_or(trimmed);
    collapse_blank_lines(body)
}

/// One line of the reply, with its fence info string if it is a fence.
struct Line<'a> {
    start: usize,
    end: usize,
    fence: Option<&'a str>,
}

fn scan_lines(text: &str) -> Vec<Line<'_>> {
    let mut offset = 0;
    text.split_inclusive('\n')
        .map(|raw| {
            let start = offset;
            offset += raw.len();
            let content = raw.trim_end_matches(|c| c == '\n' || c == '\r');
            Line {
                start,
                end: start + content.len(),
                fence: content.trim().strip_prefix("```").map(str::trim),
            }
        })
        .collect()
}

fn is_markdown_tag(info: &str) -> bool {
    info.eq_ignore_ascii_case("markdown") || info.eq_ignore_ascii_case("md")
}

fn interior<'a>(text: &'a str, lines: &[Line<'_>], open: usize, close: usize) -> &'a str {
    text[lines[open].end..lines[close].start].trim()
}

fn unwrap_fence(text: &str) -> Option<&str> {
    let lines = scan_lines(text);

    // A tagged block closes at the last bare fence, so code blocks nested
    // inside the document do not truncate it.
    if let Some(open) = lines.iter().position(|l| l.fence.is_some_and(is_markdown_tag)) {
        if let Some(close) = lines.iter().rposition(|l| l.fence == Some("")) {
            if close > open {
                return Some(interior(text, &lines, open, close));
            }
        }
    }

    let (open, close) = first_plain_block(&lines)?;
    let body = interior(text, &lines, open, close);
    looks_like_markdown(body).then_some(body)
}

/// Line indices of the first unlabelled fenced block. Fences are paired in
/// order, so the closing fence of a tagged block never opens a new one.
fn first_plain_block(lines: &[Line<'_>]) -> Option<(usize, usize)> {
    let mut open: Option<(usize, bool)> = None;
    for (idx, line) in lines.iter().enumerate() {
        let Some(info) = line.fence else { continue };
        match open {
            None => open = Some((idx, info.is_empty())),
            Some((start, true)) if info.is_empty() => return Some((start, idx)),
            Some((_, false)) if info.is_empty() => open = None,
            Some(_) => {}
        }
    }
    None
}

/// `true` when `text` contains at least one common Markdown construct.
pub fn looks_like_markdown(text: &str) -> bool {
    RE_MARKDOWN_HINTS.iter().any(|re| re.is_match(text))
}

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_RUNS.replace_all(input, "\n\n").into_owned()
}

// ── Tests ────────────────────────────────────────────────────────────────────
