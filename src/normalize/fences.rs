use regex::Regex;
use std::sync::LazyLock;

static INLINE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`{3,}").expect("valid fence regex"));

/// Removes code fences: fence-only lines (with an optional info string such
/// as `latex`) are dropped, fences embedded in prose are stripped.
pub(super) fn unwrap(text: &str) -> String {
    text.split('\n')
        .filter(|line| !is_fence_line(line))
        .map(|line| INLINE_FENCE.replace_all(line, "").into_owned())
        .collect::<Vec<_>>()
        .join("\n")
}

fn is_fence_line(line: &str) -> bool {
    let trimmed = line.trim();
    let Some(info) = trimmed.strip_prefix("```") else {
        return false;
    };
    info.trim_start_matches('`')
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '+' | '-' | '.' | '#'))
}
