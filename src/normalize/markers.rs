use regex::Regex;
use std::sync::LazyLock;

use super::tables::PLACEHOLDER_OPEN;

static LEADING_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([ \t]*)(\d{1,9}[.)]|[-*+]|>+|#+)[ \t]+").expect("valid marker regex")
});

static ORPHAN_ORDINAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[ \t]*\d{1,9}[.)][ \t]*$").expect("valid ordinal regex"));

/// Keeps list, quote and heading markers from being rendered as structure.
///
/// The whitespace after a leading marker is removed (`1. Item` → `1.Item`,
/// `- x` → `-x`) until no line starts with a marker followed by whitespace.
/// A line holding only an ordinal is joined onto the next non-blank line,
/// unless that line opens a display formula or is a table placeholder.
pub(super) fn suppress(text: &str) -> String {
    join_orphan_ordinals(text)
        .iter()
        .map(|line| strip_markers(line))
        .collect::<Vec<_>>()
        .join("\n")
}

fn join_orphan_ordinals(text: &str) -> Vec<String> {
    let lines = text.split('\n').collect::<Vec<_>>();
    let mut output = Vec::with_capacity(lines.len());
    let mut index = 0;

    while index < lines.len() {
        let line = lines[index];
        if !ORPHAN_ORDINAL.is_match(line) {
            output.push(line.to_string());
            index += 1;
            continue;
        }
        let next = (index + 1..lines.len()).find(|&candidate| !lines[candidate].trim().is_empty());
        match next {
            Some(next) if joinable(lines[next]) => {
                output.push(format!("{}{}", line.trim_end(), lines[next].trim_start()));
                index = next + 1;
            }
            _ => {
                output.push(line.to_string());
                index += 1;
            }
        }
    }
    output
}

fn joinable(line: &str) -> bool {
    let trimmed = line.trim_start();
    !trimmed.starts_with("$$") && !trimmed.starts_with(PLACEHOLDER_OPEN)
}

fn strip_markers(line: &str) -> String {
    let mut current = line.to_string();
    loop {
        let next = LEADING_MARKER.replace(&current, "$1$2").into_owned();
        if next == current {
            return current;
        }
        current = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_whitespace_is_removed() {
        assert_eq!(suppress("1. Item"), "1.Item");
        assert_eq!(suppress("2) Item"), "2)Item");
        assert_eq!(suppress("- dash\n* star\n+ plus"), "-dash\n*star\n+plus");
        assert_eq!(suppress("> quote\n## heading"), ">quote\n##heading");
    }

    #[test]
    fn nested_markers_reach_a_fixpoint() {
        assert_eq!(suppress("# # nested"), "##nested");
        assert_eq!(suppress("  > > quoted"), "  >>quoted");
    }

    #[test]
    fn orphan_ordinal_joins_next_line() {
        assert_eq!(suppress("1.\n\nOrphaned ordinal"), "1.Orphaned ordinal");
    }

    #[test]
    fn orphan_ordinal_before_formula_stays() {
        assert_eq!(suppress("1.\n\n$$x$$"), "1.\n\n$$x$$");
    }

    #[test]
    fn mid_line_markers_are_untouched() {
        assert_eq!(suppress("value - 1. and # sign"), "value - 1. and # sign");
    }
}
