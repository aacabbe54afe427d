use std::collections::HashSet;

use crate::normalize::is_pipe_row;

/// Drops every non-blank line whose exact text was already seen earlier in
/// the document. Table rows are kept even when repeated. Blank runs left
/// behind collapse to a single blank line.
pub fn dedupe_lines(text: &str) -> String {
    let mut seen = HashSet::new();
    let mut lines: Vec<&str> = Vec::new();

    for line in text.split('\n') {
        if line.trim().is_empty() {
            if lines.last().is_some_and(|last| !last.trim().is_empty()) {
                lines.push("");
            }
            continue;
        }
        if !is_pipe_row(line) && !seen.insert(md5::compute(line.as_bytes())) {
            continue;
        }
        lines.push(line);
    }
    while lines.last().is_some_and(|last| last.is_empty()) {
        lines.pop();
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_paragraph_is_dropped() {
        let text = "alpha\n\nbeta\n\nalpha\n\ngamma";
        assert_eq!(dedupe_lines(text), "alpha\n\nbeta\n\ngamma");
    }

    #[test]
    fn identical_lines_match_regardless_of_position() {
        let text = "x\n\ny\n\ny\n\nx";
        assert_eq!(dedupe_lines(text), "x\n\ny");
    }

    #[test]
    fn near_duplicates_survive() {
        let text = "alpha\n\nalpha \n\nAlpha";
        assert_eq!(dedupe_lines(text), text);
    }

    #[test]
    fn repeated_table_rows_are_kept() {
        let text = "| a | a |\n|---|---|\n| 1 | 1 |\n| 1 | 1 |";
        assert_eq!(dedupe_lines(text), text);
    }
}
