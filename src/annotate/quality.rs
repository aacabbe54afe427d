use regex::Regex;
use std::sync::LazyLock;

use crate::normalize::is_pipe_row;

static EMPHASIS_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*{3,}|_{3,}").expect("valid emphasis regex"));
static REPEATED_WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\S[ \t]{2,}\S").expect("valid whitespace regex"));
static HEADING_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[ \t]*#{2,}").expect("valid heading regex"));

/// Occurrences of degenerate output patterns. Table rows are skipped for the
/// whitespace check since aligned cells are padded on purpose.
pub fn count_error_patterns(text: &str) -> usize {
    text.split('\n')
        .map(|line| {
            let mut count = EMPHASIS_RUN.find_iter(line).count();
            if HEADING_RUN.is_match(line) {
                count += 1;
            }
            if !is_pipe_row(line) {
                count += REPEATED_WHITESPACE.find_iter(line).count();
            }
            count
        })
        .sum()
}

/// `1 − min(0.4, 0.1 × error patterns)`.
pub fn quality_score(text: &str) -> f64 {
    let penalty = 0.1 * count_error_patterns(text) as f64;
    1.0 - penalty.min(0.4)
}
