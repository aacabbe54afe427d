use regex::Regex;
use std::sync::LazyLock;

use super::tables::{PLACEHOLDER_CLOSE, PLACEHOLDER_OPEN};

static BACKSLASH_DELIMITER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\\{1,2}([()\[\]])").expect("valid delimiter regex")
});

/// Canonicalizes math delimiters.
///
/// `\(..\)` becomes `$..$` and `\[..\]` becomes `$$..$$`. A closed `$$..$$`
/// formula is trimmed, its internal line breaks are folded into spaces and it
/// is isolated into its own block. Stray `$` at either end of a display body
/// are dropped, and a block left empty is removed. A closed single-line
/// `$..$` is trimmed in place. A `$` whose would-be closing `$` is followed by
/// a digit is currency and left alone, as is any delimiter still waiting for
/// its closing half.
///
/// `\\` and `\$` are escapes and never open or close a formula. A body that
/// ends in a backslash keeps one trailing space so its closing delimiter is
/// not read as escaped on the next run.
pub(super) fn canonicalize(text: &str) -> String {
    let text = BACKSLASH_DELIMITER.replace_all(text, |caps: &regex::Captures| {
        match &caps[1] {
            "(" | ")" => "$",
            _ => "$$",
        }
        .to_string()
    });

    let bytes = text.as_bytes();
    let mut output = String::with_capacity(text.len());
    let mut last = 0;
    let mut index = 0;

    while index < bytes.len() {
        match bytes[index] {
            b'\\' if is_escape(bytes, index) => {
                index += 2;
            }
            b'$' if bytes.get(index + 1) == Some(&b'$') => {
                let Some(close) = find_block_close(&text, index + 2) else {
                    index += 2;
                    continue;
                };
                let folded = fold_lines(&text[index + 2..close]);
                let body =
                    closed_body(folded.trim_matches(|ch: char| ch == '$' || ch.is_whitespace()));

                output.push_str(&text[last..index]);
                output.truncate(output.trim_end().len());
                output.push_str("\n\n");
                if !body.is_empty() {
                    output.push_str("$$");
                    output.push_str(&body);
                    output.push_str("$$\n\n");
                }
                index = close + 2;
                while index < bytes.len() && bytes[index].is_ascii_whitespace() {
                    index += 1;
                }
                last = index;
            }
            b'$' => {
                let Some(close) = find_inline_close(bytes, index + 1) else {
                    index += 1;
                    continue;
                };
                output.push_str(&text[last..index]);
                output.push('$');
                output.push_str(&closed_body(text[index + 1..close].trim()));
                output.push('$');
                index = close + 1;
                last = index;
            }
            _ => index += 1,
        }
    }
    output.push_str(&text[last..]);
    output
}

fn is_escape(bytes: &[u8], index: usize) -> bool {
    bytes[index] == b'\\' && matches!(bytes.get(index + 1), Some(b'\\' | b'$'))
}

fn closed_body(body: &str) -> String {
    if body.ends_with('\\') {
        format!("{} ", body)
    } else {
        body.to_string()
    }
}

/// Position of the closing `$$`, unless a table placeholder sits in between.
fn find_block_close(text: &str, from: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut index = from;
    let close = loop {
        if index + 1 >= bytes.len() {
            return None;
        }
        if is_escape(bytes, index) {
            index += 2;
        } else if bytes[index] == b'$' && bytes[index + 1] == b'$' {
            break index;
        } else {
            index += 1;
        }
    };
    if text[from..close].contains([PLACEHOLDER_OPEN, PLACEHOLDER_CLOSE]) {
        return None;
    }
    Some(close)
}

fn find_inline_close(bytes: &[u8], from: usize) -> Option<usize> {
    let mut index = from;
    while index < bytes.len() {
        match bytes[index] {
            b'\n' => return None,
            b'\\' if is_escape(bytes, index) => index += 2,
            b'$' => {
                let next = bytes.get(index + 1);
                if next == Some(&b'$') || next.is_some_and(u8::is_ascii_digit) {
                    return None;
                }
                let inner = std::str::from_utf8(&bytes[from..index]).ok()?;
                if inner.trim().is_empty() {
                    return None;
                }
                return Some(index);
            }
            _ => index += 1,
        }
    }
    None
}

fn fold_lines(inner: &str) -> String {
    inner
        .split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backslash_delimiters_become_dollars() {
        assert_eq!(canonicalize("a \\(x\\) b"), "a $x$ b");
        assert_eq!(canonicalize("a \\\\(x\\\\) b"), "a $x$ b");
        assert_eq!(canonicalize("a \\[x\\] b"), "a\n\n$$x$$\n\nb");
    }

    #[test]
    fn block_formula_is_folded_and_isolated() {
        assert_eq!(
            canonicalize("see\n$$\n  x^2 +\n  y^2\n$$\nnext"),
            "see\n\n$$x^2 + y^2$$\n\nnext"
        );
    }

    #[test]
    fn inline_formula_is_trimmed() {
        assert_eq!(canonicalize("value $ a + b $ here"), "value $a + b$ here");
    }

    #[test]
    fn currency_is_left_alone() {
        assert_eq!(canonicalize("costs $5 or $10"), "costs $5 or $10");
        assert_eq!(canonicalize("from $ 5 to $10"), "from $ 5 to $10");
    }

    #[test]
    fn escaped_dollar_is_literal() {
        assert_eq!(canonicalize("a \\$ b \\$ c"), "a \\$ b \\$ c");
    }

    #[test]
    fn dangling_delimiters_are_untouched() {
        assert_eq!(canonicalize("start $$ x + y"), "start $$ x + y");
        assert_eq!(canonicalize("start $ x + y"), "start $ x + y");
        assert_eq!(canonicalize("a $\nb$"), "a $\nb$");
    }

    #[test]
    fn block_does_not_span_a_table_placeholder() {
        let text = format!("$$a\n{}0{}\nb$$", PLACEHOLDER_OPEN, PLACEHOLDER_CLOSE);
        assert_eq!(canonicalize(&text), text);
    }

    #[test]
    fn display_block_drops_wrapping_inline_dollars() {
        assert_eq!(canonicalize("\\[ $E = mc^2$ \\]"), "\n\n$$E = mc^2$$\n\n");
        assert_eq!(canonicalize("$$ $E = mc^2$ $$"), "\n\n$$E = mc^2$$\n\n");
        let once = canonicalize("$$ $E = mc^2$ $$");
        assert_eq!(canonicalize(&once), once);
    }

    #[test]
    fn empty_display_block_is_removed() {
        assert_eq!(canonicalize("a $$ $$ b"), "a\n\nb");
    }

    #[test]
    fn escaped_backslash_before_a_closing_delimiter() {
        let once = canonicalize("before $$a \\\\$$ after");
        assert_eq!(once, "before\n\n$$a \\\\ $$\n\nafter");
        assert_eq!(canonicalize(&once), once);
        assert_eq!(canonicalize("$a \\\\$ b"), "$a \\\\ $ b");
        assert_eq!(canonicalize("x \\$$ y"), "x \\$$ y");
    }
}
