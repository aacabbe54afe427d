use pulldown_cmark::{Event, Options, Parser, Tag, html};
use regex::Regex;
use std::sync::LazyLock;

static DISPLAY_MATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\$([^$]+)\$\$").expect("valid display math regex"));
static INLINE_MATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$([^$\n]+)\$").expect("valid inline math regex"));
static BLANK_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid blank run regex"));

fn options() -> Options {
    Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH
}

/// HTML for the read-only view of a document. Math spans are left as text
/// for a client-side renderer.
pub fn render_html(document: &str) -> String {
    let mut output = String::new();
    html::push_html(&mut output, Parser::new_ext(document, options()));
    output
}

/// Text for the clipboard: markup, tables and math delimiters removed.
pub fn plain_text(document: &str) -> String {
    let mut output = String::new();
    let mut table_depth = 0usize;

    for event in Parser::new_ext(document, options()) {
        match event {
            Event::Start(Tag::Table(_)) => table_depth = table_depth.saturating_add(1),
            Event::End(Tag::Table(_)) => table_depth = table_depth.saturating_sub(1),
            _ if table_depth > 0 => {}
            Event::Text(text) | Event::Code(text) => output.push_str(&text),
            Event::SoftBreak | Event::HardBreak => output.push('\n'),
            Event::End(
                Tag::Paragraph
                | Tag::Heading(..)
                | Tag::CodeBlock(_)
                | Tag::Item
                | Tag::BlockQuote,
            ) => output.push_str("\n\n"),
            _ => {}
        }
    }

    let output = DISPLAY_MATH.replace_all(&output, |caps: &regex::Captures| {
        format!("\n{}\n", caps[1].trim())
    });
    let output = INLINE_MATH.replace_all(&output, "$1");
    BLANK_RUN.replace_all(&output, "\n\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tables_and_emphasis_render_as_html() {
        let html = render_html("Intro **unsure** *fixed*\n\n| a | b |\n|---|---|\n| 1 | 2 |");
        assert!(html.contains("<strong>unsure</strong>"));
        assert!(html.contains("<em>fixed</em>"));
        assert!(html.contains("<table>"));
        assert!(html.contains("<td>2</td>"));
    }

    #[test]
    fn suppressed_markers_are_not_lists() {
        let html = render_html("1.Item\n\n-dash");
        assert!(!html.contains("<ol>"));
        assert!(!html.contains("<ul>"));
    }

    #[test]
    fn plain_text_drops_markup_tables_and_math_delimiters() {
        let document = "Energy $E = mc^2$ is **key**.\n\n| a |\n|---|\n| 1 |\n\n$$a + b$$\n\nEnd *here*";
        assert_eq!(
            plain_text(document),
            "Energy E = mc^2 is key.\n\na + b\n\nEnd here"
        );
    }
}
