//! Incremental repair of partially-arrived transcription text.
//!
//! [`normalize`] is re-run from scratch over the whole raw buffer on every new
//! fragment, so every pass must be idempotent and the pipeline as a whole must
//! never un-render a table or closed formula it has already produced.
//!
//! Pass order is fixed:
//!
//! 1. tables are swapped for opaque placeholder lines,
//! 2. code fences are unwrapped,
//! 3. math delimiters are canonicalized,
//! 4. spurious list/heading/quote markers are suppressed,
//! 5. paragraph boundaries are normalized,
//! 6. tables are restored, each in its own block.

mod fences;
mod markers;
mod math;
mod paragraphs;
mod tables;

pub(crate) use tables::{is_pipe_row, is_separator_row};

/// A named `text -> text` rewrite. Passes run between table protection and
/// table restoration, in the order they appear in [`PROSE_PASSES`].
pub struct Pass {
    pub name: &'static str,
    pub apply: fn(&str) -> String,
}

pub const PROSE_PASSES: [Pass; 4] = [
    Pass {
        name: "fences",
        apply: fences::unwrap,
    },
    Pass {
        name: "math",
        apply: math::canonicalize,
    },
    Pass {
        name: "markers",
        apply: markers::suppress,
    },
    Pass {
        name: "paragraphs",
        apply: paragraphs::normalize,
    },
];

/// Normalizes the full raw buffer received so far.
pub fn normalize(raw: &str) -> String {
    let text = canonicalize_input(raw);
    let (text, tables) = tables::protect(&text);
    let text = PROSE_PASSES
        .iter()
        .fold(text, |text, pass| (pass.apply)(&text));
    tables.restore(&text).trim().to_string()
}

/// Line endings become `\n`; the placeholder sentinels are reserved and removed.
fn canonicalize_input(raw: &str) -> String {
    raw.replace("\r\n", "\n")
        .chars()
        .filter_map(|ch| match ch {
            '\r' => Some('\n'),
            tables::PLACEHOLDER_OPEN | tables::PLACEHOLDER_CLOSE => None,
            other => Some(other),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "| Item | Rate | Hours |\n|------|------|-------|\n| Copy | $50/hr | 4 |\n| Design | $50/hr | 2 |";

    fn samples() -> Vec<String> {
        vec![
            String::new(),
            "plain line".to_string(),
            "first\nsecond\n\n\n\nthird".to_string(),
            "1. Item\n2) Other\n- dash\n* star\n+ plus\n> quote\n## heading".to_string(),
            "1.\nOrphaned ordinal".to_string(),
            format!("Intro paragraph\n{}\nOutro paragraph", TABLE),
            "Energy \\(E = mc^2\\) and \\[ a + b \\] end".to_string(),
            "Block:\n$$\n  x^2 + y^2\n  = z^2\n$$\nafter".to_string(),
            "```python\nprint('hi')\n```\nprose".to_string(),
            "Price $5 and $10 today, formula $ a + b $ here".to_string(),
            "Dangling $$ x + y".to_string(),
            "$$a\n| h |\n|---|\nb$$".to_string(),
            "# # nested\n> > quote\n- - dash".to_string(),
            "line with trailing spaces   \n\tindented line".to_string(),
            "mixed\r\nline\rendings".to_string(),
            "1.\n\n$$x$$".to_string(),
            "text $$a$$ - item after".to_string(),
            "``` inline fence ``` mid".to_string(),
        ]
    }

    #[test]
    fn pipeline_is_idempotent() {
        for sample in samples() {
            let once = normalize(&sample);
            let twice = normalize(&once);
            assert_eq!(once, twice, "not idempotent for {:?}", sample);
        }
    }

    #[test]
    fn every_prose_pass_is_idempotent_on_its_own() {
        for sample in samples() {
            let (protected, _) = tables::protect(&canonicalize_input(&sample));
            for pass in &PROSE_PASSES {
                let once = (pass.apply)(&protected);
                let twice = (pass.apply)(&once);
                assert_eq!(once, twice, "pass {} not idempotent for {:?}", pass.name, sample);
            }
        }
    }

    #[test]
    fn numbered_marker_space_is_removed() {
        assert_eq!(normalize("1. Item"), "1.Item");
        assert_eq!(normalize("1.Item"), "1.Item");
    }

    #[test]
    fn table_between_prose_is_preserved_in_its_own_block() {
        let table = "| a | b |\n|---|---|\n| 1 | 2 |\n| 3 | 4 |";
        let raw = format!("Before the table.\n{}\nAfter the table.", table);
        let normalized = normalize(&raw);
        assert_eq!(
            normalized,
            format!("Before the table.\n\n{}\n\nAfter the table.", table)
        );
    }

    #[test]
    fn table_content_is_not_rewritten_by_later_passes() {
        let table = "| 1. Item | - x |\n|---|---|\n| $ a $ | # h |";
        let normalized = normalize(table);
        assert_eq!(normalized, table);
    }

    #[test]
    fn math_delimiters_are_canonicalized() {
        let normalized = normalize("Energy \\(E = mc^2\\) and\n\\[ a + b \\]");
        assert_eq!(normalized, "Energy $E = mc^2$ and\n\n$$a + b$$");
    }

    #[test]
    fn nested_and_mixed_math_settles_in_one_run() {
        assert_eq!(normalize("\\[ $E = mc^2$ \\]"), "$$E = mc^2$$");
        assert_eq!(normalize("$$ $E = mc^2$ $$"), "$$E = mc^2$$");
        for raw in [
            "\\[ $E = mc^2$ \\]",
            "Text \\[ $a$ + \\(b\\) \\] more $c$",
        ] {
            let once = normalize(raw);
            assert_eq!(normalize(&once), once, "not idempotent for {:?}", raw);
        }
    }

    #[test]
    fn fences_are_removed_before_math_is_paired() {
        assert_eq!(normalize("$- ```$"), "$-$");
        assert_eq!(normalize("$$$\n\\]"), "");
    }

    #[test]
    fn fences_are_stripped_to_prose() {
        let normalized = normalize("```latex\nx = 1\n```");
        assert_eq!(normalized, "x = 1");
    }

    #[test]
    fn input_sentinels_cannot_forge_placeholders() {
        let forged = format!("{}0{} text", tables::PLACEHOLDER_OPEN, tables::PLACEHOLDER_CLOSE);
        assert_eq!(normalize(&forged), "0 text");
    }

    const TOKENS: [&str; 15] = [
        "$", "$$", "\\[", "\\]", "\\(", "\\", "```", " ", "\n", "- ", "1.", "x", "5", "| a |",
        "|---|",
    ];

    /// Every concatenation of one to `max` tokens.
    fn token_sequences(max: usize) -> Vec<String> {
        let mut all = Vec::new();
        let mut frontier = vec![String::new()];
        for _ in 0..max {
            frontier = frontier
                .iter()
                .flat_map(|prefix| TOKENS.iter().map(move |token| format!("{}{}", prefix, token)))
                .collect();
            all.extend(frontier.iter().cloned());
        }
        all
    }

    #[test]
    fn generated_inputs_are_idempotent() {
        for raw in token_sequences(4) {
            let once = normalize(&raw);
            assert_eq!(normalize(&once), once, "pipeline not idempotent for {:?}", raw);

            let (protected, _) = tables::protect(&canonicalize_input(&raw));
            for pass in &PROSE_PASSES {
                let once = (pass.apply)(&protected);
                let twice = (pass.apply)(&once);
                assert_eq!(once, twice, "pass {} not idempotent for {:?}", pass.name, raw);
            }
        }
    }

    fn closed_formulas(text: &str) -> Vec<String> {
        text.split("\n\n")
            .filter(|block| block.starts_with("$$") && block.ends_with("$$") && block.len() >= 4)
            .map(str::to_string)
            .collect()
    }

    fn rendered_tables(text: &str) -> Vec<String> {
        text.split("\n\n")
            .filter(|block| {
                let lines = block.lines().collect::<Vec<_>>();
                lines.len() >= 2 && is_pipe_row(lines[0]) && is_separator_row(lines[1])
            })
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn appending_fragments_never_unrenders_structure() {
        let full = "Intro line\n| h1 | h2 |\n|----|----|\n| a | b |\n| c | d |\nBetween \\[ x^2 \\] text\n1. point\n$$ y = mx + b $$\nclosing words here";
        let chars = full.chars().collect::<Vec<_>>();
        let mut previous = normalize("");
        for end in 1..=chars.len() {
            let prefix = chars[..end].iter().collect::<String>();
            let current = normalize(&prefix);
            for formula in closed_formulas(&previous) {
                assert!(
                    current.contains(&formula),
                    "formula {:?} lost at prefix {:?}",
                    formula,
                    prefix
                );
            }
            let now_tables = rendered_tables(&current);
            for table in rendered_tables(&previous) {
                assert!(
                    now_tables.iter().any(|candidate| candidate.starts_with(&table)),
                    "table {:?} lost at prefix {:?}",
                    table,
                    prefix
                );
            }
            previous = current;
        }
    }
}
