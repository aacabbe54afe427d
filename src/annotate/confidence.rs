use regex::Regex;
use std::sync::LazyLock;

use super::{Annotation, AnnotationKind, is_uncertain};
use crate::normalize::is_pipe_row;

const RARE_CHARACTER_SCORE: f64 = 0.4;
const STROKE_SCORE: f64 = 0.5;
const ANOMALOUS_GLYPH_SCORE: f64 = 0.6;

const COMMON_PUNCTUATION: &str = ".,;:!?'\"()[]{}-–—/%&+=<>#@$€£¥°’‘“”…·、。，．・「」『』（）：；！？ー〜";

/// Spans the upstream already emphasised, and inline math; never re-scored.
static PROTECTED_SPAN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\*\*[^*\n]+\*\*|\*[^*\n]+\*|\$[^$\n]+\$").expect("valid span regex")
});

static WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\S+").expect("valid word regex"));

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureWeights {
    pub stroke_complexity_ceiling: f64,
    pub structure_anomaly_weight: f64,
}

impl FeatureWeights {
    pub fn max_score(&self) -> f64 {
        RARE_CHARACTER_SCORE + STROKE_SCORE + ANOMALOUS_GLYPH_SCORE + self.structure_anomaly_weight
    }

    /// Uncertainty of a single whitespace-delimited span. Higher is worse.
    pub fn score(&self, span: &str) -> f64 {
        let mut score = STROKE_SCORE * self.stroke_complexity(span);
        if span.chars().any(is_rare_character) {
            score += RARE_CHARACTER_SCORE;
        }
        if span.chars().any(is_anomalous_glyph) {
            score += ANOMALOUS_GLYPH_SCORE;
        }
        if has_structure_anomaly(span) {
            score += self.structure_anomaly_weight;
        }
        score
    }

    pub fn confidence(&self, score: f64) -> f64 {
        let max = self.max_score();
        if max <= 0.0 {
            return 1.0;
        }
        (1.0 - score / max).clamp(0.0, 1.0)
    }

    /// Character-class switches (case, digit, symbol) as a proxy for glyphs
    /// the recognizer may have confused, bounded by the ceiling and scaled
    /// into `0..=1`.
    fn stroke_complexity(&self, span: &str) -> f64 {
        let ceiling = self.stroke_complexity_ceiling.max(f64::EPSILON);
        (class_transitions(span) as f64).min(ceiling) / ceiling
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CharClass {
    Upper,
    Lower,
    Digit,
    Letter,
    Symbol,
}

fn classify(ch: char) -> CharClass {
    if ch.is_uppercase() {
        CharClass::Upper
    } else if ch.is_lowercase() {
        CharClass::Lower
    } else if ch.is_numeric() {
        CharClass::Digit
    } else if ch.is_alphabetic() {
        CharClass::Letter
    } else {
        CharClass::Symbol
    }
}

fn class_transitions(span: &str) -> usize {
    let classes = span.chars().map(classify).collect::<Vec<_>>();
    classes.windows(2).filter(|pair| pair[0] != pair[1]).count()
}

fn is_rare_character(ch: char) -> bool {
    !ch.is_alphanumeric() && !ch.is_whitespace() && !COMMON_PUNCTUATION.contains(ch)
}

fn is_anomalous_glyph(ch: char) -> bool {
    ch == '\u{FFFD}'
        || ch.is_control()
        || ('\u{E000}'..='\u{F8FF}').contains(&ch)
        || matches!(ch, '\u{200B}'..='\u{200D}' | '\u{FEFF}')
}

fn has_structure_anomaly(span: &str) -> bool {
    span.contains('*')
        || span
            .as_bytes()
            .windows(2)
            .any(|pair| pair[0] == pair[1] && b",;:".contains(&pair[0]))
}

fn is_display_formula(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.len() >= 4 && trimmed.starts_with("$$") && trimmed.ends_with("$$")
}

pub(super) struct Marked {
    pub(super) text: String,
    pub(super) annotations: Vec<Annotation>,
    pub(super) confidences: Vec<f64>,
}

struct Marker<'a> {
    weights: &'a FeatureWeights,
    threshold: f64,
    output: String,
    annotations: Vec<Annotation>,
    confidences: Vec<f64>,
}

impl Marker<'_> {
    fn push_run(&mut self, run: &str) {
        let mut last = 0;
        for word in WORD.find_iter(run) {
            self.output.push_str(&run[last..word.start()]);
            let score = self.weights.score(word.as_str());
            self.confidences.push(self.weights.confidence(score));
            if is_uncertain(score, self.threshold) {
                self.push_emphasis(word.as_str(), "**", AnnotationKind::Uncertain);
            } else {
                self.output.push_str(word.as_str());
            }
            last = word.end();
        }
        self.output.push_str(&run[last..]);
    }

    fn push_emphasis(&mut self, content: &str, marker: &str, kind: AnnotationKind) {
        self.output.push_str(marker);
        let start = self.output.len();
        self.output.push_str(content);
        self.annotations.push(Annotation {
            span: start..self.output.len(),
            kind,
        });
        self.output.push_str(marker);
    }

    fn push_protected(&mut self, span: &str) {
        if let Some(content) = span.strip_prefix("**").and_then(|rest| rest.strip_suffix("**")) {
            self.push_emphasis(content, "**", AnnotationKind::Uncertain);
        } else if let Some(content) = span.strip_prefix('*').and_then(|rest| rest.strip_suffix('*')) {
            self.push_emphasis(content, "*", AnnotationKind::Corrected);
        } else {
            self.output.push_str(span);
        }
    }
}

/// Scores every word outside tables, formulas and existing emphasis and wraps
/// the uncertain ones. Existing `**…**` and `*…*` spans are reported as
/// uncertain and corrected respectively.
pub(super) fn mark(text: &str, weights: &FeatureWeights, threshold: f64) -> Marked {
    let mut marker = Marker {
        weights,
        threshold,
        output: String::with_capacity(text.len()),
        annotations: Vec::new(),
        confidences: Vec::new(),
    };

    for (index, line) in text.split('\n').enumerate() {
        if index > 0 {
            marker.output.push('\n');
        }
        if is_pipe_row(line) || is_display_formula(line) {
            marker.output.push_str(line);
            continue;
        }
        let mut last = 0;
        for span in PROTECTED_SPAN.find_iter(line) {
            marker.push_run(&line[last..span.start()]);
            marker.push_protected(span.as_str());
            last = span.end();
        }
        marker.push_run(&line[last..]);
    }

    Marked {
        text: marker.output,
        annotations: marker.annotations,
        confidences: marker.confidences,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WEIGHTS: FeatureWeights = FeatureWeights {
        stroke_complexity_ceiling: 2.0,
        structure_anomaly_weight: 0.3,
    };

    #[test]
    fn plain_words_score_low() {
        assert_eq!(WEIGHTS.score("word"), 0.0);
        assert!(WEIGHTS.score("Hello,") <= 0.5);
        assert!(WEIGHTS.score("今日は、晴れ。") < 0.6);
    }

    #[test]
    fn stroke_proxy_is_bounded_by_ceiling() {
        assert_eq!(WEIGHTS.score("a1b2c3d4e5"), STROKE_SCORE);
    }

    #[test]
    fn anomalous_span_scores_high() {
        let score = WEIGHTS.score("w\u{FFFD}rd§");
        assert!(score > 1.0, "score was {}", score);
        assert!(WEIGHTS.confidence(score) < 0.5);
    }

    #[test]
    fn uncertain_word_is_wrapped_and_annotated() {
        let marked = mark("good w\u{FFFD}rd§ here", &WEIGHTS, 0.6);
        assert_eq!(marked.text, "good **w\u{FFFD}rd§** here");
        assert_eq!(marked.annotations.len(), 1);
        assert_eq!(&marked.text[marked.annotations[0].span.clone()], "w\u{FFFD}rd§");
        assert_eq!(marked.annotations[0].kind, AnnotationKind::Uncertain);
        assert_eq!(marked.confidences.len(), 3);
    }

    #[test]
    fn tables_formulas_and_inline_math_are_skipped() {
        let text = "| w\u{FFFD}rd§ |\n|---|\n\n$$ x§\u{FFFD} $$\n\nsee $a§\u{FFFD}b$ ok";
        let marked = mark(text, &WEIGHTS, 0.6);
        assert_eq!(marked.text, text);
        assert!(marked.annotations.is_empty());
    }

    #[test]
    fn existing_emphasis_becomes_annotations() {
        let marked = mark("*fixed* then **unsure**", &WEIGHTS, 0.6);
        assert_eq!(marked.text, "*fixed* then **unsure**");
        let kinds = marked
            .annotations
            .iter()
            .map(|annotation| annotation.kind)
            .collect::<Vec<_>>();
        assert_eq!(kinds, vec![AnnotationKind::Corrected, AnnotationKind::Uncertain]);
    }
}
