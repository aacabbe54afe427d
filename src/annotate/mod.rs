//! Post-completion pass over a finished document: drops repeated lines, wraps
//! low-confidence spans in `**…**` and scores the overall quality.
//!
//! Runs once, after the stream ends. Nothing here runs mid-stream.

mod confidence;
mod dedup;
mod quality;

use serde::Serialize;
use std::io::Cursor;
use std::ops::Range;

use crate::settings::Settings;

pub use confidence::FeatureWeights;
pub use dedup::dedupe_lines;
pub use quality::{count_error_patterns, quality_score};

/// Expected mean span confidence for printed and handwritten material.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceFloors {
    pub printed: f64,
    pub handwritten: f64,
}

impl ConfidenceFloors {
    pub fn for_content(&self, handwritten: bool) -> f64 {
        if handwritten {
            self.handwritten
        } else {
            self.printed
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub base: f64,
    pub image_quality_factor: f64,
    pub content_type_factor: f64,
}

impl Thresholds {
    /// `base + image_quality_factor·[low quality] + content_type_factor·[handwritten]`
    pub fn effective(&self, context: ImageContext) -> f64 {
        let mut threshold = self.base;
        if context.low_quality {
            threshold += self.image_quality_factor;
        }
        if context.handwritten {
            threshold += self.content_type_factor;
        }
        threshold
    }
}

/// Marking is strict: a score equal to the threshold stays unmarked.
pub fn is_uncertain(score: f64, threshold: f64) -> bool {
    score > threshold
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImageContext {
    pub low_quality: bool,
    pub handwritten: bool,
}

impl ImageContext {
    /// Reads the image header for its dimensions; an image whose shorter side
    /// is below `min_side` pixels counts as low quality. Formats the decoder
    /// cannot size are treated as normal quality.
    pub fn inspect(bytes: &[u8], domain: Option<&str>, min_side: u32) -> Self {
        let low_quality = image::ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .ok()
            .and_then(|reader| reader.into_dimensions().ok())
            .is_some_and(|(width, height)| width.min(height) < min_side);
        Self {
            low_quality,
            handwritten: domain.is_some_and(is_handwritten_domain),
        }
    }
}

fn is_handwritten_domain(domain: &str) -> bool {
    let lower = domain.to_lowercase();
    ["handwrit", "hand-writ", "manuscript", "cursive", "手書き"]
        .iter()
        .any(|needle| lower.contains(needle))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationKind {
    Uncertain,
    Corrected,
}

/// Byte range of the emphasised content (markers excluded) in the final text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Annotation {
    pub span: Range<usize>,
    pub kind: AnnotationKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityReport {
    pub quality: f64,
    pub mean_confidence: f64,
    pub needs_review: bool,
    pub low_confidence: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnotatedDocument {
    pub text: String,
    pub annotations: Vec<Annotation>,
    pub report: QualityReport,
}

#[derive(Debug, Clone)]
pub struct Annotator {
    thresholds: Thresholds,
    floors: ConfidenceFloors,
    weights: FeatureWeights,
    min_quality_score: f64,
}

impl Annotator {
    pub fn new(settings: &Settings) -> Self {
        Self {
            thresholds: settings.thresholds,
            floors: settings.confidence,
            weights: FeatureWeights {
                stroke_complexity_ceiling: settings.stroke_complexity_ceiling,
                structure_anomaly_weight: settings.structure_anomaly_weight,
            },
            min_quality_score: settings.min_quality_score,
        }
    }

    pub fn annotate(&self, document: &str, context: ImageContext) -> AnnotatedDocument {
        let deduped = dedupe_lines(document);
        let quality = quality_score(&deduped);
        let threshold = self.thresholds.effective(context);
        let marked = confidence::mark(&deduped, &self.weights, threshold);

        let mean_confidence = if marked.confidences.is_empty() {
            1.0
        } else {
            marked.confidences.iter().sum::<f64>() / marked.confidences.len() as f64
        };
        AnnotatedDocument {
            text: marked.text,
            annotations: marked.annotations,
            report: QualityReport {
                quality,
                mean_confidence,
                needs_review: quality < self.min_quality_score,
                low_confidence: mean_confidence < self.floors.for_content(context.handwritten),
            },
        }
    }

    /// Score only, for the closing stream event.
    pub fn quality(&self, document: &str) -> f64 {
        quality_score(&dedupe_lines(document))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds() -> Thresholds {
        Thresholds {
            base: 0.6,
            image_quality_factor: 0.3,
            content_type_factor: 0.2,
        }
    }

    #[test]
    fn threshold_combines_factors() {
        let both = ImageContext {
            low_quality: true,
            handwritten: true,
        };
        let threshold = thresholds().effective(both);
        assert!((threshold - 1.1).abs() < 1e-9);
        assert!(!is_uncertain(1.05, threshold));
        assert!(is_uncertain(1.15, threshold));
    }

    #[test]
    fn threshold_without_context_is_base() {
        assert_eq!(thresholds().effective(ImageContext::default()), 0.6);
        assert!(!is_uncertain(0.6, 0.6));
    }

    #[test]
    fn handwriting_domains_are_recognized() {
        let context = ImageContext::inspect(b"not an image", Some("Handwritten notes"), 800);
        assert_eq!(
            context,
            ImageContext {
                low_quality: false,
                handwritten: true
            }
        );
        assert!(!ImageContext::inspect(b"", Some("invoice"), 800).handwritten);
    }

    #[test]
    fn small_images_are_low_quality() {
        let mut bytes = Vec::new();
        image::RgbImage::new(320, 1200)
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .expect("encode png");
        assert!(ImageContext::inspect(&bytes, None, 800).low_quality);
        assert!(!ImageContext::inspect(&bytes, None, 300).low_quality);
    }

    #[test]
    fn annotate_reports_review_and_confidence() {
        let annotator = Annotator::new(&Settings::default());
        let document = "Clean sentence here.\n\nClean sentence here.\n\n*fixed* and **unsure** words";
        let annotated = annotator.annotate(document, ImageContext::default());
        assert_eq!(
            annotated.text,
            "Clean sentence here.\n\n*fixed* and **unsure** words"
        );
        let kinds = annotated
            .annotations
            .iter()
            .map(|annotation| (&annotated.text[annotation.span.clone()], annotation.kind))
            .collect::<Vec<_>>();
        assert_eq!(
            kinds,
            vec![
                ("fixed", AnnotationKind::Corrected),
                ("unsure", AnnotationKind::Uncertain)
            ]
        );
        assert_eq!(annotated.report.quality, 1.0);
        assert!(!annotated.report.needs_review);
        assert!(!annotated.report.low_confidence);
    }

    #[test]
    fn degenerate_documents_need_review() {
        let annotator = Annotator::new(&Settings::default());
        let document = "***a***\n\n##bad\n\n###worse\n\nwide   gap";
        let annotated = annotator.annotate(document, ImageContext::default());
        assert!(annotated.report.quality < 0.7);
        assert!(annotated.report.needs_review);
        assert_eq!(annotator.quality(document), annotated.report.quality);
    }
}
