//! Sentiment classification core.
//!
//! The classifier wraps one of two interchangeable backends (transformer
//! model or keyword lexicon) and owns everything the backends must not:
//! input validation, truncation, normalization of raw backend labels into
//! the canonical three-way taxonomy, and the neutral fallback that makes
//! `classify` total over non-empty input.

use axum::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::config::{EngineKind, Settings};
use crate::error::ApiError;
use crate::lexicon::LexiconBackend;
use crate::model::ModelBackend;

/// Inputs are cut to this many characters before they reach a backend.
pub const MAX_CLASSIFY_CHARS: usize = 512;

/// Canonical three-way sentiment taxonomy. Every backend's native label
/// scheme (star ratings, two-class polarity, five-level intensity) is
/// normalized into this set and nothing else ever crosses the API boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Negative,
    Neutral,
}

impl std::fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SentimentLabel::Positive => "positive",
            SentimentLabel::Negative => "negative",
            SentimentLabel::Neutral => "neutral",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SentimentResult {
    pub label: SentimentLabel,
    /// Confidence in `[0.0, 1.0]`.
    pub score: f32,
}

impl SentimentResult {
    /// Result used whenever a backend call fails: neutral at mid confidence.
    pub const fn fallback() -> Self {
        SentimentResult {
            label: SentimentLabel::Neutral,
            score: 0.5,
        }
    }
}

/// Un-normalized backend output, in whatever taxonomy the backend natively
/// speaks (e.g. `"5 stars"`, `"POSITIVE"`).
#[derive(Debug, Clone)]
pub struct RawPrediction {
    pub label: String,
    pub score: f32,
}

/// A raw sentiment prediction source. Implementations report their native
/// label scheme through [`RawPrediction`]; normalization happens in
/// [`SentimentClassifier`], never in a backend.
#[async_trait]
pub trait SentimentBackend: Send + Sync {
    async fn predict(&self, text: &str) -> anyhow::Result<RawPrediction>;

    fn name(&self) -> &'static str;
}

/// Maps a raw backend prediction onto the canonical taxonomy.
///
/// Precedence: an explicit positive marker or a 4/5 intensity wins, then an
/// explicit negative marker or a 1/2 intensity, then neutral. The same rule
/// applies to every backend so "5 stars", "POSITIVE" and "4 stars" all land
/// on the same label. Scores outside `[0, 1]` are clamped.
pub fn normalize(raw: RawPrediction) -> SentimentResult {
    let label_lc = raw.label.to_lowercase();
    let label = if label_lc.contains("positive") || label_lc.contains('4') || label_lc.contains('5')
    {
        SentimentLabel::Positive
    } else if label_lc.contains("negative") || label_lc.contains('1') || label_lc.contains('2') {
        SentimentLabel::Negative
    } else {
        SentimentLabel::Neutral
    };

    SentimentResult {
        label,
        score: raw.score.clamp(0.0, 1.0),
    }
}

/// Cuts `text` to at most `max` characters, never splitting a codepoint.
fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// The process-wide classifier. Constructed once at startup with whichever
/// backend the configuration selects and shared behind an `Arc` for the
/// lifetime of the process.
pub struct SentimentClassifier {
    backend: Box<dyn SentimentBackend>,
}

impl SentimentClassifier {
    pub fn new(backend: Box<dyn SentimentBackend>) -> Self {
        SentimentClassifier { backend }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Classifies one text. Total over non-empty input: a backend failure or
    /// malformed backend output degrades to [`SentimentResult::fallback`]
    /// with a warning log instead of propagating. The only error path is
    /// empty/whitespace input.
    pub async fn classify(&self, text: &str) -> Result<SentimentResult, ApiError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(ApiError::Validation("Text cannot be empty".to_string()));
        }

        let input = truncate_chars(trimmed, MAX_CLASSIFY_CHARS);
        if input.len() < trimmed.len() {
            warn!(
                limit = MAX_CLASSIFY_CHARS,
                original_chars = trimmed.chars().count(),
                "input truncated before classification"
            );
        }

        match self.backend.predict(input).await {
            Ok(raw) => Ok(normalize(raw)),
            Err(err) => {
                warn!(backend = self.backend.name(), "classification failed, using neutral fallback: {err:#}");
                Ok(SentimentResult::fallback())
            }
        }
    }
}

/// Builds the classifier the configuration asks for. Called exactly once per
/// process (through the `AppState` init cell); the model variant may take a
/// while on first run because it downloads the checkpoint.
pub async fn build_classifier(settings: &Settings) -> anyhow::Result<SentimentClassifier> {
    let classifier = match settings.engine {
        EngineKind::Model => {
            let backend =
                ModelBackend::load(&settings.model_repo, settings.inference_timeout).await?;
            SentimentClassifier::new(Box::new(backend))
        }
        EngineKind::Lexicon => SentimentClassifier::new(Box::new(LexiconBackend::new())),
    };
    info!(backend = classifier.backend_name(), "sentiment classifier ready");
    Ok(classifier)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedBackend {
        label: &'static str,
        score: f32,
    }

    #[async_trait]
    impl SentimentBackend for FixedBackend {
        async fn predict(&self, _text: &str) -> anyhow::Result<RawPrediction> {
            Ok(RawPrediction {
                label: self.label.to_string(),
                score: self.score,
            })
        }

        fn name(&self) -> &'static str {
            "fixed"
        }
    }

    struct FailingBackend;

    #[async_trait]
    impl SentimentBackend for FailingBackend {
        async fn predict(&self, _text: &str) -> anyhow::Result<RawPrediction> {
            anyhow::bail!("backend exploded")
        }

        fn name(&self) -> &'static str {
            "failing"
        }
    }

    fn norm(label: &str, score: f32) -> SentimentResult {
        normalize(RawPrediction {
            label: label.to_string(),
            score,
        })
    }

    #[test]
    fn test_normalize_star_taxonomy() {
        assert_eq!(norm("5 stars", 0.9).label, SentimentLabel::Positive);
        assert_eq!(norm("4 stars", 0.7).label, SentimentLabel::Positive);
        assert_eq!(norm("3 stars", 0.6).label, SentimentLabel::Neutral);
        assert_eq!(norm("2 stars", 0.7).label, SentimentLabel::Negative);
        assert_eq!(norm("1 star", 0.9).label, SentimentLabel::Negative);
    }

    #[test]
    fn test_normalize_two_class_taxonomy() {
        assert_eq!(norm("POSITIVE", 0.98).label, SentimentLabel::Positive);
        assert_eq!(norm("NEGATIVE", 0.97).label, SentimentLabel::Negative);
        assert_eq!(norm("mixed", 0.4).label, SentimentLabel::Neutral);
    }

    #[test]
    fn test_normalize_five_level_taxonomy() {
        assert_eq!(norm("Very Positive", 0.9).label, SentimentLabel::Positive);
        assert_eq!(norm("Very Negative", 0.9).label, SentimentLabel::Negative);
        assert_eq!(norm("Somewhat Neutral", 0.5).label, SentimentLabel::Neutral);
        assert_eq!(norm("LABEL_4", 0.8).label, SentimentLabel::Positive);
        assert_eq!(norm("LABEL_2", 0.8).label, SentimentLabel::Negative);
    }

    #[test]
    fn test_normalize_positive_marker_wins_over_digits() {
        // A label carrying both a positive marker and a low digit follows the
        // precedence order, not the digit.
        assert_eq!(norm("positive_2", 0.5).label, SentimentLabel::Positive);
    }

    #[test]
    fn test_normalize_clamps_score() {
        assert_eq!(norm("5 stars", 1.7).score, 1.0);
        assert_eq!(norm("1 star", -0.3).score, 0.0);
        assert_eq!(norm("3 stars", 0.6).score, 0.6);
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let text = "é".repeat(600);
        let cut = truncate_chars(&text, MAX_CLASSIFY_CHARS);
        assert_eq!(cut.chars().count(), MAX_CLASSIFY_CHARS);

        let short = "hello";
        assert_eq!(truncate_chars(short, MAX_CLASSIFY_CHARS), "hello");
    }

    #[tokio::test]
    async fn test_classify_rejects_empty_input() {
        let classifier = SentimentClassifier::new(Box::new(FixedBackend {
            label: "5 stars",
            score: 0.9,
        }));
        assert!(classifier.classify("").await.is_err());
        assert!(classifier.classify("   ").await.is_err());
        assert!(classifier.classify("\n\t").await.is_err());
    }

    #[tokio::test]
    async fn test_classify_normalizes_backend_output() {
        let classifier = SentimentClassifier::new(Box::new(FixedBackend {
            label: "1 star",
            score: 0.88,
        }));
        let result = classifier.classify("some text").await.unwrap();
        assert_eq!(result.label, SentimentLabel::Negative);
        assert!((result.score - 0.88).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_classify_absorbs_backend_failure() {
        let classifier = SentimentClassifier::new(Box::new(FailingBackend));
        let result = classifier.classify("this must not error").await.unwrap();
        assert_eq!(result, SentimentResult::fallback());
        assert_eq!(result.label, SentimentLabel::Neutral);
        assert!((result.score - 0.5).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_classify_truncates_long_input() {
        // The backend sees at most 512 characters regardless of input size.
        struct LenBackend;

        #[async_trait]
        impl SentimentBackend for LenBackend {
            async fn predict(&self, text: &str) -> anyhow::Result<RawPrediction> {
                assert!(text.chars().count() <= MAX_CLASSIFY_CHARS);
                Ok(RawPrediction {
                    label: "3 stars".to_string(),
                    score: 0.6,
                })
            }

            fn name(&self) -> &'static str {
                "len"
            }
        }

        let classifier = SentimentClassifier::new(Box::new(LenBackend));
        let long = "x".repeat(5000);
        let result = classifier.classify(&long).await.unwrap();
        assert_eq!(result.label, SentimentLabel::Neutral);
    }
}
