//! Keyword-based sentiment backend.
//!
//! A deterministic substitute for the transformer backend: counts fixed
//! positive and negative keywords (case-insensitive substring presence) and
//! maps the majority into a confidence score. It reports its predictions in
//! the five-star raw taxonomy so they flow through the exact same
//! normalization path as the model's output, which keeps the two backends
//! interchangeable for tests and offline operation.

use axum::async_trait;
use once_cell::sync::Lazy;

use crate::classifier::{RawPrediction, SentimentBackend};

static POSITIVE_KEYWORDS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "love", "good", "great", "excellent", "amazing", "wonderful", "fantastic", "awesome",
        "happy", "excited",
    ]
});

static NEGATIVE_KEYWORDS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "hate", "bad", "terrible", "awful", "horrible", "disappointing", "sad", "angry",
        "frustrated", "worst",
    ]
});

pub struct LexiconBackend;

impl LexiconBackend {
    pub fn new() -> Self {
        LexiconBackend
    }

    fn score(text: &str) -> RawPrediction {
        let lower = text.to_lowercase();
        // Each keyword counts at most once, however often it appears.
        let positive = POSITIVE_KEYWORDS.iter().filter(|w| lower.contains(**w)).count();
        let negative = NEGATIVE_KEYWORDS.iter().filter(|w| lower.contains(**w)).count();

        let (label, score) = if positive > negative {
            ("5 stars", 0.85 + 0.05 * positive as f32)
        } else if negative > positive {
            ("1 star", 0.80 + 0.05 * negative as f32)
        } else {
            ("3 stars", 0.60)
        };

        RawPrediction {
            label: label.to_string(),
            score,
        }
    }
}

#[async_trait]
impl SentimentBackend for LexiconBackend {
    async fn predict(&self, text: &str) -> anyhow::Result<RawPrediction> {
        Ok(Self::score(text))
    }

    fn name(&self) -> &'static str {
        "lexicon"
    }
}
