//! Aggregates per-comment sentiment over a whole discussion thread.

use serde::Serialize;
use tracing::info;
use utoipa::ToSchema;

use crate::classifier::{SentimentClassifier, SentimentLabel, SentimentResult};
use crate::error::ApiError;
use crate::reddit::CommentCollector;

/// Label counts for one analyzed thread. The three counts always sum to
/// `total_comments_analyzed`, which equals the length of the comment list.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AnalysisSummary {
    pub post_title: String,
    pub total_comments_analyzed: usize,
    pub positive_count: usize,
    pub negative_count: usize,
    pub neutral_count: usize,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AnalyzedComment {
    pub text: String,
    pub author: String,
    pub label: SentimentLabel,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ThreadAnalysis {
    pub summary: AnalysisSummary,
    pub comments: Vec<AnalyzedComment>,
}

/// Fetches the thread behind `post_url` and classifies every collected
/// comment in order. A collector failure aborts the whole operation with no
/// partial result; classification failures never do, they fall back to
/// neutral inside `classify`.
pub async fn analyze_thread(
    collector: &CommentCollector,
    classifier: &SentimentClassifier,
    post_url: &str,
) -> Result<ThreadAnalysis, ApiError> {
    let thread = collector.fetch(post_url).await?;
    info!(
        title = %thread.title,
        comments = thread.comments.len(),
        backend = classifier.backend_name(),
        "classifying thread comments"
    );

    let mut comments = Vec::with_capacity(thread.comments.len());
    let mut positive = 0;
    let mut negative = 0;
    let mut neutral = 0;

    for collected in thread.comments {
        // The collector never emits empty bodies, so classify cannot reject
        // here; the guard keeps one comment from ever aborting the loop.
        let result = classifier
            .classify(&collected.text)
            .await
            .unwrap_or_else(|_| SentimentResult::fallback());

        match result.label {
            SentimentLabel::Positive => positive += 1,
            SentimentLabel::Negative => negative += 1,
            SentimentLabel::Neutral => neutral += 1,
        }
        comments.push(AnalyzedComment {
            text: collected.text,
            author: collected.author,
            label: result.label,
            score: result.score,
        });
    }

    info!(positive, negative, neutral, "thread analysis complete");

    Ok(ThreadAnalysis {
        summary: AnalysisSummary {
            post_title: thread.title,
            total_comments_analyzed: comments.len(),
            positive_count: positive,
            negative_count: negative,
            neutral_count: neutral,
        },
        comments,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::async_trait;

    use crate::classifier::{RawPrediction, SentimentBackend};
    use crate::lexicon::LexiconBackend;
    use crate::reddit::{CollectorError, CommentData, LinkData, Listing, RedditApi, Thing};

    struct StaticThread {
        title: &'static str,
        bodies: Vec<&'static str>,
        fail: bool,
    }

    #[async_trait]
    impl RedditApi for StaticThread {
        async fn submission(
            &self,
            post_id: &str,
        ) -> Result<(LinkData, Vec<Thing>), CollectorError> {
            if self.fail {
                return Err(CollectorError::Malformed("simulated outage".into()));
            }
            let link = LinkData {
                id: post_id.to_string(),
                title: self.title.to_string(),
                num_comments: self.bodies.len() as u64,
            };
            let forest = self
                .bodies
                .iter()
                .enumerate()
                .map(|(i, body)| {
                    Thing::Comment(CommentData {
                        id: format!("c{i}"),
                        body: body.to_string(),
                        author: Some(format!("user{i}")),
                        parent_id: format!("t3_{post_id}"),
                        replies: Listing::default(),
                    })
                })
                .collect();
            Ok((link, forest))
        }

        async fn more_children(
            &self,
            _post_id: &str,
            _children: &[String],
        ) -> Result<Vec<Thing>, CollectorError> {
            Ok(Vec::new())
        }

        async fn comment_subtree(
            &self,
            _post_id: &str,
            _comment_id: &str,
        ) -> Result<Vec<Thing>, CollectorError> {
            Ok(Vec::new())
        }
    }

    fn lexicon_classifier() -> SentimentClassifier {
        SentimentClassifier::new(Box::new(LexiconBackend::new()))
    }

    fn collector(api: StaticThread) -> CommentCollector {
        CommentCollector::new(Arc::new(api))
    }

    #[tokio::test]
    async fn test_counts_match_comment_list() {
        let api = StaticThread {
            title: "Mixed feelings",
            bodies: vec!["I love it", "I hate it", "meh, fine"],
            fail: false,
        };
        let classifier = lexicon_classifier();
        let analysis = analyze_thread(&collector(api), &classifier, "https://reddit.com/comments/abc")
            .await
            .unwrap();

        assert_eq!(analysis.summary.post_title, "Mixed feelings");
        assert_eq!(analysis.summary.positive_count, 1);
        assert_eq!(analysis.summary.negative_count, 1);
        assert_eq!(analysis.summary.neutral_count, 1);
        assert_eq!(analysis.summary.total_comments_analyzed, 3);
        assert_eq!(analysis.comments.len(), 3);
        assert_eq!(
            analysis.summary.positive_count
                + analysis.summary.negative_count
                + analysis.summary.neutral_count,
            analysis.summary.total_comments_analyzed
        );
    }

    #[tokio::test]
    async fn test_comment_order_is_preserved() {
        let api = StaticThread {
            title: "Ordering",
            bodies: vec!["first comment", "second comment", "third comment"],
            fail: false,
        };
        let classifier = lexicon_classifier();
        let analysis = analyze_thread(&collector(api), &classifier, "https://reddit.com/comments/abc")
            .await
            .unwrap();

        let texts: Vec<&str> = analysis.comments.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["first comment", "second comment", "third comment"]);
        assert_eq!(analysis.comments[0].author, "user0");
    }

    #[tokio::test]
    async fn test_backend_failures_fall_back_to_neutral() {
        struct AlwaysFails;

        #[async_trait]
        impl SentimentBackend for AlwaysFails {
            async fn predict(&self, _text: &str) -> anyhow::Result<RawPrediction> {
                anyhow::bail!("backend down")
            }

            fn name(&self) -> &'static str {
                "always-fails"
            }
        }

        let api = StaticThread {
            title: "Degraded",
            bodies: vec!["I love it", "I hate it"],
            fail: false,
        };
        let classifier = SentimentClassifier::new(Box::new(AlwaysFails));
        let analysis = analyze_thread(&collector(api), &classifier, "https://reddit.com/comments/abc")
            .await
            .unwrap();

        assert_eq!(analysis.summary.neutral_count, 2);
        assert_eq!(analysis.summary.total_comments_analyzed, 2);
        for comment in &analysis.comments {
            assert_eq!(comment.label, SentimentLabel::Neutral);
            assert_eq!(comment.score, 0.5);
        }
    }

    #[tokio::test]
    async fn test_collector_failure_aborts_with_no_partial_result() {
        let api = StaticThread {
            title: "Unreachable",
            bodies: vec!["never seen"],
            fail: true,
        };
        let classifier = lexicon_classifier();
        let err = analyze_thread(&collector(api), &classifier, "https://reddit.com/comments/abc")
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::Collector(_)));
    }
}
