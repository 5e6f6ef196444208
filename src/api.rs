//! Shared application state, request/response schemas, and HTTP handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, info};
use utoipa::ToSchema;

use crate::analyzer::{self, ThreadAnalysis};
use crate::classifier::{build_classifier, SentimentClassifier, SentimentResult};
use crate::config::Settings;
use crate::error::ApiError;
use crate::reddit::{CommentCollector, RedditClient};

/// Longest accepted input for analysis endpoints, in characters.
pub const MAX_TEXT_CHARS: usize = 2000;

/// Most texts accepted in one batch call.
pub const BATCH_LIMIT: usize = 10;

/// Echoed text in batch results is cut at this many characters.
const ECHO_CHARS: usize = 50;

pub struct AppState {
    pub settings: Settings,
    classifier: OnceCell<Arc<SentimentClassifier>>,
    collector: Option<CommentCollector>,
}

impl AppState {
    pub fn new(settings: Settings) -> anyhow::Result<Self> {
        let collector = if settings.reddit_enabled {
            let client = RedditClient::new(
                &settings.reddit_base_url,
                &settings.reddit_user_agent,
                settings.reddit_timeout,
            )?;
            Some(CommentCollector::new(Arc::new(client)))
        } else {
            None
        };

        Ok(AppState {
            settings,
            classifier: OnceCell::new(),
            collector,
        })
    }

    /// The process-wide classifier. The first caller pays for backend
    /// construction while concurrent callers await the same future; a failed
    /// construction leaves the cell empty so a later request can retry.
    pub async fn classifier(&self) -> Result<Arc<SentimentClassifier>, ApiError> {
        self.classifier
            .get_or_try_init(|| async {
                let classifier = build_classifier(&self.settings)
                    .await
                    .map_err(|e| ApiError::ClassifierInit(e.to_string()))?;
                Ok(Arc::new(classifier))
            })
            .await
            .cloned()
    }
}

// ============================================================================
// Schemas
// ============================================================================

#[derive(Debug, Deserialize, ToSchema)]
pub struct AnalyzeRequest {
    /// Text to classify, 1 to 2000 characters.
    pub text: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BatchItem {
    /// The submitted text, shortened for display.
    pub text: String,
    pub sentiment: SentimentResult,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BatchAnalyzeResponse {
    pub results: Vec<BatchItem>,
    pub count: usize,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RedditAnalyzeRequest {
    /// Full URL of the submission whose comments should be analyzed.
    pub post_url: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
    pub version: String,
}

// ============================================================================
// Handlers
// ============================================================================

#[utoipa::path(
    get,
    path = "/",
    responses((status = 200, description = "Service banner", body = HealthResponse)),
    tag = "service"
)]
pub async fn root(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        message: format!(
            "Sentiment Analysis API is running with the {} engine. Visit /docs for API documentation.",
            state.settings.engine.as_str()
        ),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Classifier ready", body = HealthResponse),
        (status = 503, description = "Classifier unavailable", body = crate::error::ErrorBody)
    ),
    tag = "service"
)]
pub async fn health(
    State(state): State<Arc<AppState>>,
) -> Result<Json<HealthResponse>, ApiError> {
    let classifier = state.classifier().await?;
    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        message: format!("{} backend ready", classifier.backend_name()),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }))
}

#[utoipa::path(
    post,
    path = "/analyze",
    request_body = AnalyzeRequest,
    responses(
        (status = 200, description = "Sentiment for the text", body = SentimentResult),
        (status = 400, description = "Empty or oversized text", body = crate::error::ErrorBody),
        (status = 503, description = "Classifier unavailable", body = crate::error::ErrorBody)
    ),
    tag = "sentiment"
)]
pub async fn analyze(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Json<SentimentResult>, ApiError> {
    validate_text(&request.text)?;
    let classifier = state.classifier().await?;

    info!(chars = request.text.chars().count(), "analyzing text sentiment");
    let result = classifier.classify(&request.text).await?;
    Ok(Json(result))
}

#[utoipa::path(
    post,
    path = "/batch-analyze",
    request_body = Vec<String>,
    responses(
        (status = 200, description = "Sentiment for every text, in order", body = BatchAnalyzeResponse),
        (status = 400, description = "Too many texts, or an empty item", body = crate::error::ErrorBody),
        (status = 503, description = "Classifier unavailable", body = crate::error::ErrorBody)
    ),
    tag = "sentiment"
)]
pub async fn batch_analyze(
    State(state): State<Arc<AppState>>,
    Json(texts): Json<Vec<String>>,
) -> Result<Json<BatchAnalyzeResponse>, ApiError> {
    // Admission control comes first, before any validation or model work.
    if texts.len() > BATCH_LIMIT {
        return Err(ApiError::Capacity {
            size: texts.len(),
            limit: BATCH_LIMIT,
        });
    }
    if texts.is_empty() || texts.iter().any(|t| t.trim().is_empty()) {
        return Err(ApiError::Validation("All texts must be non-empty".to_string()));
    }

    let classifier = state.classifier().await?;
    let mut results = Vec::with_capacity(texts.len());
    for (i, text) in texts.iter().enumerate() {
        debug!(item = i + 1, total = texts.len(), "analyzing batch item");
        let sentiment = classifier.classify(text).await?;
        results.push(BatchItem {
            text: echo(text),
            sentiment,
        });
    }

    let count = results.len();
    Ok(Json(BatchAnalyzeResponse { results, count }))
}

#[utoipa::path(
    post,
    path = "/api/v1/reddit/analyze",
    request_body = RedditAnalyzeRequest,
    responses(
        (status = 200, description = "Summary plus every analyzed comment", body = ThreadAnalysis),
        (status = 400, description = "Missing post URL", body = crate::error::ErrorBody),
        (status = 501, description = "Thread analysis disabled", body = crate::error::ErrorBody),
        (status = 500, description = "Thread could not be fetched", body = crate::error::ErrorBody)
    ),
    tag = "reddit"
)]
pub async fn reddit_analyze(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RedditAnalyzeRequest>,
) -> Result<Json<ThreadAnalysis>, ApiError> {
    if request.post_url.trim().is_empty() {
        return Err(ApiError::Validation("post_url must not be empty".to_string()));
    }
    let collector = state.collector.as_ref().ok_or_else(|| {
        ApiError::Unsupported("thread analysis is disabled on this deployment".to_string())
    })?;
    let classifier = state.classifier().await?;

    info!(post_url = %request.post_url, "thread analysis requested");
    let analysis = analyzer::analyze_thread(collector, &classifier, &request.post_url).await?;
    Ok(Json(analysis))
}

fn validate_text(text: &str) -> Result<(), ApiError> {
    if text.trim().is_empty() {
        return Err(ApiError::Validation("Text field cannot be empty".to_string()));
    }
    if text.chars().count() > MAX_TEXT_CHARS {
        return Err(ApiError::Validation(format!(
            "text exceeds the maximum length of {MAX_TEXT_CHARS} characters"
        )));
    }
    Ok(())
}

/// Shortens the echoed text to `ECHO_CHARS` characters plus an ellipsis,
/// leaving shorter texts untouched.
fn echo(text: &str) -> String {
    match text.char_indices().nth(ECHO_CHARS) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}
