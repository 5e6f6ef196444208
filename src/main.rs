mod analyzer;
mod api;
mod classifier;
mod config;
mod error;
mod lexicon;
mod model;
mod reddit;

use axum::{
    routing::{get, post},
    Router,
};
use dotenv::dotenv;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::root,
        api::health,
        api::analyze,
        api::batch_analyze,
        api::reddit_analyze
    ),
    components(
        schemas(
            api::AnalyzeRequest,
            api::BatchItem,
            api::BatchAnalyzeResponse,
            api::RedditAnalyzeRequest,
            api::HealthResponse,
            crate::classifier::SentimentLabel,
            crate::classifier::SentimentResult,
            crate::analyzer::AnalysisSummary,
            crate::analyzer::AnalyzedComment,
            crate::analyzer::ThreadAnalysis,
            crate::error::ErrorBody
        )
    ),
    tags(
        (name = "service", description = "Service status endpoints"),
        (name = "sentiment", description = "Text sentiment analysis"),
        (name = "reddit", description = "Discussion thread analysis")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    tracing_subscriber::fmt::init();

    let settings = config::Settings::from_env()?;
    let addr = settings.bind_addr();
    let state = Arc::new(api::AppState::new(settings)?);

    // Warm the classifier so the first request does not pay for model
    // download and load. A failed preload keeps the server running with
    // /health reporting unavailable, and a later request retries.
    match state.classifier().await {
        Ok(classifier) => {
            tracing::info!(backend = classifier.backend_name(), "classifier ready");
        }
        Err(e) => {
            tracing::error!("classifier preload failed: {e}");
        }
    }

    let app = Router::new()
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/", get(api::root))
        .route("/health", get(api::health))
        .route("/analyze", post(api::analyze))
        .route("/batch-analyze", post(api::batch_analyze))
        .route("/api/v1/reddit/analyze", post(api::reddit_analyze))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    println!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
