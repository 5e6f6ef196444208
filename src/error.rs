//! Service error taxonomy and its HTTP mapping.
//!
//! Validation and capacity problems are rejected before any expensive work
//! and map to client errors. Collector failures abort thread analysis and map
//! to server errors. Per-item classification failures never appear here at
//! all: `classify` absorbs them into the neutral fallback result.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::reddit::CollectorError;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Empty, oversized, or otherwise malformed caller input.
    #[error("{0}")]
    Validation(String),

    /// Batch admission limit exceeded.
    #[error("batch size {size} exceeds the maximum of {limit} texts")]
    Capacity { size: usize, limit: usize },

    /// The classification backend could not be initialized.
    #[error("sentiment backend unavailable: {0}")]
    ClassifierInit(String),

    /// The requested operation is disabled by configuration.
    #[error("{0}")]
    Unsupported(String),

    /// Thread resolution or fetch failed; the whole analysis was aborted.
    #[error(transparent)]
    Collector(#[from] CollectorError),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::Capacity { .. } => StatusCode::BAD_REQUEST,
            ApiError::ClassifierInit(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Unsupported(_) => StatusCode::NOT_IMPLEMENTED,
            ApiError::Collector(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// JSON body returned for every error response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Human-readable failure description.
    pub detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("request failed: {}", self);
        }
        (
            status,
            Json(ErrorBody {
                detail: self.to_string(),
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::Validation("Text cannot be empty".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Capacity { size: 11, limit: 10 }.status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::ClassifierInit("download failed".into()).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::Unsupported("thread analysis disabled".into()).status(),
            StatusCode::NOT_IMPLEMENTED
        );
        assert_eq!(
            ApiError::Collector(CollectorError::InvalidUrl("not-a-url".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::Internal(anyhow::anyhow!("boom")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_capacity_message_names_both_numbers() {
        let msg = ApiError::Capacity { size: 11, limit: 10 }.to_string();
        assert!(msg.contains("11"));
        assert!(msg.contains("10"));
    }
}
