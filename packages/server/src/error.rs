use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use common::storage::StorageError;
use serde::Serialize;

use crate::assets::{AssetError, StoreError};

/// Structured error response returned by all endpoints on failure.
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorBody {
    /// Machine-readable error code. One of: `VALIDATION_ERROR`, `NOT_FOUND`,
    /// `PROCESSING_FAILED`, `SERVICE_UNAVAILABLE`, `INTERNAL_ERROR`.
    #[schema(example = "VALIDATION_ERROR")]
    pub code: &'static str,
    /// Human-readable error description.
    #[schema(example = "Missing 'image' field")]
    pub message: String,
}

/// Application-level error type.
#[derive(Debug)]
pub enum AppError {
    Validation(String),
    NotFound(String),
    /// The transform rejected the image.
    ProcessingFailed(String),
    /// A backing store could not be reached.
    Unavailable(String),
    Internal(String),
}

impl AppError {
    fn status_and_body(self) -> (StatusCode, ErrorBody) {
        match self {
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    code: "VALIDATION_ERROR",
                    message: msg,
                },
            ),
            AppError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                ErrorBody {
                    code: "NOT_FOUND",
                    message: msg,
                },
            ),
            AppError::ProcessingFailed(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorBody {
                    code: "PROCESSING_FAILED",
                    message: msg,
                },
            ),
            AppError::Unavailable(detail) => {
                tracing::warn!("Store unavailable: {}", detail);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    ErrorBody {
                        code: "SERVICE_UNAVAILABLE",
                        message: "A backing service is unavailable, try again later".into(),
                    },
                )
            }
            AppError::Internal(detail) => {
                tracing::error!("Internal error: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody {
                        code: "INTERNAL_ERROR",
                        message: "An unexpected error occurred".into(),
                    },
                )
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = self.status_and_body();
        (status, Json(body)).into_response()
    }
}

impl From<AssetError> for AppError {
    fn from(err: AssetError) -> Self {
        match err {
            AssetError::Validation(msg) => AppError::Validation(msg),
            AssetError::NotFound(id) => AppError::NotFound(format!("Image '{id}' not found")),
            AssetError::Transform(e) => AppError::ProcessingFailed(e.to_string()),
            // A blob the record points at is gone; the record is stale, not the request.
            AssetError::TransientStore(StoreError::Blob(StorageError::NotFound(key))) => {
                AppError::Internal(format!("blob {key} missing"))
            }
            AssetError::TransientStore(e) => AppError::Unavailable(e.to_string()),
            e @ AssetError::Consistency { .. } => AppError::Internal(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::transform::TransformError;

    fn status_of(err: AssetError) -> (StatusCode, &'static str) {
        let (status, body) = AppError::from(err).status_and_body();
        (status, body.code)
    }

    #[test]
    fn test_asset_errors_map_to_codes() {
        assert_eq!(
            status_of(AssetError::Validation("empty".into())),
            (StatusCode::BAD_REQUEST, "VALIDATION_ERROR")
        );
        assert_eq!(
            status_of(AssetError::NotFound(Uuid::nil())),
            (StatusCode::NOT_FOUND, "NOT_FOUND")
        );
        assert_eq!(
            status_of(AssetError::Transform(TransformError::UnsupportedFormat(
                "text/plain".into()
            ))),
            (StatusCode::UNPROCESSABLE_ENTITY, "PROCESSING_FAILED")
        );
        assert_eq!(
            status_of(AssetError::TransientStore(StoreError::Blob(
                StorageError::Unavailable("down".into())
            ))),
            (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE")
        );
        assert_eq!(
            status_of(AssetError::consistency(
                Uuid::nil(),
                StorageError::Unavailable("down".into())
            )),
            (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
        );
    }
}
