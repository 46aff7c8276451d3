//! API error type.
//!
//! Every handler returns `Result<_, ApiError>`. Errors render as
//! `{"error": "<message>"}` with the matching status code.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),

    #[error("storage failure: {0}")]
    Storage(StorageError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        ApiError::BadRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        ApiError::NotFound(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Storage(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Conflict(msg) | StorageError::InvalidState(msg) => {
                ApiError::BadRequest(msg)
            }
            StorageError::NotFound(what) => ApiError::NotFound(format!("Not found: {}", what)),
            other => ApiError::Storage(other),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

// Non-numeric ids never match a record
impl From<PathRejection> for ApiError {
    fn from(_: PathRejection) -> Self {
        ApiError::NotFound("Not found.".to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Storage(_) | ApiError::Internal(_) => {
                error!("Request failed: {}", self);
                "Internal server error".to_string()
            }
            ApiError::Unauthorized(msg) => {
                warn!("Rejected credentials: {}", msg);
                msg.clone()
            }
            ApiError::BadRequest(msg) | ApiError::NotFound(msg) => msg.clone(),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_errors_map_to_status() {
        let conflict: ApiError = StorageError::Conflict("taken".to_string()).into();
        assert_eq!(conflict.status(), StatusCode::BAD_REQUEST);

        let missing: ApiError = StorageError::NotFound("mission 4".to_string()).into();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let closed: ApiError =
            StorageError::InvalidState("Mission is not in progress".to_string()).into();
        assert_eq!(closed.status(), StatusCode::BAD_REQUEST);
        assert_eq!(closed.to_string(), "Mission is not in progress");

        let broken: ApiError = StorageError::InvalidData("bad status".to_string()).into();
        assert_eq!(broken.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_internal_details_hidden() {
        let response =
            ApiError::from(StorageError::InvalidData("secret detail".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["error"], "Internal server error");
    }
}
