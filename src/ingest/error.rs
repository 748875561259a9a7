use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("malformed input: {0}")]
    Malformed(String),

    #[error("checksum mismatch")]
    ChecksumMismatch,

    #[error("unknown file_id")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            IngestError::Malformed(_) => (StatusCode::BAD_REQUEST, "malformed_input"),
            IngestError::ChecksumMismatch => (StatusCode::BAD_REQUEST, "checksum_mismatch"),
            IngestError::NotFound => (StatusCode::NOT_FOUND, "not_found"),
            IngestError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            IngestError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
            IngestError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "io_error"),
        };

        let body = Json(json!({
            "error": self.to_string(),
            "code": code,
        }));

        (status, body).into_response()
    }
}

pub type IngestResult<T> = std::result::Result<T, IngestError>;
