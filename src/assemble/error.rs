use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum AssembleError {
    #[error("unknown file_id")]
    NotFound,

    #[error("chunk {0} missing from staging")]
    MissingChunk(u32),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl IntoResponse for AssembleError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AssembleError::NotFound => (StatusCode::NOT_FOUND, "not_found"),
            AssembleError::MissingChunk(_) => (StatusCode::BAD_REQUEST, "missing_chunk"),
            AssembleError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
            AssembleError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "io_error"),
        };

        let body = Json(json!({
            "error": self.to_string(),
            "code": code,
        }));

        (status, body).into_response()
    }
}

pub type AssembleResult<T> = std::result::Result<T, AssembleError>;
