use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FootfallError {
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid matcher: {0}")]
    InvalidMatcher(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<duckdb::Error> for FootfallError {
    fn from(err: duckdb::Error) -> Self {
        FootfallError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for FootfallError {
    fn from(err: serde_json::Error) -> Self {
        FootfallError::Serialization(err.to_string())
    }
}

impl IntoResponse for FootfallError {
    fn into_response(self) -> Response {
        let status = match self {
            FootfallError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            FootfallError::InvalidMatcher(_) | FootfallError::Validation(_) => {
                StatusCode::BAD_REQUEST
            }
            FootfallError::Storage(_)
            | FootfallError::Configuration(_)
            | FootfallError::Serialization(_)
            | FootfallError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, FootfallError>;
