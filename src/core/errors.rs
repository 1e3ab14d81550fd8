use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("catalog unavailable: {0}")]
    CatalogUnavailable(String),
    #[error("unknown document: {0}")]
    UnknownDocument(String),
    #[error("index load failed: {0}")]
    LoadFailure(String),
    #[error("answer generation failed: {0}")]
    AnswerGeneration(String),
    #[error("invalid path: {0}")]
    InvalidPath(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            ApiError::CatalogUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::UnknownDocument(_)
            | ApiError::InvalidPath(_)
            | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::LoadFailure(_) | ApiError::AnswerGeneration(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}
