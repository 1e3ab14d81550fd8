use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::Response;
use bytes::Bytes;
use futures_util::stream;

use crate::core::errors::ApiError;
use crate::state::AppState;

/// Validate a PDF path relative to the pdf prefix. Anything that could step
/// outside the prefix is rejected before the object store is touched.
fn validate_rel_path(path: &str) -> Result<String, ApiError> {
    let norm = path.replace('\\', "/");
    if norm.trim().is_empty()
        || norm.starts_with('/')
        || norm.split('/').any(|segment| segment == "..")
    {
        return Err(ApiError::InvalidPath(path.to_string()));
    }
    Ok(norm)
}

/// Stream a PDF from the object store.
pub async fn serve_pdf(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
) -> Result<Response, ApiError> {
    let rel_path = validate_rel_path(&path)?;
    let key = format!(
        "{}/{}",
        state.settings.blob.pdf_prefix.trim_matches('/'),
        rel_path
    );

    if !state.blob.exists(&key).await? {
        return Err(ApiError::NotFound(format!("PDF not found: {}", rel_path)));
    }

    let rx = state.blob.stream(&key).await?;
    let body_stream = stream::unfold((rx, key), |(mut rx, key)| async move {
        match rx.recv().await {
            Some(Ok(bytes)) => Some((Ok::<Bytes, Infallible>(bytes), (rx, key))),
            Some(Err(e)) => {
                // Truncates the response; the client sees a short body.
                tracing::error!("streaming '{}' failed: {}", key, e);
                None
            }
            None => None,
        }
    });

    Response::builder()
        .header(header::CONTENT_TYPE, "application/pdf")
        .header(header::CACHE_CONTROL, "private, max-age=3600")
        .body(Body::from_stream(body_stream))
        .map_err(ApiError::internal)
}
