use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::header;
use axum::response::Response;
use axum::Json;
use bytes::Bytes;
use futures_util::stream::{self, StreamExt};
use serde::Deserialize;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub doc_id: Option<String>,
    pub question: Option<String>,
    #[serde(default = "default_streaming")]
    pub streaming: bool,
}

fn default_streaming() -> bool {
    true
}

/// Reject blank input before any retrieval work happens.
fn validate(payload: &AskRequest) -> Result<(String, String), ApiError> {
    let doc_id = payload
        .doc_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::BadRequest("missing doc_id".to_string()))?;
    let question = payload
        .question
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::BadRequest("missing question".to_string()))?;
    Ok((doc_id.to_string(), question.to_string()))
}

/// Answer a question about one document.
///
/// The response is newline-delimited JSON: one `meta` record, then content
/// as one-or-more `token` records. A model failure after the metadata has
/// gone out closes the stream early; it is logged here and never retried
/// (re-invoking a partially-consumed completion would duplicate output).
pub async fn ask_stream(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AskRequest>,
) -> Result<Response, ApiError> {
    let (doc_id, question) = validate(&payload)?;

    let (meta, rx) = state
        .answer
        .answer(&doc_id, &question, payload.streaming)
        .await?;

    let mut meta_record = serde_json::to_value(&meta).map_err(ApiError::internal)?;
    meta_record["type"] = json!("meta");
    let meta_line = format!("{}\n", meta_record);

    let tokens = stream::unfold((rx, doc_id), |(mut rx, doc_id)| async move {
        match rx.recv().await {
            Some(Ok(content)) => {
                let line = format!("{}\n", json!({ "type": "token", "content": content }));
                Some((Ok::<Bytes, Infallible>(Bytes::from(line)), (rx, doc_id)))
            }
            Some(Err(e)) => {
                tracing::error!("content stream for '{}' ended abnormally: {}", doc_id, e);
                None
            }
            None => None,
        }
    });

    let body = Body::from_stream(
        stream::once(async move { Ok::<Bytes, Infallible>(Bytes::from(meta_line)) }).chain(tokens),
    );

    Response::builder()
        .header(header::CONTENT_TYPE, "application/x-ndjson")
        .body(body)
        .map_err(ApiError::internal)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(doc_id: Option<&str>, question: Option<&str>) -> AskRequest {
        AskRequest {
            doc_id: doc_id.map(String::from),
            question: question.map(String::from),
            streaming: true,
        }
    }

    #[test]
    fn missing_doc_id_is_rejected() {
        let err = validate(&request(None, Some("what is the span limit?")));
        assert!(matches!(err, Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn blank_question_is_rejected() {
        let err = validate(&request(Some("ACI/2019/aci_318"), Some("   ")));
        assert!(matches!(err, Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn valid_payload_is_trimmed() {
        let (doc_id, question) =
            validate(&request(Some("ACI/2019/aci_318"), Some("  span limit?  ")))
                .expect("valid");
        assert_eq!(doc_id, "ACI/2019/aci_318");
        assert_eq!(question, "span limit?");
    }
}
