use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::state::AppState;

pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let documents: usize = state
        .catalog
        .snapshot()
        .await
        .values()
        .flat_map(|years| years.values())
        .map(|entries| entries.len())
        .sum();

    Json(json!({
        "status": "ok",
        "documents": documents,
    }))
}
