use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::state::AppState;

pub async fn get_catalog(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.catalog.snapshot().await;
    Json((*snapshot).clone())
}

pub async fn get_categories(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.catalog.snapshot().await;
    let categories: Vec<String> = snapshot.keys().cloned().collect();
    Json(categories)
}

#[derive(Debug, Deserialize)]
pub struct YearsQuery {
    pub category: Option<String>,
}

pub async fn get_years(
    State(state): State<Arc<AppState>>,
    Query(params): Query<YearsQuery>,
) -> impl IntoResponse {
    let snapshot = state.catalog.snapshot().await;
    let years: Vec<String> = params
        .category
        .as_deref()
        .and_then(|category| snapshot.get(category))
        .map(|years| years.keys().cloned().collect())
        .unwrap_or_default();
    Json(years)
}

#[derive(Debug, Deserialize)]
pub struct DocsQuery {
    pub category: Option<String>,
    pub year: Option<String>,
}

pub async fn get_docs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DocsQuery>,
) -> impl IntoResponse {
    let snapshot = state.catalog.snapshot().await;
    let docs = match (params.category.as_deref(), params.year.as_deref()) {
        (Some(category), Some(year)) => snapshot
            .get(category)
            .and_then(|years| years.get(year))
            .cloned()
            .unwrap_or_default(),
        _ => Vec::new(),
    };
    Json(docs)
}

pub async fn refresh_catalog(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let count = state
        .catalog
        .refresh(
            state.blob.as_ref(),
            &state.settings.blob.vectorstore_prefix,
        )
        .await?;
    Ok(Json(json!({ "documents": count })))
}
