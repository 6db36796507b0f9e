//! Catalog handlers: search and manga page.

use super::SearchQuery;
use crate::api::AppState;
use crate::api::loopback::empty_not_found;
use axum::{
    Json,
    extract::{Path, Query, State, rejection::QueryRejection},
    response::{Html, IntoResponse, Response},
};

/// GET /search - Search manga by title
#[utoipa::path(
    get,
    path = "/search",
    tag = "catalog",
    params(SearchQuery),
    responses(
        (status = 200, description = "Search results", body = Vec<crate::catalog::SearchSummary>),
        (status = 404, description = "Missing or malformed parameters"),
        (status = 502, description = "Catalog request failed", body = crate::error::ApiError)
    )
)]
pub async fn search(
    State(state): State<AppState>,
    query: Result<Query<SearchQuery>, QueryRejection>,
) -> Response {
    let Ok(Query(query)) = query else {
        return empty_not_found();
    };

    match state
        .blocking(move |engine| engine.search(&query.q, query.max_results))
        .await
    {
        Ok(results) => Json(results).into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /manga/:id - HTML page for one manga
#[utoipa::path(
    get,
    path = "/manga/{id}",
    tag = "catalog",
    params(
        ("id" = String, Path, description = "MangaDex manga id")
    ),
    responses(
        (status = 200, description = "Manga page with embedded JSON metadata", content_type = "text/html"),
        (status = 502, description = "Catalog request failed", body = crate::error::ApiError)
    )
)]
pub async fn manga_page(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.blocking(move |engine| engine.manga_page(&id)).await {
        Ok(page) => Html(page).into_response(),
        Err(e) => e.into_response(),
    }
}
