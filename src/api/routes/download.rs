//! Archive download handler.

use crate::api::AppState;
use crate::error::Error;
use crate::jobs::JobKey;
use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use tokio_util::io::ReaderStream;

/// GET /download/:id - Stream a finished archive
#[utoipa::path(
    get,
    path = "/download/{id}",
    tag = "download",
    params(
        ("id" = String, Path, description = "Task id of a completed job")
    ),
    responses(
        (status = 200, description = "CBZ archive", content_type = "application/zip"),
        (status = 404, description = "No finished archive for this task", body = crate::error::ApiError)
    )
)]
pub async fn download(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let Some(key) = JobKey::parse(&id) else {
        return Error::NotFound(format!("artifact for task {}", id)).into_response();
    };

    let record = match state.blocking(move |engine| engine.locate(&key)).await {
        Ok(record) => record,
        Err(e) => return e.into_response(),
    };

    // The retention sweep may remove the file between locate and open
    let file = match tokio::fs::File::open(&record.file_path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Error::NotFound(format!("artifact for task {}", id)).into_response();
        }
        Err(e) => return Error::Io(e).into_response(),
    };

    tracing::debug!(task_id = %id, size_bytes = record.size_bytes, "streaming archive");

    let mut response = Body::from_stream(ReaderStream::new(file)).into_response();
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/zip"),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(record.size_bytes));
    if let Ok(value) = HeaderValue::from_str(&content_disposition(&record.display_name)) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    response
}

/// `attachment` disposition with an ASCII fallback and the UTF-8 name
fn content_disposition(file_name: &str) -> String {
    let fallback: String = file_name
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii() && !c.is_ascii_control() => c,
            _ => '_',
        })
        .collect();

    if fallback == file_name {
        format!("attachment; filename=\"{}\"", file_name)
    } else {
        format!(
            "attachment; filename=\"{}\"; filename*=UTF-8''{}",
            fallback,
            urlencoding::encode(file_name)
        )
    }
}
