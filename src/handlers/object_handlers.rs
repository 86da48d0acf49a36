//! HTTP handlers for downloading and listing stored files.

use super::required;
use crate::{errors::AppError, state::AppState};
use axum::{
    Json,
    body::Body,
    extract::{Path, Query, State, rejection::QueryRejection},
    http::{HeaderValue, StatusCode, header},
    response::Response,
};
use base64::{Engine as _, engine::general_purpose};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    /// `base64` returns the payload base64-encoded as text.
    pub encoding: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListFilesQuery {
    pub folder: Option<String>,
}

/// `GET /files/{folder}/{*item}`: download one stored file.
pub async fn get_file(
    State(state): State<AppState>,
    Path((folder, item)): Path<(String, String)>,
    query: Result<Query<DownloadQuery>, QueryRejection>,
) -> Result<Response, AppError> {
    let Query(q) = query.map_err(|err| AppError::bad_request(err.body_text()))?;
    let key = format!("{}/{}", folder.trim_end_matches('/'), item);
    let bytes = state.objects.get_object(&key).await?;

    let (body, content_type) = match q.encoding.as_deref() {
        None | Some("raw") => (Body::from(bytes), "application/octet-stream"),
        Some("base64") => (
            Body::from(general_purpose::STANDARD.encode(&bytes)),
            "text/plain; charset=utf-8",
        ),
        Some(other) => {
            return Err(AppError::bad_request(format!(
                "unsupported encoding `{}` (expected `raw` or `base64`)",
                other
            )));
        }
    };

    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    Ok(response)
}

/// `GET /files?folder=`: names stored under a folder, prefix stripped.
pub async fn list_files(
    State(state): State<AppState>,
    query: Result<Query<ListFilesQuery>, QueryRejection>,
) -> Result<Json<Vec<String>>, AppError> {
    let Query(q) = query.map_err(|err| AppError::bad_request(err.body_text()))?;
    let folder = required(q.folder, "folder")?;
    tracing::info!(folder = %folder, "listing files");
    let names = state.objects.list_objects(&folder).await?;
    Ok(Json(names))
}
