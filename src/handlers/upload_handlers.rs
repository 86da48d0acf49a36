//! Chunk upload and upload status handlers.

use super::{check_total, required, upload_id};
use crate::{
    errors::AppError,
    models::chunk::ChunkIndex,
    services::{auth::credential_from_header, chunk_writer::ChunkAck, object_access::ChunkStatus},
    state::AppState,
};
use axum::{
    Json,
    body::Bytes,
    extract::{Query, State, rejection::QueryRejection},
    http::{HeaderMap, header},
};
use serde::{Deserialize, Serialize};

/// Query accepted by `POST /upload`. The request body is the chunk payload.
#[derive(Debug, Deserialize)]
pub struct UploadChunkQuery {
    pub folder: Option<String>,
    pub file_key: Option<String>,
    pub chunk_number: Option<u32>,
    pub total_chunks: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct UploadChunkResponse {
    pub message: String,
    #[serde(flatten)]
    pub ack: ChunkAck,
    pub total_chunks: u32,
}

/// Query accepted by `GET /upload/status`.
#[derive(Debug, Deserialize)]
pub struct ChunkStatusQuery {
    pub folder: Option<String>,
    pub file_key: Option<String>,
    pub total_chunks: Option<u32>,
}

/// `POST /upload`: store one chunk of an upload.
///
/// Requires a valid `Authorization` credential. Re-sending a chunk with the
/// same number replaces the earlier payload.
pub async fn upload_chunk(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<UploadChunkQuery>, QueryRejection>,
    body: Bytes,
) -> Result<Json<UploadChunkResponse>, AppError> {
    let credential = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(credential_from_header)
        .unwrap_or_default();
    let identity = state.authorizer.verify(credential).await?;

    let Query(q) = query.map_err(|err| AppError::bad_request(err.body_text()))?;
    let file_key = required(q.file_key, "file_key")?;
    let chunk_number = required(q.chunk_number, "chunk_number")?;
    let total_chunks = required(q.total_chunks, "total_chunks")?;

    let index = ChunkIndex::new(chunk_number)
        .map_err(|err| AppError::bad_request(err.to_string()))?;
    check_total(total_chunks)?;
    if chunk_number > total_chunks {
        return Err(AppError::bad_request(format!(
            "chunk_number {} exceeds total_chunks {}",
            chunk_number, total_chunks
        )));
    }

    let upload_id = upload_id(q.folder.as_deref(), &file_key)?;
    let ack = state.writer.write_chunk(&upload_id, index, body).await?;

    tracing::debug!(
        principal = %identity.principal,
        upload_id = %upload_id,
        chunk = chunk_number,
        total_chunks,
        "chunk accepted"
    );

    Ok(Json(UploadChunkResponse {
        message: format!("Chunk {} uploaded successfully", chunk_number),
        ack,
        total_chunks,
    }))
}

/// `GET /upload/status`: which chunks of an upload are stored so far.
pub async fn chunk_status(
    State(state): State<AppState>,
    query: Result<Query<ChunkStatusQuery>, QueryRejection>,
) -> Result<Json<ChunkStatus>, AppError> {
    let Query(q) = query.map_err(|err| AppError::bad_request(err.body_text()))?;
    let file_key = required(q.file_key, "file_key")?;
    let total_chunks = required(q.total_chunks, "total_chunks")?;
    check_total(total_chunks)?;

    let upload_id = upload_id(q.folder.as_deref(), &file_key)?;
    let status = state.objects.chunk_status(&upload_id, total_chunks).await?;
    Ok(Json(status))
}
