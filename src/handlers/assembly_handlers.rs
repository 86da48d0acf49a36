//! Assembly handler.
//!
//! Two request shapes share `POST /assemble`:
//! - `files_name` present: batch mode. Names like `report.pdf._part_2`
//!   are grouped by logical file and each file is assembled on its own.
//! - otherwise: one upload, `file_key` with `total_chunks`.

use super::{check_total, required, upload_id};
use crate::{
    errors::AppError,
    models::{
        assembly::{AssemblyOutcome, GroupReport},
        manifest::Manifest,
    },
    state::AppState,
};
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct AssembleRequest {
    pub folder: Option<String>,
    pub file_key: Option<String>,
    pub total_chunks: Option<u32>,
    pub files_name: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
struct AssembledResponse {
    message: &'static str,
    #[serde(flatten)]
    outcome: AssemblyOutcome,
}

#[derive(Debug, Serialize)]
struct BatchResponse {
    message: &'static str,
    folder: String,
    results: Vec<GroupReport>,
}

/// `POST /assemble`
///
/// Single mode answers 200 on success and the mapped error status otherwise.
/// Batch mode answers 200 when every file assembled and 207 when any failed;
/// the body carries one result per file either way.
pub async fn assemble(
    State(state): State<AppState>,
    payload: Result<Json<AssembleRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(req) = payload.map_err(|err| AppError::bad_request(err.body_text()))?;

    if let Some(files_name) = req.files_name {
        let folder = required(req.folder, "folder")?;
        let results = state
            .assembler
            .assemble_batch(&folder, &files_name, req.total_chunks)
            .await?;

        let all_ok = results.iter().all(GroupReport::is_ok);
        let (status, message) = if all_ok {
            (StatusCode::OK, "File assembled successfully and stored")
        } else {
            (StatusCode::MULTI_STATUS, "Some files could not be assembled")
        };
        let body = BatchResponse {
            message,
            folder,
            results,
        };
        return Ok((status, Json(body)).into_response());
    }

    let file_key = required(req.file_key, "file_key")?;
    let total_chunks = required(req.total_chunks, "total_chunks")?;
    check_total(total_chunks)?;

    let upload_id = upload_id(req.folder.as_deref(), &file_key)?;
    let outcome = state
        .assembler
        .assemble(&upload_id, &Manifest::Count(total_chunks))
        .await?;

    let message = match outcome {
        AssemblyOutcome::Assembled { .. } => "File assembled successfully and stored",
        AssemblyOutcome::AlreadyAssembled { .. } => "File was already assembled",
    };
    Ok(Json(AssembledResponse { message, outcome }).into_response())
}
