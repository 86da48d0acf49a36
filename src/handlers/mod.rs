//! HTTP handlers. Each delegates to a service held in `AppState` and maps
//! service errors through `AppError`.

pub mod assembly_handlers;
pub mod health_handlers;
pub mod object_handlers;
pub mod upload_handlers;

use crate::{
    errors::AppError,
    models::{chunk::UploadId, manifest::MAX_CHUNKS},
};

/// Unwrap a required request field or fail with 400.
fn required<T>(value: Option<T>, field: &str) -> Result<T, AppError> {
    value.ok_or_else(|| {
        AppError::bad_request(format!("Bad Request: missing required parameter `{}`", field))
    })
}

/// Upload identifier for `file_key`, optionally inside `folder`.
fn upload_id(folder: Option<&str>, file_key: &str) -> Result<UploadId, AppError> {
    UploadId::scoped(folder.unwrap_or_default(), file_key)
        .map_err(|err| AppError::bad_request(err.to_string()))
}

/// Reject chunk counts above the manifest limit.
fn check_total(total_chunks: u32) -> Result<(), AppError> {
    if total_chunks > MAX_CHUNKS {
        return Err(AppError::bad_request(format!(
            "total_chunks {} exceeds the limit of {}",
            total_chunks, MAX_CHUNKS
        )));
    }
    Ok(())
}
