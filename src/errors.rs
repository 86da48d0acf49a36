use crate::services::{
    assembler::AssemblyError, auth::AuthError, blob_store::BlobError,
    chunk_writer::ChunkWriteError,
};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// A lightweight wrapper for request failures: status, stable code, message.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status, code and message.
    pub fn new(status: StatusCode, code: &'static str, msg: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", msg)
    }

    /// Shortcut for 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(code = self.code, "{}", self.message);
        }

        let body = Json(json!({
            "error": self.message,
            "code": self.code,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::internal(err.to_string())
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        AppError::new(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            format!("Unauthorized: {}", err),
        )
    }
}

impl From<BlobError> for AppError {
    fn from(err: BlobError) -> Self {
        match err {
            BlobError::NotFound(_) => AppError::not_found(err.to_string()),
            BlobError::InvalidKey(_) => AppError::bad_request(err.to_string()),
            BlobError::Io(_) => AppError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "storage_read_failed",
                err.to_string(),
            ),
        }
    }
}

impl From<ChunkWriteError> for AppError {
    fn from(err: ChunkWriteError) -> Self {
        AppError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "storage_write_failed",
            err.to_string(),
        )
    }
}

impl From<AssemblyError> for AppError {
    fn from(err: AssemblyError) -> Self {
        let status = match &err {
            AssemblyError::InvalidManifest(_)
            | AssemblyError::InvalidName(_)
            | AssemblyError::CountMismatch { .. } => StatusCode::BAD_REQUEST,
            AssemblyError::ChunksMissing { .. }
            | AssemblyError::InProgress(_)
            | AssemblyError::LeaseExpired(_) => StatusCode::CONFLICT,
            AssemblyError::StorageReadFailed { .. }
            | AssemblyError::StorageWriteFailed { .. }
            | AssemblyError::Lease(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError::new(status, err.code(), err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chunk::ChunkIndex;

    #[test]
    fn assembly_errors_map_to_distinct_codes() {
        let missing: AppError = AssemblyError::ChunksMissing {
            upload_id: "u".into(),
            indices: vec![ChunkIndex::new(2).unwrap()],
        }
        .into();
        assert_eq!(missing.status, StatusCode::CONFLICT);
        assert_eq!(missing.code, "chunk_missing");
        assert!(missing.message.contains("chunk(s) 2"));

        let busy: AppError = AssemblyError::InProgress("u".into()).into();
        assert_eq!(busy.status, StatusCode::CONFLICT);
        assert_eq!(busy.code, "assembly_in_progress");

        let expired: AppError = AssemblyError::LeaseExpired("u".into()).into();
        assert_eq!(expired.status, StatusCode::CONFLICT);
        assert_eq!(expired.code, "lease_expired");

        let bad_name: AppError = AssemblyError::InvalidName(
            crate::models::chunk::UploadId::new("a//b").unwrap_err(),
        )
        .into();
        assert_eq!(bad_name.status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn blob_not_found_is_404() {
        let err: AppError = BlobError::NotFound("a/b".into()).into();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert_eq!(err.code, "not_found");
    }
}
