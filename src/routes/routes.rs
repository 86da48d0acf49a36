//! Defines routes for chunk upload, assembly, and file access.
//!
//! ## Structure
//! - **Upload endpoints**
//!   - `POST /upload?folder=&file_key=&chunk_number=&total_chunks=`: store one chunk
//!   - `GET  /upload/status?folder=&file_key=&total_chunks=`: received/missing chunks
//!
//! - **Assembly endpoint**
//!   - `POST /assemble`: concatenate chunks into the published file
//!
//! - **File endpoints**
//!   - `GET  /files?folder=`: list names under a folder
//!   - `GET  /files/{folder}/{*item}`: download one file
//!
//! The wildcard `*item` allows nested names like `2025/report.pdf`.

use crate::{
    handlers::{
        assembly_handlers::assemble,
        health_handlers::{healthz, readyz},
        object_handlers::{get_file, list_files},
        upload_handlers::{chunk_status, upload_chunk},
    },
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderName, HeaderValue, Method, header},
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};

const ALLOWED_METHODS: &str = "OPTIONS,POST,GET";
const ALLOWED_HEADERS: &str = "Content-Type";

/// Build and return the router for all API routes.
///
/// The router carries shared state (`AppState`) to all handlers.
pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // Upload routes
        .route("/upload", post(upload_chunk))
        .route("/upload/status", get(chunk_status))
        // Assembly
        .route("/assemble", post(assemble))
        // File routes
        .route("/files", get(list_files))
        .route("/files/{folder}/{*item}", get(get_file))
}

/// The complete application: routes, state, request limits, tracing and
/// cross-origin headers for browser clients.
pub fn app(state: AppState, max_body_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::OPTIONS, Method::POST, Method::GET])
        .allow_headers([header::CONTENT_TYPE]);

    routes()
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(SetResponseHeaderLayer::if_not_present(
            HeaderName::from_static("access-control-allow-methods"),
            HeaderValue::from_static(ALLOWED_METHODS),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            HeaderName::from_static("access-control-allow-headers"),
            HeaderValue::from_static(ALLOWED_HEADERS),
        ))
        .layer(cors)
        .with_state(state)
}
