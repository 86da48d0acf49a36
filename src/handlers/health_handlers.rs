//! Health & readiness handlers.
//!
//! - GET /healthz  -> simple liveness ("ok")
//! - GET /readyz   -> readiness that checks DB connectivity and blob store I/O

use crate::state::AppState;
use axum::{Json, body::Bytes, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

const PROBE_BODY: &[u8] = b"readyz";

/// `GET /healthz`
///
/// Very small liveness probe: always returns 200 OK with a plain JSON body.
/// This endpoint should be cheap and never perform I/O.
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
        }),
    )
}

/// `GET /readyz`
///
/// Readiness probe that:
/// 1. Runs a lightweight query against SQLite (`SELECT 1`).
/// 2. Performs a write/read/delete of a probe key against the blob store.
///
/// Returns JSON describing each check. HTTP 200 when all checks pass,
/// HTTP 503 when any check fails.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    // 1) SQLite check
    let sqlite_check = match sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(&*state.db)
        .await
    {
        Ok(1) => (true, None::<String>),
        Ok(v) => (false, Some(format!("unexpected result: {}", v))),
        Err(e) => (false, Some(format!("error: {}", e))),
    };

    // 2) Blob store put/get/delete check
    let probe_key = format!(".readyz/{}", Uuid::new_v4());
    let store_check = match state
        .store
        .put(&probe_key, Bytes::from_static(PROBE_BODY))
        .await
    {
        Ok(()) => match state.store.get(&probe_key).await {
            Ok(bytes) if bytes.as_ref() == PROBE_BODY => {
                match state.store.delete(&probe_key).await {
                    Ok(()) => (true, None::<String>),
                    Err(e) => (true, Some(format!("could not remove probe: {}", e))),
                }
            }
            Ok(_) => {
                let _ = state.store.delete(&probe_key).await;
                (false, Some("probe content mismatch".to_string()))
            }
            Err(e) => {
                let _ = state.store.delete(&probe_key).await;
                (false, Some(format!("could not read probe: {}", e)))
            }
        },
        Err(e) => (false, Some(format!("could not write probe: {}", e))),
    };

    let sqlite_ok = sqlite_check.0;
    let store_ok = store_check.0;
    let overall_ok = sqlite_ok && store_ok;

    let mut checks = HashMap::new();
    checks.insert(
        "sqlite",
        CheckStatus {
            ok: sqlite_ok,
            error: sqlite_check.1,
        },
    );
    checks.insert(
        state.store.backend_name(),
        CheckStatus {
            ok: store_ok,
            error: store_check.1,
        },
    );

    let body = ReadyResponse {
        status: if overall_ok {
            "ok".into()
        } else {
            "error".into()
        },
        checks,
    };

    let status = if overall_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: String,
    checks: HashMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}
