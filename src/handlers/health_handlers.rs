//! Health & readiness handlers.
//!
//! - GET /healthz  -> simple liveness ("ok")
//! - GET /readyz   -> readiness that checks catalog connectivity

use crate::services::blob_store::BlobStore;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::collections::HashMap;

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
/// Readiness probe that runs a `SELECT 1` round-trip against the catalog.
/// HTTP 200 when it succeeds, HTTP 503 otherwise.
pub async fn readyz(State(store): State<BlobStore>) -> impl IntoResponse {
    let catalog = match store.ping().await {
        Ok(()) => CheckStatus {
            ok: true,
            error: None,
        },
        Err(err) => CheckStatus {
            ok: false,
            error: Some(err.to_string()),
        },
    };

    let overall_ok = catalog.ok;
    let mut checks = HashMap::new();
    checks.insert("catalog", catalog);

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
