// Copyright (c) 2026 Fleetkeeper Maintainers
// SPDX-License-Identifier: AGPL-3.0
//! Probe Server
//!
//! - `GET /healthz` - 200 while the process is alive
//! - `GET /readyz` - 200 once the driver has completed a convergence pass,
//!   503 before that

use anyhow::{Context, Result};
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::application::driver::Readiness;

struct ProbeState {
    readiness: Readiness,
    start_time: Instant,
}

pub fn probe_router(readiness: Readiness) -> Router {
    let state = Arc::new(ProbeState {
        readiness,
        start_time: Instant::now(),
    });

    Router::new()
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .with_state(state)
}

/// Serve the probe endpoints on `bind_address` until `shutdown` fires.
pub async fn serve_probes(
    bind_address: &str,
    readiness: Readiness,
    shutdown: CancellationToken,
) -> Result<()> {
    let listener = TcpListener::bind(bind_address)
        .await
        .with_context(|| format!("Failed to bind probe server to {}", bind_address))?;

    info!("Probe server listening on {}", bind_address);

    axum::serve(listener, probe_router(readiness))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("Probe server failed")
}

async fn healthz_handler(State(state): State<Arc<ProbeState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "uptime_seconds": state.start_time.elapsed().as_secs(),
    }))
}

async fn readyz_handler(State(state): State<Arc<ProbeState>>) -> (StatusCode, Json<serde_json::Value>) {
    if state.readiness.is_ready() {
        (StatusCode::OK, Json(serde_json::json!({ "status": "ready" })))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "status": "waiting for first convergence pass" })),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    async fn status_of(router: Router, uri: &str) -> StatusCode {
        router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn test_healthz_always_ok() {
        let router = probe_router(Readiness::new());
        assert_eq!(status_of(router, "/healthz").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_readyz_follows_readiness() {
        let readiness = Readiness::new();
        let router = probe_router(readiness.clone());

        assert_eq!(
            status_of(router.clone(), "/readyz").await,
            StatusCode::SERVICE_UNAVAILABLE
        );

        readiness.mark_ready();
        assert_eq!(status_of(router, "/readyz").await, StatusCode::OK);
    }
}
