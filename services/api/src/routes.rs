use crate::infra::{AppState, Components};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::{middleware, Extension, Json, Router};
use intern_apply::accounts::{account_router, require_session};
use intern_apply::submissions::submission_router;
use serde_json::json;
use tokio_util::sync::CancellationToken;

/// Full HTTP surface: open account routes, session-gated application
/// routes, and the operational endpoints.
pub(crate) fn with_application_routes(
    components: Components,
    shutdown: CancellationToken,
) -> Router {
    let Components {
        desk,
        accounts,
        sessions,
    } = components;

    let gated = submission_router(desk, shutdown).route_layer(middleware::from_fn_with_state(
        sessions.clone(),
        require_session,
    ));

    account_router(accounts, sessions)
        .merge(gated)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
