//! HTTP handlers for booking-payment-service.

pub mod bookings;
pub mod cash;
pub mod payments;
pub mod settlement;
pub mod vendors;
pub mod wallets;
pub mod webhooks;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use mongodb::bson::doc;
use serde_json::json;

use crate::services::get_metrics;
use crate::startup::AppState;

/// Liveness probe.
pub async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "service": "booking-payment-service",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// Readiness probe; pings MongoDB when that backend is in use.
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    if let Some(db) = &state.db {
        if let Err(e) = db.run_command(doc! { "ping": 1 }, None).await {
            tracing::warn!(error = %e, "Readiness check failed: database unreachable");
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable" })),
            );
        }
    }
    (StatusCode::OK, Json(json!({ "status": "ready" })))
}

/// Prometheus metrics endpoint.
pub async fn metrics_endpoint() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        get_metrics(),
    )
}
