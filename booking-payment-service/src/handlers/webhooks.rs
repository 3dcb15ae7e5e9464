//! Gateway webhook receiver.

use axum::{extract::State, http::HeaderMap, Json};
use serde_json::{json, Value};
use service_core::error::AppError;

use crate::services::payments::WebhookOutcome;
use crate::startup::AppState;

const SIGNATURE_HEADER: &str = "x-razorpay-signature";

/// Verify and apply a gateway event. The raw body is needed for the HMAC.
pub async fn gateway_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<Value>, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            tracing::warn!("Webhook received without signature header");
            AppError::Unauthorized(anyhow::anyhow!("Missing webhook signature"))
        })?;

    let outcome = state
        .services
        .payments
        .handle_webhook(&body, signature)
        .await?;

    let response = match outcome {
        WebhookOutcome::BookingConfirmed { booking_id, replay } => json!({
            "status": "ok",
            "outcome": "booking_confirmed",
            "booking_id": booking_id,
            "replay": replay
        }),
        WebhookOutcome::CaptureReturned {
            booking_id,
            refund_id,
            replay,
        } => json!({
            "status": "ok",
            "outcome": "capture_refunded",
            "booking_id": booking_id,
            "refund_id": refund_id,
            "replay": replay
        }),
        WebhookOutcome::BookingFailed { booking_id } => json!({
            "status": "ok",
            "outcome": "booking_failed",
            "booking_id": booking_id
        }),
        WebhookOutcome::TopupCredited { order_id, replay } => json!({
            "status": "ok",
            "outcome": "topup_credited",
            "order_id": order_id,
            "replay": replay
        }),
        WebhookOutcome::Ignored { event } => json!({
            "status": "ignored",
            "event": event
        }),
    };
    Ok(Json(response))
}
