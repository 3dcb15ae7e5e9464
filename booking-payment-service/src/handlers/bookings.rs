//! Booking payment view registration and lookup.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use validator::Validate;

use crate::dtos::{BookingPaymentView, RegisterBookingRequest, UpdateLifecycleRequest};
use crate::middleware::CallerContext;
use crate::startup::AppState;

/// Register a booking's payment view. Called by the booking subsystem.
pub async fn register_booking(
    State(state): State<AppState>,
    Json(payload): Json<RegisterBookingRequest>,
) -> Result<(StatusCode, Json<BookingPaymentView>), AppError> {
    payload.validate()?;
    let booking = state
        .services
        .payments
        .register_booking(payload.into_new_booking()?)
        .await?;

    tracing::info!(
        booking_id = %booking.id,
        method = %booking.payment_method,
        final_amount = booking.final_amount,
        "Booking registered for payment"
    );

    Ok((StatusCode::CREATED, Json(booking.into())))
}

pub async fn get_booking(
    State(state): State<AppState>,
    caller: CallerContext,
    Path(booking_id): Path<String>,
) -> Result<Json<BookingPaymentView>, AppError> {
    let booking = state.services.payments.get_booking(&booking_id).await?;
    caller.ensure_party(&booking)?;
    Ok(Json(booking.into()))
}

/// Lifecycle updates reported by the dispatch subsystem.
pub async fn update_status(
    State(state): State<AppState>,
    Path(booking_id): Path<String>,
    Json(payload): Json<UpdateLifecycleRequest>,
) -> Result<Json<BookingPaymentView>, AppError> {
    let booking = state
        .services
        .payments
        .update_lifecycle_status(&booking_id, payload.status)
        .await?;
    Ok(Json(booking.into()))
}
