//! In-person collection: the vendor bills at the door and the customer
//! approves with a one-time code.

use axum::{
    extract::{Path, State},
    Json,
};
use service_core::error::AppError;
use validator::Validate;

use crate::dtos::{
    to_charges, BookingPaymentView, CashConfirmRequest, CashInitiateRequest, CashInitiateResponse,
};
use crate::middleware::CallerContext;
use crate::models::{to_major, to_minor};
use crate::startup::AppState;

pub async fn initiate(
    State(state): State<AppState>,
    caller: CallerContext,
    Path(booking_id): Path<String>,
    Json(payload): Json<CashInitiateRequest>,
) -> Result<Json<CashInitiateResponse>, AppError> {
    let booking = state.services.payments.get_booking(&booking_id).await?;
    caller.ensure_vendor(&booking)?;

    let extras = to_charges(&payload.extra_items)?;
    let initiation = state
        .services
        .cash
        .initiate(&booking_id, to_minor(payload.total)?, extras)
        .await?;

    Ok(Json(CashInitiateResponse {
        booking_id: initiation.booking_id,
        otp_sent: initiation.otp_sent,
        expires_at: initiation.expires_at,
        total: to_major(initiation.total),
    }))
}

pub async fn confirm(
    State(state): State<AppState>,
    caller: CallerContext,
    Path(booking_id): Path<String>,
    Json(payload): Json<CashConfirmRequest>,
) -> Result<Json<BookingPaymentView>, AppError> {
    payload.validate()?;
    let booking = state.services.payments.get_booking(&booking_id).await?;
    caller.ensure_vendor(&booking)?;

    let extras = to_charges(&payload.extra_items)?;
    let booking = state
        .services
        .cash
        .confirm(&booking_id, &payload.code, to_minor(payload.total)?, extras)
        .await?;

    Ok(Json(booking.into()))
}
