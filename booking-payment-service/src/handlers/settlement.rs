//! Worker payout and final settlement, both driven by the booking's vendor.

use axum::{
    extract::{Path, State},
    Json,
};
use service_core::error::AppError;

use crate::dtos::{BookingPaymentView, WorkerPayoutResponse};
use crate::middleware::CallerContext;
use crate::models::to_major;
use crate::startup::AppState;

pub async fn pay_worker(
    State(state): State<AppState>,
    caller: CallerContext,
    Path(booking_id): Path<String>,
) -> Result<Json<WorkerPayoutResponse>, AppError> {
    let booking = state.services.payments.get_booking(&booking_id).await?;
    caller.ensure_vendor(&booking)?;

    let (booking, outcome) = state.services.settlement.pay_worker(&booking_id).await?;
    Ok(Json(WorkerPayoutResponse {
        outcome,
        worker_earnings: booking.worker_earnings.map(to_major),
        booking: booking.into(),
    }))
}

pub async fn final_settlement(
    State(state): State<AppState>,
    caller: CallerContext,
    Path(booking_id): Path<String>,
) -> Result<Json<BookingPaymentView>, AppError> {
    let booking = state.services.payments.get_booking(&booking_id).await?;
    caller.ensure_vendor(&booking)?;

    let booking = state
        .services
        .settlement
        .final_settlement(&booking_id)
        .await?;
    Ok(Json(booking.into()))
}
