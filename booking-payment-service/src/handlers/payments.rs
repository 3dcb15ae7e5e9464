//! Online payment handlers: gateway checkout, wallet payment, cancellation
//! and refunds.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use validator::Validate;

use crate::dtos::{
    CancelPaymentResponse, CreateOrderResponse, RefundRequest, RefundResponse,
    VerifyPaymentRequest, VerifyPaymentResponse, WalletPayResponse,
};
use crate::middleware::CallerContext;
use crate::models::{to_major, Booking};
use crate::startup::AppState;

async fn load_for_customer(
    state: &AppState,
    caller: &CallerContext,
    booking_id: &str,
) -> Result<Booking, AppError> {
    let booking = state.services.payments.get_booking(booking_id).await?;
    caller.ensure_customer(&booking)?;
    Ok(booking)
}

/// Open a gateway order for the booking's final amount.
///
/// The client passes `order_id` and `key_id` to the checkout widget.
pub async fn create_order(
    State(state): State<AppState>,
    caller: CallerContext,
    Path(booking_id): Path<String>,
) -> Result<(StatusCode, Json<CreateOrderResponse>), AppError> {
    load_for_customer(&state, &caller, &booking_id).await?;

    let created = state
        .services
        .payments
        .create_payment_order(&booking_id)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateOrderResponse {
            booking_id: created.booking.id,
            amount: to_major(created.order.amount),
            amount_minor: created.order.amount,
            order_id: created.order.order_id,
            currency: created.order.currency,
            key_id: created.key_id,
        }),
    ))
}

/// Verify a checkout callback. The signature is the proof of payment.
pub async fn verify_payment(
    State(state): State<AppState>,
    Json(payload): Json<VerifyPaymentRequest>,
) -> Result<Json<VerifyPaymentResponse>, AppError> {
    payload.validate()?;
    tracing::info!(
        order_id = %payload.order_id,
        payment_id = %payload.payment_id,
        "Verifying gateway payment"
    );

    let confirmation = state
        .services
        .payments
        .confirm_gateway_payment(&payload.order_id, &payload.payment_id, &payload.signature)
        .await?;

    Ok(Json(VerifyPaymentResponse {
        ok: true,
        replay: !confirmation.newly_confirmed,
        booking: confirmation.booking.into(),
    }))
}

pub async fn wallet_pay(
    State(state): State<AppState>,
    caller: CallerContext,
    Path(booking_id): Path<String>,
) -> Result<Json<WalletPayResponse>, AppError> {
    load_for_customer(&state, &caller, &booking_id).await?;

    let payment = state
        .services
        .payments
        .process_wallet_payment(&booking_id)
        .await?;

    Ok(Json(WalletPayResponse {
        balance: to_major(payment.balance),
        wallet_transaction_id: payment.wallet_transaction_id,
        booking: payment.booking.into(),
    }))
}

/// Abort a pending payment, or fully refund a confirmed online one.
pub async fn cancel_payment(
    State(state): State<AppState>,
    caller: CallerContext,
    Path(booking_id): Path<String>,
) -> Result<Json<CancelPaymentResponse>, AppError> {
    load_for_customer(&state, &caller, &booking_id).await?;

    let outcome = state.services.payments.cancel_payment(&booking_id).await?;
    let refund_amount = outcome.refund.as_ref().map(|r| to_major(r.refund_amount));
    let booking = outcome
        .refund
        .map(|r| r.booking)
        .unwrap_or(outcome.booking);

    Ok(Json(CancelPaymentResponse {
        refund_amount,
        booking: booking.into(),
    }))
}

pub async fn refund(
    State(state): State<AppState>,
    caller: CallerContext,
    Path(booking_id): Path<String>,
    payload: Option<Json<RefundRequest>>,
) -> Result<Json<RefundResponse>, AppError> {
    load_for_customer(&state, &caller, &booking_id).await?;

    let request = payload.map(|Json(r)| r).unwrap_or_default();
    let outcome = state
        .services
        .payments
        .refund(&booking_id, request.amount_minor()?)
        .await?;

    Ok(Json(RefundResponse {
        refund_amount: to_major(outcome.refund_amount),
        refund_id: outcome.refund_id,
        booking: outcome.booking.into(),
    }))
}
