//! Customer wallet balance, history and gateway-funded top-ups.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use validator::Validate;

use crate::dtos::{
    HistoryQuery, TopupConfirmResponse, TopupOrderResponse, TopupRequest, VerifyPaymentRequest,
    WalletResponse, WalletTransactionView,
};
use crate::middleware::CallerContext;
use crate::models::to_major;
use crate::startup::AppState;

const DEFAULT_HISTORY_LIMIT: usize = 50;
const MAX_HISTORY_LIMIT: usize = 200;

fn ensure_owner(caller: &CallerContext, user_id: &str) -> Result<(), AppError> {
    if caller.require_user()? != user_id {
        return Err(AppError::NotFound(anyhow::anyhow!(
            "Wallet {} not found",
            user_id
        )));
    }
    Ok(())
}

pub async fn get_wallet(
    State(state): State<AppState>,
    caller: CallerContext,
    Path(user_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<WalletResponse>, AppError> {
    ensure_owner(&caller, &user_id)?;

    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);
    let wallet = &state.services.wallet;
    let balance = wallet.balance(&user_id).await?;
    let transactions = wallet
        .history(&user_id, limit)
        .await?
        .into_iter()
        .map(WalletTransactionView::from)
        .collect();

    Ok(Json(WalletResponse {
        user_id,
        balance: to_major(balance),
        transactions,
    }))
}

pub async fn create_topup(
    State(state): State<AppState>,
    caller: CallerContext,
    Path(user_id): Path<String>,
    Json(payload): Json<TopupRequest>,
) -> Result<(StatusCode, Json<TopupOrderResponse>), AppError> {
    ensure_owner(&caller, &user_id)?;

    let payments = &state.services.payments;
    let order = payments
        .create_topup_order(&user_id, payload.amount_minor()?)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(TopupOrderResponse {
            amount: to_major(order.amount),
            amount_minor: order.amount,
            order_id: order.order_id,
            currency: order.currency,
            key_id: payments.gateway_key_id().to_string(),
        }),
    ))
}

/// Credit the wallet after checkout. Replays report `credited: false`.
pub async fn verify_topup(
    State(state): State<AppState>,
    caller: CallerContext,
    Path(user_id): Path<String>,
    Json(payload): Json<VerifyPaymentRequest>,
) -> Result<Json<TopupConfirmResponse>, AppError> {
    ensure_owner(&caller, &user_id)?;
    payload.validate()?;

    let payments = &state.services.payments;
    let order = payments.get_topup_order(&payload.order_id).await?;
    if order.user_id != user_id {
        return Err(AppError::NotFound(anyhow::anyhow!(
            "Top-up order {} not found",
            payload.order_id
        )));
    }

    let confirmation = payments
        .confirm_topup(&payload.order_id, &payload.payment_id, &payload.signature)
        .await?;

    Ok(Json(TopupConfirmResponse {
        order_id: confirmation.order.order_id,
        credited: confirmation.newly_credited,
        balance: to_major(confirmation.balance),
    }))
}
