//! Vendor cash-dues ledger.

use axum::{
    extract::{Path, State},
    Json,
};
use service_core::error::AppError;
use validator::Validate;

use crate::dtos::{SettleDuesRequest, VendorLedgerResponse};
use crate::middleware::CallerContext;
use crate::startup::AppState;

pub async fn get_ledger(
    State(state): State<AppState>,
    caller: CallerContext,
    Path(vendor_id): Path<String>,
) -> Result<Json<VendorLedgerResponse>, AppError> {
    if caller.require_vendor()? != vendor_id {
        return Err(AppError::NotFound(anyhow::anyhow!(
            "Vendor {} not found",
            vendor_id
        )));
    }

    let ledger = state.services.wallet.vendor_ledger(&vendor_id).await?;
    Ok(Json(ledger.into()))
}

/// Record a dues settlement. Called by the admin back office after checking
/// the transfer proof.
pub async fn settle_dues(
    State(state): State<AppState>,
    Path(vendor_id): Path<String>,
    Json(payload): Json<SettleDuesRequest>,
) -> Result<Json<VendorLedgerResponse>, AppError> {
    payload.validate()?;

    let ledger = state
        .services
        .wallet
        .settle(&vendor_id, payload.amount_minor()?, &payload.proof)
        .await?;
    Ok(Json(ledger.into()))
}
