//! Reverses a confirmed payment through the rail it came in on.
//!
//! The booking is flagged `refund_in_flight` before the rail call and moved to
//! `REFUNDED` after it, so concurrent refunds cannot both reach the rail and a
//! failed rail call leaves the payment at `SUCCESS`.

use serde_json::json;
use std::sync::Arc;

use super::gateway::PaymentGateway;
use super::metrics;
use super::notifier::{Notification, NotificationDispatcher};
use super::store::{load_booking, update_booking, Mutation, PaymentStore};
use super::wallet::WalletLedger;
use crate::error::{PaymentError, PaymentResult};
use crate::models::{Booking, PaymentMethod, PaymentStatus, WalletReason};

#[derive(Debug, Clone)]
pub struct RefundOutcome {
    pub booking: Booking,
    pub refund_id: String,
    pub refund_amount: i64,
}

#[derive(Debug, Clone)]
enum RefundRail {
    Gateway { payment_id: String },
    Wallet { user_id: String },
}

#[derive(Clone)]
pub struct RefundEngine {
    store: Arc<dyn PaymentStore>,
    gateway: Arc<dyn PaymentGateway>,
    wallet: WalletLedger,
    notifier: NotificationDispatcher,
}

impl RefundEngine {
    pub fn new(
        store: Arc<dyn PaymentStore>,
        gateway: Arc<dyn PaymentGateway>,
        wallet: WalletLedger,
        notifier: NotificationDispatcher,
    ) -> Self {
        Self {
            store,
            gateway,
            wallet,
            notifier,
        }
    }

    /// Refund `amount` (the full final amount when `None`).
    #[tracing::instrument(skip(self))]
    pub async fn refund(&self, booking_id: &str, amount: Option<i64>) -> PaymentResult<RefundOutcome> {
        let booking = load_booking(self.store.as_ref(), booking_id).await?;
        let requested = amount.unwrap_or(booking.final_amount);
        validate_amount(&booking, requested)?;

        let (booking, rail) = update_booking(self.store.as_ref(), booking_id, |booking| {
            let rail = refund_rail(booking)?;
            validate_amount(booking, requested)?;
            booking.refund_in_flight = true;
            Ok(Mutation::Apply(rail))
        })
        .await?;

        let is_full = requested == booking.final_amount;
        let result = match &rail {
            RefundRail::Gateway { payment_id } => self
                .gateway
                .refund(
                    payment_id,
                    if is_full { None } else { Some(requested) },
                    Some(json!({ "booking_id": booking.id })),
                )
                .await
                .map(|receipt| receipt.refund_id),
            RefundRail::Wallet { user_id } => self
                .wallet
                .credit(
                    user_id,
                    requested,
                    WalletReason::BookingRefund,
                    Some(booking.id.clone()),
                )
                .await
                .map(|entry| entry.id),
        };

        let refund_id = match result {
            Ok(refund_id) => refund_id,
            Err(e) => {
                self.release(booking_id).await;
                metrics::record_outcome(booking.payment_method.as_str(), "refund_failed");
                return Err(match e {
                    PaymentError::Storage(source) => PaymentError::Storage(source),
                    PaymentError::Refund(message) => PaymentError::Refund(message),
                    other => PaymentError::Refund(other.to_string()),
                });
            }
        };

        let finalized = update_booking(self.store.as_ref(), booking_id, |booking| {
            booking.transition_payment(PaymentStatus::Refunded)?;
            booking.refund_in_flight = false;
            booking.refund_amount = Some(requested);
            booking.refund_id = Some(refund_id.clone());
            Ok(Mutation::Apply(()))
        })
        .await;

        let (booking, ()) = finalized.map_err(|e| {
            tracing::error!(
                error = %e,
                booking_id = %booking_id,
                refund_id = %refund_id,
                amount = requested,
                "Refund issued but booking could not be marked refunded, needs reconciliation"
            );
            e
        })?;

        tracing::info!(
            booking_id = %booking.id,
            refund_id = %refund_id,
            amount = requested,
            method = %booking.payment_method,
            "Booking refunded"
        );
        metrics::record_outcome(booking.payment_method.as_str(), "refunded");

        self.notifier
            .dispatch(Notification::RefundProcessed {
                user_id: booking.user_id.clone(),
                booking_id: booking.id.clone(),
                amount: requested,
            })
            .await;

        Ok(RefundOutcome {
            booking,
            refund_id,
            refund_amount: requested,
        })
    }

    async fn release(&self, booking_id: &str) {
        let released = update_booking(self.store.as_ref(), booking_id, |booking| {
            if !booking.refund_in_flight {
                return Ok(Mutation::Unchanged(()));
            }
            booking.refund_in_flight = false;
            Ok(Mutation::Apply(()))
        })
        .await;

        if let Err(e) = released {
            tracing::error!(
                error = %e,
                booking_id = %booking_id,
                "Failed to clear refund flag after rail failure"
            );
        }
    }
}

fn validate_amount(booking: &Booking, requested: i64) -> PaymentResult<()> {
    if requested <= 0 {
        return Err(PaymentError::Validation(
            "Refund amount must be positive".to_string(),
        ));
    }
    if requested > booking.final_amount {
        return Err(PaymentError::Validation(format!(
            "Refund amount {} exceeds the paid amount {}",
            requested, booking.final_amount
        )));
    }
    Ok(())
}

fn refund_rail(booking: &Booking) -> PaymentResult<RefundRail> {
    match booking.payment_status {
        PaymentStatus::Success => {}
        PaymentStatus::CollectedByVendor => {
            return Err(PaymentError::UnsupportedPaymentMethod(
                booking.payment_method.to_string(),
            ))
        }
        PaymentStatus::Refunded => {
            return Err(PaymentError::Validation(format!(
                "Booking {} is already refunded",
                booking.id
            )))
        }
        _ => {
            return Err(PaymentError::Validation(format!(
                "Booking {} has no confirmed payment to refund",
                booking.id
            )))
        }
    }
    if booking.refund_in_flight {
        return Err(PaymentError::Conflict(booking.id.clone()));
    }

    match booking.payment_method {
        PaymentMethod::Gateway => booking
            .gateway_payment_id
            .clone()
            .map(|payment_id| RefundRail::Gateway { payment_id })
            .ok_or_else(|| {
                PaymentError::Refund(format!("Booking {} has no gateway payment id", booking.id))
            }),
        PaymentMethod::Wallet => Ok(RefundRail::Wallet {
            user_id: booking.user_id.clone(),
        }),
        other => Err(PaymentError::UnsupportedPaymentMethod(other.to_string())),
    }
}
