//! Booking payment state machine: gateway orders, gateway confirmation, wallet
//! payment, cancellation, wallet top-ups and gateway webhooks.
//!
//! Remote gateway calls happen outside any booking write. Each write is a
//! versioned compare-and-swap that re-validates against the latest state.

use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use super::gateway::{CreateOrderRequest, GatewayOrder, PaymentGateway, WebhookEvent};
use super::metrics;
use super::notifier::{Notification, NotificationDispatcher};
use super::refund::{RefundEngine, RefundOutcome};
use super::settlement::PricingPolicy;
use super::store::{load_booking, update_booking, Mutation, PaymentStore};
use super::wallet::WalletLedger;
use crate::error::{PaymentError, PaymentResult};
use crate::models::{
    Booking, BookingStatus, NewBooking, PaymentMethod, PaymentStatus, ReturnedCapture, TopupOrder,
    TopupStatus, WalletReason,
};

#[derive(Debug, Clone)]
pub struct PaymentOrder {
    pub booking: Booking,
    pub order: GatewayOrder,
    pub key_id: String,
}

#[derive(Debug, Clone)]
pub struct GatewayConfirmation {
    pub booking: Booking,
    /// `false` when the call replayed an already confirmed payment.
    pub newly_confirmed: bool,
}

#[derive(Debug, Clone)]
pub struct WalletPayment {
    pub booking: Booking,
    pub balance: i64,
    pub wallet_transaction_id: String,
}

#[derive(Debug, Clone)]
pub struct CancelOutcome {
    pub booking: Booking,
    pub refund: Option<RefundOutcome>,
}

#[derive(Debug, Clone)]
pub struct TopupConfirmation {
    pub order: TopupOrder,
    pub balance: i64,
    pub newly_credited: bool,
}

/// A verified capture that could not settle its booking and was refunded.
#[derive(Debug, Clone)]
pub struct ReturnedPayment {
    pub booking: Booking,
    pub refund_id: String,
    pub replay: bool,
}

#[derive(Debug, Clone)]
pub enum CaptureOutcome {
    Confirmed(GatewayConfirmation),
    Returned(ReturnedPayment),
}

enum CaptureDecision {
    Confirm,
    Replay,
    Return,
    Returned(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    BookingConfirmed { booking_id: String, replay: bool },
    CaptureReturned {
        booking_id: String,
        refund_id: String,
        replay: bool,
    },
    BookingFailed { booking_id: String },
    TopupCredited { order_id: String, replay: bool },
    Ignored { event: String },
}

#[derive(Clone)]
pub struct PaymentEngine {
    store: Arc<dyn PaymentStore>,
    gateway: Arc<dyn PaymentGateway>,
    wallet: WalletLedger,
    refunds: RefundEngine,
    policy: PricingPolicy,
    notifier: NotificationDispatcher,
    currency: String,
}

impl PaymentEngine {
    pub fn new(
        store: Arc<dyn PaymentStore>,
        gateway: Arc<dyn PaymentGateway>,
        wallet: WalletLedger,
        refunds: RefundEngine,
        policy: PricingPolicy,
        notifier: NotificationDispatcher,
        currency: &str,
    ) -> Self {
        Self {
            store,
            gateway,
            wallet,
            refunds,
            policy,
            notifier,
            currency: currency.to_string(),
        }
    }

    /// Public key id handed to checkout clients.
    pub fn gateway_key_id(&self) -> &str {
        self.gateway.key_id()
    }

    /// Register the payment view of a booking created by the booking subsystem.
    pub async fn register_booking(&self, input: NewBooking) -> PaymentResult<Booking> {
        let booking = Booking::new(input)?;
        let inserted = self
            .store
            .insert_booking(&booking)
            .await
            .map_err(|e| PaymentError::storage("insert booking", e))?;

        if !inserted {
            return Err(PaymentError::Validation(format!(
                "Booking {} is already registered",
                booking.id
            )));
        }

        tracing::info!(
            booking_id = %booking.id,
            user_id = %booking.user_id,
            vendor_id = %booking.vendor_id,
            final_amount = booking.final_amount,
            method = %booking.payment_method,
            "Booking registered"
        );
        Ok(booking)
    }

    pub async fn get_booking(&self, booking_id: &str) -> PaymentResult<Booking> {
        load_booking(self.store.as_ref(), booking_id).await
    }

    /// Record a lifecycle change reported by the dispatch subsystem.
    pub async fn update_lifecycle_status(
        &self,
        booking_id: &str,
        status: BookingStatus,
    ) -> PaymentResult<Booking> {
        let (booking, changed) = update_booking(self.store.as_ref(), booking_id, |booking| {
            if booking.status == status {
                return Ok(Mutation::Unchanged(false));
            }
            booking.status = status;
            Ok(Mutation::Apply(true))
        })
        .await?;

        if changed {
            tracing::info!(booking_id = %booking_id, status = ?status, "Booking lifecycle updated");
        }
        Ok(booking)
    }

    /// Open a gateway order for the booking's final amount.
    ///
    /// A second call replaces the stored order id, so only the latest order can
    /// confirm the booking.
    #[tracing::instrument(skip(self))]
    pub async fn create_payment_order(&self, booking_id: &str) -> PaymentResult<PaymentOrder> {
        if !self.gateway.is_configured() {
            return Err(PaymentError::GatewayUnavailable);
        }

        let booking = load_booking(self.store.as_ref(), booking_id).await?;
        ensure_payable(&booking)?;
        let amount = booking.final_amount;

        let order = self
            .gateway
            .create_order(CreateOrderRequest {
                amount,
                currency: self.currency.clone(),
                receipt: Some(booking.id.clone()),
                notes: Some(json!({
                    "booking_id": booking.id,
                    "user_id": booking.user_id,
                })),
            })
            .await?;

        let order_id = order.order_id.clone();
        let (booking, previous_order) = update_booking(self.store.as_ref(), booking_id, |booking| {
            ensure_payable(booking)?;
            if booking.final_amount != amount {
                return Err(PaymentError::Conflict(booking.id.clone()));
            }
            booking.transition_payment(PaymentStatus::Pending)?;
            Ok(Mutation::Apply(booking.open_gateway_order(order_id.clone())))
        })
        .await?;

        if let Some(previous) = previous_order {
            tracing::info!(
                booking_id = %booking.id,
                previous_order_id = %previous,
                order_id = %order.order_id,
                "Gateway order replaced"
            );
        }
        tracing::info!(
            booking_id = %booking.id,
            order_id = %order.order_id,
            amount,
            "Payment order created"
        );
        metrics::record_outcome(PaymentMethod::Gateway.as_str(), "order_created");

        Ok(PaymentOrder {
            booking,
            order,
            key_id: self.gateway.key_id().to_string(),
        })
    }

    /// Confirm a checkout callback. Replays of a confirmed payment are no-ops.
    ///
    /// A capture that arrives for a superseded order, or after the booking was
    /// settled through another rail, is refunded and reported as
    /// `CaptureReturned`.
    #[tracing::instrument(skip(self, signature))]
    pub async fn confirm_gateway_payment(
        &self,
        order_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> PaymentResult<GatewayConfirmation> {
        if !self
            .gateway
            .verify_payment_signature(order_id, payment_id, signature)?
        {
            metrics::record_outcome(PaymentMethod::Gateway.as_str(), "invalid_signature");
            return Err(PaymentError::InvalidSignature);
        }

        let booking = self
            .store
            .find_booking_by_order_id(order_id)
            .await
            .map_err(|e| PaymentError::storage("find booking by order", e))?
            .ok_or_else(|| PaymentError::NotFound(format!("Order {}", order_id)))?;

        match self
            .apply_gateway_success(&booking.id, order_id, payment_id)
            .await?
        {
            CaptureOutcome::Confirmed(confirmation) => Ok(confirmation),
            CaptureOutcome::Returned(returned) => Err(PaymentError::CaptureReturned {
                booking_id: returned.booking.id,
                payment_id: payment_id.to_string(),
            }),
        }
    }

    async fn apply_gateway_success(
        &self,
        booking_id: &str,
        order_id: &str,
        payment_id: &str,
    ) -> PaymentResult<CaptureOutcome> {
        let policy = &self.policy;
        let (booking, decision) = update_booking(self.store.as_ref(), booking_id, |booking| {
            if booking.gateway_payment_id.as_deref() == Some(payment_id) {
                return Ok(Mutation::Unchanged(CaptureDecision::Replay));
            }
            if let Some(returned) = booking
                .returned_captures
                .iter()
                .find(|r| r.payment_id == payment_id)
            {
                return match &returned.refund_id {
                    Some(refund_id) => Ok(Mutation::Unchanged(CaptureDecision::Returned(
                        refund_id.clone(),
                    ))),
                    None => Err(PaymentError::Conflict(booking.id.clone())),
                };
            }
            if !booking.holds_order(order_id) {
                return Err(PaymentError::NotFound(format!("Order {}", order_id)));
            }

            let is_live_order = booking.gateway_order_id.as_deref() == Some(order_id);
            if booking.payment_status.is_final() || !is_live_order {
                booking.returned_captures.push(ReturnedCapture {
                    order_id: order_id.to_string(),
                    payment_id: payment_id.to_string(),
                    refund_id: None,
                    recorded_at: Utc::now(),
                });
                return Ok(Mutation::Apply(CaptureDecision::Return));
            }

            booking.transition_payment(PaymentStatus::Success)?;
            booking.payment_method = PaymentMethod::Gateway;
            booking.payment_id = Some(payment_id.to_string());
            booking.gateway_payment_id = Some(payment_id.to_string());
            booking.wallet_transaction_id = None;
            booking.confirm_lifecycle_if_awaiting();
            policy.apply(booking)?;
            Ok(Mutation::Apply(CaptureDecision::Confirm))
        })
        .await?;

        let newly_confirmed = match decision {
            CaptureDecision::Confirm => true,
            CaptureDecision::Replay => false,
            CaptureDecision::Returned(refund_id) => {
                return Ok(CaptureOutcome::Returned(ReturnedPayment {
                    booking,
                    refund_id,
                    replay: true,
                }));
            }
            CaptureDecision::Return => {
                return self
                    .return_capture(booking, order_id, payment_id)
                    .await
                    .map(CaptureOutcome::Returned);
            }
        };

        if newly_confirmed {
            tracing::info!(
                booking_id = %booking.id,
                order_id = %order_id,
                payment_id = %payment_id,
                amount = booking.final_amount,
                "Gateway payment confirmed"
            );
            self.on_paid(&booking).await;
        } else {
            tracing::info!(
                booking_id = %booking.id,
                order_id = %order_id,
                "Gateway confirmation replayed, nothing to do"
            );
        }

        Ok(CaptureOutcome::Confirmed(GatewayConfirmation {
            booking,
            newly_confirmed,
        }))
    }

    /// Refund a capture the booking cannot accept, then record the refund id.
    ///
    /// The capture is claimed on the booking before the gateway call; a failed
    /// call drops the claim so a redelivered webhook can try again.
    async fn return_capture(
        &self,
        booking: Booking,
        order_id: &str,
        payment_id: &str,
    ) -> PaymentResult<ReturnedPayment> {
        tracing::warn!(
            booking_id = %booking.id,
            order_id = %order_id,
            payment_id = %payment_id,
            payment_status = %booking.payment_status,
            payment_method = %booking.payment_method,
            "Capture cannot settle the booking, refunding it"
        );

        let refunded = self
            .gateway
            .refund(
                payment_id,
                None,
                Some(json!({
                    "booking_id": booking.id,
                    "order_id": order_id,
                    "reason": "capture_not_applied",
                })),
            )
            .await;

        let receipt = match refunded {
            Ok(receipt) => receipt,
            Err(e) => {
                let released = update_booking(self.store.as_ref(), &booking.id, |booking| {
                    let before = booking.returned_captures.len();
                    booking
                        .returned_captures
                        .retain(|r| r.payment_id != payment_id || r.refund_id.is_some());
                    if booking.returned_captures.len() == before {
                        return Ok(Mutation::Unchanged(()));
                    }
                    Ok(Mutation::Apply(()))
                })
                .await;
                if let Err(release_err) = released {
                    tracing::error!(
                        error = %release_err,
                        booking_id = %booking.id,
                        payment_id = %payment_id,
                        "Failed to release returned capture claim"
                    );
                }
                metrics::record_outcome(PaymentMethod::Gateway.as_str(), "capture_return_failed");
                return Err(match e {
                    PaymentError::Refund(message) => PaymentError::Refund(message),
                    other => PaymentError::Refund(other.to_string()),
                });
            }
        };

        let refund_id = receipt.refund_id;
        let recorded = update_booking(self.store.as_ref(), &booking.id, |booking| {
            match booking
                .returned_captures
                .iter_mut()
                .find(|r| r.payment_id == payment_id)
            {
                Some(returned) if returned.refund_id.is_none() => {
                    returned.refund_id = Some(refund_id.clone());
                    Ok(Mutation::Apply(()))
                }
                _ => Ok(Mutation::Unchanged(())),
            }
        })
        .await;

        let (booking, ()) = recorded.map_err(|e| {
            tracing::error!(
                error = %e,
                booking_id = %booking.id,
                payment_id = %payment_id,
                refund_id = %refund_id,
                "Capture refunded but not recorded, needs reconciliation"
            );
            e
        })?;

        tracing::info!(
            booking_id = %booking.id,
            payment_id = %payment_id,
            refund_id = %refund_id,
            "Unapplied capture refunded"
        );
        metrics::record_outcome(PaymentMethod::Gateway.as_str(), "capture_returned");

        Ok(ReturnedPayment {
            booking,
            refund_id,
            replay: false,
        })
    }

    /// PENDING → FAILED for the booking holding `order_id`; no-op otherwise.
    #[tracing::instrument(skip(self))]
    pub async fn fail_gateway_payment(&self, order_id: &str) -> PaymentResult<Booking> {
        let booking = self
            .store
            .find_booking_by_order_id(order_id)
            .await
            .map_err(|e| PaymentError::storage("find booking by order", e))?
            .ok_or_else(|| PaymentError::NotFound(format!("Order {}", order_id)))?;

        let (booking, failed) = update_booking(self.store.as_ref(), &booking.id, |booking| {
            if booking.payment_status != PaymentStatus::Pending
                || booking.gateway_order_id.as_deref() != Some(order_id)
            {
                return Ok(Mutation::Unchanged(false));
            }
            booking.transition_payment(PaymentStatus::Failed)?;
            Ok(Mutation::Apply(true))
        })
        .await?;

        if failed {
            tracing::info!(booking_id = %booking.id, order_id = %order_id, "Gateway payment failed");
            metrics::record_outcome(PaymentMethod::Gateway.as_str(), "failed");
        }
        Ok(booking)
    }

    /// Pay the booking from the customer's wallet.
    ///
    /// The debit happens first; if the booking write then fails the debit is
    /// credited back.
    #[tracing::instrument(skip(self))]
    pub async fn process_wallet_payment(&self, booking_id: &str) -> PaymentResult<WalletPayment> {
        let booking = load_booking(self.store.as_ref(), booking_id).await?;
        ensure_payable(&booking)?;
        let amount = booking.final_amount;

        let debit = self
            .wallet
            .debit(
                &booking.user_id,
                amount,
                WalletReason::BookingPayment,
                Some(booking.id.clone()),
            )
            .await
            .inspect_err(|_| {
                metrics::record_outcome(PaymentMethod::Wallet.as_str(), "declined");
            })?;

        let policy = &self.policy;
        let wallet_tx_id = debit.id.clone();
        let written = update_booking(self.store.as_ref(), booking_id, |booking| {
            ensure_payable(booking)?;
            if booking.final_amount != amount {
                return Err(PaymentError::Conflict(booking.id.clone()));
            }
            booking.transition_payment(PaymentStatus::Success)?;
            booking.payment_method = PaymentMethod::Wallet;
            booking.payment_id = Some(wallet_tx_id.clone());
            booking.wallet_transaction_id = Some(wallet_tx_id.clone());
            booking.retire_gateway_order();
            booking.gateway_payment_id = None;
            booking.confirm_lifecycle_if_awaiting();
            policy.apply(booking)?;
            Ok(Mutation::Apply(()))
        })
        .await;

        let booking = match written {
            Ok((booking, ())) => booking,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    booking_id = %booking_id,
                    wallet_tx_id = %debit.id,
                    "Booking write failed after wallet debit, crediting back"
                );
                if let Err(credit_err) = self
                    .wallet
                    .credit(
                        &debit.user_id,
                        amount,
                        WalletReason::Compensation,
                        Some(debit.id.clone()),
                    )
                    .await
                {
                    tracing::error!(
                        error = %credit_err,
                        user_id = %debit.user_id,
                        wallet_tx_id = %debit.id,
                        amount,
                        "Wallet compensation failed, needs reconciliation"
                    );
                }
                return Err(e);
            }
        };

        tracing::info!(
            booking_id = %booking.id,
            user_id = %booking.user_id,
            amount,
            balance = debit.balance_after,
            "Wallet payment completed"
        );
        self.on_paid(&booking).await;

        Ok(WalletPayment {
            booking,
            balance: debit.balance_after,
            wallet_transaction_id: debit.id,
        })
    }

    /// Full refund of a confirmed payment, or `amount` of it.
    pub async fn refund(&self, booking_id: &str, amount: Option<i64>) -> PaymentResult<RefundOutcome> {
        self.refunds.refund(booking_id, amount).await
    }

    /// Abort an unpaid booking's pending order, or refund a paid one in full.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_payment(&self, booking_id: &str) -> PaymentResult<CancelOutcome> {
        let (booking, aborted) = update_booking(self.store.as_ref(), booking_id, |booking| {
            if booking.payment_status.is_final() {
                return Ok(Mutation::Unchanged(false));
            }
            let was_pending = booking.payment_status == PaymentStatus::Pending;
            if was_pending {
                booking.transition_payment(PaymentStatus::Failed)?;
            }
            let had_order = booking.retire_gateway_order().is_some();
            if was_pending || had_order {
                Ok(Mutation::Apply(true))
            } else {
                Ok(Mutation::Unchanged(false))
            }
        })
        .await?;

        match booking.payment_status {
            PaymentStatus::Success => {
                let refund = self.refunds.refund(booking_id, None).await?;
                Ok(CancelOutcome {
                    booking: refund.booking.clone(),
                    refund: Some(refund),
                })
            }
            PaymentStatus::CollectedByVendor => Err(PaymentError::UnsupportedPaymentMethod(
                booking.payment_method.to_string(),
            )),
            _ => {
                if aborted {
                    tracing::info!(booking_id = %booking.id, "Pending payment aborted");
                }
                Ok(CancelOutcome {
                    booking,
                    refund: None,
                })
            }
        }
    }

    /// Open a gateway order that funds the user's wallet.
    #[tracing::instrument(skip(self))]
    pub async fn create_topup_order(&self, user_id: &str, amount: i64) -> PaymentResult<TopupOrder> {
        if !self.gateway.is_configured() {
            return Err(PaymentError::GatewayUnavailable);
        }
        if amount <= 0 {
            return Err(PaymentError::Validation(
                "Top-up amount must be positive".to_string(),
            ));
        }

        let receipt = format!("topup_{}", Uuid::new_v4().simple());
        let order = self
            .gateway
            .create_order(CreateOrderRequest {
                amount,
                currency: self.currency.clone(),
                receipt: Some(receipt),
                notes: Some(json!({ "user_id": user_id, "purpose": "wallet_topup" })),
            })
            .await?;

        let topup = TopupOrder {
            order_id: order.order_id,
            user_id: user_id.to_string(),
            amount: order.amount,
            currency: order.currency,
            status: TopupStatus::Created,
            gateway_payment_id: None,
            created_at: Utc::now(),
        };
        self.store
            .insert_topup_order(&topup)
            .await
            .map_err(|e| PaymentError::storage("insert top-up order", e))?;

        tracing::info!(
            user_id = %user_id,
            order_id = %topup.order_id,
            amount = topup.amount,
            "Wallet top-up order created"
        );
        Ok(topup)
    }

    pub async fn get_topup_order(&self, order_id: &str) -> PaymentResult<TopupOrder> {
        self.store
            .get_topup_order(order_id)
            .await
            .map_err(|e| PaymentError::storage("load top-up order", e))?
            .ok_or_else(|| PaymentError::NotFound(format!("Top-up order {}", order_id)))
    }

    /// Verify a top-up checkout callback and credit the wallet exactly once.
    #[tracing::instrument(skip(self, signature))]
    pub async fn confirm_topup(
        &self,
        order_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> PaymentResult<TopupConfirmation> {
        if !self
            .gateway
            .verify_payment_signature(order_id, payment_id, signature)?
        {
            return Err(PaymentError::InvalidSignature);
        }
        self.credit_topup(order_id, payment_id).await
    }

    async fn credit_topup(&self, order_id: &str, payment_id: &str) -> PaymentResult<TopupConfirmation> {
        let existing = self.get_topup_order(order_id).await?;

        let claimed = self
            .store
            .mark_topup_credited(order_id, payment_id)
            .await
            .map_err(|e| PaymentError::storage("mark top-up credited", e))?;

        let Some(order) = claimed else {
            tracing::info!(order_id = %order_id, "Top-up already credited, nothing to do");
            let balance = self.wallet.balance(&existing.user_id).await?;
            let order = TopupOrder {
                status: TopupStatus::Credited,
                ..existing
            };
            return Ok(TopupConfirmation {
                order,
                balance,
                newly_credited: false,
            });
        };

        match self
            .wallet
            .credit(
                &order.user_id,
                order.amount,
                WalletReason::TopUp,
                Some(order.order_id.clone()),
            )
            .await
        {
            Ok(entry) => {
                metrics::record_outcome("topup", "success");
                metrics::record_amount("topup", order.amount);
                Ok(TopupConfirmation {
                    balance: entry.balance_after,
                    order,
                    newly_credited: true,
                })
            }
            Err(e) => {
                if let Err(revert_err) = self.store.revert_topup_credit(order_id).await {
                    tracing::error!(
                        error = ?revert_err,
                        order_id = %order_id,
                        "Failed to release top-up order after credit failure"
                    );
                }
                Err(e)
            }
        }
    }

    /// Process a gateway webhook delivery. Unknown orders are acknowledged.
    #[tracing::instrument(skip(self, body, signature))]
    pub async fn handle_webhook(&self, body: &str, signature: &str) -> PaymentResult<WebhookOutcome> {
        if !self.gateway.verify_webhook_signature(body, signature)? {
            return Err(PaymentError::InvalidSignature);
        }

        let WebhookEvent { event, payload } = WebhookEvent::parse(body)?;
        let payment = payload.payment.map(|p| p.entity);
        let order_id = payment
            .as_ref()
            .and_then(|p| p.order_id.clone())
            .or_else(|| payload.order.map(|o| o.entity.id));

        tracing::info!(event = %event, order_id = ?order_id, "Gateway webhook received");

        let (Some(order_id), Some(payment)) = (order_id, payment) else {
            return Ok(WebhookOutcome::Ignored { event });
        };

        match event.as_str() {
            "payment.captured" | "order.paid" => {
                let topup = self
                    .store
                    .get_topup_order(&order_id)
                    .await
                    .map_err(|e| PaymentError::storage("load top-up order", e))?;
                if topup.is_some() {
                    let confirmation = self.credit_topup(&order_id, &payment.id).await?;
                    return Ok(WebhookOutcome::TopupCredited {
                        order_id,
                        replay: !confirmation.newly_credited,
                    });
                }

                match self.find_by_order(&order_id).await? {
                    Some(booking) => {
                        match self
                            .apply_gateway_success(&booking.id, &order_id, &payment.id)
                            .await
                        {
                            Ok(CaptureOutcome::Confirmed(confirmation)) => {
                                Ok(WebhookOutcome::BookingConfirmed {
                                    booking_id: confirmation.booking.id,
                                    replay: !confirmation.newly_confirmed,
                                })
                            }
                            Ok(CaptureOutcome::Returned(returned)) => {
                                Ok(WebhookOutcome::CaptureReturned {
                                    booking_id: returned.booking.id,
                                    refund_id: returned.refund_id,
                                    replay: returned.replay,
                                })
                            }
                            Err(PaymentError::NotFound(_)) => {
                                tracing::warn!(
                                    booking_id = %booking.id,
                                    order_id = %order_id,
                                    "Capture for an order the booking does not hold acknowledged"
                                );
                                Ok(WebhookOutcome::Ignored { event })
                            }
                            Err(e) => Err(e),
                        }
                    }
                    None => {
                        tracing::info!(order_id = %order_id, "Webhook for unknown order acknowledged");
                        Ok(WebhookOutcome::Ignored { event })
                    }
                }
            }
            "payment.failed" => match self.find_by_order(&order_id).await? {
                Some(_) => {
                    let booking = self.fail_gateway_payment(&order_id).await?;
                    Ok(WebhookOutcome::BookingFailed {
                        booking_id: booking.id,
                    })
                }
                None => Ok(WebhookOutcome::Ignored { event }),
            },
            _ => Ok(WebhookOutcome::Ignored { event }),
        }
    }

    async fn find_by_order(&self, order_id: &str) -> PaymentResult<Option<Booking>> {
        self.store
            .find_booking_by_order_id(order_id)
            .await
            .map_err(|e| PaymentError::storage("find booking by order", e))
    }

    async fn on_paid(&self, booking: &Booking) {
        let rail = booking.payment_method.as_str();
        metrics::record_outcome(rail, "success");
        metrics::record_amount(rail, booking.final_amount);

        self.notifier
            .dispatch(Notification::PaymentConfirmed {
                user_id: booking.user_id.clone(),
                booking_id: booking.id.clone(),
                amount: booking.final_amount,
                method: rail.to_string(),
            })
            .await;
    }
}

/// Online rails can only collect a positive amount on an unpaid booking.
fn ensure_payable(booking: &Booking) -> PaymentResult<()> {
    if booking.payment_status.is_paid() {
        return Err(PaymentError::AlreadyPaid(booking.id.clone()));
    }
    if booking.payment_status == PaymentStatus::Refunded {
        return Err(PaymentError::Validation(format!(
            "Booking {} has been refunded",
            booking.id
        )));
    }
    if booking.payment_method == PaymentMethod::PlanBenefit {
        return Err(PaymentError::UnsupportedPaymentMethod(
            booking.payment_method.to_string(),
        ));
    }
    if booking.status == BookingStatus::Cancelled {
        return Err(PaymentError::Validation(format!(
            "Booking {} is cancelled",
            booking.id
        )));
    }
    if booking.final_amount <= 0 {
        return Err(PaymentError::Validation(
            "Booking has nothing to pay".to_string(),
        ));
    }
    Ok(())
}
