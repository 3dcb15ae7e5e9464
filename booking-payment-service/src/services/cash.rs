//! OTP-gated collection of in-person payments.
//!
//! The vendor raises the bill at the door (`initiate`), the customer receives
//! a four digit code, and the vendor submits it with the same bill
//! (`confirm`). The challenge lives on the booking, so it is serialized by the
//! booking's version token like every other payment write.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;

use super::metrics;
use super::notifier::{Notification, NotificationDispatcher};
use super::settlement::PricingPolicy;
use super::store::{load_booking, update_booking, Mutation, PaymentStore};
use super::wallet::WalletLedger;
use crate::config::CashCollectionConfig;
use crate::error::{PaymentError, PaymentResult};
use crate::models::{Booking, ExtraCharge, OtpChallenge, PaymentStatus};

/// Returned to the vendor. Never carries the code.
#[derive(Debug, Clone, Serialize)]
pub struct CashInitiation {
    pub booking_id: String,
    pub otp_sent: bool,
    pub expires_at: DateTime<Utc>,
    pub total: i64,
}

enum CodeCheck {
    Match,
    Mismatch,
}

#[derive(Clone)]
pub struct CashCollection {
    store: Arc<dyn PaymentStore>,
    wallet: WalletLedger,
    policy: PricingPolicy,
    notifier: NotificationDispatcher,
    otp_ttl: Duration,
    max_attempts: u32,
}

impl CashCollection {
    pub fn new(
        store: Arc<dyn PaymentStore>,
        wallet: WalletLedger,
        policy: PricingPolicy,
        notifier: NotificationDispatcher,
        config: &CashCollectionConfig,
    ) -> Self {
        Self {
            store,
            wallet,
            policy,
            notifier,
            otp_ttl: Duration::seconds(config.otp_ttl_secs),
            max_attempts: config.otp_max_attempts.max(1),
        }
    }

    /// Validate the bill and issue a fresh challenge, replacing any live one.
    #[tracing::instrument(skip(self, extras), fields(extra_items = extras.len()))]
    pub async fn initiate(
        &self,
        booking_id: &str,
        proposed_total: i64,
        extras: Vec<ExtraCharge>,
    ) -> PaymentResult<CashInitiation> {
        let code = generate_code();
        let ttl = self.otp_ttl;

        let (booking, superseded) = update_booking(self.store.as_ref(), booking_id, |booking| {
            ensure_collectable(booking)?;
            if booking.payment_status.is_final() {
                return Err(already_settled(booking));
            }

            let expected = booking.billable_total_with(&extras)?;
            if proposed_total != expected {
                return Err(PaymentError::Validation(format!(
                    "Proposed total {} does not match the bill of {}",
                    proposed_total, expected
                )));
            }

            let superseded = booking
                .otp_challenge
                .as_ref()
                .is_some_and(|c| !c.consumed);
            booking.otp_challenge = Some(OtpChallenge::issue(
                code.clone(),
                Utc::now(),
                ttl,
                proposed_total,
                extras.clone(),
            ));
            Ok(Mutation::Apply(superseded))
        })
        .await?;

        let expires_at = booking
            .otp_challenge
            .as_ref()
            .map(|c| c.expires_at)
            .unwrap_or_else(|| Utc::now() + ttl);

        tracing::info!(
            booking_id = %booking.id,
            vendor_id = %booking.vendor_id,
            total = proposed_total,
            superseded,
            %expires_at,
            "Cash collection OTP issued"
        );

        self.notifier
            .dispatch(Notification::CashOtp {
                user_id: booking.user_id.clone(),
                booking_id: booking.id.clone(),
                code,
                amount: proposed_total,
            })
            .await;

        Ok(CashInitiation {
            booking_id: booking.id,
            otp_sent: true,
            expires_at,
            total: proposed_total,
        })
    }

    /// Consume the challenge and mark the booking collected by the vendor.
    #[tracing::instrument(skip(self, code, extras), fields(extra_items = extras.len()))]
    pub async fn confirm(
        &self,
        booking_id: &str,
        code: &str,
        final_total: i64,
        extras: Vec<ExtraCharge>,
    ) -> PaymentResult<Booking> {
        let booking = load_booking(self.store.as_ref(), booking_id).await?;
        let (check, issued_at) = check_challenge(&booking, code, final_total, &extras, Utc::now())?;

        if let CodeCheck::Mismatch = check {
            self.record_failed_attempt(booking_id, issued_at).await?;
            return Err(PaymentError::InvalidOtp);
        }

        // Booking first, then the dues; the booking is restored if the dues write fails.
        let policy = &self.policy;
        let (booking, (before, dues)) = update_booking(self.store.as_ref(), booking_id, |booking| {
            let (check, current_issue) =
                check_challenge(booking, code, final_total, &extras, Utc::now())?;
            if current_issue != issued_at || matches!(check, CodeCheck::Mismatch) {
                return Err(PaymentError::InvalidOtp);
            }
            let before = booking.clone();

            let Some(challenge) = booking.otp_challenge.as_mut() else {
                return Err(PaymentError::InvalidOtp);
            };
            challenge.consumed = true;
            let extra_charges = challenge.snapshot_extra_items.clone();
            let final_amount = challenge.snapshot_total;

            booking.extra_charges = extra_charges;
            booking.final_amount = final_amount;
            booking.transition_payment(PaymentStatus::CollectedByVendor)?;

            let split = policy.apply(booking)?;
            Ok(Mutation::Apply((before, split.admin_commission)))
        })
        .await?;

        if let Err(e) = self.wallet.record_cash_due(&booking.vendor_id, dues).await {
            tracing::warn!(
                error = %e,
                booking_id = %booking_id,
                dues,
                "Vendor dues not recorded, restoring uncollected booking"
            );
            self.restore_uncollected(&booking, &before).await;
            return Err(e);
        }

        tracing::info!(
            booking_id = %booking.id,
            vendor_id = %booking.vendor_id,
            final_amount = booking.final_amount,
            dues,
            "Cash collected by vendor"
        );
        let rail = booking.payment_method.as_str();
        metrics::record_outcome(rail, "collected");
        metrics::record_amount(rail, booking.final_amount);

        self.notifier
            .dispatch(Notification::PaymentConfirmed {
                user_id: booking.user_id.clone(),
                booking_id: booking.id.clone(),
                amount: booking.final_amount,
                method: rail.to_string(),
            })
            .await;

        Ok(booking)
    }

    /// Undo a confirmation whose dues could not be recorded, provided nothing
    /// has written the booking since.
    async fn restore_uncollected(&self, collected: &Booking, before: &Booking) {
        let restored = update_booking(self.store.as_ref(), &collected.id, |booking| {
            if booking.version != collected.version {
                return Err(PaymentError::Conflict(booking.id.clone()));
            }
            booking.payment_status = before.payment_status;
            booking.paid_at = before.paid_at;
            booking.otp_challenge = before.otp_challenge.clone();
            booking.extra_charges = before.extra_charges.clone();
            booking.final_amount = before.final_amount;
            booking.vendor_earnings = before.vendor_earnings;
            booking.admin_commission = before.admin_commission;
            booking.worker_earnings = before.worker_earnings;
            Ok(Mutation::Apply(()))
        })
        .await;

        if let Err(e) = restored {
            tracing::error!(
                error = %e,
                booking_id = %collected.id,
                "Cash collection committed without vendor dues, needs reconciliation"
            );
        }
    }

    async fn record_failed_attempt(
        &self,
        booking_id: &str,
        issued_at: DateTime<Utc>,
    ) -> PaymentResult<()> {
        let max_attempts = self.max_attempts;
        let (_, outcome) = update_booking(self.store.as_ref(), booking_id, |booking| {
            let Some(challenge) = booking
                .otp_challenge
                .as_mut()
                .filter(|c| !c.consumed && c.issued_at == issued_at)
            else {
                return Ok(Mutation::Unchanged(None));
            };

            challenge.attempts += 1;
            let attempts = challenge.attempts;
            // `max_attempts` wrong codes spend the challenge; any further attempt needs a new one.
            let locked = attempts >= max_attempts;
            if locked {
                booking.otp_challenge = None;
            }
            Ok(Mutation::Apply(Some((attempts, locked))))
        })
        .await?;

        match outcome {
            Some((attempts, true)) => tracing::warn!(
                booking_id = %booking_id,
                attempts,
                "Cash OTP locked out after repeated failures, re-initiation required"
            ),
            Some((attempts, false)) => tracing::warn!(
                booking_id = %booking_id,
                attempts,
                "Cash OTP mismatch"
            ),
            None => {}
        }
        Ok(())
    }
}

fn generate_code() -> String {
    format!("{:04}", rand::thread_rng().gen_range(0..10_000))
}

fn ensure_collectable(booking: &Booking) -> PaymentResult<()> {
    if !booking.payment_method.is_in_person() {
        return Err(PaymentError::UnsupportedPaymentMethod(
            booking.payment_method.to_string(),
        ));
    }
    if !booking.status.is_billable() {
        return Err(PaymentError::Validation(format!(
            "Booking {} is not ready for billing",
            booking.id
        )));
    }
    Ok(())
}

fn already_settled(booking: &Booking) -> PaymentError {
    if booking.payment_status.is_paid() {
        PaymentError::AlreadyPaid(booking.id.clone())
    } else {
        PaymentError::Validation(format!("Booking {} has been refunded", booking.id))
    }
}

/// Classify a confirmation against the live challenge without mutating anything.
///
/// Hard failures (no live challenge, expiry, settled booking) are errors;
/// a wrong code or a stale bill is a `Mismatch` that counts as an attempt.
fn check_challenge(
    booking: &Booking,
    code: &str,
    total: i64,
    extras: &[ExtraCharge],
    now: DateTime<Utc>,
) -> PaymentResult<(CodeCheck, DateTime<Utc>)> {
    if !booking.payment_method.is_in_person() {
        return Err(PaymentError::UnsupportedPaymentMethod(
            booking.payment_method.to_string(),
        ));
    }

    let challenge = booking
        .otp_challenge
        .as_ref()
        .filter(|c| !c.consumed)
        .ok_or(PaymentError::InvalidOtp)?;

    if booking.payment_status.is_final() {
        return Err(already_settled(booking));
    }
    ensure_collectable(booking)?;
    if challenge.is_expired(now) {
        return Err(PaymentError::OtpExpired);
    }

    let check = if challenge.code_matches(code) && challenge.snapshot_matches(total, extras) {
        CodeCheck::Match
    } else {
        CodeCheck::Mismatch
    };
    Ok((check, challenge.issued_at))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PricingConfig;
    use crate::models::{
        BookingStatus, NewBooking, PaymentMethod, SettlementRecord, TopupOrder, UserWallet,
        VendorLedger, WalletTransaction,
    };
    use crate::services::memory_store::InMemoryPaymentStore;
    use crate::services::notifier::LogNotifier;
    use async_trait::async_trait;

    /// In-memory store whose vendor dues writes always fail.
    struct DuesOutage(InMemoryPaymentStore);

    #[async_trait]
    impl PaymentStore for DuesOutage {
        async fn insert_booking(&self, booking: &Booking) -> anyhow::Result<bool> {
            self.0.insert_booking(booking).await
        }
        async fn get_booking(&self, booking_id: &str) -> anyhow::Result<Option<Booking>> {
            self.0.get_booking(booking_id).await
        }
        async fn find_booking_by_order_id(&self, order_id: &str) -> anyhow::Result<Option<Booking>> {
            self.0.find_booking_by_order_id(order_id).await
        }
        async fn replace_booking(&self, booking: &Booking, expected_version: u64) -> anyhow::Result<bool> {
            self.0.replace_booking(booking, expected_version).await
        }
        async fn get_wallet(&self, user_id: &str) -> anyhow::Result<Option<UserWallet>> {
            self.0.get_wallet(user_id).await
        }
        async fn debit_wallet(&self, user_id: &str, amount: i64) -> anyhow::Result<Option<i64>> {
            self.0.debit_wallet(user_id, amount).await
        }
        async fn credit_wallet(&self, user_id: &str, amount: i64) -> anyhow::Result<i64> {
            self.0.credit_wallet(user_id, amount).await
        }
        async fn record_wallet_transaction(&self, entry: &WalletTransaction) -> anyhow::Result<()> {
            self.0.record_wallet_transaction(entry).await
        }
        async fn list_wallet_transactions(
            &self,
            user_id: &str,
            limit: usize,
        ) -> anyhow::Result<Vec<WalletTransaction>> {
            self.0.list_wallet_transactions(user_id, limit).await
        }
        async fn get_vendor_ledger(&self, vendor_id: &str) -> anyhow::Result<Option<VendorLedger>> {
            self.0.get_vendor_ledger(vendor_id).await
        }
        async fn add_vendor_dues(
            &self,
            _vendor_id: &str,
            _delta: i64,
            _default_cash_limit: i64,
        ) -> anyhow::Result<VendorLedger> {
            anyhow::bail!("vendor ledger unavailable")
        }
        async fn settle_vendor_dues(
            &self,
            vendor_id: &str,
            record: &SettlementRecord,
        ) -> anyhow::Result<Option<VendorLedger>> {
            self.0.settle_vendor_dues(vendor_id, record).await
        }
        async fn insert_topup_order(&self, order: &TopupOrder) -> anyhow::Result<()> {
            self.0.insert_topup_order(order).await
        }
        async fn get_topup_order(&self, order_id: &str) -> anyhow::Result<Option<TopupOrder>> {
            self.0.get_topup_order(order_id).await
        }
        async fn mark_topup_credited(
            &self,
            order_id: &str,
            payment_id: &str,
        ) -> anyhow::Result<Option<TopupOrder>> {
            self.0.mark_topup_credited(order_id, payment_id).await
        }
        async fn revert_topup_credit(&self, order_id: &str) -> anyhow::Result<()> {
            self.0.revert_topup_credit(order_id).await
        }
    }

    fn collection(store: Arc<dyn PaymentStore>) -> CashCollection {
        let config = CashCollectionConfig::default();
        CashCollection::new(
            store.clone(),
            WalletLedger::new(store, config.default_cash_limit),
            PricingPolicy::from(&PricingConfig::default()),
            NotificationDispatcher::new(Arc::new(LogNotifier), std::time::Duration::from_secs(1)),
            &config,
        )
    }

    #[tokio::test]
    async fn failed_dues_write_leaves_booking_uncollected() {
        let store: Arc<dyn PaymentStore> = Arc::new(DuesOutage(InMemoryPaymentStore::new()));
        let booking = Booking::new(NewBooking {
            id: "bk_outage".to_string(),
            user_id: "user_1".to_string(),
            vendor_id: "vendor_1".to_string(),
            worker_id: None,
            status: BookingStatus::Arrived,
            payment_method: PaymentMethod::Cash,
            base_price: 75_000,
            tax: 0,
            visiting_charge: 0,
            discount: 0,
        })
        .unwrap();
        store.insert_booking(&booking).await.unwrap();

        let cash = collection(store.clone());
        cash.initiate("bk_outage", 75_000, Vec::new()).await.unwrap();
        let code = store
            .get_booking("bk_outage")
            .await
            .unwrap()
            .and_then(|b| b.otp_challenge)
            .map(|c| c.code)
            .unwrap();

        let result = cash.confirm("bk_outage", &code, 75_000, Vec::new()).await;
        assert!(matches!(result, Err(PaymentError::Storage(_))));

        let booking = store.get_booking("bk_outage").await.unwrap().unwrap();
        assert_eq!(booking.payment_status, PaymentStatus::None);
        assert!(booking.admin_commission.is_none());
        let challenge = booking.otp_challenge.unwrap();
        assert!(!challenge.consumed);
    }

    #[test]
    fn codes_are_four_digits() {
        for _ in 0..200 {
            let code = generate_code();
            assert_eq!(code.len(), 4);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }
}
