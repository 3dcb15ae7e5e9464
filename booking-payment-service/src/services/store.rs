//! Persistence port for the payment engine.
//!
//! Every booking write is a compare-and-swap on `Booking::version`; wallet and
//! ledger movements are single conditional updates in the backing store.

use async_trait::async_trait;
use chrono::Utc;

use crate::error::{PaymentError, PaymentResult};
use crate::models::{
    Booking, SettlementRecord, TopupOrder, UserWallet, VendorLedger, WalletTransaction,
};

/// Attempts made by [`update_booking`] before reporting a conflict.
pub const MAX_BOOKING_WRITE_ATTEMPTS: usize = 3;

#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Insert a new booking; `false` when the id is already taken.
    async fn insert_booking(&self, booking: &Booking) -> anyhow::Result<bool>;

    async fn get_booking(&self, booking_id: &str) -> anyhow::Result<Option<Booking>>;

    async fn find_booking_by_order_id(&self, order_id: &str) -> anyhow::Result<Option<Booking>>;

    /// Replace the stored booking only if its version is still `expected_version`.
    async fn replace_booking(&self, booking: &Booking, expected_version: u64)
        -> anyhow::Result<bool>;

    async fn get_wallet(&self, user_id: &str) -> anyhow::Result<Option<UserWallet>>;

    /// Atomically decrement when `balance >= amount`; `None` when it would underflow.
    async fn debit_wallet(&self, user_id: &str, amount: i64) -> anyhow::Result<Option<i64>>;

    /// Atomically increment, creating the wallet on first credit.
    async fn credit_wallet(&self, user_id: &str, amount: i64) -> anyhow::Result<i64>;

    async fn record_wallet_transaction(&self, entry: &WalletTransaction) -> anyhow::Result<()>;

    async fn list_wallet_transactions(
        &self,
        user_id: &str,
        limit: usize,
    ) -> anyhow::Result<Vec<WalletTransaction>>;

    async fn get_vendor_ledger(&self, vendor_id: &str) -> anyhow::Result<Option<VendorLedger>>;

    /// Add `delta` (may be negative) to a vendor's dues, creating the ledger on first use.
    async fn add_vendor_dues(
        &self,
        vendor_id: &str,
        delta: i64,
        default_cash_limit: i64,
    ) -> anyhow::Result<VendorLedger>;

    /// Apply an approved settlement when `dues >= record.amount`.
    async fn settle_vendor_dues(
        &self,
        vendor_id: &str,
        record: &SettlementRecord,
    ) -> anyhow::Result<Option<VendorLedger>>;

    async fn insert_topup_order(&self, order: &TopupOrder) -> anyhow::Result<()>;

    async fn get_topup_order(&self, order_id: &str) -> anyhow::Result<Option<TopupOrder>>;

    /// Flip a top-up from `Created` to `Credited`; `None` if it was not `Created`.
    async fn mark_topup_credited(
        &self,
        order_id: &str,
        payment_id: &str,
    ) -> anyhow::Result<Option<TopupOrder>>;

    /// Undo [`PaymentStore::mark_topup_credited`] after a failed credit.
    async fn revert_topup_credit(&self, order_id: &str) -> anyhow::Result<()>;
}

/// Result of a booking mutation closure.
pub enum Mutation<T> {
    /// Persist the mutated booking.
    Apply(T),
    /// Nothing to write (idempotent replay and similar).
    Unchanged(T),
}

/// Load, mutate and compare-and-swap a booking, retrying on version conflicts.
///
/// `apply` runs against freshly loaded state on every attempt, so its
/// validations always see the latest write. An `Err` from `apply` aborts
/// without writing.
pub async fn update_booking<T, F>(
    store: &dyn PaymentStore,
    booking_id: &str,
    mut apply: F,
) -> PaymentResult<(Booking, T)>
where
    F: FnMut(&mut Booking) -> PaymentResult<Mutation<T>> + Send,
    T: Send,
{
    for attempt in 1..=MAX_BOOKING_WRITE_ATTEMPTS {
        let current = load_booking(store, booking_id).await?;
        let mut next = current.clone();

        match apply(&mut next)? {
            Mutation::Unchanged(out) => return Ok((current, out)),
            Mutation::Apply(out) => {
                next.version = current.version + 1;
                next.updated_at = Utc::now();

                let written = store
                    .replace_booking(&next, current.version)
                    .await
                    .map_err(|e| PaymentError::storage("replace booking", e))?;

                if written {
                    return Ok((next, out));
                }

                tracing::debug!(
                    booking_id = %booking_id,
                    attempt,
                    version = current.version,
                    "Booking version conflict, retrying"
                );
            }
        }
    }

    tracing::warn!(booking_id = %booking_id, "Booking write lost every retry");
    Err(PaymentError::Conflict(booking_id.to_string()))
}

pub async fn load_booking(store: &dyn PaymentStore, booking_id: &str) -> PaymentResult<Booking> {
    store
        .get_booking(booking_id)
        .await
        .map_err(|e| PaymentError::storage("load booking", e))?
        .ok_or_else(|| PaymentError::NotFound(format!("Booking {}", booking_id)))
}
