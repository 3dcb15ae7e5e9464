//! In-process `PaymentStore` used by tests and `database.backend = "memory"`.
//!
//! Each conditional update runs under the owning `DashMap` shard lock, which
//! gives the same check-and-write atomicity the MongoDB filters provide.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::{Arc, Mutex};

use super::store::PaymentStore;
use crate::models::{
    Booking, SettlementRecord, TopupOrder, TopupStatus, UserWallet, VendorLedger,
    WalletTransaction,
};

#[derive(Default)]
struct Inner {
    bookings: DashMap<String, Booking>,
    wallets: DashMap<String, UserWallet>,
    wallet_transactions: Mutex<Vec<WalletTransaction>>,
    vendor_ledgers: DashMap<String, VendorLedger>,
    topup_orders: DashMap<String, TopupOrder>,
}

#[derive(Clone, Default)]
pub struct InMemoryPaymentStore {
    inner: Arc<Inner>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn insert_booking(&self, booking: &Booking) -> anyhow::Result<bool> {
        match self.inner.bookings.entry(booking.id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Ok(false),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(booking.clone());
                Ok(true)
            }
        }
    }

    async fn get_booking(&self, booking_id: &str) -> anyhow::Result<Option<Booking>> {
        Ok(self.inner.bookings.get(booking_id).map(|b| b.value().clone()))
    }

    async fn find_booking_by_order_id(&self, order_id: &str) -> anyhow::Result<Option<Booking>> {
        Ok(self
            .inner
            .bookings
            .iter()
            .find(|b| b.holds_order(order_id))
            .map(|b| b.value().clone()))
    }

    async fn replace_booking(
        &self,
        booking: &Booking,
        expected_version: u64,
    ) -> anyhow::Result<bool> {
        match self.inner.bookings.get_mut(&booking.id) {
            Some(mut current) if current.version == expected_version => {
                *current = booking.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get_wallet(&self, user_id: &str) -> anyhow::Result<Option<UserWallet>> {
        Ok(self.inner.wallets.get(user_id).map(|w| w.value().clone()))
    }

    async fn debit_wallet(&self, user_id: &str, amount: i64) -> anyhow::Result<Option<i64>> {
        match self.inner.wallets.get_mut(user_id) {
            Some(mut wallet) if wallet.balance >= amount => {
                wallet.balance -= amount;
                wallet.updated_at = Utc::now();
                Ok(Some(wallet.balance))
            }
            _ => Ok(None),
        }
    }

    async fn credit_wallet(&self, user_id: &str, amount: i64) -> anyhow::Result<i64> {
        let mut wallet = self
            .inner
            .wallets
            .entry(user_id.to_string())
            .or_insert_with(|| UserWallet::empty(user_id));
        wallet.balance += amount;
        wallet.updated_at = Utc::now();
        Ok(wallet.balance)
    }

    async fn record_wallet_transaction(&self, entry: &WalletTransaction) -> anyhow::Result<()> {
        self.inner
            .wallet_transactions
            .lock()
            .map_err(|_| anyhow::anyhow!("wallet transaction log poisoned"))?
            .push(entry.clone());
        Ok(())
    }

    async fn list_wallet_transactions(
        &self,
        user_id: &str,
        limit: usize,
    ) -> anyhow::Result<Vec<WalletTransaction>> {
        let log = self
            .inner
            .wallet_transactions
            .lock()
            .map_err(|_| anyhow::anyhow!("wallet transaction log poisoned"))?;
        Ok(log
            .iter()
            .rev()
            .filter(|t| t.user_id == user_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get_vendor_ledger(&self, vendor_id: &str) -> anyhow::Result<Option<VendorLedger>> {
        Ok(self
            .inner
            .vendor_ledgers
            .get(vendor_id)
            .map(|l| l.value().clone()))
    }

    async fn add_vendor_dues(
        &self,
        vendor_id: &str,
        delta: i64,
        default_cash_limit: i64,
    ) -> anyhow::Result<VendorLedger> {
        let mut ledger = self
            .inner
            .vendor_ledgers
            .entry(vendor_id.to_string())
            .or_insert_with(|| VendorLedger::new(vendor_id, default_cash_limit));
        ledger.dues += delta;
        ledger.updated_at = Utc::now();
        Ok(ledger.value().clone())
    }

    async fn settle_vendor_dues(
        &self,
        vendor_id: &str,
        record: &SettlementRecord,
    ) -> anyhow::Result<Option<VendorLedger>> {
        match self.inner.vendor_ledgers.get_mut(vendor_id) {
            Some(mut ledger) if ledger.dues >= record.amount => {
                ledger.dues -= record.amount;
                ledger.settlement_history.push(record.clone());
                ledger.updated_at = Utc::now();
                Ok(Some(ledger.value().clone()))
            }
            _ => Ok(None),
        }
    }

    async fn insert_topup_order(&self, order: &TopupOrder) -> anyhow::Result<()> {
        self.inner
            .topup_orders
            .insert(order.order_id.clone(), order.clone());
        Ok(())
    }

    async fn get_topup_order(&self, order_id: &str) -> anyhow::Result<Option<TopupOrder>> {
        Ok(self
            .inner
            .topup_orders
            .get(order_id)
            .map(|o| o.value().clone()))
    }

    async fn mark_topup_credited(
        &self,
        order_id: &str,
        payment_id: &str,
    ) -> anyhow::Result<Option<TopupOrder>> {
        match self.inner.topup_orders.get_mut(order_id) {
            Some(mut order) if order.status == TopupStatus::Created => {
                order.status = TopupStatus::Credited;
                order.gateway_payment_id = Some(payment_id.to_string());
                Ok(Some(order.value().clone()))
            }
            _ => Ok(None),
        }
    }

    async fn revert_topup_credit(&self, order_id: &str) -> anyhow::Result<()> {
        if let Some(mut order) = self.inner.topup_orders.get_mut(order_id) {
            order.status = TopupStatus::Created;
            order.gateway_payment_id = None;
        }
        Ok(())
    }
}
