//! Customer wallet and vendor cash ledger.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use super::store::PaymentStore;
use crate::error::{PaymentError, PaymentResult};
use crate::models::{
    SettlementRecord, VendorLedger, WalletEntryKind, WalletReason, WalletTransaction,
};

#[derive(Clone)]
pub struct WalletLedger {
    store: Arc<dyn PaymentStore>,
    default_cash_limit: i64,
}

impl WalletLedger {
    pub fn new(store: Arc<dyn PaymentStore>, default_cash_limit: i64) -> Self {
        Self {
            store,
            default_cash_limit,
        }
    }

    pub async fn balance(&self, user_id: &str) -> PaymentResult<i64> {
        let wallet = self
            .store
            .get_wallet(user_id)
            .await
            .map_err(|e| PaymentError::storage("load wallet", e))?;
        Ok(wallet.map_or(0, |w| w.balance))
    }

    /// Atomic check-then-decrement. Fails without mutation when the balance is short.
    pub async fn debit(
        &self,
        user_id: &str,
        amount: i64,
        reason: WalletReason,
        reference: Option<String>,
    ) -> PaymentResult<WalletTransaction> {
        if amount <= 0 {
            return Err(PaymentError::Validation(
                "Debit amount must be positive".to_string(),
            ));
        }

        let balance_after = self
            .store
            .debit_wallet(user_id, amount)
            .await
            .map_err(|e| PaymentError::storage("debit wallet", e))?
            .ok_or_else(|| {
                tracing::info!(user_id = %user_id, amount, "Wallet debit rejected, balance too low");
                PaymentError::InsufficientBalance
            })?;

        let entry = WalletTransaction::new(
            user_id,
            WalletEntryKind::Debit,
            reason,
            amount,
            balance_after,
            reference,
        );
        self.record(&entry).await;

        tracing::info!(
            user_id = %user_id,
            amount,
            balance_after,
            wallet_tx_id = %entry.id,
            "Wallet debited"
        );
        Ok(entry)
    }

    pub async fn credit(
        &self,
        user_id: &str,
        amount: i64,
        reason: WalletReason,
        reference: Option<String>,
    ) -> PaymentResult<WalletTransaction> {
        if amount < 0 {
            return Err(PaymentError::Validation(
                "Credit amount must not be negative".to_string(),
            ));
        }

        let balance_after = self
            .store
            .credit_wallet(user_id, amount)
            .await
            .map_err(|e| PaymentError::storage("credit wallet", e))?;

        let entry = WalletTransaction::new(
            user_id,
            WalletEntryKind::Credit,
            reason,
            amount,
            balance_after,
            reference,
        );
        self.record(&entry).await;

        tracing::info!(
            user_id = %user_id,
            amount,
            balance_after,
            reason = ?reason,
            "Wallet credited"
        );
        Ok(entry)
    }

    pub async fn history(&self, user_id: &str, limit: usize) -> PaymentResult<Vec<WalletTransaction>> {
        self.store
            .list_wallet_transactions(user_id, limit)
            .await
            .map_err(|e| PaymentError::storage("list wallet transactions", e))
    }

    // The balance update is the source of truth; the history row is best-effort.
    async fn record(&self, entry: &WalletTransaction) {
        if let Err(e) = self.store.record_wallet_transaction(entry).await {
            tracing::error!(
                error = ?e,
                wallet_tx_id = %entry.id,
                user_id = %entry.user_id,
                "Failed to record wallet transaction"
            );
        }
    }

    pub async fn vendor_ledger(&self, vendor_id: &str) -> PaymentResult<VendorLedger> {
        let ledger = self
            .store
            .get_vendor_ledger(vendor_id)
            .await
            .map_err(|e| PaymentError::storage("load vendor ledger", e))?;
        Ok(ledger.unwrap_or_else(|| VendorLedger::new(vendor_id, self.default_cash_limit)))
    }

    /// Increase the cash a vendor owes the platform.
    pub async fn record_cash_due(&self, vendor_id: &str, amount: i64) -> PaymentResult<VendorLedger> {
        if amount < 0 {
            return Err(PaymentError::Validation(
                "Cash due must not be negative".to_string(),
            ));
        }

        let ledger = self
            .store
            .add_vendor_dues(vendor_id, amount, self.default_cash_limit)
            .await
            .map_err(|e| PaymentError::storage("record cash due", e))?;

        if ledger.is_suspended() {
            tracing::warn!(
                vendor_id = %vendor_id,
                dues = ledger.dues,
                cash_limit = ledger.cash_limit,
                "Vendor dues exceed cash limit, vendor suspended from new bookings"
            );
        } else {
            tracing::info!(vendor_id = %vendor_id, amount, dues = ledger.dues, "Cash due recorded");
        }
        Ok(ledger)
    }

    /// Apply an admin-approved settlement of collected cash.
    pub async fn settle(
        &self,
        vendor_id: &str,
        amount: i64,
        proof: &str,
    ) -> PaymentResult<VendorLedger> {
        if amount <= 0 {
            return Err(PaymentError::Validation(
                "Settlement amount must be positive".to_string(),
            ));
        }
        if proof.trim().is_empty() {
            return Err(PaymentError::Validation(
                "Settlement proof is required".to_string(),
            ));
        }

        let record = SettlementRecord {
            id: format!("stl_{}", Uuid::new_v4().simple()),
            amount,
            proof: proof.trim().to_string(),
            settled_at: Utc::now(),
        };

        match self
            .store
            .settle_vendor_dues(vendor_id, &record)
            .await
            .map_err(|e| PaymentError::storage("settle vendor dues", e))?
        {
            Some(ledger) => {
                tracing::info!(
                    vendor_id = %vendor_id,
                    amount,
                    dues = ledger.dues,
                    settlement_id = %record.id,
                    "Vendor dues settled"
                );
                Ok(ledger)
            }
            None => {
                let ledger = self.vendor_ledger(vendor_id).await?;
                Err(PaymentError::Validation(format!(
                    "Settlement of {} exceeds outstanding dues of {}",
                    amount, ledger.dues
                )))
            }
        }
    }
}
