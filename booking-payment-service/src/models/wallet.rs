//! Customer wallets, vendor cash ledgers and wallet top-up orders.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prefunded customer balance in minor units. Never negative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserWallet {
    #[serde(rename = "_id")]
    pub user_id: String,
    pub balance: i64,
    pub updated_at: DateTime<Utc>,
}

impl UserWallet {
    pub fn empty(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            balance: 0,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WalletEntryKind {
    Debit,
    Credit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WalletReason {
    BookingPayment,
    BookingRefund,
    TopUp,
    /// Reversal of a debit whose booking write lost a race.
    Compensation,
}

/// One applied wallet movement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletTransaction {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub kind: WalletEntryKind,
    pub reason: WalletReason,
    pub amount: i64,
    pub balance_after: i64,
    pub reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl WalletTransaction {
    pub fn new(
        user_id: &str,
        kind: WalletEntryKind,
        reason: WalletReason,
        amount: i64,
        balance_after: i64,
        reference: Option<String>,
    ) -> Self {
        Self {
            id: format!("wtx_{}", Uuid::new_v4().simple()),
            user_id: user_id.to_string(),
            kind,
            reason,
            amount,
            balance_after,
            reference,
            created_at: Utc::now(),
        }
    }
}

/// An approved settlement of cash dues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementRecord {
    pub id: String,
    pub amount: i64,
    pub proof: String,
    pub settled_at: DateTime<Utc>,
}

/// Cash a vendor has collected on the platform's behalf.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorLedger {
    #[serde(rename = "_id")]
    pub vendor_id: String,
    pub dues: i64,
    pub cash_limit: i64,
    pub settlement_history: Vec<SettlementRecord>,
    pub updated_at: DateTime<Utc>,
}

impl VendorLedger {
    pub fn new(vendor_id: &str, cash_limit: i64) -> Self {
        Self {
            vendor_id: vendor_id.to_string(),
            dues: 0,
            cash_limit,
            settlement_history: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    /// Read by dispatch: a suspended vendor receives no new bookings.
    pub fn is_suspended(&self) -> bool {
        self.dues > self.cash_limit
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TopupStatus {
    Created,
    Credited,
}

/// Gateway order that funds a wallet rather than a booking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopupOrder {
    #[serde(rename = "_id")]
    pub order_id: String,
    pub user_id: String,
    pub amount: i64,
    pub currency: String,
    pub status: TopupStatus,
    pub gateway_payment_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vendor_is_suspended_only_above_limit() {
        let mut ledger = VendorLedger::new("vendor_1", 10_000);
        assert!(!ledger.is_suspended());
        ledger.dues = 10_000;
        assert!(!ledger.is_suspended());
        ledger.dues = 10_001;
        assert!(ledger.is_suspended());
    }
}
