//! MongoDB-backed `PaymentStore`.
//!
//! Conditional updates carry their precondition in the filter (`version`,
//! `balance >= amount`, `dues >= amount`, `status = CREATED`) so each one is a
//! single server-side operation.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use futures::TryStreamExt;
use mongodb::options::{
    FindOneAndUpdateOptions, FindOptions, IndexOptions, ReturnDocument,
};
use mongodb::{
    bson::{doc, to_bson},
    Collection, Database, IndexModel,
};

use super::store::PaymentStore;
use crate::models::{
    Booking, SettlementRecord, TopupOrder, TopupStatus, UserWallet, VendorLedger,
    WalletTransaction,
};

const DUPLICATE_KEY: i32 = 11000;

#[derive(Clone)]
pub struct PaymentRepository {
    bookings: Collection<Booking>,
    wallets: Collection<UserWallet>,
    wallet_transactions: Collection<WalletTransaction>,
    vendor_ledgers: Collection<VendorLedger>,
    topup_orders: Collection<TopupOrder>,
}

impl PaymentRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            bookings: db.collection("booking_payments"),
            wallets: db.collection("user_wallets"),
            wallet_transactions: db.collection("wallet_transactions"),
            vendor_ledgers: db.collection("vendor_ledgers"),
            topup_orders: db.collection("wallet_topup_orders"),
        }
    }

    /// Initialize database indexes.
    pub async fn init_indexes(&self) -> Result<()> {
        // One live gateway order per booking; bookings without an order are skipped.
        let order_index = IndexModel::builder()
            .keys(doc! { "gateway_order_id": 1 })
            .options(
                IndexOptions::builder()
                    .name("booking_gateway_order_idx".to_string())
                    .unique(true)
                    .partial_filter_expression(doc! { "gateway_order_id": { "$type": "string" } })
                    .build(),
            )
            .build();

        let user_index = IndexModel::builder()
            .keys(doc! { "user_id": 1, "payment_status": 1 })
            .options(
                IndexOptions::builder()
                    .name("booking_user_status_idx".to_string())
                    .build(),
            )
            .build();

        let superseded_index = IndexModel::builder()
            .keys(doc! { "superseded_order_ids": 1 })
            .options(
                IndexOptions::builder()
                    .name("booking_superseded_order_idx".to_string())
                    .build(),
            )
            .build();

        self.bookings
            .create_indexes([order_index, superseded_index, user_index], None)
            .await?;

        let wallet_tx_index = IndexModel::builder()
            .keys(doc! { "user_id": 1, "created_at": -1 })
            .options(
                IndexOptions::builder()
                    .name("wallet_tx_user_idx".to_string())
                    .build(),
            )
            .build();

        self.wallet_transactions
            .create_indexes([wallet_tx_index], None)
            .await?;

        tracing::info!("Booking payment indexes initialized");
        Ok(())
    }

    fn return_after(upsert: bool) -> FindOneAndUpdateOptions {
        FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .upsert(upsert)
            .build()
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    match err.kind.as_ref() {
        mongodb::error::ErrorKind::Write(mongodb::error::WriteFailure::WriteError(e)) => {
            e.code == DUPLICATE_KEY
        }
        _ => false,
    }
}

#[async_trait]
impl PaymentStore for PaymentRepository {
    async fn insert_booking(&self, booking: &Booking) -> Result<bool> {
        match self.bookings.insert_one(booking, None).await {
            Ok(_) => Ok(true),
            Err(e) if is_duplicate_key(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_booking(&self, booking_id: &str) -> Result<Option<Booking>> {
        let booking = self
            .bookings
            .find_one(doc! { "_id": booking_id }, None)
            .await?;
        Ok(booking)
    }

    async fn find_booking_by_order_id(&self, order_id: &str) -> Result<Option<Booking>> {
        let booking = self
            .bookings
            .find_one(
                doc! {
                    "$or": [
                        { "gateway_order_id": order_id },
                        { "superseded_order_ids": order_id },
                    ]
                },
                None,
            )
            .await?;
        Ok(booking)
    }

    async fn replace_booking(&self, booking: &Booking, expected_version: u64) -> Result<bool> {
        let filter = doc! {
            "_id": booking.id.as_str(),
            "version": expected_version as i64,
        };
        let result = self.bookings.replace_one(filter, booking, None).await?;
        Ok(result.matched_count == 1)
    }

    async fn get_wallet(&self, user_id: &str) -> Result<Option<UserWallet>> {
        let wallet = self.wallets.find_one(doc! { "_id": user_id }, None).await?;
        Ok(wallet)
    }

    async fn debit_wallet(&self, user_id: &str, amount: i64) -> Result<Option<i64>> {
        let filter = doc! { "_id": user_id, "balance": { "$gte": amount } };
        let update = doc! {
            "$inc": { "balance": -amount },
            "$set": { "updated_at": to_bson(&Utc::now())? },
        };
        let wallet = self
            .wallets
            .find_one_and_update(filter, update, Self::return_after(false))
            .await?;
        Ok(wallet.map(|w| w.balance))
    }

    async fn credit_wallet(&self, user_id: &str, amount: i64) -> Result<i64> {
        let update = doc! {
            "$inc": { "balance": amount },
            "$set": { "updated_at": to_bson(&Utc::now())? },
        };
        let wallet = self
            .wallets
            .find_one_and_update(doc! { "_id": user_id }, update, Self::return_after(true))
            .await?
            .ok_or_else(|| anyhow::anyhow!("wallet upsert returned no document"))?;
        Ok(wallet.balance)
    }

    async fn record_wallet_transaction(&self, entry: &WalletTransaction) -> Result<()> {
        self.wallet_transactions.insert_one(entry, None).await?;
        Ok(())
    }

    async fn list_wallet_transactions(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<WalletTransaction>> {
        let options = FindOptions::builder()
            .sort(doc! { "created_at": -1 })
            .limit(limit as i64)
            .build();

        let cursor = self
            .wallet_transactions
            .find(doc! { "user_id": user_id }, Some(options))
            .await?;

        let entries: Vec<WalletTransaction> = cursor.try_collect().await?;
        Ok(entries)
    }

    async fn get_vendor_ledger(&self, vendor_id: &str) -> Result<Option<VendorLedger>> {
        let ledger = self
            .vendor_ledgers
            .find_one(doc! { "_id": vendor_id }, None)
            .await?;
        Ok(ledger)
    }

    async fn add_vendor_dues(
        &self,
        vendor_id: &str,
        delta: i64,
        default_cash_limit: i64,
    ) -> Result<VendorLedger> {
        let update = doc! {
            "$inc": { "dues": delta },
            "$set": { "updated_at": to_bson(&Utc::now())? },
            "$setOnInsert": {
                "cash_limit": default_cash_limit,
                "settlement_history": [],
            },
        };
        let ledger = self
            .vendor_ledgers
            .find_one_and_update(doc! { "_id": vendor_id }, update, Self::return_after(true))
            .await?
            .ok_or_else(|| anyhow::anyhow!("vendor ledger upsert returned no document"))?;
        Ok(ledger)
    }

    async fn settle_vendor_dues(
        &self,
        vendor_id: &str,
        record: &SettlementRecord,
    ) -> Result<Option<VendorLedger>> {
        let filter = doc! { "_id": vendor_id, "dues": { "$gte": record.amount } };
        let update = doc! {
            "$inc": { "dues": -record.amount },
            "$push": { "settlement_history": to_bson(record)? },
            "$set": { "updated_at": to_bson(&Utc::now())? },
        };
        let ledger = self
            .vendor_ledgers
            .find_one_and_update(filter, update, Self::return_after(false))
            .await?;
        Ok(ledger)
    }

    async fn insert_topup_order(&self, order: &TopupOrder) -> Result<()> {
        self.topup_orders.insert_one(order, None).await?;
        Ok(())
    }

    async fn get_topup_order(&self, order_id: &str) -> Result<Option<TopupOrder>> {
        let order = self
            .topup_orders
            .find_one(doc! { "_id": order_id }, None)
            .await?;
        Ok(order)
    }

    async fn mark_topup_credited(
        &self,
        order_id: &str,
        payment_id: &str,
    ) -> Result<Option<TopupOrder>> {
        let filter = doc! {
            "_id": order_id,
            "status": to_bson(&TopupStatus::Created)?,
        };
        let update = doc! {
            "$set": {
                "status": to_bson(&TopupStatus::Credited)?,
                "gateway_payment_id": payment_id,
            }
        };
        let order = self
            .topup_orders
            .find_one_and_update(filter, update, Self::return_after(false))
            .await?;
        Ok(order)
    }

    async fn revert_topup_credit(&self, order_id: &str) -> Result<()> {
        let filter = doc! {
            "_id": order_id,
            "status": to_bson(&TopupStatus::Credited)?,
        };
        let update = doc! {
            "$set": {
                "status": to_bson(&TopupStatus::Created)?,
                "gateway_payment_id": null,
            }
        };
        self.topup_orders.update_one(filter, update, None).await?;
        Ok(())
    }
}
