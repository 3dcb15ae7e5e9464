//! Request and response bodies. Amounts cross the API in major units.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::PaymentError;
use crate::models::{
    to_major, to_minor, Booking, BookingStatus, ExtraCharge, PaymentMethod, PaymentStatus,
    SettlementRecord, SettlementStatus, VendorLedger, WalletEntryKind, WalletReason,
    WalletTransaction, WorkerPaymentStatus,
};
use crate::services::settlement::PayoutOutcome;

/// Extra line item as entered by the vendor.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtraItemInput {
    pub name: String,
    pub price: Decimal,
    pub qty: u32,
    #[serde(default)]
    pub gst_percentage: Decimal,
}

impl ExtraItemInput {
    pub fn to_charge(&self) -> Result<ExtraCharge, PaymentError> {
        ExtraCharge::new(&self.name, to_minor(self.price)?, self.qty, self.gst_percentage)
    }
}

pub fn to_charges(items: &[ExtraItemInput]) -> Result<Vec<ExtraCharge>, PaymentError> {
    items.iter().map(ExtraItemInput::to_charge).collect()
}

fn positive_minor(amount: Decimal, field: &str) -> Result<i64, PaymentError> {
    let minor = to_minor(amount)?;
    if minor <= 0 {
        return Err(PaymentError::Validation(format!("{} must be positive", field)));
    }
    Ok(minor)
}

fn non_negative_minor(amount: Decimal, field: &str) -> Result<i64, PaymentError> {
    let minor = to_minor(amount)?;
    if minor < 0 {
        return Err(PaymentError::Validation(format!("{} must not be negative", field)));
    }
    Ok(minor)
}

#[derive(Debug, Serialize)]
pub struct ExtraChargeView {
    pub name: String,
    pub unit_price: Decimal,
    pub qty: u32,
    pub gst_percentage: Decimal,
    pub line_total: Decimal,
}

impl From<&ExtraCharge> for ExtraChargeView {
    fn from(e: &ExtraCharge) -> Self {
        Self {
            name: e.name.clone(),
            unit_price: to_major(e.unit_price),
            qty: e.qty,
            gst_percentage: e.gst_percentage,
            line_total: to_major(e.line_total),
        }
    }
}

/// Live OTP challenge state, without the code.
#[derive(Debug, Serialize)]
pub struct OtpChallengeView {
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub attempts: u32,
    pub consumed: bool,
    pub total: Decimal,
}

#[derive(Debug, Serialize)]
pub struct BookingPaymentView {
    pub id: String,
    pub user_id: String,
    pub vendor_id: String,
    pub worker_id: Option<String>,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: PaymentMethod,
    pub payment_id: Option<String>,
    pub gateway_order_id: Option<String>,
    pub gateway_payment_id: Option<String>,
    pub base_price: Decimal,
    pub tax: Decimal,
    pub visiting_charge: Decimal,
    pub discount: Decimal,
    pub extra_charges: Vec<ExtraChargeView>,
    pub final_amount: Decimal,
    pub vendor_earnings: Option<Decimal>,
    pub admin_commission: Option<Decimal>,
    pub worker_earnings: Option<Decimal>,
    pub worker_payment_status: WorkerPaymentStatus,
    pub final_settlement_status: SettlementStatus,
    pub refund_amount: Option<Decimal>,
    pub otp_challenge: Option<OtpChallengeView>,
    pub paid_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Booking> for BookingPaymentView {
    fn from(b: &Booking) -> Self {
        Self {
            id: b.id.clone(),
            user_id: b.user_id.clone(),
            vendor_id: b.vendor_id.clone(),
            worker_id: b.worker_id.clone(),
            status: b.status,
            payment_status: b.payment_status,
            payment_method: b.payment_method,
            payment_id: b.payment_id.clone(),
            gateway_order_id: b.gateway_order_id.clone(),
            gateway_payment_id: b.gateway_payment_id.clone(),
            base_price: to_major(b.base_price),
            tax: to_major(b.tax),
            visiting_charge: to_major(b.visiting_charge),
            discount: to_major(b.discount),
            extra_charges: b.extra_charges.iter().map(ExtraChargeView::from).collect(),
            final_amount: to_major(b.final_amount),
            vendor_earnings: b.vendor_earnings.map(to_major),
            admin_commission: b.admin_commission.map(to_major),
            worker_earnings: b.worker_earnings.map(to_major),
            worker_payment_status: b.worker_payment_status,
            final_settlement_status: b.final_settlement_status,
            refund_amount: b.refund_amount.map(to_major),
            otp_challenge: b.otp_challenge.as_ref().map(|c| OtpChallengeView {
                issued_at: c.issued_at,
                expires_at: c.expires_at,
                attempts: c.attempts,
                consumed: c.consumed,
                total: to_major(c.snapshot_total),
            }),
            paid_at: b.paid_at,
            updated_at: b.updated_at,
        }
    }
}

impl From<Booking> for BookingPaymentView {
    fn from(b: Booking) -> Self {
        Self::from(&b)
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterBookingRequest {
    #[validate(length(min = 1, max = 128, message = "Booking id is required"))]
    pub id: String,
    #[validate(length(min = 1, message = "User id is required"))]
    pub user_id: String,
    #[validate(length(min = 1, message = "Vendor id is required"))]
    pub vendor_id: String,
    pub worker_id: Option<String>,
    #[serde(default = "default_booking_status")]
    pub status: BookingStatus,
    pub payment_method: PaymentMethod,
    pub base_price: Decimal,
    #[serde(default)]
    pub tax: Decimal,
    #[serde(default)]
    pub visiting_charge: Decimal,
    #[serde(default)]
    pub discount: Decimal,
}

fn default_booking_status() -> BookingStatus {
    BookingStatus::Pending
}

impl RegisterBookingRequest {
    pub fn into_new_booking(self) -> Result<crate::models::NewBooking, PaymentError> {
        Ok(crate::models::NewBooking {
            base_price: non_negative_minor(self.base_price, "Base price")?,
            tax: non_negative_minor(self.tax, "Tax")?,
            visiting_charge: non_negative_minor(self.visiting_charge, "Visiting charge")?,
            discount: non_negative_minor(self.discount, "Discount")?,
            id: self.id,
            user_id: self.user_id,
            vendor_id: self.vendor_id,
            worker_id: self.worker_id.filter(|w| !w.trim().is_empty()),
            status: self.status,
            payment_method: self.payment_method,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateLifecycleRequest {
    pub status: BookingStatus,
}

#[derive(Debug, Serialize)]
pub struct CreateOrderResponse {
    pub booking_id: String,
    pub order_id: String,
    pub amount: Decimal,
    pub amount_minor: i64,
    pub currency: String,
    /// Key id for checkout initialization.
    pub key_id: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct VerifyPaymentRequest {
    #[validate(length(min = 1, message = "Order id is required"))]
    pub order_id: String,
    #[validate(length(min = 1, message = "Payment id is required"))]
    pub payment_id: String,
    #[validate(length(min = 1, message = "Signature is required"))]
    pub signature: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyPaymentResponse {
    pub ok: bool,
    /// `true` when the payment had already been confirmed.
    pub replay: bool,
    pub booking: BookingPaymentView,
}

#[derive(Debug, Serialize)]
pub struct WalletPayResponse {
    pub balance: Decimal,
    pub wallet_transaction_id: String,
    pub booking: BookingPaymentView,
}

#[derive(Debug, Default, Deserialize)]
pub struct RefundRequest {
    /// Omit to refund the full amount.
    pub amount: Option<Decimal>,
}

impl RefundRequest {
    pub fn amount_minor(&self) -> Result<Option<i64>, PaymentError> {
        self.amount.map(to_minor).transpose()
    }
}

#[derive(Debug, Serialize)]
pub struct RefundResponse {
    pub refund_amount: Decimal,
    pub refund_id: String,
    pub booking: BookingPaymentView,
}

#[derive(Debug, Serialize)]
pub struct CancelPaymentResponse {
    pub refund_amount: Option<Decimal>,
    pub booking: BookingPaymentView,
}

#[derive(Debug, Deserialize)]
pub struct CashInitiateRequest {
    pub total: Decimal,
    #[serde(default)]
    pub extra_items: Vec<ExtraItemInput>,
}

#[derive(Debug, Serialize)]
pub struct CashInitiateResponse {
    pub booking_id: String,
    pub otp_sent: bool,
    pub expires_at: DateTime<Utc>,
    pub total: Decimal,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CashConfirmRequest {
    #[validate(length(min = 4, max = 4, message = "OTP must be 4 digits"))]
    pub code: String,
    pub total: Decimal,
    #[serde(default)]
    pub extra_items: Vec<ExtraItemInput>,
}

#[derive(Debug, Serialize)]
pub struct WorkerPayoutResponse {
    pub outcome: PayoutOutcome,
    pub worker_earnings: Option<Decimal>,
    pub booking: BookingPaymentView,
}

#[derive(Debug, Deserialize)]
pub struct TopupRequest {
    pub amount: Decimal,
}

impl TopupRequest {
    pub fn amount_minor(&self) -> Result<i64, PaymentError> {
        positive_minor(self.amount, "Top-up amount")
    }
}

#[derive(Debug, Serialize)]
pub struct TopupOrderResponse {
    pub order_id: String,
    pub amount: Decimal,
    pub amount_minor: i64,
    pub currency: String,
    pub key_id: String,
}

#[derive(Debug, Serialize)]
pub struct TopupConfirmResponse {
    pub order_id: String,
    pub credited: bool,
    pub balance: Decimal,
}

#[derive(Debug, Serialize)]
pub struct WalletTransactionView {
    pub id: String,
    pub kind: WalletEntryKind,
    pub reason: WalletReason,
    pub amount: Decimal,
    pub balance_after: Decimal,
    pub reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<WalletTransaction> for WalletTransactionView {
    fn from(t: WalletTransaction) -> Self {
        Self {
            id: t.id,
            kind: t.kind,
            reason: t.reason,
            amount: to_major(t.amount),
            balance_after: to_major(t.balance_after),
            reference: t.reference,
            created_at: t.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct WalletResponse {
    pub user_id: String,
    pub balance: Decimal,
    pub transactions: Vec<WalletTransactionView>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct SettlementView {
    pub id: String,
    pub amount: Decimal,
    pub proof: String,
    pub settled_at: DateTime<Utc>,
}

impl From<SettlementRecord> for SettlementView {
    fn from(r: SettlementRecord) -> Self {
        Self {
            id: r.id,
            amount: to_major(r.amount),
            proof: r.proof,
            settled_at: r.settled_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct VendorLedgerResponse {
    pub vendor_id: String,
    pub dues: Decimal,
    pub cash_limit: Decimal,
    pub suspended: bool,
    pub settlement_history: Vec<SettlementView>,
}

impl From<VendorLedger> for VendorLedgerResponse {
    fn from(l: VendorLedger) -> Self {
        Self {
            suspended: l.is_suspended(),
            vendor_id: l.vendor_id,
            dues: to_major(l.dues),
            cash_limit: to_major(l.cash_limit),
            settlement_history: l
                .settlement_history
                .into_iter()
                .map(SettlementView::from)
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct SettleDuesRequest {
    pub amount: Decimal,
    #[validate(length(min = 1, max = 256, message = "Settlement proof is required"))]
    pub proof: String,
}

impl SettleDuesRequest {
    pub fn amount_minor(&self) -> Result<i64, PaymentError> {
        positive_minor(self.amount, "Settlement amount")
    }
}
