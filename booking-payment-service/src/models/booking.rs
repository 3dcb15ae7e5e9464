//! Payment view of a marketplace booking.
//!
//! The booking subsystem owns the lifecycle (`status`); this service owns every
//! payment field and moves `payment_status` through its state machine.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::money::{line_total, sum_minor, MAX_AMOUNT_MINOR};
use super::otp::OtpChallenge;
use crate::error::PaymentError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    None,
    Pending,
    Success,
    Failed,
    Refunded,
    CollectedByVendor,
}

impl PaymentStatus {
    /// Money has been confirmed received through some rail.
    pub fn is_paid(self) -> bool {
        matches!(self, Self::Success | Self::CollectedByVendor)
    }

    /// Payment fields are frozen (bar settlement bookkeeping and the refund move).
    pub fn is_final(self) -> bool {
        matches!(
            self,
            Self::Success | Self::CollectedByVendor | Self::Refunded
        )
    }

    pub fn can_transition_to(self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, next),
            (None, Pending)
                | (None, Success)
                | (None, CollectedByVendor)
                | (Pending, Pending)
                | (Pending, Success)
                | (Pending, Failed)
                | (Pending, CollectedByVendor)
                | (Failed, Pending)
                | (Failed, Success)
                | (Failed, CollectedByVendor)
                | (Success, Refunded)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Pending => "PENDING",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
            Self::Refunded => "REFUNDED",
            Self::CollectedByVendor => "COLLECTED_BY_VENDOR",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Gateway,
    Wallet,
    Cash,
    PayAtHome,
    PlanBenefit,
}

impl PaymentMethod {
    /// Rails settled in person through the cash collection protocol.
    pub fn is_in_person(self) -> bool {
        matches!(self, Self::Cash | Self::PayAtHome | Self::PlanBenefit)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gateway => "gateway",
            Self::Wallet => "wallet",
            Self::Cash => "cash",
            Self::PayAtHome => "pay_at_home",
            Self::PlanBenefit => "plan_benefit",
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle status as reported by the booking/dispatch subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Pending,
    Searching,
    Confirmed,
    Assigned,
    OnTheWay,
    Arrived,
    InProgress,
    WorkDone,
    Completed,
    Cancelled,
}

impl BookingStatus {
    /// Statuses in which a bill can be raised at the customer's door.
    pub fn is_billable(self) -> bool {
        matches!(self, Self::Arrived | Self::InProgress | Self::WorkDone)
    }

    pub fn is_completion(self) -> bool {
        matches!(self, Self::WorkDone | Self::Completed)
    }

    /// Statuses an online payment may advance to `Confirmed`.
    pub fn awaits_payment_confirmation(self) -> bool {
        matches!(self, Self::Pending | Self::Searching)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerPaymentStatus {
    Pending,
    Paid,
    NotApplicable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SettlementStatus {
    Pending,
    Done,
}

/// A billed extra line. Amounts in minor units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraCharge {
    pub name: String,
    pub unit_price: i64,
    pub qty: u32,
    pub gst_percentage: Decimal,
    pub line_total: i64,
}

impl ExtraCharge {
    pub fn new(
        name: &str,
        unit_price: i64,
        qty: u32,
        gst_percentage: Decimal,
    ) -> Result<Self, PaymentError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(PaymentError::Validation(
                "Extra item name is required".to_string(),
            ));
        }
        if unit_price < 0 {
            return Err(PaymentError::Validation(format!(
                "Extra item '{}' has a negative price",
                name
            )));
        }
        if qty == 0 {
            return Err(PaymentError::Validation(format!(
                "Extra item '{}' must have a quantity of at least 1",
                name
            )));
        }
        if gst_percentage.is_sign_negative() || gst_percentage > Decimal::ONE_HUNDRED {
            return Err(PaymentError::Validation(format!(
                "Extra item '{}' has an invalid GST percentage",
                name
            )));
        }

        Ok(Self {
            name: name.to_string(),
            unit_price,
            qty,
            gst_percentage,
            line_total: line_total(unit_price, qty, gst_percentage)?,
        })
    }
}

/// A verified gateway capture that did not settle the booking and was sent back
/// to the customer in full.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnedCapture {
    pub order_id: String,
    pub payment_id: String,
    /// `None` while the refund call is in flight.
    pub refund_id: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Input for registering the payment view of a booking.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub id: String,
    pub user_id: String,
    pub vendor_id: String,
    pub worker_id: Option<String>,
    pub status: BookingStatus,
    pub payment_method: PaymentMethod,
    pub base_price: i64,
    pub tax: i64,
    pub visiting_charge: i64,
    pub discount: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    #[serde(rename = "_id")]
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
    pub wallet_transaction_id: Option<String>,
    /// Orders opened for this booking that can no longer confirm it.
    #[serde(default)]
    pub superseded_order_ids: Vec<String>,
    #[serde(default)]
    pub returned_captures: Vec<ReturnedCapture>,

    pub base_price: i64,
    pub tax: i64,
    pub visiting_charge: i64,
    pub discount: i64,
    pub extra_charges: Vec<ExtraCharge>,
    pub final_amount: i64,

    pub vendor_earnings: Option<i64>,
    pub admin_commission: Option<i64>,
    pub worker_earnings: Option<i64>,
    pub worker_payment_status: WorkerPaymentStatus,
    pub final_settlement_status: SettlementStatus,

    pub refund_in_flight: bool,
    pub refund_id: Option<String>,
    pub refund_amount: Option<i64>,

    pub otp_challenge: Option<OtpChallenge>,

    /// Optimistic concurrency token, bumped on every write.
    pub version: u64,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn new(input: NewBooking) -> Result<Self, PaymentError> {
        if input.id.trim().is_empty() {
            return Err(PaymentError::Validation("Booking id is required".to_string()));
        }
        if [input.base_price, input.tax, input.visiting_charge, input.discount]
            .iter()
            .any(|v| *v < 0 || *v > MAX_AMOUNT_MINOR)
        {
            return Err(PaymentError::Validation(
                "Booking amounts must be between zero and the maximum amount".to_string(),
            ));
        }

        let now = Utc::now();
        let worker_payment_status = if is_self_performed(&input.vendor_id, input.worker_id.as_deref()) {
            WorkerPaymentStatus::NotApplicable
        } else {
            WorkerPaymentStatus::Pending
        };

        let mut booking = Self {
            id: input.id,
            user_id: input.user_id,
            vendor_id: input.vendor_id,
            worker_id: input.worker_id,
            status: input.status,
            payment_status: PaymentStatus::None,
            payment_method: input.payment_method,
            payment_id: None,
            gateway_order_id: None,
            gateway_payment_id: None,
            wallet_transaction_id: None,
            superseded_order_ids: Vec::new(),
            returned_captures: Vec::new(),
            base_price: input.base_price,
            tax: input.tax,
            visiting_charge: input.visiting_charge,
            discount: input.discount,
            extra_charges: Vec::new(),
            final_amount: 0,
            vendor_earnings: None,
            admin_commission: None,
            worker_earnings: None,
            worker_payment_status,
            final_settlement_status: SettlementStatus::Pending,
            refund_in_flight: false,
            refund_id: None,
            refund_amount: None,
            otp_challenge: None,
            version: 0,
            paid_at: None,
            created_at: now,
            updated_at: now,
        };
        booking.final_amount = booking.total_with(&booking.extra_charges)?;
        if booking.final_amount < 0 {
            return Err(PaymentError::Validation(
                "Discount exceeds the booking total".to_string(),
            ));
        }
        Ok(booking)
    }

    /// `base + tax + visiting − discount + Σ extras`.
    pub fn total_with(&self, extras: &[ExtraCharge]) -> Result<i64, PaymentError> {
        let charges = [self.base_price, self.tax, self.visiting_charge, -self.discount];
        sum_minor(
            charges
                .into_iter()
                .chain(extras.iter().map(|e| e.line_total)),
        )
    }

    /// Amount the customer owes at the door for the given extras.
    ///
    /// On the plan benefit rail the service charge is pre-covered and only the
    /// extras are collected.
    pub fn billable_total_with(&self, extras: &[ExtraCharge]) -> Result<i64, PaymentError> {
        match self.payment_method {
            PaymentMethod::PlanBenefit => sum_minor(extras.iter().map(|e| e.line_total)),
            _ => self.total_with(extras),
        }
    }

    /// Make `order_id` the live gateway order, retiring the previous one.
    pub fn open_gateway_order(&mut self, order_id: String) -> Option<String> {
        let previous = self.retire_gateway_order();
        self.gateway_order_id = Some(order_id);
        previous
    }

    /// Clear the live gateway order; it stays resolvable for late captures.
    pub fn retire_gateway_order(&mut self) -> Option<String> {
        let previous = self.gateway_order_id.take();
        if let Some(ref order_id) = previous {
            if !self.superseded_order_ids.contains(order_id) {
                self.superseded_order_ids.push(order_id.clone());
            }
        }
        previous
    }

    /// Whether `order_id` was ever opened for this booking.
    pub fn holds_order(&self, order_id: &str) -> bool {
        self.gateway_order_id.as_deref() == Some(order_id)
            || self.superseded_order_ids.iter().any(|o| o == order_id)
    }

    pub fn is_self_performed(&self) -> bool {
        is_self_performed(&self.vendor_id, self.worker_id.as_deref())
    }

    /// Move `payment_status`, rejecting any edge outside the state machine.
    pub fn transition_payment(&mut self, next: PaymentStatus) -> Result<(), PaymentError> {
        if !self.payment_status.can_transition_to(next) {
            if self.payment_status.is_paid() {
                return Err(PaymentError::AlreadyPaid(self.id.clone()));
            }
            return Err(PaymentError::Validation(format!(
                "Payment status cannot move from {} to {}",
                self.payment_status, next
            )));
        }
        self.payment_status = next;
        if next.is_paid() {
            self.paid_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Advance a booking still waiting on payment; never downgrades a later status.
    pub fn confirm_lifecycle_if_awaiting(&mut self) {
        if self.status.awaits_payment_confirmation() {
            self.status = BookingStatus::Confirmed;
        }
    }
}

fn is_self_performed(vendor_id: &str, worker_id: Option<&str>) -> bool {
    worker_id.map_or(true, |w| w == vendor_id)
}
