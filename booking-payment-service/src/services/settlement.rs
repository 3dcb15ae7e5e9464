//! Earnings split and payout close-out.

use serde::Serialize;
use std::sync::Arc;

use super::store::{update_booking, Mutation, PaymentStore};
use crate::config::PricingConfig;
use crate::error::{PaymentError, PaymentResult};
use crate::models::money::{apply_bps, sum_minor};
use crate::models::{Booking, PaymentMethod, SettlementStatus, WorkerPaymentStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    SelfPerformed,
    WorkerAssigned,
}

impl JobKind {
    pub fn of(booking: &Booking) -> Self {
        if booking.is_self_performed() {
            Self::SelfPerformed
        } else {
            Self::WorkerAssigned
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EarningsSplit {
    pub vendor_earnings: i64,
    pub admin_commission: i64,
    pub worker_earnings: Option<i64>,
}

/// Single source of truth for commission and worker share.
#[derive(Debug, Clone)]
pub struct PricingPolicy {
    online_commission_bps: u32,
    cash_commission_bps: u32,
    plan_benefit_commission_bps: u32,
    worker_share_bps: u32,
}

impl From<&PricingConfig> for PricingPolicy {
    fn from(config: &PricingConfig) -> Self {
        Self {
            online_commission_bps: config.online_commission_bps,
            cash_commission_bps: config.cash_commission_bps,
            plan_benefit_commission_bps: config.plan_benefit_commission_bps,
            worker_share_bps: config.worker_share_bps,
        }
    }
}

impl PricingPolicy {
    pub fn commission_bps(&self, method: PaymentMethod) -> u32 {
        match method {
            PaymentMethod::Gateway | PaymentMethod::Wallet => self.online_commission_bps,
            PaymentMethod::Cash | PaymentMethod::PayAtHome => self.cash_commission_bps,
            PaymentMethod::PlanBenefit => self.plan_benefit_commission_bps,
        }
    }

    pub fn worker_share_bps(&self, job: JobKind) -> u32 {
        match job {
            JobKind::SelfPerformed => 0,
            JobKind::WorkerAssigned => self.worker_share_bps,
        }
    }

    /// Commission is charged on service value (base + extras − discount).
    /// The visiting charge passes through to the vendor; tax stays with the platform.
    ///
    /// On the plan benefit rail the base is pre-covered and never collected, so
    /// commission is charged on the extras alone and cash dues stay within what
    /// the vendor actually took.
    pub fn split(&self, booking: &Booking) -> PaymentResult<EarningsSplit> {
        let extras = sum_minor(booking.extra_charges.iter().map(|e| e.line_total))?;
        let service_value = sum_minor([booking.base_price, extras, -booking.discount])?.max(0);
        let commission_base = match booking.payment_method {
            PaymentMethod::PlanBenefit => extras,
            _ => service_value,
        };

        let admin_commission = apply_bps(commission_base, self.commission_bps(booking.payment_method))?;
        let vendor_earnings = sum_minor([service_value, -admin_commission, booking.visiting_charge])?;

        let worker_earnings = match JobKind::of(booking) {
            JobKind::SelfPerformed => None,
            job => Some(apply_bps(vendor_earnings, self.worker_share_bps(job))?),
        };

        Ok(EarningsSplit {
            vendor_earnings,
            admin_commission,
            worker_earnings,
        })
    }

    /// Write the split onto the booking.
    pub fn apply(&self, booking: &mut Booking) -> PaymentResult<EarningsSplit> {
        let split = self.split(booking)?;
        booking.vendor_earnings = Some(split.vendor_earnings);
        booking.admin_commission = Some(split.admin_commission);
        booking.worker_earnings = split.worker_earnings;
        Ok(split)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutOutcome {
    Paid,
    AlreadyPaid,
    /// Self-performed job, nothing owed to a worker.
    Skipped,
}

#[derive(Clone)]
pub struct SettlementEngine {
    store: Arc<dyn PaymentStore>,
    policy: PricingPolicy,
}

impl SettlementEngine {
    pub fn new(store: Arc<dyn PaymentStore>, policy: PricingPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &PricingPolicy {
        &self.policy
    }

    #[tracing::instrument(skip(self))]
    pub async fn pay_worker(&self, booking_id: &str) -> PaymentResult<(Booking, PayoutOutcome)> {
        let policy = self.policy.clone();
        let (booking, outcome) = update_booking(self.store.as_ref(), booking_id, |booking| {
            ensure_settleable(booking)?;

            match booking.worker_payment_status {
                WorkerPaymentStatus::NotApplicable => Ok(Mutation::Unchanged(PayoutOutcome::Skipped)),
                WorkerPaymentStatus::Paid => Ok(Mutation::Unchanged(PayoutOutcome::AlreadyPaid)),
                WorkerPaymentStatus::Pending => {
                    if booking.vendor_earnings.is_none() {
                        policy.apply(booking)?;
                    }
                    booking.worker_payment_status = WorkerPaymentStatus::Paid;
                    Ok(Mutation::Apply(PayoutOutcome::Paid))
                }
            }
        })
        .await?;

        tracing::info!(
            booking_id = %booking.id,
            worker_id = ?booking.worker_id,
            worker_earnings = ?booking.worker_earnings,
            outcome = ?outcome,
            "Worker payout processed"
        );
        Ok((booking, outcome))
    }

    #[tracing::instrument(skip(self))]
    pub async fn final_settlement(&self, booking_id: &str) -> PaymentResult<Booking> {
        let policy = self.policy.clone();
        let (booking, applied) = update_booking(self.store.as_ref(), booking_id, |booking| {
            ensure_settleable(booking)?;

            if booking.worker_payment_status == WorkerPaymentStatus::Pending {
                return Err(PaymentError::Validation(
                    "Worker payout must be completed before final settlement".to_string(),
                ));
            }
            if booking.final_settlement_status == SettlementStatus::Done {
                return Ok(Mutation::Unchanged(false));
            }

            if booking.vendor_earnings.is_none() {
                policy.apply(booking)?;
            }
            booking.final_settlement_status = SettlementStatus::Done;
            Ok(Mutation::Apply(true))
        })
        .await?;

        if applied {
            tracing::info!(
                booking_id = %booking.id,
                vendor_id = %booking.vendor_id,
                vendor_earnings = ?booking.vendor_earnings,
                admin_commission = ?booking.admin_commission,
                "Booking settled"
            );
        }
        Ok(booking)
    }
}

fn ensure_settleable(booking: &Booking) -> PaymentResult<()> {
    if !booking.payment_status.is_paid() {
        return Err(PaymentError::Validation(format!(
            "Payment for booking {} has not been confirmed",
            booking.id
        )));
    }
    if booking.refund_in_flight {
        return Err(PaymentError::Conflict(booking.id.clone()));
    }
    if !booking.status.is_completion() {
        return Err(PaymentError::Validation(format!(
            "Booking {} is not complete",
            booking.id
        )));
    }
    Ok(())
}
