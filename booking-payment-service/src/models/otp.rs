//! One-time challenge that authorizes an in-person collection.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use service_core::utils::constant_time_eq;

use super::booking::ExtraCharge;

/// Challenge issued to the customer, snapshotting the bill it authorizes.
///
/// The snapshot is captured at issuance so that a later edit to the bill
/// cannot change what the customer confirmed.
#[derive(Clone, Serialize, Deserialize)]
pub struct OtpChallenge {
    pub code: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub attempts: u32,
    pub consumed: bool,
    pub snapshot_total: i64,
    pub snapshot_extra_items: Vec<ExtraCharge>,
}

impl OtpChallenge {
    pub fn issue(
        code: String,
        now: DateTime<Utc>,
        ttl: Duration,
        snapshot_total: i64,
        snapshot_extra_items: Vec<ExtraCharge>,
    ) -> Self {
        Self {
            code,
            issued_at: now,
            expires_at: now + ttl,
            attempts: 0,
            consumed: false,
            snapshot_total,
            snapshot_extra_items,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn code_matches(&self, entered: &str) -> bool {
        constant_time_eq(&self.code, entered.trim())
    }

    pub fn snapshot_matches(&self, total: i64, extras: &[ExtraCharge]) -> bool {
        self.snapshot_total == total && self.snapshot_extra_items == extras
    }
}

// The code never reaches logs.
impl std::fmt::Debug for OtpChallenge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OtpChallenge")
            .field("code", &"****")
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .field("attempts", &self.attempts)
            .field("consumed", &self.consumed)
            .field("snapshot_total", &self.snapshot_total)
            .field("snapshot_extra_items", &self.snapshot_extra_items)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn challenge(ttl_minutes: i64) -> OtpChallenge {
        let extras = vec![ExtraCharge::new("Pipe", 10_000, 2, Decimal::ZERO).unwrap()];
        OtpChallenge::issue(
            "0427".to_string(),
            Utc::now(),
            Duration::minutes(ttl_minutes),
            95_000,
            extras,
        )
    }

    #[test]
    fn matches_code_and_snapshot() {
        let challenge = challenge(10);
        assert!(challenge.code_matches("0427"));
        assert!(challenge.code_matches(" 0427 "));
        assert!(!challenge.code_matches("4270"));

        let extras = vec![ExtraCharge::new("Pipe", 10_000, 2, Decimal::ZERO).unwrap()];
        assert!(challenge.snapshot_matches(95_000, &extras));
        assert!(!challenge.snapshot_matches(96_000, &extras));
        assert!(!challenge.snapshot_matches(95_000, &[]));
    }

    #[test]
    fn expiry_is_inclusive() {
        let challenge = challenge(0);
        assert!(challenge.is_expired(challenge.expires_at));
        assert!(!challenge.is_expired(challenge.issued_at - Duration::seconds(1)));
    }

    #[test]
    fn debug_output_redacts_code() {
        let rendered = format!("{:?}", challenge(10));
        assert!(!rendered.contains("0427"));
    }
}
