//! Minor-unit money helpers.
//!
//! Every amount inside the service is an `i64` count of minor units (paise for INR).
//! Decimal major units only appear at the API boundary.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::PaymentError;

pub const DEFAULT_CURRENCY: &str = "INR";

const MINOR_PER_MAJOR: i64 = 100;
const BPS_DENOMINATOR: i128 = 10_000;

/// Largest single amount accepted anywhere, in minor units (10 billion major).
pub const MAX_AMOUNT_MINOR: i64 = 1_000_000_000_000;

fn out_of_range(what: &str) -> PaymentError {
    PaymentError::Validation(format!("{} is out of range", what))
}

fn to_bounded_minor(value: Decimal, what: &str) -> Result<i64, PaymentError> {
    value
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .filter(|v| v.abs() <= MAX_AMOUNT_MINOR)
        .ok_or_else(|| out_of_range(what))
}

/// Convert a major-unit amount to minor units, rounding half away from zero.
pub fn to_minor(amount: Decimal) -> Result<i64, PaymentError> {
    let scaled = amount
        .checked_mul(Decimal::from(MINOR_PER_MAJOR))
        .ok_or_else(|| out_of_range(&format!("Amount {}", amount)))?;
    to_bounded_minor(scaled, &format!("Amount {}", amount))
}

/// Convert a minor-unit amount to major units.
pub fn to_major(amount_minor: i64) -> Decimal {
    Decimal::new(amount_minor, 2)
}

/// `unit × qty × (100 + gst%) / 100`, rounded to a whole minor unit.
pub fn line_total(unit_price: i64, qty: u32, gst_percentage: Decimal) -> Result<i64, PaymentError> {
    let with_tax = Decimal::from(unit_price)
        .checked_mul(Decimal::from(qty))
        .zip(Decimal::ONE_HUNDRED.checked_add(gst_percentage))
        .and_then(|(gross, rate)| gross.checked_mul(rate))
        .and_then(|scaled| scaled.checked_div(Decimal::ONE_HUNDRED))
        .ok_or_else(|| out_of_range("Line total"))?;
    to_bounded_minor(with_tax, "Line total")
}

/// Checked sum of minor-unit amounts.
pub fn sum_minor<I>(amounts: I) -> Result<i64, PaymentError>
where
    I: IntoIterator<Item = i64>,
{
    amounts
        .into_iter()
        .try_fold(0i64, |acc, v| acc.checked_add(v))
        .ok_or_else(|| out_of_range("Total"))
}

/// `amount × bps / 10_000`, rounded half away from zero.
pub fn apply_bps(amount: i64, bps: u32) -> Result<i64, PaymentError> {
    let scaled = i128::from(amount) * i128::from(bps);
    let half = BPS_DENOMINATOR / 2;
    let rounded = if scaled >= 0 {
        (scaled + half) / BPS_DENOMINATOR
    } else {
        (scaled - half) / BPS_DENOMINATOR
    };
    i64::try_from(rounded).map_err(|_| out_of_range("Basis point share"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn converts_major_to_minor_with_rounding() {
        assert_eq!(to_minor(dec!(500)).unwrap(), 50_000);
        assert_eq!(to_minor(dec!(10.005)).unwrap(), 1_001);
        assert_eq!(to_minor(dec!(10.004)).unwrap(), 1_000);
        assert_eq!(to_major(95_000), dec!(950.00));
    }

    #[test]
    fn line_total_includes_gst() {
        assert_eq!(line_total(10_000, 2, Decimal::ZERO).unwrap(), 20_000);
        assert_eq!(line_total(10_000, 1, dec!(18)).unwrap(), 11_800);
        assert_eq!(line_total(333, 1, dec!(2.5)).unwrap(), 341);
    }

    #[test]
    fn basis_points_split() {
        assert_eq!(apply_bps(100_000, 1_000).unwrap(), 10_000);
        assert_eq!(apply_bps(99_999, 7_000).unwrap(), 69_999);
        assert_eq!(apply_bps(5, 1_000).unwrap(), 1);
        assert_eq!(apply_bps(0, 7_000).unwrap(), 0);
        assert!(apply_bps(i64::MAX, 20_000).is_err());
    }

    #[test]
    fn oversized_amounts_are_rejected() {
        assert!(matches!(
            to_minor(Decimal::MAX),
            Err(PaymentError::Validation(_))
        ));
        assert!(to_minor(dec!(10_000_000_001)).is_err());
        assert_eq!(to_minor(dec!(10_000_000_000)).unwrap(), MAX_AMOUNT_MINOR);
        assert!(line_total(MAX_AMOUNT_MINOR, u32::MAX, dec!(18)).is_err());
        assert!(sum_minor([i64::MAX, 1]).is_err());
        assert_eq!(sum_minor([1, 2, 3]).unwrap(), 6);
    }
}
