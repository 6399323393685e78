//! Exchange rate records and derivation helpers

use crate::core::currency::CurrencyCode;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// A stored exchange rate. Unique per (source, target, date, provider).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateRecord {
    pub source: CurrencyCode,
    pub target: CurrencyCode,
    pub date: NaiveDate,
    pub rate: Decimal,
    pub provider: String,
    pub fetched_at: DateTime<Utc>,
}

/// Normalized provider output: one rate for one date.
#[derive(Debug, Clone, PartialEq)]
pub struct RateQuote {
    pub date: NaiveDate,
    pub rate: Decimal,
}

/// Where a resolved rate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateOrigin {
    /// Same-currency request, always 1.
    Identity,
    /// Stored direct pair.
    Direct,
    /// Reciprocal of a stored inverse pair.
    Inverse,
    /// Freshly fetched from a provider.
    Provider,
}

impl Display for RateOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                RateOrigin::Identity => "identity",
                RateOrigin::Direct => "store",
                RateOrigin::Inverse => "store (inverse)",
                RateOrigin::Provider => "provider",
            }
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRate {
    pub source: CurrencyCode,
    pub target: CurrencyCode,
    pub date: NaiveDate,
    pub rate: Decimal,
    pub origin: RateOrigin,
    /// Provider that produced or originally stored the rate, when known.
    pub provider: Option<String>,
}

/// Reciprocal of a positive rate, rounded half-up to `scale` decimal places.
pub fn invert_rate(rate: Decimal, scale: u32) -> Option<Decimal> {
    if rate <= Decimal::ZERO {
        return None;
    }
    Decimal::ONE
        .checked_div(rate)
        .map(|r| r.round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero))
}

/// Half-up rounding used for derived rates and converted amounts.
pub fn round_amount(value: Decimal, scale: u32) -> Decimal {
    value.round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero)
}

/// All dates from `from` through `to`, ascending.
pub fn days_inclusive(from: NaiveDate, to: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    from.iter_days().take_while(move |d| *d <= to)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn inverts_at_six_decimal_places() {
        assert_eq!(invert_rate(dec!(1.10), 6), Some(dec!(0.909091)));
        assert_eq!(invert_rate(dec!(1.5), 6), Some(dec!(0.666667)));
        assert_eq!(invert_rate(dec!(2), 6), Some(dec!(0.5)));
    }

    #[test]
    fn rounds_midpoints_away_from_zero() {
        // 1 / 3.2 = 0.3125 exactly; half-up at 3 places gives 0.313.
        assert_eq!(invert_rate(dec!(3.2), 3), Some(dec!(0.313)));
    }

    #[test]
    fn rejects_non_positive_rates() {
        assert_eq!(invert_rate(dec!(0), 6), None);
        assert_eq!(invert_rate(dec!(-1.10), 6), None);
    }

    #[test]
    fn iterates_inclusive_date_windows() {
        let from = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let to = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        let days: Vec<_> = days_inclusive(from, to).collect();
        assert_eq!(days.len(), 5);
        assert_eq!(days[0], from);
        assert_eq!(days[4], to);
    }

    #[test]
    fn single_day_window_yields_one_date() {
        let day = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        assert_eq!(days_inclusive(day, day).count(), 1);
    }
}
