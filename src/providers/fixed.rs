//! Offline adapter serving deterministic rates, for air-gapped setups
//! and tests

use crate::core::adapter::{AdapterError, RateAdapter};
use crate::core::currency::CurrencyCode;
use crate::core::rate::{days_inclusive, RateQuote};
use crate::registry::ProviderSettings;
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;

pub struct FixedAdapter {
    rate: Option<Decimal>,
}

impl FixedAdapter {
    pub fn new(settings: &ProviderSettings) -> Self {
        FixedAdapter {
            rate: settings.rate,
        }
    }

    /// Derives a stable pseudo-rate in [0.5, 1.5] from the pair and date
    /// (FNV-1a over the request key).
    fn derive(&self, source: &CurrencyCode, target: &CurrencyCode, date: NaiveDate) -> Decimal {
        if let Some(rate) = self.rate {
            return rate;
        }
        let key = format!("{source}/{target}/{date}");
        let mut hash: u64 = 0xcbf29ce484222325;
        for byte in key.bytes() {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(0x100000001b3);
        }
        Decimal::new(500_000 + (hash % 1_000_001) as i64, 6)
    }
}

#[async_trait]
impl RateAdapter for FixedAdapter {
    async fn fetch_rate(
        &self,
        source: &CurrencyCode,
        target: &CurrencyCode,
        date: NaiveDate,
    ) -> Result<RateQuote, AdapterError> {
        Ok(RateQuote {
            date,
            rate: self.derive(source, target, date),
        })
    }

    async fn fetch_range(
        &self,
        source: &CurrencyCode,
        target: &CurrencyCode,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<RateQuote>, AdapterError> {
        Ok(days_inclusive(from, to)
            .map(|date| RateQuote {
                date,
                rate: self.derive(source, target, date),
            })
            .collect())
    }
}
