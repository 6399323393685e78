//! Rate persistence: the store seam and its backends

pub mod disk;
pub mod memory;

pub use disk::FjallRateStore;
pub use memory::MemoryRateStore;

use crate::core::currency::CurrencyCode;
use crate::core::rate::{RateRecord, days_inclusive};
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(#[from] fjall::Error),

    #[error("failed to encode or decode a stored rate: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("invalid rate record: {0}")]
    InvalidRecord(String),
}

/// Store-level invariants shared by every backend.
pub(crate) fn validate_record(record: &RateRecord) -> Result<(), StoreError> {
    if record.source == record.target {
        return Err(StoreError::InvalidRecord(format!(
            "source and target must differ, got {} twice",
            record.source
        )));
    }
    if record.rate <= Decimal::ZERO {
        return Err(StoreError::InvalidRecord(format!(
            "rate must be positive, got {}",
            record.rate
        )));
    }
    if record.provider.is_empty() {
        return Err(StoreError::InvalidRecord(
            "provider id must not be empty".to_string(),
        ));
    }
    Ok(())
}

/// Persistent mapping of (source, target, date, provider) to a rate.
/// Lookups are direct only: no derivation, no provider calls.
#[async_trait]
pub trait RateStore: Send + Sync {
    /// Direct lookup. With rows from several providers for the same
    /// pair and date, the lexicographically smallest provider id wins.
    async fn get(
        &self,
        source: &CurrencyCode,
        target: &CurrencyCode,
        date: NaiveDate,
    ) -> Result<Option<RateRecord>, StoreError>;

    /// Returns `false` when the (source, target, date, provider) row
    /// already exists; the stored row is left untouched.
    async fn insert(&self, record: &RateRecord) -> Result<bool, StoreError>;

    /// Direct rows inside the inclusive date window, ascending by date.
    async fn range(
        &self,
        source: &CurrencyCode,
        target: &CurrencyCode,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<RateRecord>, StoreError>;

    /// Dates in the window with no direct row.
    async fn missing_dates(
        &self,
        source: &CurrencyCode,
        target: &CurrencyCode,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<NaiveDate>, StoreError> {
        let covered: HashSet<NaiveDate> = self
            .range(source, target, from, to)
            .await?
            .into_iter()
            .map(|r| r.date)
            .collect();
        Ok(days_inclusive(from, to)
            .filter(|d| !covered.contains(d))
            .collect())
    }
}
