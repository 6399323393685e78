//! fjall-backed persistent rate store

use crate::core::currency::CurrencyCode;
use crate::core::rate::RateRecord;
use crate::store::{RateStore, StoreError, validate_record};
use async_trait::async_trait;
use chrono::NaiveDate;
use fjall::{Keyspace, PartitionCreateOptions, PartitionHandle};
use std::path::Path;
use tracing::debug;

/// Rates keyed as `SRC/TGT/YYYY-MM-DD/provider` with JSON-encoded rows.
/// ISO dates keep lexicographic key order chronological, and the key
/// itself enforces (source, target, date, provider) uniqueness, so
/// concurrent writers converge to a single row.
pub struct FjallRateStore {
    _keyspace: Keyspace,
    partition: PartitionHandle,
}

impl FjallRateStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let keyspace = fjall::Config::new(path.as_ref()).open()?;
        let partition = keyspace.open_partition("rates", PartitionCreateOptions::default())?;
        Ok(Self {
            _keyspace: keyspace,
            partition,
        })
    }

    fn row_key(record: &RateRecord) -> String {
        format!(
            "{}/{}/{}/{}",
            record.source, record.target, record.date, record.provider
        )
    }

    fn date_prefix(source: &CurrencyCode, target: &CurrencyCode, date: NaiveDate) -> String {
        format!("{source}/{target}/{date}/")
    }
}

#[async_trait]
impl RateStore for FjallRateStore {
    async fn get(
        &self,
        source: &CurrencyCode,
        target: &CurrencyCode,
        date: NaiveDate,
    ) -> Result<Option<RateRecord>, StoreError> {
        // Key order yields the smallest provider id first.
        let prefix = Self::date_prefix(source, target, date);
        for item in self.partition.prefix(prefix) {
            let (_, value) = item?;
            let record: RateRecord = serde_json::from_slice(&value)?;
            return Ok(Some(record));
        }
        debug!("Store MISS for {}/{} on {}", source, target, date);
        Ok(None)
    }

    async fn insert(&self, record: &RateRecord) -> Result<bool, StoreError> {
        validate_record(record)?;
        let key = Self::row_key(record);
        if self.partition.contains_key(&key)? {
            debug!("Duplicate rate row {}, keeping stored row", key);
            return Ok(false);
        }
        self.partition.insert(key, serde_json::to_vec(record)?)?;
        Ok(true)
    }

    async fn range(
        &self,
        source: &CurrencyCode,
        target: &CurrencyCode,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<RateRecord>, StoreError> {
        let start = Self::date_prefix(source, target, from).into_bytes();
        // '\x7f' sorts after '/' and every provider id character, so the
        // bound covers all providers of the final date.
        let end = format!("{source}/{target}/{to}\u{7f}").into_bytes();
        let mut records = Vec::new();
        for item in self.partition.range(start..end) {
            let (_, value) = item?;
            records.push(serde_json::from_slice(&value)?);
        }
        Ok(records)
    }
}
