//! In-memory rate store for tests and ephemeral runs

use crate::core::currency::CurrencyCode;
use crate::core::rate::RateRecord;
use crate::store::{RateStore, StoreError, validate_record};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

type Key = (CurrencyCode, CurrencyCode, NaiveDate, String);

pub struct MemoryRateStore {
    inner: Arc<Mutex<BTreeMap<Key, RateRecord>>>,
}

impl MemoryRateStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }
}

impl Default for MemoryRateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RateStore for MemoryRateStore {
    async fn get(
        &self,
        source: &CurrencyCode,
        target: &CurrencyCode,
        date: NaiveDate,
    ) -> Result<Option<RateRecord>, StoreError> {
        let map = self.inner.lock().await;
        let start = (source.clone(), target.clone(), date, String::new());
        let hit = map
            .range(start..)
            .take_while(|(key, _)| key.0 == *source && key.1 == *target && key.2 == date)
            .map(|(_, record)| record.clone())
            .next();
        debug!(
            "Store {} for {}/{} on {}",
            if hit.is_some() { "HIT" } else { "MISS" },
            source,
            target,
            date
        );
        Ok(hit)
    }

    async fn insert(&self, record: &RateRecord) -> Result<bool, StoreError> {
        validate_record(record)?;
        let key = (
            record.source.clone(),
            record.target.clone(),
            record.date,
            record.provider.clone(),
        );
        let mut map = self.inner.lock().await;
        if map.contains_key(&key) {
            debug!(
                "Duplicate rate for {}/{} on {} from {}, keeping stored row",
                record.source, record.target, record.date, record.provider
            );
            return Ok(false);
        }
        map.insert(key, record.clone());
        Ok(true)
    }

    async fn range(
        &self,
        source: &CurrencyCode,
        target: &CurrencyCode,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<RateRecord>, StoreError> {
        let map = self.inner.lock().await;
        let start = (source.clone(), target.clone(), from, String::new());
        Ok(map
            .range(start..)
            .take_while(|(key, _)| key.0 == *source && key.1 == *target && key.2 <= to)
            .map(|(_, record)| record.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn record(source: &str, target: &str, day: u32, rate: rust_decimal::Decimal) -> RateRecord {
        RateRecord {
            source: CurrencyCode::parse(source).unwrap(),
            target: CurrencyCode::parse(target).unwrap(),
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            rate,
            provider: "frankfurter".to_string(),
            fetched_at: Utc::now(),
        }
    }

    fn code(value: &str) -> CurrencyCode {
        CurrencyCode::parse(value).unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let store = MemoryRateStore::new();
        let rec = record("EUR", "USD", 1, dec!(1.10));

        assert!(store.insert(&rec).await.unwrap());
        let found = store.get(&rec.source, &rec.target, rec.date).await.unwrap();
        assert_eq!(found, Some(rec));
    }

    #[tokio::test]
    async fn test_duplicate_insert_is_a_no_op() {
        let store = MemoryRateStore::new();
        let rec = record("EUR", "USD", 1, dec!(1.10));

        assert!(store.insert(&rec).await.unwrap());
        let mut changed = rec.clone();
        changed.rate = dec!(9.99);
        assert!(!store.insert(&changed).await.unwrap());

        // The stored row keeps the original value.
        let found = store
            .get(&rec.source, &rec.target, rec.date)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.rate, dec!(1.10));
    }

    #[tokio::test]
    async fn test_rejects_invalid_records() {
        let store = MemoryRateStore::new();

        let same_pair = record("EUR", "EUR", 1, dec!(1.10));
        assert!(store.insert(&same_pair).await.is_err());

        let zero_rate = record("EUR", "USD", 1, dec!(0));
        assert!(store.insert(&zero_rate).await.is_err());

        let mut no_provider = record("EUR", "USD", 1, dec!(1.10));
        no_provider.provider = String::new();
        assert!(store.insert(&no_provider).await.is_err());
    }

    #[tokio::test]
    async fn test_range_is_windowed_and_ascending() {
        let store = MemoryRateStore::new();
        for day in [3, 1, 5, 2] {
            store
                .insert(&record("EUR", "USD", day, dec!(1.10)))
                .await
                .unwrap();
        }
        // Rows outside the pair must not leak into the scan.
        store
            .insert(&record("EUR", "GBP", 2, dec!(0.86)))
            .await
            .unwrap();

        let from = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let to = NaiveDate::from_ymd_opt(2024, 1, 3).unwrap();
        let rows = store.range(&code("EUR"), &code("USD"), from, to).await.unwrap();
        let days: Vec<u32> = rows
            .iter()
            .map(|r| chrono::Datelike::day(&r.date))
            .collect();
        assert_eq!(days, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_missing_dates() {
        let store = MemoryRateStore::new();
        for day in [2, 4] {
            store
                .insert(&record("EUR", "USD", day, dec!(1.10)))
                .await
                .unwrap();
        }

        let from = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let to = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        let missing = store
            .missing_dates(&code("EUR"), &code("USD"), from, to)
            .await
            .unwrap();
        let days: Vec<u32> = missing.iter().map(|d| chrono::Datelike::day(d)).collect();
        assert_eq!(days, vec![1, 3, 5]);
    }

    #[tokio::test]
    async fn test_get_prefers_smallest_provider_id() {
        let store = MemoryRateStore::new();
        let mut first = record("EUR", "USD", 1, dec!(1.10));
        first.provider = "beacon".to_string();
        let mut second = record("EUR", "USD", 1, dec!(1.11));
        second.provider = "frankfurter".to_string();

        store.insert(&second).await.unwrap();
        store.insert(&first).await.unwrap();

        let found = store
            .get(&first.source, &first.target, first.date)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.provider, "beacon");
    }
}
