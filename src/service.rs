//! Facade tying the resolver, the store and the backfill orchestrator
//! together for the CLI commands

use crate::backfill::{BackfillOrchestrator, BackfillReport, JobId};
use crate::core::config::AppConfig;
use crate::core::currency::{Currency, CurrencyCode};
use crate::core::error::ResolveError;
use crate::core::rate::{round_amount, ResolvedRate};
use crate::registry::ProviderRegistry;
use crate::resolver::{RangeResolution, Resolver, ResolverConfig};
use crate::store::RateStore;
use chrono::NaiveDate;
use futures::future::join_all;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct Conversion {
    pub amount: Decimal,
    pub converted: Decimal,
    pub rate: ResolvedRate,
}

/// Result of refreshing the configured currencies against one base.
#[derive(Debug)]
pub struct RefreshOutcome {
    pub date: NaiveDate,
    pub refreshed: Vec<ResolvedRate>,
    pub failures: Vec<(CurrencyCode, ResolveError)>,
}

pub struct RateService {
    resolver: Arc<Resolver>,
    backfill: Arc<BackfillOrchestrator>,
    currencies: Vec<Currency>,
    base_currency: CurrencyCode,
    scale: u32,
    inline_gap_limit: usize,
}

impl RateService {
    /// Wires the resolution stack from configuration on top of the
    /// given store.
    pub fn build(config: &AppConfig, store: Arc<dyn RateStore>) -> Self {
        let registry = Arc::new(ProviderRegistry::new(config.providers.clone()));
        let resolver = Arc::new(Resolver::new(
            store,
            registry,
            ResolverConfig {
                currencies: config.currencies.iter().map(|c| c.code.clone()).collect(),
                scale: config.rates.scale,
                materialize_inverse: config.rates.materialize_inverse,
                inline_gap_limit: config.backfill.inline_gap_limit,
            },
        ));
        let backfill = Arc::new(BackfillOrchestrator::new(
            resolver.clone(),
            i64::from(config.backfill.max_window_days),
        ));
        RateService {
            resolver,
            backfill,
            currencies: config.currencies.clone(),
            base_currency: config.base_currency.clone(),
            scale: config.rates.scale,
            inline_gap_limit: config.backfill.inline_gap_limit,
        }
    }

    pub fn currencies(&self) -> &[Currency] {
        &self.currencies
    }

    pub fn base_currency(&self) -> &CurrencyCode {
        &self.base_currency
    }

    pub async fn rate(
        &self,
        source: &str,
        target: &str,
        date: NaiveDate,
    ) -> Result<ResolvedRate, ResolveError> {
        let source = CurrencyCode::parse(source)?;
        let target = CurrencyCode::parse(target)?;
        self.resolver.resolve(&source, &target, date).await
    }

    /// Resolves a whole window. When the gap left over is wider than
    /// the inline limit a backfill job is submitted for it and its id
    /// is attached to the resolution.
    pub async fn rates_range(
        &self,
        source: &str,
        target: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<RangeResolution, ResolveError> {
        let source = CurrencyCode::parse(source)?;
        let target = CurrencyCode::parse(target)?;
        let mut resolution = self.resolver.resolve_range(&source, &target, from, to).await?;

        if resolution.missing.len() > self.inline_gap_limit {
            if let (Some(first), Some(last)) =
                (resolution.missing.first(), resolution.missing.last())
            {
                match self.backfill.submit(source.clone(), target.clone(), *first, *last) {
                    Ok(id) => {
                        info!(
                            "Delegated {} missing dates for {}/{} to backfill job {}",
                            resolution.missing.len(),
                            source,
                            target,
                            id
                        );
                        resolution.backfill = Some(id);
                    }
                    Err(err) => debug!("Backfill submission rejected: {}", err),
                }
            }
        }
        Ok(resolution)
    }

    pub async fn convert(
        &self,
        amount: Decimal,
        source: &str,
        target: &str,
        date: NaiveDate,
    ) -> Result<Conversion, ResolveError> {
        let rate = self.rate(source, target, date).await?;
        let converted = round_amount(amount * rate.rate, self.scale);
        Ok(Conversion {
            amount,
            converted,
            rate,
        })
    }

    /// Resolves every configured currency against the base for one
    /// date, tolerating per-pair failures. `update_callback` is invoked
    /// once per pair for progress reporting.
    pub async fn refresh(
        &self,
        base: Option<&str>,
        date: NaiveDate,
        update_callback: &(dyn Fn()),
    ) -> Result<RefreshOutcome, ResolveError> {
        let base = match base {
            Some(code) => CurrencyCode::parse(code)?,
            None => self.base_currency.clone(),
        };

        let lookups = self
            .currencies
            .iter()
            .filter(|currency| currency.code != base)
            .map(|currency| {
                let base = base.clone();
                async move {
                    let result = self.resolver.resolve(&base, &currency.code, date).await;
                    update_callback();
                    (currency.code.clone(), result)
                }
            });

        let mut refreshed = Vec::new();
        let mut failures = Vec::new();
        for (code, result) in join_all(lookups).await {
            match result {
                Ok(rate) => refreshed.push(rate),
                Err(err) => {
                    warn!("Refresh failed for {}/{}: {}", base, code, err);
                    failures.push((code, err));
                }
            }
        }
        Ok(RefreshOutcome {
            date,
            refreshed,
            failures,
        })
    }

    pub fn submit_backfill(
        &self,
        source: &str,
        target: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<JobId, ResolveError> {
        let source = CurrencyCode::parse(source)?;
        let target = CurrencyCode::parse(target)?;
        self.backfill.submit(source, target, from, to)
    }

    pub fn backfill_report(&self, id: JobId) -> Option<BackfillReport> {
        self.backfill.report(id)
    }

    pub async fn wait_backfill(&self, id: JobId) -> Option<BackfillReport> {
        self.backfill.wait(id).await
    }

    pub fn cancel_backfill(&self, id: JobId) -> bool {
        self.backfill.cancel(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::BackfillOptions;
    use crate::core::rate::{RateOrigin, RateRecord};
    use crate::registry::{ProviderKind, ProviderSettings};
    use crate::store::MemoryRateStore;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fixed(rate: Decimal) -> ProviderSettings {
        ProviderSettings {
            name: "fixed".to_string(),
            kind: ProviderKind::Fixed,
            priority: 1,
            enabled: true,
            base_url: None,
            api_key: None,
            timeout_secs: 5,
            retries: 0,
            rate: Some(rate),
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn record(source: &str, target: &str, d: u32, rate: Decimal) -> RateRecord {
        RateRecord {
            source: CurrencyCode::parse(source).unwrap(),
            target: CurrencyCode::parse(target).unwrap(),
            date: day(d),
            rate,
            provider: "frankfurter".to_string(),
            fetched_at: Utc::now(),
        }
    }

    fn service(
        providers: Vec<ProviderSettings>,
        inline_gap_limit: usize,
    ) -> (Arc<MemoryRateStore>, RateService) {
        let store = Arc::new(MemoryRateStore::new());
        let config = AppConfig {
            providers,
            backfill: BackfillOptions {
                inline_gap_limit,
                max_window_days: 3650,
            },
            ..AppConfig::default()
        };
        let service = RateService::build(&config, store.clone());
        (store, service)
    }

    #[tokio::test]
    async fn test_convert_applies_the_resolved_rate() {
        let (store, service) = service(Vec::new(), 7);
        store
            .insert(&record("EUR", "USD", 1, dec!(1.10)))
            .await
            .unwrap();

        let conversion = service
            .convert(dec!(100), "USD", "EUR", day(1))
            .await
            .unwrap();
        assert_eq!(conversion.rate.origin, RateOrigin::Inverse);
        assert_eq!(conversion.converted, dec!(90.9091));
    }

    #[tokio::test]
    async fn test_wide_gaps_are_delegated_to_backfill() {
        let (store, service) = service(vec![fixed(dec!(1.1))], 2);

        let resolution = service
            .rates_range("EUR", "USD", day(1), day(6))
            .await
            .unwrap();
        assert!(resolution.rates.is_empty());
        assert_eq!(resolution.missing.len(), 6);
        let job = resolution.backfill.expect("a backfill job");

        let report = service.wait_backfill(job).await.unwrap();
        assert!(report.is_complete());
        assert_eq!(report.succeeded(), 6);
        let rows = store
            .range(
                &CurrencyCode::parse("EUR").unwrap(),
                &CurrencyCode::parse("USD").unwrap(),
                day(1),
                day(6),
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 6);

        let again = service
            .rates_range("EUR", "USD", day(1), day(6))
            .await
            .unwrap();
        assert_eq!(again.rates.len(), 6);
        assert!(again.missing.is_empty());
        assert_eq!(again.backfill, None);
    }

    #[tokio::test]
    async fn test_refresh_reports_progress_per_pair() {
        let (store, service) = service(vec![fixed(dec!(1.2))], 7);
        store
            .insert(&record("USD", "EUR", 2, dec!(0.92)))
            .await
            .unwrap();

        let ticks = AtomicUsize::new(0);
        let outcome = service
            .refresh(None, day(2), &|| {
                ticks.fetch_add(1, Ordering::SeqCst);
            })
            .await
            .unwrap();

        assert_eq!(outcome.refreshed.len(), 3);
        assert!(outcome.failures.is_empty());
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
        let stored_hit = outcome
            .refreshed
            .iter()
            .find(|r| r.target.as_str() == "EUR")
            .unwrap();
        assert_eq!(stored_hit.origin, RateOrigin::Direct);
    }

    #[tokio::test]
    async fn test_code_parsing_happens_at_the_boundary() {
        let (_, service) = service(Vec::new(), 7);
        let result = service.rate("EURO", "USD", day(1)).await;
        assert!(matches!(result, Err(ResolveError::InvalidRequest(_))));

        let unknown = service.rate("JPY", "USD", day(1)).await;
        assert!(matches!(unknown, Err(ResolveError::InvalidRequest(_))));
    }
}
