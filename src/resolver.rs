//! Resolution engine deciding where a rate comes from: the store, the
//! inverse pair, or an ordered walk over external providers

use crate::backfill::JobId;
use crate::core::adapter::AdapterError;
use crate::core::currency::CurrencyCode;
use crate::core::error::{ProviderFailure, ResolveError};
use crate::core::rate::{
    days_inclusive, invert_rate, RateOrigin, RateQuote, RateRecord, ResolvedRate,
};
use crate::registry::ProviderRegistry;
use crate::store::RateStore;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, instrument, warn};

#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Currency codes accepted in requests. Empty means unrestricted.
    pub currencies: HashSet<CurrencyCode>,
    /// Decimal places kept when deriving an inverse rate.
    pub scale: u32,
    /// Persist derived inverse rates instead of recomputing per request.
    pub materialize_inverse: bool,
    /// Largest gap (in days) filled inline during a range resolution.
    /// Larger gaps are left for a background backfill job.
    pub inline_gap_limit: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        ResolverConfig {
            currencies: HashSet::new(),
            scale: 6,
            materialize_inverse: false,
            inline_gap_limit: 7,
        }
    }
}

/// Outcome of a range resolution. `missing` holds the dates no source
/// could supply inline; `backfill` is set by the service layer when a
/// background job was submitted for them.
#[derive(Debug)]
pub struct RangeResolution {
    pub rates: Vec<ResolvedRate>,
    pub missing: Vec<NaiveDate>,
    pub backfill: Option<JobId>,
}

pub struct Resolver {
    store: Arc<dyn RateStore>,
    registry: Arc<ProviderRegistry>,
    config: ResolverConfig,
}

impl Resolver {
    pub fn new(
        store: Arc<dyn RateStore>,
        registry: Arc<ProviderRegistry>,
        config: ResolverConfig,
    ) -> Self {
        Resolver {
            store,
            registry,
            config,
        }
    }

    pub fn store(&self) -> Arc<dyn RateStore> {
        self.store.clone()
    }

    /// Resolves a single rate: identity, then direct store row, then the
    /// inverse pair, then providers in priority order with write-back.
    #[instrument(
        name = "RateResolve",
        skip(self),
        fields(source = %source, target = %target, date = %date)
    )]
    pub async fn resolve(
        &self,
        source: &CurrencyCode,
        target: &CurrencyCode,
        date: NaiveDate,
    ) -> Result<ResolvedRate, ResolveError> {
        self.ensure_known(source)?;
        self.ensure_known(target)?;
        if date > Utc::now().date_naive() {
            return Err(ResolveError::InvalidRequest(format!(
                "date {date} is in the future"
            )));
        }

        if source == target {
            debug!("Identity pair, returning unit rate");
            return Ok(unit_rate(source, target, date));
        }

        if let Some(record) = self.store.get(source, target, date).await? {
            return Ok(ResolvedRate {
                source: source.clone(),
                target: target.clone(),
                date,
                rate: record.rate,
                origin: RateOrigin::Direct,
                provider: Some(record.provider),
            });
        }

        if let Some(record) = self.store.get(target, source, date).await? {
            if let Some(rate) = invert_rate(record.rate, self.config.scale) {
                debug!("Derived {}/{} on {} from the inverse pair", source, target, date);
                if self.config.materialize_inverse {
                    let derived = RateRecord {
                        source: source.clone(),
                        target: target.clone(),
                        date,
                        rate,
                        provider: record.provider.clone(),
                        fetched_at: Utc::now(),
                    };
                    self.store.insert(&derived).await?;
                }
                return Ok(ResolvedRate {
                    source: source.clone(),
                    target: target.clone(),
                    date,
                    rate,
                    origin: RateOrigin::Inverse,
                    provider: Some(record.provider),
                });
            }
        }

        let (quote, provider) = self.fetch_via_providers(source, target, date).await?;
        let record = RateRecord {
            source: source.clone(),
            target: target.clone(),
            date,
            rate: quote.rate,
            provider: provider.clone(),
            fetched_at: Utc::now(),
        };
        self.store.insert(&record).await?;
        Ok(ResolvedRate {
            source: source.clone(),
            target: target.clone(),
            date,
            rate: quote.rate,
            origin: RateOrigin::Provider,
            provider: Some(provider),
        })
    }

    /// Resolves every day in `[from, to]`. Stored rows win, the inverse
    /// series fills read-only, and gaps up to `inline_gap_limit` days are
    /// fetched from providers. Remaining dates are reported in `missing`.
    #[instrument(
        name = "RangeResolve",
        skip(self),
        fields(source = %source, target = %target, from = %from, to = %to)
    )]
    pub async fn resolve_range(
        &self,
        source: &CurrencyCode,
        target: &CurrencyCode,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<RangeResolution, ResolveError> {
        self.ensure_known(source)?;
        self.ensure_known(target)?;
        if from > to {
            return Err(ResolveError::InvalidRequest(format!(
                "range start {from} is after end {to}"
            )));
        }
        if to > Utc::now().date_naive() {
            return Err(ResolveError::InvalidRequest(format!(
                "date {to} is in the future"
            )));
        }

        if source == target {
            let rates = days_inclusive(from, to)
                .map(|date| unit_rate(source, target, date))
                .collect();
            return Ok(RangeResolution {
                rates,
                missing: Vec::new(),
                backfill: None,
            });
        }

        let mut by_date: BTreeMap<NaiveDate, ResolvedRate> = BTreeMap::new();
        for record in self.store.range(source, target, from, to).await? {
            by_date.entry(record.date).or_insert(ResolvedRate {
                source: source.clone(),
                target: target.clone(),
                date: record.date,
                rate: record.rate,
                origin: RateOrigin::Direct,
                provider: Some(record.provider),
            });
        }

        for record in self.store.range(target, source, from, to).await? {
            if by_date.contains_key(&record.date) {
                continue;
            }
            if let Some(rate) = invert_rate(record.rate, self.config.scale) {
                by_date.insert(
                    record.date,
                    ResolvedRate {
                        source: source.clone(),
                        target: target.clone(),
                        date: record.date,
                        rate,
                        origin: RateOrigin::Inverse,
                        provider: Some(record.provider),
                    },
                );
            }
        }

        let missing: Vec<NaiveDate> = days_inclusive(from, to)
            .filter(|date| !by_date.contains_key(date))
            .collect();

        let mut unresolved = Vec::new();
        for (seg_from, seg_to) in contiguous_segments(&missing) {
            let days: Vec<NaiveDate> = days_inclusive(seg_from, seg_to).collect();
            if days.len() > self.config.inline_gap_limit {
                debug!(
                    "Gap {}..{} ({} days) exceeds the inline limit, leaving for backfill",
                    seg_from,
                    seg_to,
                    days.len()
                );
                unresolved.extend(days);
                continue;
            }
            match self
                .fetch_range_via_providers(source, target, seg_from, seg_to)
                .await
            {
                Ok((quotes, provider)) => {
                    for quote in quotes {
                        let record = RateRecord {
                            source: source.clone(),
                            target: target.clone(),
                            date: quote.date,
                            rate: quote.rate,
                            provider: provider.clone(),
                            fetched_at: Utc::now(),
                        };
                        self.store.insert(&record).await?;
                        by_date.entry(quote.date).or_insert(ResolvedRate {
                            source: source.clone(),
                            target: target.clone(),
                            date: quote.date,
                            rate: quote.rate,
                            origin: RateOrigin::Provider,
                            provider: Some(provider.clone()),
                        });
                    }
                    unresolved.extend(days.into_iter().filter(|d| !by_date.contains_key(d)));
                }
                Err(ResolveError::NoProvidersEnabled) => {
                    return Err(ResolveError::NoProvidersEnabled);
                }
                Err(err) => {
                    debug!("No provider could fill {}..{}: {}", seg_from, seg_to, err);
                    unresolved.extend(days);
                }
            }
        }

        Ok(RangeResolution {
            rates: by_date.into_values().collect(),
            missing: unresolved,
            backfill: None,
        })
    }

    /// Walks enabled providers in priority order until one supplies the
    /// rate. Each attempt is bounded by the provider's own timeout; a
    /// failure is recorded and the walk advances to the next candidate.
    pub(crate) async fn fetch_via_providers(
        &self,
        source: &CurrencyCode,
        target: &CurrencyCode,
        date: NaiveDate,
    ) -> Result<(RateQuote, String), ResolveError> {
        let candidates = self.registry.candidates()?;
        let mut failures = Vec::new();
        for candidate in candidates {
            let name = candidate.settings.name.clone();
            let limit = candidate.settings.timeout();
            debug!("Trying provider {} for {}/{} on {}", name, source, target, date);
            let attempt = timeout(limit, candidate.adapter.fetch_rate(source, target, date)).await;
            match flatten_attempt(attempt, limit) {
                Ok(quote) => {
                    debug!("Provider {} supplied {}/{} on {}", name, source, target, date);
                    return Ok((quote, name));
                }
                Err(error) => {
                    warn!(
                        "Provider {} failed for {}/{} on {}: {}",
                        name, source, target, date, error
                    );
                    failures.push(ProviderFailure {
                        provider: name,
                        error,
                    });
                }
            }
        }
        Err(ResolveError::NotFound {
            source: source.clone(),
            target: target.clone(),
            date,
            failures,
        })
    }

    /// Range variant of the provider walk. An empty result set counts as
    /// a failure so the walk can advance to a provider with data.
    pub(crate) async fn fetch_range_via_providers(
        &self,
        source: &CurrencyCode,
        target: &CurrencyCode,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<(Vec<RateQuote>, String), ResolveError> {
        let candidates = self.registry.candidates()?;
        let mut failures = Vec::new();
        for candidate in candidates {
            let name = candidate.settings.name.clone();
            let limit = candidate.settings.timeout();
            let attempt =
                timeout(limit, candidate.adapter.fetch_range(source, target, from, to)).await;
            match flatten_attempt(attempt, limit) {
                Ok(quotes) if quotes.is_empty() => {
                    let error = AdapterError::NoData { date: from };
                    warn!(
                        "Provider {} returned no data for {}/{} over {}..{}",
                        name, source, target, from, to
                    );
                    failures.push(ProviderFailure {
                        provider: name,
                        error,
                    });
                }
                Ok(quotes) => return Ok((quotes, name)),
                Err(error) => {
                    warn!(
                        "Provider {} failed for {}/{} over {}..{}: {}",
                        name, source, target, from, to, error
                    );
                    failures.push(ProviderFailure {
                        provider: name,
                        error,
                    });
                }
            }
        }
        Err(ResolveError::NotFound {
            source: source.clone(),
            target: target.clone(),
            date: from,
            failures,
        })
    }

    pub(crate) fn ensure_known(&self, code: &CurrencyCode) -> Result<(), ResolveError> {
        if self.config.currencies.is_empty() || self.config.currencies.contains(code) {
            Ok(())
        } else {
            Err(ResolveError::InvalidRequest(format!(
                "unknown currency code: {code}"
            )))
        }
    }
}

fn unit_rate(source: &CurrencyCode, target: &CurrencyCode, date: NaiveDate) -> ResolvedRate {
    ResolvedRate {
        source: source.clone(),
        target: target.clone(),
        date,
        rate: Decimal::ONE,
        origin: RateOrigin::Identity,
        provider: None,
    }
}

fn flatten_attempt<T>(
    outcome: Result<Result<T, AdapterError>, tokio::time::error::Elapsed>,
    limit: Duration,
) -> Result<T, AdapterError> {
    match outcome {
        Ok(result) => result,
        Err(_) => Err(AdapterError::Unavailable {
            reason: format!("timed out after {}s", limit.as_secs()),
        }),
    }
}

/// Groups sorted dates into runs of consecutive days.
fn contiguous_segments(dates: &[NaiveDate]) -> Vec<(NaiveDate, NaiveDate)> {
    let mut segments = Vec::new();
    let mut dates = dates.iter().copied();
    let Some(mut start) = dates.next() else {
        return segments;
    };
    let mut end = start;
    for date in dates {
        if end.succ_opt() == Some(date) {
            end = date;
        } else {
            segments.push((start, end));
            start = date;
            end = date;
        }
    }
    segments.push((start, end));
    segments
}
