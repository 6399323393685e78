//! Background fetch-and-store of historical rate ranges, tracked per
//! date so one bad day never sinks the whole window

use crate::core::currency::CurrencyCode;
use crate::core::error::ResolveError;
use crate::core::rate::{days_inclusive, RateRecord};
use crate::resolver::Resolver;
use crate::store::RateStore;
use chrono::{NaiveDate, Utc};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of one date unit. `Skipped` marks a date the store already
/// covered; the other terminal states record the fetch outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateStatus {
    Pending,
    InFlight,
    Skipped,
    Succeeded { provider: String },
    Failed { reason: String },
}

impl fmt::Display for DateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateStatus::Pending => write!(f, "pending"),
            DateStatus::InFlight => write!(f, "in-flight"),
            DateStatus::Skipped => write!(f, "skipped"),
            DateStatus::Succeeded { provider } => write!(f, "succeeded ({provider})"),
            DateStatus::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BackfillReport {
    pub id: JobId,
    pub source: CurrencyCode,
    pub target: CurrencyCode,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub cancelled: bool,
    pub statuses: BTreeMap<NaiveDate, DateStatus>,
}

impl BackfillReport {
    pub fn succeeded(&self) -> usize {
        self.count(|s| matches!(s, DateStatus::Succeeded { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, DateStatus::Skipped))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, DateStatus::Failed { .. }))
    }

    /// Dates still waiting on a terminal state.
    pub fn outstanding(&self) -> usize {
        self.count(|s| matches!(s, DateStatus::Pending | DateStatus::InFlight))
    }

    pub fn is_complete(&self) -> bool {
        self.outstanding() == 0
    }

    fn count(&self, predicate: impl Fn(&DateStatus) -> bool) -> usize {
        self.statuses.values().filter(|s| predicate(s)).count()
    }
}

struct JobHandle {
    report: Arc<Mutex<BackfillReport>>,
    cancelled: Arc<AtomicBool>,
    done: watch::Receiver<bool>,
}

/// Runs backfill jobs on background tasks. Submission returns
/// immediately; progress is observable through `report` and `wait`.
/// Duplicate or overlapping submissions are safe since the store
/// rejects duplicate rows.
pub struct BackfillOrchestrator {
    resolver: Arc<Resolver>,
    store: Arc<dyn RateStore>,
    max_window_days: i64,
    jobs: Mutex<HashMap<JobId, JobHandle>>,
    next_id: AtomicU64,
}

impl BackfillOrchestrator {
    pub fn new(resolver: Arc<Resolver>, max_window_days: i64) -> Self {
        let store = resolver.store();
        BackfillOrchestrator {
            resolver,
            store,
            max_window_days,
            jobs: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Validates the request and spawns the job, returning its id
    /// without waiting for any unit of work.
    pub fn submit(
        self: &Arc<Self>,
        source: CurrencyCode,
        target: CurrencyCode,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<JobId, ResolveError> {
        self.resolver.ensure_known(&source)?;
        self.resolver.ensure_known(&target)?;
        if source == target {
            return Err(ResolveError::InvalidRequest(
                "an identity pair needs no backfill".to_string(),
            ));
        }
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
        let span = (to - from).num_days() + 1;
        if span > self.max_window_days {
            return Err(ResolveError::InvalidRequest(format!(
                "window of {span} days exceeds the limit of {}",
                self.max_window_days
            )));
        }

        let id = JobId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let statuses = days_inclusive(from, to)
            .map(|date| (date, DateStatus::Pending))
            .collect();
        let report = Arc::new(Mutex::new(BackfillReport {
            id,
            source: source.clone(),
            target: target.clone(),
            from,
            to,
            cancelled: false,
            statuses,
        }));
        let cancelled = Arc::new(AtomicBool::new(false));
        let (done_tx, done_rx) = watch::channel(false);
        self.jobs.lock().unwrap().insert(
            id,
            JobHandle {
                report: report.clone(),
                cancelled: cancelled.clone(),
                done: done_rx,
            },
        );

        info!(
            "Submitted backfill job {} for {}/{} over {}..{}",
            id, source, target, from, to
        );
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move {
            orchestrator
                .run_job(id, report, cancelled, source, target, from, to)
                .await;
            let _ = done_tx.send(true);
        });
        Ok(id)
    }

    /// Flags the job for cancellation. The unit in flight finishes;
    /// remaining dates stay pending. Returns false for unknown jobs.
    pub fn cancel(&self, id: JobId) -> bool {
        match self.jobs.lock().unwrap().get(&id) {
            Some(handle) => {
                handle.cancelled.store(true, Ordering::SeqCst);
                info!("Backfill job {} flagged for cancellation", id);
                true
            }
            None => false,
        }
    }

    pub fn report(&self, id: JobId) -> Option<BackfillReport> {
        self.jobs
            .lock()
            .unwrap()
            .get(&id)
            .map(|handle| handle.report.lock().unwrap().clone())
    }

    /// Blocks until the job's worker finishes, then returns its report.
    pub async fn wait(&self, id: JobId) -> Option<BackfillReport> {
        let mut done = {
            let jobs = self.jobs.lock().unwrap();
            jobs.get(&id)?.done.clone()
        };
        let _ = done.wait_for(|finished| *finished).await;
        self.report(id)
    }

    #[instrument(
        name = "BackfillJob",
        skip_all,
        fields(job = %id, source = %source, target = %target)
    )]
    async fn run_job(
        &self,
        id: JobId,
        report: Arc<Mutex<BackfillReport>>,
        cancelled: Arc<AtomicBool>,
        source: CurrencyCode,
        target: CurrencyCode,
        from: NaiveDate,
        to: NaiveDate,
    ) {
        for date in days_inclusive(from, to) {
            if cancelled.load(Ordering::SeqCst) {
                report.lock().unwrap().cancelled = true;
                info!("Backfill job {} cancelled before {}", id, date);
                return;
            }
            set_status(&report, date, DateStatus::InFlight);
            let status = self.process_date(&source, &target, date).await;
            set_status(&report, date, status);
        }
        info!("Backfill job {} finished", id);
    }

    /// One unit of work. The store is consulted first so re-runs over a
    /// partially covered range cost no external calls.
    async fn process_date(
        &self,
        source: &CurrencyCode,
        target: &CurrencyCode,
        date: NaiveDate,
    ) -> DateStatus {
        match self.store.get(source, target, date).await {
            Ok(Some(_)) => {
                debug!("Rate for {}/{} on {} already stored", source, target, date);
                DateStatus::Skipped
            }
            Ok(None) => match self.resolver.fetch_via_providers(source, target, date).await {
                Ok((quote, provider)) => {
                    let record = RateRecord {
                        source: source.clone(),
                        target: target.clone(),
                        date,
                        rate: quote.rate,
                        provider: provider.clone(),
                        fetched_at: Utc::now(),
                    };
                    match self.store.insert(&record).await {
                        Ok(_) => DateStatus::Succeeded { provider },
                        Err(err) => DateStatus::Failed {
                            reason: err.to_string(),
                        },
                    }
                }
                Err(err) => {
                    warn!(
                        "Backfill unit {}/{} on {} failed: {}",
                        source, target, date, err
                    );
                    DateStatus::Failed {
                        reason: err.to_string(),
                    }
                }
            },
            Err(err) => DateStatus::Failed {
                reason: err.to_string(),
            },
        }
    }
}

fn set_status(report: &Arc<Mutex<BackfillReport>>, date: NaiveDate, status: DateStatus) {
    report.lock().unwrap().statuses.insert(date, status);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ProviderKind, ProviderRegistry, ProviderSettings};
    use crate::resolver::ResolverConfig;
    use crate::store::MemoryRateStore;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn code(value: &str) -> CurrencyCode {
        CurrencyCode::parse(value).unwrap()
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn record(source: &str, target: &str, d: u32, rate: Decimal) -> RateRecord {
        RateRecord {
            source: code(source),
            target: code(target),
            date: day(d),
            rate,
            provider: "frankfurter".to_string(),
            fetched_at: Utc::now(),
        }
    }

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

    fn http(base_url: &str) -> ProviderSettings {
        ProviderSettings {
            name: "frankfurter".to_string(),
            kind: ProviderKind::Frankfurter,
            priority: 1,
            enabled: true,
            base_url: Some(base_url.to_string()),
            api_key: None,
            timeout_secs: 5,
            retries: 0,
            rate: None,
        }
    }

    fn setup(
        providers: Vec<ProviderSettings>,
        max_window_days: i64,
    ) -> (Arc<MemoryRateStore>, Arc<BackfillOrchestrator>) {
        let store = Arc::new(MemoryRateStore::new());
        let resolver = Arc::new(Resolver::new(
            store.clone(),
            Arc::new(ProviderRegistry::new(providers)),
            ResolverConfig::default(),
        ));
        (
            store.clone(),
            Arc::new(BackfillOrchestrator::new(resolver, max_window_days)),
        )
    }

    #[tokio::test]
    async fn test_backfill_fetches_only_missing_dates_and_reruns_free() {
        let mock_server = MockServer::start().await;
        for (gap, rate) in [(1, "1.07"), (3, "1.08"), (5, "1.10")] {
            Mock::given(method("GET"))
                .and(path(format!("/2024-01-0{gap}")))
                .respond_with(ResponseTemplate::new(200).set_body_string(format!(
                    r#"{{"rates": {{"USD": {rate}}}}}"#
                )))
                .expect(1)
                .mount(&mock_server)
                .await;
        }

        let (store, orchestrator) = setup(vec![http(&mock_server.uri())], 3650);
        store.insert(&record("EUR", "USD", 2, dec!(1.08))).await.unwrap();
        store.insert(&record("EUR", "USD", 4, dec!(1.09))).await.unwrap();

        let id = orchestrator
            .submit(code("EUR"), code("USD"), day(1), day(5))
            .unwrap();
        let report = orchestrator.wait(id).await.unwrap();

        assert!(report.is_complete());
        assert_eq!(report.succeeded(), 3);
        assert_eq!(report.skipped(), 2);
        assert_eq!(report.failed(), 0);
        assert_eq!(report.statuses[&day(2)], DateStatus::Skipped);
        assert_eq!(
            report.statuses[&day(3)],
            DateStatus::Succeeded {
                provider: "frankfurter".to_string()
            }
        );

        // Re-running the same window touches no provider; the mocks
        // above verify exactly one request per gap in total.
        let id = orchestrator
            .submit(code("EUR"), code("USD"), day(1), day(5))
            .unwrap();
        let report = orchestrator.wait(id).await.unwrap();
        assert_eq!(report.skipped(), 5);
        assert_eq!(report.succeeded(), 0);
    }

    #[tokio::test]
    async fn test_one_failing_date_does_not_abort_the_job() {
        let mock_server = MockServer::start().await;
        for gap in [1, 2, 4, 5] {
            Mock::given(method("GET"))
                .and(path(format!("/2024-01-0{gap}")))
                .respond_with(
                    ResponseTemplate::new(200).set_body_string(r#"{"rates": {"USD": 1.08}}"#),
                )
                .mount(&mock_server)
                .await;
        }
        Mock::given(method("GET"))
            .and(path("/2024-01-03"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let (store, orchestrator) = setup(vec![http(&mock_server.uri())], 3650);
        let id = orchestrator
            .submit(code("EUR"), code("USD"), day(1), day(5))
            .unwrap();
        let report = orchestrator.wait(id).await.unwrap();

        assert!(report.is_complete());
        assert_eq!(report.succeeded(), 4);
        assert_eq!(report.failed(), 1);
        assert!(matches!(
            report.statuses[&day(3)],
            DateStatus::Failed { .. }
        ));
        assert!(store.get(&code("EUR"), &code("USD"), day(3)).await.unwrap().is_none());
        assert!(store.get(&code("EUR"), &code("USD"), day(4)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_overlapping_jobs_never_duplicate_rows() {
        let (store, orchestrator) = setup(vec![fixed(dec!(1.1))], 3650);

        let first = orchestrator
            .submit(code("EUR"), code("USD"), day(1), day(5))
            .unwrap();
        let second = orchestrator
            .submit(code("EUR"), code("USD"), day(3), day(8))
            .unwrap();
        orchestrator.wait(first).await.unwrap();
        orchestrator.wait(second).await.unwrap();

        let rows = store
            .range(&code("EUR"), &code("USD"), day(1), day(8))
            .await
            .unwrap();
        assert_eq!(rows.len(), 8);
    }

    #[tokio::test]
    async fn test_cancel_leaves_remaining_dates_pending() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"rates": {"USD": 1.08}}"#)
                    .set_delay(Duration::from_millis(200)),
            )
            .mount(&mock_server)
            .await;

        let (_, orchestrator) = setup(vec![http(&mock_server.uri())], 3650);
        let id = orchestrator
            .submit(code("EUR"), code("USD"), day(1), day(5))
            .unwrap();
        assert!(orchestrator.cancel(id));

        let report = orchestrator.wait(id).await.unwrap();
        assert!(report.cancelled);
        assert!(!report.is_complete());
        assert!(report.outstanding() >= 4);
        assert_eq!(report.failed(), 0);
    }

    #[tokio::test]
    async fn test_submit_rejects_bad_windows() {
        let (_, orchestrator) = setup(vec![fixed(dec!(1.1))], 30);

        let inverted = orchestrator.submit(code("EUR"), code("USD"), day(5), day(1));
        assert!(matches!(inverted, Err(ResolveError::InvalidRequest(_))));

        let identity = orchestrator.submit(code("EUR"), code("EUR"), day(1), day(5));
        assert!(matches!(identity, Err(ResolveError::InvalidRequest(_))));

        let wide = orchestrator.submit(
            code("EUR"),
            code("USD"),
            NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
        );
        assert!(matches!(wide, Err(ResolveError::InvalidRequest(_))));

        let future = orchestrator.submit(
            code("EUR"),
            code("USD"),
            Utc::now().date_naive(),
            Utc::now().date_naive().succ_opt().unwrap(),
        );
        assert!(matches!(future, Err(ResolveError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_unknown_job_ids_are_not_found() {
        let (_, orchestrator) = setup(vec![fixed(dec!(1.1))], 3650);
        assert!(orchestrator.report(JobId(999)).is_none());
        assert!(!orchestrator.cancel(JobId(999)));
        assert!(orchestrator.wait(JobId(999)).await.is_none());
    }
}
