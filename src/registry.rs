//! Provider bookkeeping: settings, ordering and adapter construction

use crate::core::adapter::RateAdapter;
use crate::core::error::ResolveError;
use crate::providers::beacon::BeaconAdapter;
use crate::providers::fixed::FixedAdapter;
use crate::providers::frankfurter::FrankfurterAdapter;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Beacon,
    Frankfurter,
    Fixed,
}

impl ProviderKind {
    pub fn default_base_url(&self) -> &'static str {
        match self {
            ProviderKind::Beacon => "https://api.currencybeacon.com/v1",
            ProviderKind::Frankfurter => "https://api.frankfurter.dev/v1",
            ProviderKind::Fixed => "",
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_retries() -> usize {
    2
}

/// One provider row. `name` is the unique id rates are attributed to;
/// `kind` selects the wire protocol the adapter speaks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSettings {
    pub name: String,
    pub kind: ProviderKind,
    #[serde(default)]
    pub priority: u32,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_retries")]
    pub retries: usize,
    /// Fixed-kind only: quote this rate instead of deriving one.
    #[serde(default)]
    pub rate: Option<Decimal>,
}

impl ProviderSettings {
    pub fn endpoint(&self) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| self.kind.default_base_url().to_string())
            .trim_end_matches('/')
            .to_string()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// An enabled provider ready to be tried: its settings snapshot plus the
/// adapter built from that snapshot.
pub struct ProviderCandidate {
    pub settings: ProviderSettings,
    pub adapter: Arc<dyn RateAdapter>,
}

/// Holds the provider list behind a lock. `candidates` works on a
/// snapshot, so an `update` mid-resolution never changes the sequence a
/// caller is already walking.
pub struct ProviderRegistry {
    settings: RwLock<Vec<ProviderSettings>>,
}

impl ProviderRegistry {
    pub fn new(settings: Vec<ProviderSettings>) -> Self {
        Self {
            settings: RwLock::new(settings),
        }
    }

    /// Replace the whole provider list. Takes effect on the next
    /// `candidates` call.
    pub fn update(&self, settings: Vec<ProviderSettings>) {
        let mut current = self.settings.write().unwrap();
        debug!("Updating provider registry with {} entries", settings.len());
        *current = settings;
    }

    pub fn snapshot(&self) -> Vec<ProviderSettings> {
        self.settings.read().unwrap().clone()
    }

    /// Enabled providers by ascending priority, ties broken by name, each
    /// with an adapter built from the current settings snapshot.
    pub fn candidates(&self) -> Result<Vec<ProviderCandidate>, ResolveError> {
        let mut enabled: Vec<ProviderSettings> = self
            .settings
            .read()
            .unwrap()
            .iter()
            .filter(|s| s.enabled)
            .cloned()
            .collect();
        if enabled.is_empty() {
            return Err(ResolveError::NoProvidersEnabled);
        }
        enabled.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.name.cmp(&b.name)));
        Ok(enabled
            .into_iter()
            .map(|settings| {
                let adapter = build_adapter(&settings);
                ProviderCandidate { settings, adapter }
            })
            .collect())
    }
}

fn build_adapter(settings: &ProviderSettings) -> Arc<dyn RateAdapter> {
    match settings.kind {
        ProviderKind::Beacon => Arc::new(BeaconAdapter::new(settings)),
        ProviderKind::Frankfurter => Arc::new(FrankfurterAdapter::new(settings)),
        ProviderKind::Fixed => Arc::new(FixedAdapter::new(settings)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(name: &str, priority: u32, enabled: bool) -> ProviderSettings {
        ProviderSettings {
            name: name.to_string(),
            kind: ProviderKind::Fixed,
            priority,
            enabled,
            base_url: None,
            api_key: None,
            timeout_secs: 30,
            retries: 2,
            rate: None,
        }
    }

    #[test]
    fn test_orders_by_priority_then_name() {
        let registry = ProviderRegistry::new(vec![
            settings("zeta", 1, true),
            settings("beacon", 2, true),
            settings("alpha", 1, true),
        ]);

        let names: Vec<String> = registry
            .candidates()
            .unwrap()
            .into_iter()
            .map(|c| c.settings.name)
            .collect();
        assert_eq!(names, vec!["alpha", "zeta", "beacon"]);
    }

    #[test]
    fn test_disabled_providers_are_not_candidates() {
        let registry = ProviderRegistry::new(vec![
            settings("alpha", 1, false),
            settings("beta", 2, true),
        ]);

        let names: Vec<String> = registry
            .candidates()
            .unwrap()
            .into_iter()
            .map(|c| c.settings.name)
            .collect();
        assert_eq!(names, vec!["beta"]);
    }

    #[test]
    fn test_no_enabled_providers_is_a_distinct_error() {
        let registry = ProviderRegistry::new(vec![settings("alpha", 1, false)]);
        assert!(matches!(
            registry.candidates(),
            Err(ResolveError::NoProvidersEnabled)
        ));

        let empty = ProviderRegistry::new(Vec::new());
        assert!(matches!(
            empty.candidates(),
            Err(ResolveError::NoProvidersEnabled)
        ));
    }

    #[test]
    fn test_update_takes_effect_on_next_read() {
        let registry = ProviderRegistry::new(vec![settings("alpha", 1, true)]);
        let held = registry.candidates().unwrap();

        registry.update(vec![settings("beta", 1, true), settings("gamma", 2, true)]);

        // The snapshot taken before the update is unchanged.
        assert_eq!(held.len(), 1);
        assert_eq!(held[0].settings.name, "alpha");

        let names: Vec<String> = registry
            .candidates()
            .unwrap()
            .into_iter()
            .map(|c| c.settings.name)
            .collect();
        assert_eq!(names, vec!["beta", "gamma"]);
    }

    #[test]
    fn test_endpoint_falls_back_to_kind_default() {
        let mut s = settings("frank", 1, true);
        s.kind = ProviderKind::Frankfurter;
        assert_eq!(s.endpoint(), "https://api.frankfurter.dev/v1");

        s.base_url = Some("http://localhost:9000/".to_string());
        assert_eq!(s.endpoint(), "http://localhost:9000");
    }
}
