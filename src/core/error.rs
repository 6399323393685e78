//! Resolution error taxonomy

use crate::core::adapter::AdapterError;
use crate::core::currency::{CurrencyCode, InvalidCurrency};
use crate::store::StoreError;
use chrono::NaiveDate;
use std::fmt::Display;

/// One provider's failure inside a fallback walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderFailure {
    pub provider: String,
    pub error: AdapterError,
}

impl Display for ProviderFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.provider, self.error)
    }
}

// Display/Error/From are implemented by hand: thiserror's derive treats
// any field named `source` as the error source, but in `NotFound` it is
// the source currency of the pair.
#[derive(Debug)]
pub enum ResolveError {
    /// Nothing stored and every enabled provider failed. Carries the
    /// per-provider failures in the order they were attempted.
    NotFound {
        source: CurrencyCode,
        target: CurrencyCode,
        date: NaiveDate,
        failures: Vec<ProviderFailure>,
    },

    NoProvidersEnabled,

    InvalidRequest(String),

    Store(StoreError),
}

impl Display for ResolveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolveError::NotFound {
                source,
                target,
                date,
                failures,
            } => {
                let n = failures.len();
                write!(f, "no rate for {source}/{target} on {date}: {n} provider(s) failed")
            }
            ResolveError::NoProvidersEnabled => write!(f, "no providers are enabled"),
            ResolveError::InvalidRequest(reason) => write!(f, "invalid request: {reason}"),
            ResolveError::Store(transparent) => Display::fmt(transparent, f),
        }
    }
}

impl std::error::Error for ResolveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ResolveError::Store(transparent) => std::error::Error::source(transparent),
            _ => None,
        }
    }
}

impl From<StoreError> for ResolveError {
    fn from(source: StoreError) -> Self {
        ResolveError::Store(source)
    }
}

impl From<InvalidCurrency> for ResolveError {
    fn from(err: InvalidCurrency) -> Self {
        ResolveError::InvalidRequest(err.to_string())
    }
}

impl ResolveError {
    /// Failures recorded during the fallback walk, if this is a miss.
    pub fn provider_failures(&self) -> &[ProviderFailure] {
        match self {
            ResolveError::NotFound { failures, .. } => failures,
            _ => &[],
        }
    }
}
