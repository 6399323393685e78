//! Provider adapter seam and its error taxonomy

use crate::core::currency::CurrencyCode;
use crate::core::rate::RateQuote;
use async_trait::async_trait;
use chrono::NaiveDate;

/// Why a single provider attempt failed. These never abort the fallback
/// walk; the resolver records them and moves to the next candidate.
// Display/Error are implemented by hand: thiserror's derive treats any
// field named `source` as the error source, but here it is the source
// currency of the pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterError {
    Unavailable { reason: String },

    UnsupportedPair { source: String, target: String },

    NoData { date: NaiveDate },

    MalformedResponse { reason: String },

    AuthenticationFailed,
}

impl std::fmt::Display for AdapterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdapterError::Unavailable { reason } => {
                write!(f, "provider unavailable: {reason}")
            }
            AdapterError::UnsupportedPair { source, target } => {
                write!(f, "currency pair {source}/{target} not supported")
            }
            AdapterError::NoData { date } => {
                write!(f, "no rate published for {date}")
            }
            AdapterError::MalformedResponse { reason } => {
                write!(f, "malformed provider response: {reason}")
            }
            AdapterError::AuthenticationFailed => {
                write!(f, "provider rejected the configured credentials")
            }
        }
    }
}

impl std::error::Error for AdapterError {}

impl AdapterError {
    pub(crate) fn from_status(
        status: reqwest::StatusCode,
        source: &CurrencyCode,
        target: &CurrencyCode,
    ) -> Self {
        match status.as_u16() {
            401 | 403 => AdapterError::AuthenticationFailed,
            404 | 422 => AdapterError::UnsupportedPair {
                source: source.to_string(),
                target: target.to_string(),
            },
            _ => AdapterError::Unavailable {
                reason: format!("HTTP error: {status}"),
            },
        }
    }
}

impl From<reqwest::Error> for AdapterError {
    fn from(err: reqwest::Error) -> Self {
        let reason = if err.is_timeout() {
            "request timed out".to_string()
        } else if err.is_connect() {
            format!("connection failed: {err}")
        } else {
            err.to_string()
        };
        AdapterError::Unavailable { reason }
    }
}

/// Normalizes one external rate API. Implementations apply the base URL,
/// credential and timeout from the settings snapshot they were built from.
#[async_trait]
pub trait RateAdapter: Send + Sync {
    /// Rate for a single pair and date.
    async fn fetch_rate(
        &self,
        source: &CurrencyCode,
        target: &CurrencyCode,
        date: NaiveDate,
    ) -> Result<RateQuote, AdapterError>;

    /// Quotes for the dates the provider published inside the inclusive
    /// window. Dates without data are absent from the result, not errors.
    async fn fetch_range(
        &self,
        source: &CurrencyCode,
        target: &CurrencyCode,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<RateQuote>, AdapterError>;
}
