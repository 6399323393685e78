//! Adapter for keyless rate APIs addressed by path date, with `..`
//! range endpoints (Frankfurter wire shape)

use crate::core::adapter::{AdapterError, RateAdapter};
use crate::core::currency::CurrencyCode;
use crate::core::rate::RateQuote;
use crate::providers::util::{parse_wire_rate, with_retry};
use crate::registry::ProviderSettings;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, instrument};

const RETRY_DELAY_MS: u64 = 500;

pub struct FrankfurterAdapter {
    name: String,
    base_url: String,
    timeout: Duration,
    retries: usize,
}

impl FrankfurterAdapter {
    pub fn new(settings: &ProviderSettings) -> Self {
        FrankfurterAdapter {
            name: settings.name.clone(),
            base_url: settings.endpoint(),
            timeout: settings.timeout(),
            retries: settings.retries,
        }
    }

    fn client(&self) -> Result<reqwest::Client, AdapterError> {
        reqwest::Client::builder()
            .user_agent("fxr/0.1")
            .timeout(self.timeout)
            .build()
            .map_err(|e| AdapterError::Unavailable {
                reason: format!("failed to build HTTP client: {e}"),
            })
    }

    async fn get_text(
        &self,
        url: &str,
        source: &CurrencyCode,
        target: &CurrencyCode,
    ) -> Result<String, AdapterError> {
        debug!("Requesting rate data from {}", url);
        let client = self.client()?;
        let response = with_retry(|| client.get(url).send(), self.retries, RETRY_DELAY_MS).await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AdapterError::from_status(status, source, target));
        }
        response.text().await.map_err(AdapterError::from)
    }
}

#[derive(Deserialize, Debug)]
struct FrankfurterResponse {
    rates: HashMap<String, f64>,
}

#[derive(Deserialize, Debug)]
struct FrankfurterSeriesResponse {
    rates: HashMap<String, HashMap<String, f64>>,
}

fn parse_json<T: serde::de::DeserializeOwned>(body: &str) -> Result<T, AdapterError> {
    serde_json::from_str(body).map_err(|e| AdapterError::MalformedResponse {
        reason: format!("failed to parse JSON response: {e}"),
    })
}

#[async_trait]
impl RateAdapter for FrankfurterAdapter {
    #[instrument(
        name = "FrankfurterRateFetch",
        skip(self),
        fields(provider = %self.name, source = %source, target = %target)
    )]
    async fn fetch_rate(
        &self,
        source: &CurrencyCode,
        target: &CurrencyCode,
        date: NaiveDate,
    ) -> Result<RateQuote, AdapterError> {
        let url = format!(
            "{}/{}?base={}&symbols={}",
            self.base_url, date, source, target
        );

        let body = self.get_text(&url, source, target).await?;
        let data: FrankfurterResponse = parse_json(&body)?;
        if data.rates.is_empty() {
            return Err(AdapterError::NoData { date });
        }
        let raw = data
            .rates
            .get(target.as_str())
            .ok_or_else(|| AdapterError::UnsupportedPair {
                source: source.to_string(),
                target: target.to_string(),
            })?;

        // The provider substitutes the previous banking day on holidays;
        // the quote is still attributed to the requested date.
        Ok(RateQuote {
            date,
            rate: parse_wire_rate(*raw)?,
        })
    }

    #[instrument(
        name = "FrankfurterSeriesFetch",
        skip(self),
        fields(provider = %self.name, source = %source, target = %target)
    )]
    async fn fetch_range(
        &self,
        source: &CurrencyCode,
        target: &CurrencyCode,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<RateQuote>, AdapterError> {
        let url = format!(
            "{}/{}..{}?base={}&symbols={}",
            self.base_url, from, to, source, target
        );

        let body = self.get_text(&url, source, target).await?;
        let data: FrankfurterSeriesResponse = parse_json(&body)?;

        let mut quotes = Vec::new();
        for (day, rates) in &data.rates {
            let day = NaiveDate::parse_from_str(day, "%Y-%m-%d").map_err(|e| {
                AdapterError::MalformedResponse {
                    reason: format!("bad date key '{day}' in series: {e}"),
                }
            })?;
            if day < from || day > to {
                continue;
            }
            if let Some(raw) = rates.get(target.as_str()) {
                quotes.push(RateQuote {
                    date: day,
                    rate: parse_wire_rate(*raw)?,
                });
            }
        }
        quotes.sort_by_key(|q| q.date);
        Ok(quotes)
    }
}
