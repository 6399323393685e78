//! Adapter for bearer-token rate APIs with latest/historical/timeseries
//! endpoints (CurrencyBeacon wire shape)

use crate::core::adapter::{AdapterError, RateAdapter};
use crate::core::currency::CurrencyCode;
use crate::core::rate::RateQuote;
use crate::providers::util::{parse_wire_rate, with_retry};
use crate::registry::ProviderSettings;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, instrument};

const RETRY_DELAY_MS: u64 = 500;

pub struct BeaconAdapter {
    name: String,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
    retries: usize,
}

impl BeaconAdapter {
    pub fn new(settings: &ProviderSettings) -> Self {
        BeaconAdapter {
            name: settings.name.clone(),
            base_url: settings.endpoint(),
            api_key: settings.api_key.clone(),
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
        let response = with_retry(
            || {
                let mut request = client.get(url);
                if let Some(key) = &self.api_key {
                    request = request.bearer_auth(key);
                }
                request.send()
            },
            self.retries,
            RETRY_DELAY_MS,
        )
        .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AdapterError::from_status(status, source, target));
        }
        response.text().await.map_err(AdapterError::from)
    }
}

#[derive(Deserialize, Debug)]
struct BeaconRatesResponse {
    rates: HashMap<String, f64>,
}

#[derive(Deserialize, Debug)]
struct BeaconSeriesResponse {
    rates: HashMap<String, HashMap<String, f64>>,
}

fn parse_json<T: serde::de::DeserializeOwned>(body: &str) -> Result<T, AdapterError> {
    serde_json::from_str(body).map_err(|e| AdapterError::MalformedResponse {
        reason: format!("failed to parse JSON response: {e}"),
    })
}

#[async_trait]
impl RateAdapter for BeaconAdapter {
    #[instrument(
        name = "BeaconRateFetch",
        skip(self),
        fields(provider = %self.name, source = %source, target = %target)
    )]
    async fn fetch_rate(
        &self,
        source: &CurrencyCode,
        target: &CurrencyCode,
        date: NaiveDate,
    ) -> Result<RateQuote, AdapterError> {
        let url = if date == Utc::now().date_naive() {
            format!(
                "{}/latest?base={}&symbols={}",
                self.base_url, source, target
            )
        } else {
            format!(
                "{}/historical?base={}&date={}&symbols={}",
                self.base_url, source, date, target
            )
        };

        let body = self.get_text(&url, source, target).await?;
        let data: BeaconRatesResponse = parse_json(&body)?;
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

        // Quotes are attributed to the requested date even when the
        // provider served an adjacent banking day.
        Ok(RateQuote {
            date,
            rate: parse_wire_rate(*raw)?,
        })
    }

    #[instrument(
        name = "BeaconSeriesFetch",
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
            "{}/timeseries?base={}&start_date={}&end_date={}&symbols={}",
            self.base_url, source, from, to, target
        );

        let body = self.get_text(&url, source, target).await?;
        let data: BeaconSeriesResponse = parse_json(&body)?;

        let mut quotes = Vec::new();
        for (day, rates) in &data.rates {
            let day = NaiveDate::parse_from_str(day, "%Y-%m-%d").map_err(|e| {
                AdapterError::MalformedResponse {
                    reason: format!("bad date key '{day}' in timeseries: {e}"),
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
