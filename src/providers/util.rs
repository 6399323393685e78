use crate::core::adapter::AdapterError;
use rust_decimal::Decimal;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Retries an async operation with configurable attempts and delays
///
/// # Parameters
/// - `operation`: Closure returning a future
/// - `retries`: Number of retry attempts (total runs = 1 initial + retries)
/// - `delay_ms`: Milliseconds between retry attempts
///
/// # Returns
/// Either the successful result or the last error after all attempts
pub async fn with_retry<F, Fut, T>(
    mut operation: F,
    retries: usize,
    delay_ms: u64,
) -> Result<T, reqwest::Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, reqwest::Error>>,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(val) => return Ok(val),
            Err(err) => {
                if attempt > retries {
                    return Err(err);
                }
                debug!(
                    "Attempt {}/{} failed: {}. Retrying...",
                    attempt, retries, err
                );
                attempt += 1;
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}

/// Converts a wire-format rate into a positive `Decimal` through its
/// shortest decimal representation, so JSON floats do not smuggle binary
/// representation error into stored rates.
pub fn parse_wire_rate(value: f64) -> Result<Decimal, AdapterError> {
    let rate = Decimal::from_str(&value.to_string()).map_err(|e| {
        AdapterError::MalformedResponse {
            reason: format!("unparseable rate {value}: {e}"),
        }
    })?;
    if rate <= Decimal::ZERO {
        return Err(AdapterError::MalformedResponse {
            reason: format!("non-positive rate {value}"),
        });
    }
    Ok(rate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_succeeds_on_first_attempt() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&mock_server)
            .await;

        let attempts = AtomicUsize::new(0);
        let client = reqwest::Client::new();
        let url = mock_server.uri();

        let result = with_retry(
            || {
                attempts.fetch_add(1, Ordering::SeqCst);
                client.get(&url).send()
            },
            3,
            10,
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhausts_retries_on_persistent_failure() {
        let attempts = AtomicUsize::new(0);
        let client = reqwest::Client::new();
        // Nothing listens on port 9; every attempt fails to connect.
        let url = "http://127.0.0.1:9/";

        let result = with_retry(
            || {
                attempts.fetch_add(1, Ordering::SeqCst);
                client.get(url).send()
            },
            2,
            10,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&mock_server)
            .await;

        let attempts = AtomicUsize::new(0);
        let client = reqwest::Client::new();
        let good_url = mock_server.uri();

        let result = with_retry(
            || {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst);
                let url = if attempt == 0 {
                    "http://127.0.0.1:9/".to_string()
                } else {
                    good_url.clone()
                };
                client.get(url).send()
            },
            2,
            10,
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_parses_wire_rates_exactly() {
        assert_eq!(parse_wire_rate(0.9123).unwrap(), dec!(0.9123));
        assert_eq!(parse_wire_rate(1.27).unwrap(), dec!(1.27));
        assert_eq!(parse_wire_rate(83.0).unwrap(), dec!(83));
    }

    #[test]
    fn test_rejects_non_positive_wire_rates() {
        assert!(parse_wire_rate(0.0).is_err());
        assert!(parse_wire_rate(-1.1).is_err());
    }
}
