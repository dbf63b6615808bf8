//! Alpha Vantage daily price client

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde_json::Value;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::error::{OracleError, Result};
use crate::history::PriceHistorySource;
use crate::series::{Period, PricePoint, PriceSeries};

const BASE_URL: &str = "https://www.alphavantage.co/query";
const PROVIDER: &str = "Alpha Vantage";
const DAILY_SERIES_KEY: &str = "Time Series (Daily)";

type SharedRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

/// Alpha Vantage API client
#[derive(Debug, Clone)]
pub struct AlphaVantageClient {
    client: Client,
    api_key: String,
    rate_limiter: SharedRateLimiter,
}

impl AlphaVantageClient {
    /// Create a client allowing `rate_limit` requests per minute
    pub fn new(api_key: impl Into<String>, rate_limit: u32, timeout: Duration) -> Result<Self> {
        let quota = Quota::per_minute(NonZeroU32::new(rate_limit).unwrap_or(NonZeroU32::MIN));
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        })
    }

    /// Create from the ALPHA_VANTAGE_API_KEY environment variable at the free-tier rate
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("ALPHA_VANTAGE_API_KEY").map_err(|_| {
            OracleError::Config("ALPHA_VANTAGE_API_KEY environment variable not set".to_string())
        })?;
        Self::new(api_key, 5, Duration::from_secs(30))
    }

    /// Daily closes for `symbol`.
    ///
    /// `compact` returns roughly the last 100 sessions, `full` the whole history.
    pub async fn get_daily(&self, symbol: &str, output_size: &str) -> Result<PriceSeries> {
        self.rate_limiter.until_ready().await;

        let params = [
            ("function", "TIME_SERIES_DAILY"),
            ("symbol", symbol),
            ("outputsize", output_size),
            ("apikey", self.api_key.as_str()),
        ];
        let response = self.client.get(BASE_URL).query(&params).send().await?;

        if !response.status().is_success() {
            return Err(OracleError::provider(
                PROVIDER,
                format!("HTTP error: {}", response.status()),
            ));
        }

        let data: Value = response.json().await?;
        parse_daily_series(symbol, &data)
    }
}

fn output_size_for(period: Period) -> &'static str {
    match period {
        Period::OneMonth | Period::ThreeMonths => "compact",
        _ => "full",
    }
}

/// Parse a `TIME_SERIES_DAILY` payload into a sorted series.
///
/// Entries with an unparsable date or close are skipped.
pub fn parse_daily_series(symbol: &str, data: &Value) -> Result<PriceSeries> {
    if let Some(error) = data.get("Error Message") {
        return Err(OracleError::provider(PROVIDER, error.to_string()));
    }
    if data.get("Note").is_some() {
        return Err(OracleError::RateLimitExceeded {
            provider: PROVIDER.to_string(),
        });
    }
    if let Some(info) = data.get("Information") {
        let text = info.as_str().unwrap_or_default().to_lowercase();
        if text.contains("rate limit") || text.contains("call frequency") {
            return Err(OracleError::RateLimitExceeded {
                provider: PROVIDER.to_string(),
            });
        }
        return Err(OracleError::provider(PROVIDER, info.to_string()));
    }

    let series = data
        .get(DAILY_SERIES_KEY)
        .and_then(Value::as_object)
        .ok_or_else(|| OracleError::provider(PROVIDER, "No time series data found"))?;

    let points = series
        .iter()
        .filter_map(|(date, values)| {
            let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
            let close = values["4. close"].as_str()?.parse::<f64>().ok()?;
            Some(PricePoint::new(date.and_hms_opt(0, 0, 0)?.and_utc(), close))
        })
        .collect();

    Ok(PriceSeries::from_unordered(symbol, points))
}

#[async_trait]
impl PriceHistorySource for AlphaVantageClient {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn fetch(&self, symbol: &str, period: Period) -> Result<PriceSeries> {
        let series = self.get_daily(symbol, output_size_for(period)).await?;
        debug!(symbol, points = series.len(), "Alpha Vantage daily series");
        Ok(series.since(Utc::now() - period.lookback()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_creation() {
        let client = AlphaVantageClient::new("test_key", 5, Duration::from_secs(5)).unwrap();
        assert_eq!(client.api_key, "test_key");
        assert_eq!(client.name(), "Alpha Vantage");
    }

    #[test]
    fn test_parse_daily_series_sorts_and_skips_bad_rows() {
        let payload = json!({
            "Meta Data": { "2. Symbol": "IBM" },
            "Time Series (Daily)": {
                "2025-01-03": { "1. open": "1", "4. close": "102.50" },
                "2025-01-02": { "1. open": "1", "4. close": "101.00" },
                "2025-01-06": { "1. open": "1", "4. close": "n/a" },
                "not-a-date": { "1. open": "1", "4. close": "99.0" }
            }
        });
        let series = parse_daily_series("IBM", &payload).unwrap();
        assert_eq!(series.closes(), vec![101.0, 102.5]);
        assert_eq!(series.symbol(), "IBM");
    }

    #[test]
    fn test_parse_daily_series_errors() {
        let err = parse_daily_series("XX", &json!({ "Error Message": "Invalid API call" }));
        assert!(matches!(err, Err(OracleError::Provider { .. })));

        let err = parse_daily_series("XX", &json!({ "Note": "Thank you for using Alpha Vantage" }));
        assert!(matches!(err, Err(OracleError::RateLimitExceeded { .. })));

        let err = parse_daily_series(
            "XX",
            &json!({ "Information": "Our standard API rate limit is 25 requests per day." }),
        );
        assert!(matches!(err, Err(OracleError::RateLimitExceeded { .. })));

        let err = parse_daily_series("XX", &json!({}));
        assert!(matches!(err, Err(OracleError::Provider { .. })));
    }

    #[test]
    fn test_output_size_for_period() {
        assert_eq!(output_size_for(Period::ThreeMonths), "compact");
        assert_eq!(output_size_for(Period::TwoYears), "full");
    }

    #[tokio::test]
    #[ignore] // Requires API key and network access
    async fn test_fetch_daily() {
        let client = AlphaVantageClient::from_env().unwrap();
        let series = client.fetch("IBM", Period::ThreeMonths).await.unwrap();
        assert!(!series.is_empty());
    }
}
