//! Price history with provider fallback and caching

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::api::{AlphaVantageClient, YahooFinanceClient};
use crate::cache::{HistoryCache, HistoryKey};
use crate::config::{DataProvider, OracleConfig};
use crate::error::{OracleError, Result, SourceFailure};
use crate::series::{Period, PriceSeries};

/// A provider of daily close history
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceHistorySource: Send + Sync {
    /// Provider name used in logs and failure reports
    fn name(&self) -> &'static str;

    /// Daily closes for `symbol` covering `period`
    async fn fetch(&self, symbol: &str, period: Period) -> Result<PriceSeries>;
}

struct SourceSlot {
    source: Arc<dyn PriceHistorySource>,
    // also queried for the alternate listing of a dual-listed ticker
    alternate_listings: bool,
}

/// Ordered price-history sources behind a TTL cache
///
/// Sources are tried in registration order for the requested ticker. If all
/// of them fail and the ticker has an alternate listing (`.NS` to `.BO`), the
/// sources registered for alternate listings are tried with that symbol.
pub struct PriceHistory {
    sources: Vec<SourceSlot>,
    cache: HistoryCache,
}

impl PriceHistory {
    pub fn new(cache_ttl: Duration) -> Self {
        Self {
            sources: Vec::new(),
            cache: HistoryCache::new(cache_ttl),
        }
    }

    /// Add a source queried for the requested ticker only
    pub fn with_source(mut self, source: Arc<dyn PriceHistorySource>) -> Self {
        self.sources.push(SourceSlot {
            source,
            alternate_listings: false,
        });
        self
    }

    /// Add a source that is also queried for alternate listings
    pub fn with_alternate_listing_source(mut self, source: Arc<dyn PriceHistorySource>) -> Self {
        self.sources.push(SourceSlot {
            source,
            alternate_listings: true,
        });
        self
    }

    /// Build the provider chain described by `config`.
    ///
    /// Alpha Vantage is skipped when no API key is configured.
    pub fn from_config(config: &OracleConfig) -> Result<Self> {
        let mut history = Self::new(config.cache_ttl_history);
        for provider in &config.providers {
            match provider {
                DataProvider::AlphaVantage => match &config.alpha_vantage_api_key {
                    Some(key) => {
                        let client = AlphaVantageClient::new(
                            key.clone(),
                            config.alpha_vantage_rate_limit,
                            config.request_timeout,
                        )?;
                        history = history.with_source(Arc::new(client));
                    }
                    None => warn!("Alpha Vantage API key not set, skipping provider"),
                },
                DataProvider::Yahoo => {
                    history =
                        history.with_alternate_listing_source(Arc::new(YahooFinanceClient::new()));
                }
            }
        }

        if history.sources.is_empty() {
            return Err(OracleError::Config(
                "no usable price-history provider configured".to_string(),
            ));
        }
        Ok(history)
    }

    pub fn source_names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|slot| slot.source.name()).collect()
    }

    /// Trim, drop inner whitespace and uppercase a user-supplied ticker
    pub fn normalize_ticker(raw: &str) -> String {
        raw.chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_uppercase()
    }

    /// Other exchange listing of a dual-listed Indian ticker
    pub fn alternate_listing(symbol: &str) -> Option<String> {
        symbol
            .strip_suffix(".NS")
            .map(|base| format!("{base}.BO"))
    }

    /// Fetch daily closes for `ticker`, serving repeats from the cache
    pub async fn fetch(&self, ticker: &str, period: Period) -> Result<PriceSeries> {
        let symbol = Self::normalize_ticker(ticker);
        if symbol.is_empty() {
            return Err(OracleError::Validation("ticker is empty".to_string()));
        }

        let key = HistoryKey::new(symbol.clone(), period);
        self.cache
            .get_or_fetch(key, || self.fetch_uncached(&symbol, period))
            .await
    }

    async fn fetch_uncached(&self, symbol: &str, period: Period) -> Result<PriceSeries> {
        let mut attempts = Vec::new();

        if let Some(series) = self
            .try_sources(symbol, period, false, &mut attempts)
            .await
        {
            return Ok(series);
        }

        if let Some(alternate) = Self::alternate_listing(symbol) {
            debug!(symbol, alternate = %alternate, "trying alternate listing");
            if let Some(series) = self
                .try_sources(&alternate, period, true, &mut attempts)
                .await
            {
                return Ok(series);
            }
        }

        warn!(symbol, attempts = attempts.len(), "all price-history sources failed");
        Err(OracleError::DataRetrieval {
            ticker: symbol.to_string(),
            attempts,
        })
    }

    async fn try_sources(
        &self,
        symbol: &str,
        period: Period,
        alternate: bool,
        attempts: &mut Vec<SourceFailure>,
    ) -> Option<PriceSeries> {
        for slot in self.sources.iter().filter(|s| !alternate || s.alternate_listings) {
            let name = slot.source.name();
            let reason = match slot.source.fetch(symbol, period).await {
                Ok(series) if !series.is_empty() => {
                    info!(source = name, symbol, points = series.len(), "fetched price history");
                    return Some(series);
                }
                Ok(_) => "no data returned".to_string(),
                Err(e) => e.to_string(),
            };
            debug!(source = name, symbol, %reason, "price-history source failed");
            attempts.push(SourceFailure {
                source: name.to_string(),
                symbol: symbol.to_string(),
                reason,
            });
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use mockall::predicate::eq;

    fn series(symbol: &str, len: usize) -> PriceSeries {
        let start = Utc.with_ymd_and_hms(2024, 6, 3, 0, 0, 0).unwrap();
        let closes: Vec<f64> = (0..len).map(|i| 100.0 + i as f64).collect();
        PriceSeries::from_closes(symbol, start, &closes).unwrap()
    }

    fn failing(name: &'static str) -> MockPriceHistorySource {
        let mut source = MockPriceHistorySource::new();
        source.expect_name().return_const(name);
        source.expect_fetch().returning(|symbol, _| {
            Err(OracleError::provider("mock", format!("no data for {symbol}")))
        });
        source
    }

    fn succeeding(name: &'static str, times: usize) -> MockPriceHistorySource {
        let mut source = MockPriceHistorySource::new();
        source.expect_name().return_const(name);
        source
            .expect_fetch()
            .times(times)
            .returning(|symbol, _| Ok(series(symbol, 30)));
        source
    }

    fn history() -> PriceHistory {
        PriceHistory::new(Duration::from_secs(60))
    }

    #[test]
    fn test_normalize_ticker() {
        assert_eq!(PriceHistory::normalize_ticker("  reliance .ns "), "RELIANCE.NS");
        assert_eq!(PriceHistory::normalize_ticker("aapl"), "AAPL");
    }

    #[test]
    fn test_alternate_listing() {
        assert_eq!(
            PriceHistory::alternate_listing("ADANI.NS").as_deref(),
            Some("ADANI.BO")
        );
        assert_eq!(PriceHistory::alternate_listing("AAPL"), None);
        assert_eq!(PriceHistory::alternate_listing("ADANI.BO"), None);
    }

    #[tokio::test]
    async fn test_first_source_wins() {
        let mut second = MockPriceHistorySource::new();
        second.expect_name().return_const("second");
        second.expect_fetch().never();

        let history = history()
            .with_source(Arc::new(succeeding("first", 1)))
            .with_alternate_listing_source(Arc::new(second));

        let series = history.fetch(" aapl", Period::TwoYears).await.unwrap();
        assert_eq!(series.symbol(), "AAPL");
    }

    #[tokio::test]
    async fn test_falls_back_to_next_source() {
        let history = history()
            .with_source(Arc::new(failing("first")))
            .with_alternate_listing_source(Arc::new(succeeding("second", 1)));

        let series = history.fetch("MSFT", Period::OneYear).await.unwrap();
        assert_eq!(series.len(), 30);
    }

    #[tokio::test]
    async fn test_empty_series_counts_as_failure() {
        let mut empty = MockPriceHistorySource::new();
        empty.expect_name().return_const("empty");
        empty
            .expect_fetch()
            .returning(|symbol, _| Ok(series(symbol, 0)));

        let history = history()
            .with_source(Arc::new(empty))
            .with_alternate_listing_source(Arc::new(succeeding("second", 1)));

        assert_eq!(history.fetch("MSFT", Period::OneYear).await.unwrap().len(), 30);
    }

    #[tokio::test]
    async fn test_alternate_listing_is_tried_on_flagged_sources() {
        let mut yahoo = MockPriceHistorySource::new();
        yahoo.expect_name().return_const("yahoo");
        yahoo
            .expect_fetch()
            .with(eq("ADANI.NS"), eq(Period::TwoYears))
            .times(1)
            .returning(|_, _| Err(OracleError::provider("yahoo", "delisted")));
        yahoo
            .expect_fetch()
            .with(eq("ADANI.BO"), eq(Period::TwoYears))
            .times(1)
            .returning(|symbol, _| Ok(series(symbol, 30)));

        let mut alpha = MockPriceHistorySource::new();
        alpha.expect_name().return_const("alpha");
        alpha
            .expect_fetch()
            .with(eq("ADANI.NS"), eq(Period::TwoYears))
            .times(1)
            .returning(|_, _| Err(OracleError::provider("alpha", "invalid symbol")));

        let history = history()
            .with_source(Arc::new(alpha))
            .with_alternate_listing_source(Arc::new(yahoo));

        let series = history.fetch("adani.ns", Period::TwoYears).await.unwrap();
        assert_eq!(series.symbol(), "ADANI.BO");
    }

    #[tokio::test]
    async fn test_all_sources_failing_lists_every_attempt() {
        let history = history()
            .with_source(Arc::new(failing("alpha")))
            .with_alternate_listing_source(Arc::new(failing("yahoo")));

        let err = history.fetch("ADANI.NS", Period::TwoYears).await.unwrap_err();
        match err {
            OracleError::DataRetrieval { ticker, attempts } => {
                assert_eq!(ticker, "ADANI.NS");
                let tried: Vec<(&str, &str)> = attempts
                    .iter()
                    .map(|a| (a.source.as_str(), a.symbol.as_str()))
                    .collect();
                assert_eq!(
                    tried,
                    vec![
                        ("alpha", "ADANI.NS"),
                        ("yahoo", "ADANI.NS"),
                        ("yahoo", "ADANI.BO"),
                    ]
                );
            }
            other => panic!("expected DataRetrieval, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_repeat_fetch_is_served_from_cache() {
        let history = history().with_source(Arc::new(succeeding("only", 1)));

        history.fetch("NVDA", Period::TwoYears).await.unwrap();
        let again = history.fetch("nvda", Period::TwoYears).await.unwrap();
        assert_eq!(again.symbol(), "NVDA");
    }

    #[tokio::test]
    async fn test_empty_ticker_is_rejected() {
        let history = history().with_source(Arc::new(succeeding("only", 0)));
        assert!(matches!(
            history.fetch("   ", Period::OneYear).await,
            Err(OracleError::Validation(_))
        ));
    }

    #[test]
    fn test_from_config_skips_alpha_vantage_without_key() {
        let config = OracleConfig::default();
        let history = PriceHistory::from_config(&config).unwrap();
        assert_eq!(history.source_names(), vec!["Yahoo Finance"]);

        let config = OracleConfig {
            alpha_vantage_api_key: Some("demo".to_string()),
            ..OracleConfig::default()
        };
        let history = PriceHistory::from_config(&config).unwrap();
        assert_eq!(history.source_names(), vec!["Alpha Vantage", "Yahoo Finance"]);
    }
}
