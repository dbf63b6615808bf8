//! Yahoo Finance daily price client

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use time::OffsetDateTime;
use yahoo_finance_api as yahoo;

use crate::error::{OracleError, Result};
use crate::history::PriceHistorySource;
use crate::series::{Period, PricePoint, PriceSeries};

const PROVIDER: &str = "Yahoo Finance";

fn yahoo_error(e: impl std::fmt::Display) -> OracleError {
    OracleError::provider(PROVIDER, e.to_string())
}

/// Yahoo Finance API client
#[derive(Debug, Clone, Default)]
pub struct YahooFinanceClient;

impl YahooFinanceClient {
    pub fn new() -> Self {
        Self
    }

    /// Daily closes between `start` and `end`, split/dividend adjusted where Yahoo provides it
    pub async fn get_history(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<PriceSeries> {
        let provider = yahoo::YahooConnector::new().map_err(yahoo_error)?;

        let start = OffsetDateTime::from_unix_timestamp(start.timestamp())
            .map_err(|e| yahoo_error(format!("Invalid start timestamp: {e}")))?;
        let end = OffsetDateTime::from_unix_timestamp(end.timestamp())
            .map_err(|e| yahoo_error(format!("Invalid end timestamp: {e}")))?;

        let response = provider
            .get_quote_history(symbol, start, end)
            .await
            .map_err(yahoo_error)?;
        let quotes = response.quotes().map_err(yahoo_error)?;

        let points = quotes
            .iter()
            .filter_map(|q| {
                let timestamp = DateTime::from_timestamp(q.timestamp as i64, 0)?;
                Some(PricePoint::new(timestamp, adjusted_close(q.adjclose, q.close)))
            })
            .collect();

        Ok(PriceSeries::from_unordered(symbol, points))
    }
}

fn adjusted_close(adjclose: f64, close: f64) -> f64 {
    if adjclose.is_finite() && adjclose > 0.0 {
        adjclose
    } else {
        close
    }
}

#[async_trait]
impl PriceHistorySource for YahooFinanceClient {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn fetch(&self, symbol: &str, period: Period) -> Result<PriceSeries> {
        let end = Utc::now();
        self.get_history(symbol, end - period.lookback(), end).await
    }
}
