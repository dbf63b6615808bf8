//! The forecast step: history, conditioning, engine handoff and reconciliation

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{info, instrument, warn};

use super::engine::ForecastEngine;
use super::reconciler::{ForecastPoint, ForecastResult, ForecastResultReconciler};
use super::request::ForecastRequestBuilder;
use crate::config::OracleConfig;
use crate::error::{OracleError, Result};
use crate::history::PriceHistory;
use crate::indicators::realized_volatility;
use crate::retry::RetryPolicy;
use crate::series::PriceSeries;
use crate::signal::{SignalConditioner, SignalQuality};
use crate::stats::round2;

/// Recent real close shown next to the forecast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub date: String,
    pub price: f64,
}

/// Forecast summary published for downstream pipeline steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleForecastState {
    /// Median of the last forecast point
    pub predicted_price: f64,
    /// `[lower, upper]` of the last forecast point
    pub confidence_interval: [f64; 2],
    pub model_confidence: f64,
    pub forecast_horizon: String,
    pub forecast: Vec<ForecastPoint>,
    pub history: Vec<HistoryPoint>,
}

impl OracleForecastState {
    /// `None` unless `result` holds at least one point
    pub fn from_result(
        result: &ForecastResult,
        series: &PriceSeries,
        config: &OracleConfig,
    ) -> Option<Self> {
        let last = result.forecast().last()?;
        let history = series
            .tail(config.history_points)
            .iter()
            .map(|p| HistoryPoint {
                date: p.timestamp.format("%Y-%m-%d").to_string(),
                price: round2(p.close),
            })
            .collect();

        Some(Self {
            predicted_price: last.median_price,
            confidence_interval: [last.lower_bound, last.upper_bound],
            model_confidence: config.confidence_level,
            forecast_horizon: format!("{} days", config.horizon),
            forecast: result.forecast().to_vec(),
            history,
        })
    }
}

/// Everything the forecast step produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleOutcome {
    pub result: ForecastResult,
    pub downstream: Option<OracleForecastState>,
    /// Absent when conditioning never completed
    pub quality: Option<SignalQuality>,
}

/// Runs the forecast pipeline for a ticker
pub struct Oracle {
    config: OracleConfig,
    history: Arc<PriceHistory>,
    engine: Arc<dyn ForecastEngine>,
    conditioner: SignalConditioner,
    builder: ForecastRequestBuilder,
    reconciler: ForecastResultReconciler,
    retry: RetryPolicy,
}

impl Oracle {
    pub fn new(
        config: OracleConfig,
        history: Arc<PriceHistory>,
        engine: Arc<dyn ForecastEngine>,
    ) -> Self {
        Self {
            conditioner: SignalConditioner::new(config.signal.clone()),
            builder: ForecastRequestBuilder::from_config(&config),
            reconciler: ForecastResultReconciler::from_config(&config),
            retry: RetryPolicy::from_config(&config),
            config,
            history,
            engine,
        }
    }

    pub fn config(&self) -> &OracleConfig {
        &self.config
    }

    /// Fetch history for `ticker` and forecast it.
    ///
    /// Only a failure to obtain history is returned as `Err`; every later
    /// fault is reported through the result status.
    #[instrument(skip(self))]
    pub async fn forecast(&self, ticker: &str) -> Result<OracleOutcome> {
        let series = self
            .history
            .fetch(ticker, self.config.forecast_period)
            .await?;
        Ok(self.forecast_series(&series).await)
    }

    /// Forecast an already fetched series
    pub async fn forecast_series(&self, series: &PriceSeries) -> OracleOutcome {
        let ticker = series.symbol();
        let last_real_price = series.last_close();
        let fail = |e: OracleError, quality: Option<SignalQuality>| {
            warn!(ticker, error = %e, "forecast failed");
            OracleOutcome {
                result: ForecastResult::error(
                    ticker,
                    &self.config.model_name,
                    last_real_price,
                    e.to_string(),
                ),
                downstream: None,
                quality,
            }
        };

        let daily_volatility =
            realized_volatility(&series.closes(), self.config.volatility_lookback);

        let conditioned = match self.conditioner.condition(series) {
            Ok(conditioned) => conditioned,
            Err(e) => return fail(e, None),
        };
        let quality = Some(conditioned.quality().clone());

        let request = match self.builder.build(ticker, &conditioned) {
            Ok(request) => request,
            Err(e) => return fail(e, quality),
        };

        let handoff = self.retry.execute("forecast handoff", || {
            self.builder.submit(self.engine.as_ref(), &request)
        });
        let frame = match timeout(self.config.forecast_timeout, handoff).await {
            Ok(Ok(frame)) => frame,
            Ok(Err(e)) => return fail(e, quality),
            Err(_) => return fail(OracleError::Timeout(self.config.forecast_timeout), quality),
        };

        let result = self
            .reconciler
            .reconcile(ticker, &frame, last_real_price, daily_volatility);
        info!(
            ticker,
            status = ?result.status(),
            points = result.forecast().len(),
            "forecast reconciled"
        );

        let downstream = OracleForecastState::from_result(&result, series, &self.config);
        OracleOutcome {
            result,
            downstream,
            quality,
        }
    }
}
