//! Price forecasting step of the trademate analysis pipeline
//!
//! The Oracle turns raw daily closes into a forecast an external time-series
//! engine can work with, and turns whatever that engine answers back into a
//! canonical, bounded forecast:
//!
//! - Price history from Alpha Vantage and Yahoo Finance with provider
//!   fallback, alternate exchange listings and a TTL cache
//! - Signal conditioning: Hampel outlier suppression, wavelet denoising and
//!   re-anchoring to the last real close
//! - Forecast engine handoff with retry and timeout
//! - Result reconciliation that tolerates drifting column names and fills
//!   missing confidence bands from realized volatility
//! - Technical indicator snapshots (RSI, MACD, SMA/EMA, Bollinger bands)
//!
//! Both steps are exposed as [`trademate_tools::Tool`]s that record their
//! stage and publish their artifacts on the caller's session.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use trademate_oracle::{HttpForecastEngine, Oracle, OracleConfig, PriceHistory};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = OracleConfig::builder().with_env_keys().build()?;
//!     let history = Arc::new(PriceHistory::from_config(&config)?);
//!     let engine = Arc::new(HttpForecastEngine::from_config(&config)?);
//!
//!     let oracle = Oracle::new(config, history, engine);
//!     let outcome = oracle.forecast("AAPL").await?;
//!     println!("{}", serde_json::to_string_pretty(&outcome.result)?);
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod forecast;
pub mod history;
pub mod indicators;
pub mod retry;
pub mod series;
pub mod signal;
pub mod stats;
pub mod tools;

pub use config::{DataProvider, OracleConfig, SignalConfig};
pub use error::{OracleError, Result};
pub use forecast::{
    ForecastEngine, ForecastPoint, ForecastResult, ForecastResultReconciler, ForecastStatus,
    HttpForecastEngine, Oracle, OracleForecastState, OracleOutcome,
};
pub use history::{PriceHistory, PriceHistorySource};
pub use indicators::{TechnicalIndicatorEngine, TechnicalSnapshot};
pub use series::{Period, PricePoint, PriceSeries};
pub use signal::{ConditionedSeries, SignalConditioner, SignalQuality};
pub use tools::{OracleForecastTool, TechnicalAnalysisTool};
