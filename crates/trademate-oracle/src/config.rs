//! Configuration for the forecasting pipeline

use crate::error::{OracleError, Result};
use crate::series::Period;
use crate::signal::Wavelet;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const ALPHA_VANTAGE_KEY_VAR: &str = "ALPHA_VANTAGE_API_KEY";
const ENGINE_URL_VAR: &str = "FORECAST_ENGINE_URL";

/// Price-history provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataProvider {
    /// Alpha Vantage (requires API key)
    AlphaVantage,
    /// Yahoo Finance (no API key required)
    Yahoo,
}

/// Tunables for outlier suppression and wavelet denoising.
///
/// The defaults are empirical choices, not derived constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalConfig {
    /// Hampel half-width; the filter window spans `2 * window` points
    pub window: usize,
    /// Outlier cut-off in scaled MADs
    pub n_sigma: f64,
    /// Wavelet family
    pub wavelet: Wavelet,
    /// Scale applied to the universal threshold (under 1.0 keeps more detail)
    pub threshold_scale: f64,
    /// Upper bound on the decomposition level
    pub max_level_cap: usize,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            window: 5,
            n_sigma: 3.0,
            wavelet: Wavelet::Db4,
            threshold_scale: 0.45,
            max_level_cap: 3,
        }
    }
}

/// Configuration for the forecasting pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Price-history providers, tried in order
    pub providers: Vec<DataProvider>,

    /// History fetched for forecasting
    pub forecast_period: Period,

    /// History fetched for technical analysis
    pub technical_period: Period,

    /// Most recent conditioned points sent as forecast context
    pub context_window: usize,

    /// Forecast horizon in periods
    pub horizon: usize,

    /// Confidence level requested from the engine
    pub confidence_level: f64,

    /// Model requested from the engine
    pub model_name: String,

    /// Daily returns used for realized volatility
    pub volatility_lookback: usize,

    /// Daily volatility used when too few returns are available
    pub default_daily_volatility: f64,

    /// Raw closes included in the downstream forecast history
    pub history_points: usize,

    /// Deadline for the whole engine handoff, retries included
    pub forecast_timeout: Duration,

    /// HTTP request timeout
    pub request_timeout: Duration,

    /// Maximum attempts for the engine handoff
    pub max_retries: u32,

    /// Initial backoff duration for retries
    pub retry_backoff_base: Duration,

    /// Cache TTL for price history
    pub cache_ttl_history: Duration,

    /// Alpha Vantage API key (optional)
    pub alpha_vantage_api_key: Option<String>,

    /// Alpha Vantage requests per minute
    pub alpha_vantage_rate_limit: u32,

    /// Base URL of the forecast engine service
    pub engine_url: Option<String>,

    /// Signal conditioning tunables
    pub signal: SignalConfig,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            providers: vec![DataProvider::AlphaVantage, DataProvider::Yahoo],
            forecast_period: Period::TwoYears,
            technical_period: Period::OneYear,
            context_window: 120,
            horizon: 30,
            confidence_level: 0.8,
            model_name: "TimesFM 2.5".to_string(),
            volatility_lookback: 30,
            default_daily_volatility: 0.02,
            history_points: 14,
            forecast_timeout: Duration::from_secs(120),
            request_timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_backoff_base: Duration::from_secs(1),
            cache_ttl_history: Duration::from_secs(300), // 5 minutes
            alpha_vantage_api_key: None,
            alpha_vantage_rate_limit: 5, // free tier
            engine_url: None,
            signal: SignalConfig::default(),
        }
    }
}

impl OracleConfig {
    /// Create a new configuration builder
    pub fn builder() -> OracleConfigBuilder {
        OracleConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.providers.is_empty() {
            return Err(OracleError::Config(
                "at least one price-history provider is required".to_string(),
            ));
        }

        if self.providers == [DataProvider::AlphaVantage] && self.alpha_vantage_api_key.is_none() {
            return Err(OracleError::Config(
                "Alpha Vantage API key required when it is the only provider".to_string(),
            ));
        }

        if self.context_window == 0 || self.horizon == 0 {
            return Err(OracleError::Config(
                "context_window and horizon must be greater than 0".to_string(),
            ));
        }

        if !(self.confidence_level > 0.0 && self.confidence_level < 1.0) {
            return Err(OracleError::Config(format!(
                "confidence_level must be in (0, 1), got {}",
                self.confidence_level
            )));
        }

        if !(self.default_daily_volatility.is_finite() && self.default_daily_volatility > 0.0) {
            return Err(OracleError::Config(
                "default_daily_volatility must be positive".to_string(),
            ));
        }

        if self.max_retries == 0 {
            return Err(OracleError::Config(
                "max_retries must be greater than 0".to_string(),
            ));
        }

        let signal = &self.signal;
        let positive = |v: f64| v.is_finite() && v > 0.0;
        if signal.window == 0 || !positive(signal.n_sigma) || !positive(signal.threshold_scale) {
            return Err(OracleError::Config(
                "signal window, n_sigma and threshold_scale must be positive".to_string(),
            ));
        }

        if signal.max_level_cap == 0 {
            return Err(OracleError::Config(
                "signal max_level_cap must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

/// Builder for OracleConfig
#[derive(Debug, Default)]
pub struct OracleConfigBuilder {
    providers: Option<Vec<DataProvider>>,
    forecast_period: Option<Period>,
    technical_period: Option<Period>,
    context_window: Option<usize>,
    horizon: Option<usize>,
    confidence_level: Option<f64>,
    model_name: Option<String>,
    default_daily_volatility: Option<f64>,
    forecast_timeout: Option<Duration>,
    request_timeout: Option<Duration>,
    max_retries: Option<u32>,
    retry_backoff_base: Option<Duration>,
    cache_ttl_history: Option<Duration>,
    alpha_vantage_api_key: Option<String>,
    engine_url: Option<String>,
    signal: Option<SignalConfig>,
}

impl OracleConfigBuilder {
    /// Set the provider fallback order
    pub fn providers(mut self, providers: Vec<DataProvider>) -> Self {
        self.providers = Some(providers);
        self
    }

    pub fn forecast_period(mut self, period: Period) -> Self {
        self.forecast_period = Some(period);
        self
    }

    pub fn technical_period(mut self, period: Period) -> Self {
        self.technical_period = Some(period);
        self
    }

    pub fn context_window(mut self, points: usize) -> Self {
        self.context_window = Some(points);
        self
    }

    pub fn horizon(mut self, periods: usize) -> Self {
        self.horizon = Some(periods);
        self
    }

    pub fn confidence_level(mut self, level: f64) -> Self {
        self.confidence_level = Some(level);
        self
    }

    pub fn model_name(mut self, model: impl Into<String>) -> Self {
        self.model_name = Some(model.into());
        self
    }

    pub fn default_daily_volatility(mut self, volatility: f64) -> Self {
        self.default_daily_volatility = Some(volatility);
        self
    }

    pub fn forecast_timeout(mut self, duration: Duration) -> Self {
        self.forecast_timeout = Some(duration);
        self
    }

    pub fn request_timeout(mut self, duration: Duration) -> Self {
        self.request_timeout = Some(duration);
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    pub fn retry_backoff_base(mut self, duration: Duration) -> Self {
        self.retry_backoff_base = Some(duration);
        self
    }

    pub fn cache_ttl_history(mut self, duration: Duration) -> Self {
        self.cache_ttl_history = Some(duration);
        self
    }

    pub fn alpha_vantage_api_key(mut self, key: impl Into<String>) -> Self {
        self.alpha_vantage_api_key = Some(key.into());
        self
    }

    pub fn engine_url(mut self, url: impl Into<String>) -> Self {
        self.engine_url = Some(url.into());
        self
    }

    pub fn signal(mut self, signal: SignalConfig) -> Self {
        self.signal = Some(signal);
        self
    }

    /// Load the Alpha Vantage key and engine URL from the environment
    pub fn with_env_keys(mut self) -> Self {
        if let Ok(key) = std::env::var(ALPHA_VANTAGE_KEY_VAR) {
            self.alpha_vantage_api_key = Some(key);
        }
        if let Ok(url) = std::env::var(ENGINE_URL_VAR) {
            self.engine_url = Some(url);
        }
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<OracleConfig> {
        let defaults = OracleConfig::default();

        let config = OracleConfig {
            providers: self.providers.unwrap_or(defaults.providers),
            forecast_period: self.forecast_period.unwrap_or(defaults.forecast_period),
            technical_period: self.technical_period.unwrap_or(defaults.technical_period),
            context_window: self.context_window.unwrap_or(defaults.context_window),
            horizon: self.horizon.unwrap_or(defaults.horizon),
            confidence_level: self.confidence_level.unwrap_or(defaults.confidence_level),
            model_name: self.model_name.unwrap_or(defaults.model_name),
            default_daily_volatility: self
                .default_daily_volatility
                .unwrap_or(defaults.default_daily_volatility),
            forecast_timeout: self.forecast_timeout.unwrap_or(defaults.forecast_timeout),
            request_timeout: self.request_timeout.unwrap_or(defaults.request_timeout),
            max_retries: self.max_retries.unwrap_or(defaults.max_retries),
            retry_backoff_base: self.retry_backoff_base.unwrap_or(defaults.retry_backoff_base),
            cache_ttl_history: self.cache_ttl_history.unwrap_or(defaults.cache_ttl_history),
            alpha_vantage_api_key: self.alpha_vantage_api_key,
            engine_url: self.engine_url,
            signal: self.signal.unwrap_or(defaults.signal),
            ..defaults
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = OracleConfig::default();
        assert_eq!(
            config.providers,
            vec![DataProvider::AlphaVantage, DataProvider::Yahoo]
        );
        assert_eq!(config.context_window, 120);
        assert_eq!(config.horizon, 30);
        assert!((config.confidence_level - 0.8).abs() < f64::EPSILON);
        assert!((config.signal.threshold_scale - 0.45).abs() < f64::EPSILON);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = OracleConfig::builder()
            .providers(vec![DataProvider::Yahoo])
            .max_retries(5)
            .forecast_timeout(Duration::from_secs(60))
            .context_window(90)
            .build()
            .unwrap();

        assert_eq!(config.max_retries, 5);
        assert_eq!(config.forecast_timeout, Duration::from_secs(60));
        assert_eq!(config.context_window, 90);
        assert_eq!(config.volatility_lookback, 30);
    }

    #[test]
    fn test_validation_alpha_vantage_only_without_key() {
        let config = OracleConfig {
            providers: vec![DataProvider::AlphaVantage],
            alpha_vantage_api_key: None,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = OracleConfig {
            providers: vec![DataProvider::AlphaVantage],
            alpha_vantage_api_key: Some("test_key".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_tunables() {
        assert!(OracleConfig::builder().confidence_level(1.0).build().is_err());
        assert!(OracleConfig::builder().providers(vec![]).build().is_err());
        assert!(OracleConfig::builder().max_retries(0).build().is_err());

        let signal = SignalConfig {
            window: 0,
            ..SignalConfig::default()
        };
        assert!(OracleConfig::builder().signal(signal).build().is_err());

        let signal = SignalConfig {
            threshold_scale: f64::NAN,
            ..SignalConfig::default()
        };
        assert!(OracleConfig::builder().signal(signal).build().is_err());
    }
}
