//! Error types for the forecasting pipeline

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Stage of the forecast-engine handoff that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpstreamStage {
    /// Writing the context rows
    Upload,
    /// Running the forecast query
    Query,
}

impl fmt::Display for UpstreamStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpstreamStage::Upload => f.write_str("upload"),
            UpstreamStage::Query => f.write_str("query"),
        }
    }
}

/// Role a result column plays in a forecast frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRole {
    Timestamp,
    Value,
}

impl fmt::Display for ColumnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnRole::Timestamp => f.write_str("timestamp"),
            ColumnRole::Value => f.write_str("value"),
        }
    }
}

/// One failed attempt against a price-history source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFailure {
    pub source: String,
    pub symbol: String,
    pub reason: String,
}

impl fmt::Display for SourceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.source, self.symbol, self.reason)
    }
}

fn format_attempts(attempts: &[SourceFailure]) -> String {
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" | ")
}

/// Forecasting pipeline errors
#[derive(Debug, Error)]
pub enum OracleError {
    /// Malformed or insufficient input series
    #[error("Validation error: {0}")]
    Validation(String),

    /// External forecast engine unreachable or rejected the request
    #[error("Forecast engine unavailable during {stage}: {reason}")]
    UpstreamUnavailable { stage: UpstreamStage, reason: String },

    /// Conditioned series does not carry the columns the engine needs
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Forecast result schema not recognised
    #[error("No {role} column could be resolved from {columns:?}")]
    ColumnResolution { role: ColumnRole, columns: Vec<String> },

    /// Every price-history source failed
    #[error("Data retrieval failed for '{ticker}': {}", format_attempts(.attempts))]
    DataRetrieval {
        ticker: String,
        attempts: Vec<SourceFailure>,
    },

    /// Not enough points for an indicator window
    #[error("Insufficient history: need {required} points, got {actual}")]
    InsufficientHistory { required: usize, actual: usize },

    /// Forecast engine did not answer in time
    #[error("Forecast engine timed out after {0:?}")]
    Timeout(Duration),

    /// Indicator could not be computed
    #[error("Indicator error: {0}")]
    Indicator(String),

    /// Wavelet decomposition or reconstruction failed
    #[error("Signal processing error: {0}")]
    Signal(String),

    /// Rate limit exceeded for a data provider
    #[error("Rate limit exceeded for {provider}")]
    RateLimitExceeded { provider: String },

    /// Provider-specific failure
    #[error("{provider} error: {message}")]
    Provider { provider: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network or HTTP error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl OracleError {
    /// Whether a caller may retry the failed operation unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(self, OracleError::UpstreamUnavailable { .. })
    }

    pub(crate) fn provider(provider: &str, message: impl Into<String>) -> Self {
        OracleError::Provider {
            provider: provider.to_string(),
            message: message.into(),
        }
    }
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, OracleError>;

/// Convert OracleError to trademate_core::Error
impl From<OracleError> for trademate_core::Error {
    fn from(err: OracleError) -> Self {
        trademate_core::Error::ProcessingFailed(err.to_string())
    }
}

/// Convert trademate_core::Error to OracleError
impl From<trademate_core::Error> for OracleError {
    fn from(err: trademate_core::Error) -> Self {
        OracleError::Other(err.to_string())
    }
}
