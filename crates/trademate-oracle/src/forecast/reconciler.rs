//! Turning schema-variable engine output into a canonical forecast
//!
//! Engine versions spell their columns differently, so columns are resolved
//! by prioritized name patterns instead of fixed names. Bounds missing from
//! the frame are derived from realized volatility over a 30-day horizon.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::engine::ResultFrame;
use crate::config::OracleConfig;
use crate::error::{ColumnRole, OracleError, Result};
use crate::stats::round2;

const TIMESTAMP_PATTERNS: &[&str] = &["timestamp", "date"];
const VALUE_PATTERNS: &[&str] = &["data", "value", "forecast"];
const TIMESTAMP_TOKENS: &[&str] = &["ts", "dt"];
const WEAK_TIMESTAMP_TOKENS: &[&str] = &["time", "period"];
/// Series identifier columns echoed back by the engine
const ID_TOKENS: &[&str] = &["id"];
/// Names that carry measurements, never weak timestamp candidates
const MEASURE_PATTERNS: &[&str] = &["data", "value"];
const VALUE_TOKENS: &[&str] = &["val", "pred", "prediction", "yhat", "mean", "median", "point"];
/// Columns that must never be read as the point forecast
const NON_VALUE_PATTERNS: &[&str] = &["lower", "upper", "bound", "status"];
const LOWER_BOUND_PATTERN: &str = "lower_bound";
const UPPER_BOUND_PATTERN: &str = "upper_bound";
/// Trading days the volatility band is scaled to
const BAND_HORIZON_DAYS: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForecastStatus {
    /// At least one point was produced
    Success,
    /// The engine answered but no usable rows remained
    Failed,
    /// A fault stopped the forecast
    Error,
}

/// One forecast date with its interval, `lower_bound <= median_price <= upper_bound`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub date: String,
    pub median_price: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
}

/// Canonical forecast, ordered by ascending date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    ticker: String,
    forecast: Vec<ForecastPoint>,
    last_real_price: Option<f64>,
    status: ForecastStatus,
    model_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_message: Option<String>,
}

impl ForecastResult {
    /// A result carrying only the fault that stopped the forecast
    pub fn error(
        ticker: impl Into<String>,
        model_name: impl Into<String>,
        last_real_price: Option<f64>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            ticker: ticker.into(),
            forecast: Vec::new(),
            last_real_price: last_real_price.map(round2),
            status: ForecastStatus::Error,
            model_name: model_name.into(),
            error_message: Some(message.into()),
        }
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn forecast(&self) -> &[ForecastPoint] {
        &self.forecast
    }

    pub fn last_real_price(&self) -> Option<f64> {
        self.last_real_price
    }

    pub fn status(&self) -> ForecastStatus {
        self.status
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn is_success(&self) -> bool {
        self.status == ForecastStatus::Success
    }
}

/// Column indices picked out of a result frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedColumns {
    pub timestamp: usize,
    pub value: usize,
    pub lower_bound: Option<usize>,
    pub upper_bound: Option<usize>,
}

fn tokens(name: &str) -> impl Iterator<Item = &str> {
    name.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
}

fn contains_any(name: &str, patterns: &[&str]) -> bool {
    patterns.iter().any(|p| name.contains(p))
}

fn has_token(name: &str, candidates: &[&str]) -> bool {
    tokens(name).any(|t| candidates.contains(&t))
}

type ColumnTest<'a> = &'a dyn Fn(usize, &str) -> bool;

/// First column (lowest index) of the first tier with a match
fn first_match(names: &[String], tiers: &[ColumnTest<'_>]) -> Option<usize> {
    tiers.iter().find_map(|matches| {
        names
            .iter()
            .enumerate()
            .find(|(i, n)| matches(*i, n.as_str()))
            .map(|(i, _)| i)
    })
}

/// Resolve the timestamp, value and bound columns of a result frame.
///
/// Timestamp: a name containing `timestamp` or `date`, else a `ts` or `dt`
/// token, else a `time` or `period` token on a name without `data` or
/// `value`. Value: a name containing `data`, `value` or `forecast` that is
/// not a timestamp candidate, else a `val`, `pred`, `yhat`, `mean`, `median`
/// or `point` token. Bound and status columns are never the value, and
/// identifier columns play neither role.
pub fn resolve_columns(columns: &[String]) -> Result<ResolvedColumns> {
    let names: Vec<String> = columns.iter().map(|c| c.to_lowercase()).collect();
    let unresolved = |role| OracleError::ColumnResolution {
        role,
        columns: columns.to_vec(),
    };

    let is_id = |n: &str| has_token(n, ID_TOKENS);
    let ts_pattern = |_: usize, n: &str| !is_id(n) && contains_any(n, TIMESTAMP_PATTERNS);
    let ts_token = |_: usize, n: &str| !is_id(n) && has_token(n, TIMESTAMP_TOKENS);
    let ts_weak = |_: usize, n: &str| {
        !is_id(n) && !contains_any(n, MEASURE_PATTERNS) && has_token(n, WEAK_TIMESTAMP_TOKENS)
    };
    let timestamp = first_match(&names, &[&ts_pattern, &ts_token, &ts_weak])
        .ok_or_else(|| unresolved(ColumnRole::Timestamp))?;

    let eligible = |i: usize, n: &str| {
        i != timestamp && !is_id(n) && !contains_any(n, NON_VALUE_PATTERNS)
    };
    let value_pattern = |i: usize, n: &str| {
        eligible(i, n) && contains_any(n, VALUE_PATTERNS) && !contains_any(n, TIMESTAMP_PATTERNS)
    };
    let value_token = |i: usize, n: &str| eligible(i, n) && has_token(n, VALUE_TOKENS);
    let value = first_match(&names, &[&value_pattern, &value_token])
        .ok_or_else(|| unresolved(ColumnRole::Value))?;

    Ok(ResolvedColumns {
        timestamp,
        value,
        lower_bound: names.iter().position(|n| n.contains(LOWER_BOUND_PATTERN)),
        upper_bound: names.iter().position(|n| n.contains(UPPER_BOUND_PATTERN)),
    })
}

/// Sort key for a forecast row; parsed instants order before unparsed text
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum RowTime {
    Parsed(DateTime<Utc>),
    Raw(String),
}

impl RowTime {
    fn from_cell(cell: Option<&Value>) -> Self {
        match cell {
            Some(value) => {
                parse_timestamp(value).map_or_else(|| Self::Raw(cell_text(value)), Self::Parsed)
            }
            None => Self::Raw(String::new()),
        }
    }

    fn label(&self) -> String {
        match self {
            RowTime::Parsed(at) if at.time().num_seconds_from_midnight() == 0 => {
                at.format("%Y-%m-%d").to_string()
            }
            RowTime::Parsed(at) => at.to_rfc3339(),
            RowTime::Raw(text) => text.clone(),
        }
    }
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn from_epoch(epoch: f64) -> Option<DateTime<Utc>> {
    if !epoch.is_finite() {
        return None;
    }
    // anything past year 5138 in seconds is taken as milliseconds
    if epoch.abs() >= 1e11 {
        DateTime::from_timestamp_millis(epoch as i64)
    } else {
        DateTime::from_timestamp(epoch as i64, 0)
    }
}

/// RFC 3339, `YYYY-MM-DD[ HH:MM:SS[+ZZ:ZZ]]` or epoch seconds/milliseconds
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n.as_f64().and_then(from_epoch),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(at) = DateTime::parse_from_rfc3339(s) {
                return Some(at.with_timezone(&Utc));
            }
            if let Ok(at) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%:z") {
                return Some(at.with_timezone(&Utc));
            }
            for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
                if let Ok(at) = NaiveDateTime::parse_from_str(s, format) {
                    return Some(at.and_utc());
                }
            }
            if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                return date.and_hms_opt(0, 0, 0).map(|at| at.and_utc());
            }
            s.parse::<f64>().ok().and_then(from_epoch)
        }
        _ => None,
    }
}

/// Finite number from a numeric or numeric-string cell
fn numeric(cell: Option<&Value>) -> Option<f64> {
    let number = match cell? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    number.is_finite().then_some(number)
}

/// Builds [`ForecastResult`]s from engine output; never fails
#[derive(Debug, Clone)]
pub struct ForecastResultReconciler {
    model_name: String,
    default_daily_volatility: f64,
}

impl Default for ForecastResultReconciler {
    fn default() -> Self {
        Self::from_config(&OracleConfig::default())
    }
}

impl ForecastResultReconciler {
    pub fn from_config(config: &OracleConfig) -> Self {
        Self {
            model_name: config.model_name.clone(),
            default_daily_volatility: config.default_daily_volatility,
        }
    }

    /// Fractional half-width of the fallback band
    pub fn band_width(&self, daily_volatility: Option<f64>) -> f64 {
        let daily = daily_volatility
            .filter(|v| v.is_finite() && *v >= 0.0)
            .unwrap_or(self.default_daily_volatility);
        daily * BAND_HORIZON_DAYS.sqrt()
    }

    /// Reconcile `frame` into a canonical forecast for `ticker`.
    ///
    /// `daily_volatility` is the realized daily stdev of recent returns, or
    /// `None` when too little history was available.
    pub fn reconcile(
        &self,
        ticker: &str,
        frame: &ResultFrame,
        last_real_price: Option<f64>,
        daily_volatility: Option<f64>,
    ) -> ForecastResult {
        let columns = match resolve_columns(&frame.columns) {
            Ok(columns) => columns,
            Err(e) => {
                warn!(ticker, error = %e, "could not resolve forecast columns");
                return ForecastResult::error(
                    ticker,
                    &self.model_name,
                    last_real_price,
                    e.to_string(),
                );
            }
        };
        debug!(ticker, ?columns, "resolved forecast columns");

        let band = self.band_width(daily_volatility);
        let mut rows: Vec<(RowTime, ForecastPoint)> = Vec::with_capacity(frame.rows.len());
        let mut skipped = 0usize;

        for row in &frame.rows {
            let Some(median) = numeric(row.get(columns.value)) else {
                skipped += 1;
                continue;
            };
            let time = RowTime::from_cell(row.get(columns.timestamp));

            let lower = columns
                .lower_bound
                .and_then(|i| numeric(row.get(i)))
                .unwrap_or(median * (1.0 - band));
            let upper = columns
                .upper_bound
                .and_then(|i| numeric(row.get(i)))
                .unwrap_or(median * (1.0 + band));
            let (lower, upper) = if lower <= upper { (lower, upper) } else { (upper, lower) };

            rows.push((
                time.clone(),
                ForecastPoint {
                    date: time.label(),
                    median_price: round2(median),
                    lower_bound: round2(lower.min(median)),
                    upper_bound: round2(upper.max(median)),
                },
            ));
        }

        if skipped > 0 {
            warn!(ticker, skipped, "skipped forecast rows without a numeric value");
        }

        rows.sort_by(|a, b| a.0.cmp(&b.0));
        let forecast: Vec<ForecastPoint> = rows.into_iter().map(|(_, point)| point).collect();

        let (status, error_message) = if forecast.is_empty() {
            (
                ForecastStatus::Failed,
                Some(format!("forecast engine returned no usable rows for {ticker}")),
            )
        } else {
            (ForecastStatus::Success, None)
        };

        ForecastResult {
            ticker: ticker.to_string(),
            forecast,
            last_real_price: last_real_price.map(round2),
            status,
            model_name: self.model_name.clone(),
            error_message,
        }
    }
}
