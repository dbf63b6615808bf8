//! Daily close-price series

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{OracleError, Result};

/// One daily observation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub close: f64,
}

impl PricePoint {
    pub fn new(timestamp: DateTime<Utc>, close: f64) -> Self {
        Self { timestamp, close }
    }
}

/// Close prices ordered by strictly increasing timestamp
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    symbol: String,
    points: Vec<PricePoint>,
}

impl PriceSeries {
    /// Build a series, rejecting out-of-order or duplicate timestamps
    pub fn new(symbol: impl Into<String>, points: Vec<PricePoint>) -> Result<Self> {
        if let Some(pair) = points
            .windows(2)
            .find(|pair| pair[1].timestamp <= pair[0].timestamp)
        {
            return Err(OracleError::Validation(format!(
                "timestamps must be strictly increasing ({} followed by {})",
                pair[0].timestamp, pair[1].timestamp
            )));
        }

        Ok(Self {
            symbol: symbol.into(),
            points,
        })
    }

    /// Build a daily series starting at `start` from bare closes
    pub fn from_closes(
        symbol: impl Into<String>,
        start: DateTime<Utc>,
        closes: &[f64],
    ) -> Result<Self> {
        let points = closes
            .iter()
            .enumerate()
            .map(|(i, &close)| PricePoint::new(start + Duration::days(i as i64), close))
            .collect();
        Self::new(symbol, points)
    }

    /// Sort by timestamp, drop duplicate timestamps (last wins) and drop
    /// non-finite or non-positive closes. Used to tidy provider payloads.
    pub fn from_unordered(symbol: impl Into<String>, mut points: Vec<PricePoint>) -> Self {
        points.retain(|p| p.close.is_finite() && p.close > 0.0);
        points.sort_by_key(|p| p.timestamp);
        let mut deduped: Vec<PricePoint> = Vec::with_capacity(points.len());
        for point in points {
            match deduped.last_mut() {
                Some(last) if last.timestamp == point.timestamp => *last = point,
                _ => deduped.push(point),
            }
        }
        Self {
            symbol: symbol.into(),
            points: deduped,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn closes(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.close).collect()
    }

    pub fn timestamps(&self) -> Vec<DateTime<Utc>> {
        self.points.iter().map(|p| p.timestamp).collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn last(&self) -> Option<&PricePoint> {
        self.points.last()
    }

    pub fn last_close(&self) -> Option<f64> {
        self.points.last().map(|p| p.close)
    }

    /// The most recent `n` points (all of them if shorter)
    pub fn tail(&self, n: usize) -> &[PricePoint] {
        &self.points[self.points.len().saturating_sub(n)..]
    }

    /// Points at or after `cutoff`
    pub fn since(&self, cutoff: DateTime<Utc>) -> Self {
        Self {
            symbol: self.symbol.clone(),
            points: self
                .points
                .iter()
                .filter(|p| p.timestamp >= cutoff)
                .copied()
                .collect(),
        }
    }

    /// Same timestamps with replaced closes
    pub fn with_closes(&self, closes: &[f64]) -> Result<Self> {
        if closes.len() != self.points.len() {
            return Err(OracleError::Validation(format!(
                "expected {} closes, got {}",
                self.points.len(),
                closes.len()
            )));
        }
        let points = self
            .points
            .iter()
            .zip(closes)
            .map(|(p, &close)| PricePoint::new(p.timestamp, close))
            .collect();
        Ok(Self {
            symbol: self.symbol.clone(),
            points,
        })
    }
}

/// Lookback period for price-history requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Period {
    #[serde(rename = "1mo")]
    OneMonth,
    #[serde(rename = "3mo")]
    ThreeMonths,
    #[serde(rename = "6mo")]
    SixMonths,
    #[serde(rename = "1y")]
    OneYear,
    #[serde(rename = "2y")]
    TwoYears,
    #[serde(rename = "5y")]
    FiveYears,
}

impl Period {
    pub fn as_str(&self) -> &'static str {
        match self {
            Period::OneMonth => "1mo",
            Period::ThreeMonths => "3mo",
            Period::SixMonths => "6mo",
            Period::OneYear => "1y",
            Period::TwoYears => "2y",
            Period::FiveYears => "5y",
        }
    }

    /// Calendar span covered by the period
    pub fn lookback(&self) -> Duration {
        match self {
            Period::OneMonth => Duration::days(30),
            Period::ThreeMonths => Duration::days(90),
            Period::SixMonths => Duration::days(180),
            Period::OneYear => Duration::days(365),
            Period::TwoYears => Duration::days(730),
            Period::FiveYears => Duration::days(1825),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = OracleError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1mo" => Ok(Period::OneMonth),
            "3mo" => Ok(Period::ThreeMonths),
            "6mo" => Ok(Period::SixMonths),
            "1y" => Ok(Period::OneYear),
            "2y" => Ok(Period::TwoYears),
            "5y" => Ok(Period::FiveYears),
            other => Err(OracleError::Validation(format!("Invalid period: {other}"))),
        }
    }
}
