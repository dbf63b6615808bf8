//! Deterministic technical indicators over daily closes
//!
//! Every function re-derives its result from the full series on each call.
//! Moving averages and MACD come from `ta`; RSI uses Wilder smoothing
//! directly so the flat/all-gain/all-loss edge cases are explicit.

use serde::{Deserialize, Serialize};
use std::fmt;
use ta::{
    Next,
    indicators::{
        ExponentialMovingAverage, MovingAverageConvergenceDivergence, SimpleMovingAverage,
    },
};

use crate::error::{OracleError, Result};
use crate::stats::{round2, sample_std};

/// Longest lookback used by the snapshot (SMA 50)
pub const MIN_SNAPSHOT_HISTORY: usize = 50;

const RSI_PERIOD: usize = 14;
const RSI_OVERSOLD: f64 = 30.0;
const RSI_OVERBOUGHT: f64 = 70.0;
/// Returns needed before realized volatility is trusted
const MIN_VOLATILITY_RETURNS: usize = 6;

fn indicator_error(e: impl fmt::Display) -> OracleError {
    OracleError::Indicator(e.to_string())
}

/// Rolling mean; the first `period - 1` values average the points seen so far
pub fn sma(values: &[f64], period: usize) -> Result<Vec<f64>> {
    let mut indicator = SimpleMovingAverage::new(period).map_err(indicator_error)?;
    Ok(values.iter().map(|&v| indicator.next(v)).collect())
}

/// Non-adjusted exponential mean with `alpha = 2 / (span + 1)`
pub fn ema(values: &[f64], span: usize) -> Result<Vec<f64>> {
    let mut indicator = ExponentialMovingAverage::new(span).map_err(indicator_error)?;
    Ok(values.iter().map(|&v| indicator.next(v)).collect())
}

/// Latest Wilder RSI, `None` until `period + 1` closes exist.
///
/// A window without gains or losses reads 50, without losses 100 and
/// without gains 0.
pub fn rsi(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period + 1 {
        return None;
    }

    let changes: Vec<f64> = values.windows(2).map(|w| w[1] - w[0]).collect();
    let (seed, rest) = changes.split_at(period);

    let mut avg_gain = seed.iter().filter(|c| **c > 0.0).sum::<f64>() / period as f64;
    let mut avg_loss = -seed.iter().filter(|c| **c < 0.0).sum::<f64>() / period as f64;

    let smoothing = (period - 1) as f64;
    for &change in rest {
        avg_gain = (avg_gain * smoothing + change.max(0.0)) / period as f64;
        avg_loss = (avg_loss * smoothing + (-change).max(0.0)) / period as f64;
    }

    Some(rsi_from_averages(avg_gain, avg_loss))
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        if avg_gain == 0.0 { 50.0 } else { 100.0 }
    } else if avg_gain == 0.0 {
        0.0
    } else {
        let rs = avg_gain / avg_loss;
        100.0 - 100.0 / (1.0 + rs)
    }
}

/// Latest MACD reading
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Macd {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
}

/// MACD with 12/26/9 periods
pub fn macd(values: &[f64]) -> Result<Option<Macd>> {
    let mut indicator =
        MovingAverageConvergenceDivergence::new(12, 26, 9).map_err(indicator_error)?;
    Ok(values
        .iter()
        .map(|&v| indicator.next(v))
        .last()
        .map(|out| Macd {
            macd: out.macd,
            signal: out.signal,
            histogram: out.histogram,
        }))
}

/// Latest Bollinger band reading
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

/// Bollinger Bands over the last `period` closes, `None` until `period`
/// closes exist. The band width uses the sample deviation.
pub fn bollinger(values: &[f64], period: usize, width: f64) -> Result<Option<Bands>> {
    let Some(middle) = sma(values, period)?.last().copied() else {
        return Ok(None);
    };
    if values.len() < period {
        return Ok(None);
    }
    let Some(sigma) = sample_std(&values[values.len() - period..]) else {
        return Ok(None);
    };
    Ok(Some(Bands {
        upper: middle + width * sigma,
        middle,
        lower: middle - width * sigma,
    }))
}

/// Simple percentage returns, one shorter than the input
pub fn daily_returns(closes: &[f64]) -> Vec<f64> {
    closes
        .windows(2)
        .filter(|w| w[0] != 0.0)
        .map(|w| w[1] / w[0] - 1.0)
        .filter(|r| r.is_finite())
        .collect()
}

/// Sample stdev of the last `lookback` daily returns, `None` below six returns
pub fn realized_volatility(closes: &[f64], lookback: usize) -> Option<f64> {
    let returns = daily_returns(closes);
    let recent = &returns[returns.len().saturating_sub(lookback)..];
    if recent.len() < MIN_VOLATILITY_RETURNS {
        return None;
    }
    sample_std(recent).filter(|v| v.is_finite())
}

/// Direction of SMA 20 relative to SMA 50
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trend {
    Uptrend,
    Downtrend,
    Sideways,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MacdBias {
    Bullish,
    Bearish,
}

/// Point-in-time technical read of a close series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnicalSnapshot {
    pub price: f64,
    pub trend: Trend,
    pub rsi: f64,
    #[serde(rename = "macd")]
    pub macd_bias: MacdBias,
    pub macd_value: f64,
    pub macd_signal: f64,
    pub sma_20: f64,
    pub sma_50: f64,
    pub ema_20: f64,
    pub bollinger_upper: f64,
    pub bollinger_lower: f64,
    pub support_levels: Vec<f64>,
    pub resistance_levels: Vec<f64>,
    /// 0-10, highest when RSI sits at 50
    pub rating: f64,
    pub signals: Vec<String>,
}

/// Computes [`TechnicalSnapshot`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct TechnicalIndicatorEngine;

impl TechnicalIndicatorEngine {
    pub fn new() -> Self {
        Self
    }

    /// Snapshot of the latest indicator values
    pub fn snapshot(&self, closes: &[f64]) -> Result<TechnicalSnapshot> {
        if closes.len() < MIN_SNAPSHOT_HISTORY {
            return Err(OracleError::InsufficientHistory {
                required: MIN_SNAPSHOT_HISTORY,
                actual: closes.len(),
            });
        }
        if closes.iter().any(|c| !c.is_finite()) {
            return Err(OracleError::Validation(
                "closes must be finite".to_string(),
            ));
        }

        let missing = || OracleError::Indicator("series produced no reading".to_string());
        let price = *closes.last().ok_or_else(missing)?;
        let sma_20 = *sma(closes, 20)?.last().ok_or_else(missing)?;
        let sma_50 = *sma(closes, 50)?.last().ok_or_else(missing)?;
        let ema_20 = *ema(closes, 20)?.last().ok_or_else(missing)?;
        let rsi = rsi(closes, RSI_PERIOD).ok_or_else(missing)?;
        let macd = macd(closes)?.ok_or_else(missing)?;
        let bands = bollinger(closes, 20, 2.0)?.ok_or_else(missing)?;

        let trend = if sma_20 > sma_50 {
            Trend::Uptrend
        } else if sma_20 < sma_50 {
            Trend::Downtrend
        } else {
            Trend::Sideways
        };
        let macd_bias = if macd.macd > macd.signal {
            MacdBias::Bullish
        } else {
            MacdBias::Bearish
        };

        let mut signals = Vec::new();
        if rsi < RSI_OVERSOLD {
            signals.push("RSI Oversold (Bullish)".to_string());
        } else if rsi > RSI_OVERBOUGHT {
            signals.push("RSI Overbought (Bearish)".to_string());
        }
        match trend {
            Trend::Uptrend => signals.push("Golden Trend (SMA20 > SMA50)".to_string()),
            Trend::Downtrend => signals.push("Death Trend (SMA20 < SMA50)".to_string()),
            Trend::Sideways => {}
        }

        Ok(TechnicalSnapshot {
            price,
            trend,
            rsi: round2(rsi),
            macd_bias,
            macd_value: round2(macd.macd),
            macd_signal: round2(macd.signal),
            sma_20: round2(sma_20),
            sma_50: round2(sma_50),
            ema_20: round2(ema_20),
            bollinger_upper: round2(bands.upper),
            bollinger_lower: round2(bands.lower),
            support_levels: vec![round2(bands.lower)],
            resistance_levels: vec![round2(bands.upper)],
            rating: rating(rsi),
            signals,
        })
    }
}

fn rating(rsi: f64) -> f64 {
    let raw = (100.0 - (rsi - 50.0).abs()) / 10.0;
    ((raw * 10.0).round() / 10.0).clamp(0.0, 10.0)
}
