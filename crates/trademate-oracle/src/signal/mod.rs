//! Signal conditioning ahead of forecasting
//!
//! A raw close series goes through four steps:
//!
//! 1. Hampel outlier suppression ([`hampel`])
//! 2. Wavelet soft-threshold denoising ([`wavelet`])
//! 3. Multiplicative anchoring so the last clean value equals the last real close
//! 4. Log returns over the anchored series
//!
//! When denoising or anchoring fails the outlier-suppressed closes are used
//! instead and the result is tagged [`SignalQuality::Degraded`].

pub mod hampel;
pub mod wavelet;

pub use wavelet::Wavelet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::SignalConfig;
use crate::error::{OracleError, Result};
use crate::series::PriceSeries;

/// Whether the clean channel went through the full conditioning chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SignalQuality {
    Clean,
    Degraded { reason: String },
}

impl SignalQuality {
    pub fn is_degraded(&self) -> bool {
        matches!(self, SignalQuality::Degraded { .. })
    }
}

/// One conditioned observation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConditionedRow {
    pub timestamp: DateTime<Utc>,
    /// Raw close
    pub close: f64,
    /// Denoised, anchored close
    pub clean_close: f64,
    /// `ln(clean_t / clean_{t-1})`
    pub log_return: f64,
}

/// Conditioned series; the first input point is dropped since it has no log return
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionedSeries {
    symbol: String,
    rows: Vec<ConditionedRow>,
    quality: SignalQuality,
}

impl ConditionedSeries {
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn rows(&self) -> &[ConditionedRow] {
        &self.rows
    }

    pub fn quality(&self) -> &SignalQuality {
        &self.quality
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn clean_closes(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.clean_close).collect()
    }

    pub fn log_returns(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.log_return).collect()
    }

    /// The most recent `n` rows
    pub fn tail(&self, n: usize) -> &[ConditionedRow] {
        &self.rows[self.rows.len().saturating_sub(n)..]
    }
}

/// Outlier suppression, denoising and anchoring of close prices
#[derive(Debug, Clone, Default)]
pub struct SignalConditioner {
    config: SignalConfig,
}

impl SignalConditioner {
    pub fn new(config: SignalConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SignalConfig {
        &self.config
    }

    /// Hampel-filter the closes of `series` into a new series
    pub fn suppress_outliers(&self, series: &PriceSeries) -> Result<PriceSeries> {
        let closes = series.closes();
        validate_closes(&closes)?;
        let cleaned = hampel::filter(&closes, self.config.window, self.config.n_sigma)?;
        let replaced = closes.iter().zip(&cleaned).filter(|(a, b)| a != b).count();
        if replaced > 0 {
            debug!(symbol = series.symbol(), replaced, "suppressed outliers");
        }
        series.with_closes(&cleaned)
    }

    pub fn denoise(&self, values: &[f64]) -> Result<Vec<f64>> {
        wavelet::denoise(
            values,
            self.config.wavelet,
            self.config.threshold_scale,
            self.config.max_level_cap,
        )
    }

    /// Rescale `denoised` so its last value equals `last_real`.
    ///
    /// Falls back to an additive shift when the denoised series ends at zero.
    pub fn anchor_to_last_real(&self, denoised: &[f64], last_real: f64) -> Result<Vec<f64>> {
        let last = *denoised
            .last()
            .ok_or_else(|| OracleError::Signal("cannot anchor an empty series".to_string()))?;
        if !last.is_finite() || !last_real.is_finite() {
            return Err(OracleError::Signal(format!(
                "cannot anchor {last} to {last_real}"
            )));
        }

        if last == 0.0 {
            let shift = last_real - last;
            return Ok(denoised.iter().map(|v| v + shift).collect());
        }
        let ratio = last_real / last;
        Ok(denoised.iter().map(|v| v * ratio).collect())
    }

    /// `ln(p_t / p_{t-1})`, one shorter than the input
    pub fn compute_log_returns(&self, prices: &[f64]) -> Vec<f64> {
        prices.windows(2).map(|w| (w[1] / w[0]).ln()).collect()
    }

    /// Full conditioning chain
    pub fn condition(&self, series: &PriceSeries) -> Result<ConditionedSeries> {
        let suppressed = self.suppress_outliers(series)?;
        let last_real = series
            .last_close()
            .ok_or_else(|| OracleError::Validation("series is empty".to_string()))?;

        let clean = self.denoise_and_anchor(&suppressed.closes(), last_real);
        Ok(self.assemble(series, clean))
    }

    /// Build rows from the denoised channel, or from the raw closes tagged
    /// [`SignalQuality::Degraded`] when denoising failed
    pub(crate) fn assemble(
        &self,
        series: &PriceSeries,
        denoised: Result<Vec<f64>>,
    ) -> ConditionedSeries {
        let (clean, quality) = match denoised {
            Ok(clean) if clean.len() == series.len() => (clean, SignalQuality::Clean),
            Ok(clean) => (
                series.closes(),
                SignalQuality::Degraded {
                    reason: format!(
                        "denoised {} points for a {}-point series",
                        clean.len(),
                        series.len()
                    ),
                },
            ),
            Err(e) => {
                warn!(
                    symbol = series.symbol(),
                    error = %e,
                    "denoising failed, using raw closes"
                );
                (
                    series.closes(),
                    SignalQuality::Degraded {
                        reason: e.to_string(),
                    },
                )
            }
        };

        let log_returns = self.compute_log_returns(&clean);
        let rows = series
            .points()
            .iter()
            .zip(&clean)
            .skip(1)
            .zip(log_returns)
            .map(|((point, &clean_close), log_return)| ConditionedRow {
                timestamp: point.timestamp,
                close: point.close,
                clean_close,
                log_return,
            })
            .collect();

        ConditionedSeries {
            symbol: series.symbol().to_string(),
            rows,
            quality,
        }
    }

    fn denoise_and_anchor(&self, closes: &[f64], last_real: f64) -> Result<Vec<f64>> {
        let denoised = self.denoise(closes)?;
        let anchored = self.anchor_to_last_real(&denoised, last_real)?;
        if anchored.iter().any(|v| !v.is_finite() || *v <= 0.0) {
            return Err(OracleError::Signal(
                "anchored series left the positive finite range".to_string(),
            ));
        }
        Ok(anchored)
    }
}

fn validate_closes(closes: &[f64]) -> Result<()> {
    if let Some((index, close)) = closes
        .iter()
        .enumerate()
        .find(|(_, c)| !c.is_finite() || **c <= 0.0)
    {
        return Err(OracleError::Validation(format!(
            "close at index {index} is not a positive finite number: {close}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn series(closes: &[f64]) -> PriceSeries {
        PriceSeries::from_closes("TEST", start(), closes).unwrap()
    }

    fn random_walk(steps: &[f64]) -> Vec<f64> {
        let mut price = 100.0;
        steps
            .iter()
            .map(|step| {
                price *= 1.0 + step;
                price
            })
            .collect()
    }

    #[test]
    fn test_spike_is_suppressed_through_conditioner() {
        let conditioner = SignalConditioner::new(SignalConfig {
            window: 2,
            n_sigma: 3.0,
            ..SignalConfig::default()
        });
        let input = series(&[10.0, 10.0, 10.0, 10.0, 10.0, 100.0, 10.0, 10.0, 10.0, 10.0]);
        let cleaned = conditioner.suppress_outliers(&input).unwrap();
        assert!((cleaned.closes()[5] - 10.0).abs() < 1e-9);
        assert_eq!(input.closes()[5], 100.0);
    }

    #[test]
    fn test_short_series_fails_validation() {
        let conditioner = SignalConditioner::default();
        let input = series(&[10.0; 9]);
        assert!(matches!(
            conditioner.condition(&input),
            Err(OracleError::Validation(_))
        ));
    }

    #[test]
    fn test_non_positive_close_fails_validation() {
        let conditioner = SignalConditioner::default();
        let mut closes = vec![10.0; 20];
        closes[3] = -1.0;
        assert!(matches!(
            conditioner.suppress_outliers(&series(&closes)),
            Err(OracleError::Validation(_))
        ));
    }

    #[test]
    fn test_anchor_is_multiplicative() {
        let conditioner = SignalConditioner::default();
        let anchored = conditioner.anchor_to_last_real(&[50.0, 100.0], 110.0).unwrap();
        assert!((anchored[0] - 55.0).abs() < 1e-12);
        assert!((anchored[1] - 110.0).abs() < 1e-12);
    }

    #[test]
    fn test_anchor_falls_back_to_additive_at_zero() {
        let conditioner = SignalConditioner::default();
        let anchored = conditioner.anchor_to_last_real(&[1.0, 0.0], 5.0).unwrap();
        assert_eq!(anchored, vec![6.0, 5.0]);
        assert!(conditioner.anchor_to_last_real(&[1.0, f64::NAN], 5.0).is_err());
    }

    #[test]
    fn test_condition_drops_leading_row() {
        let conditioner = SignalConditioner::default();
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + f64::from(i)).collect();
        let input = series(&closes);
        let conditioned = conditioner.condition(&input).unwrap();

        assert_eq!(conditioned.len(), closes.len() - 1);
        assert_eq!(conditioned.rows()[0].timestamp, input.points()[1].timestamp);
        assert_eq!(*conditioned.quality(), SignalQuality::Clean);
    }

    #[test]
    fn test_constant_series_stays_flat() {
        let conditioner = SignalConditioner::default();
        let conditioned = conditioner.condition(&series(&[25.0; 40])).unwrap();
        for row in conditioned.rows() {
            assert!((row.clean_close - 25.0).abs() < 1e-9);
            assert!(row.log_return.abs() < 1e-9);
        }
    }

    #[test]
    fn test_failed_denoise_falls_back_to_raw_closes() {
        let conditioner = SignalConditioner::default();
        let mut closes: Vec<f64> = (0..40).map(|i| 100.0 + f64::from(i)).collect();
        closes[20] = 300.0;
        let input = series(&closes);

        let failure = Err(OracleError::Signal("decomposition failed".to_string()));
        let conditioned = conditioner.assemble(&input, failure);

        match conditioned.quality() {
            SignalQuality::Degraded { reason } => assert!(reason.contains("decomposition")),
            SignalQuality::Clean => panic!("expected a degraded series"),
        }
        assert_eq!(conditioned.len(), 39);
        assert_eq!(conditioned.rows()[19].clean_close, 300.0);
        assert_eq!(conditioned.clean_closes(), closes[1..].to_vec());
        assert!(conditioned.rows().iter().all(|r| r.log_return.is_finite()));
        assert!(conditioned.quality().is_degraded());
    }

    #[test]
    fn test_mismatched_denoise_length_is_degraded() {
        let conditioner = SignalConditioner::default();
        let closes: Vec<f64> = (0..30).map(|i| 50.0 + f64::from(i)).collect();
        let input = series(&closes);

        let conditioned = conditioner.assemble(&input, Ok(vec![1.0; 12]));
        assert!(conditioned.quality().is_degraded());
        assert_eq!(conditioned.clean_closes(), closes[1..].to_vec());
    }

    proptest! {
        #[test]
        fn prop_anchored_series_ends_at_last_close(
            steps in prop::collection::vec(-0.04f64..0.04, 120..300)
        ) {
            let conditioner = SignalConditioner::default();
            let input = series(&random_walk(&steps));
            let last = input.last_close().unwrap();

            let suppressed = conditioner.suppress_outliers(&input).unwrap();
            let denoised = conditioner.denoise(&suppressed.closes()).unwrap();
            let anchored = conditioner.anchor_to_last_real(&denoised, last).unwrap();
            prop_assert!((anchored[anchored.len() - 1] - last).abs() <= 1e-9 * last);

            let conditioned = conditioner.condition(&input).unwrap();
            let rows = conditioned.rows();
            prop_assert!((rows[rows.len() - 1].clean_close - last).abs() <= 1e-9 * last);
            prop_assert!(
                rows.iter()
                    .all(|r| r.clean_close.is_finite() && r.log_return.is_finite())
            );
        }
    }
}
