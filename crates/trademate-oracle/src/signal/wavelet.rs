//! Periodized discrete wavelet transform and threshold denoising

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{OracleError, Result};
use crate::stats;

const HAAR: [f64; 2] = [std::f64::consts::FRAC_1_SQRT_2, std::f64::consts::FRAC_1_SQRT_2];

const DB2: [f64; 4] = [
    0.482_962_913_144_690_25,
    0.836_516_303_737_807_9,
    0.224_143_868_041_857_35,
    -0.129_409_522_551_260_45,
];

const DB4: [f64; 8] = [
    0.230_377_813_308_855_23,
    0.714_846_570_552_541_5,
    0.630_880_767_929_590_4,
    -0.027_983_769_416_983_85,
    -0.187_034_811_718_881_14,
    0.030_841_381_835_986_965,
    0.032_883_011_666_982_945,
    -0.010_597_401_784_997_278,
];

/// Ratio between the MAD of Gaussian noise and its standard deviation
const NOISE_MAD_RATIO: f64 = 0.6745;

/// Orthogonal Daubechies wavelet family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Wavelet {
    Haar,
    Db2,
    #[default]
    Db4,
}

impl Wavelet {
    /// Low-pass decomposition filter
    pub fn scaling_filter(&self) -> &'static [f64] {
        match self {
            Wavelet::Haar => &HAAR,
            Wavelet::Db2 => &DB2,
            Wavelet::Db4 => &DB4,
        }
    }

    pub fn filter_len(&self) -> usize {
        self.scaling_filter().len()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Wavelet::Haar => "haar",
            Wavelet::Db2 => "db2",
            Wavelet::Db4 => "db4",
        }
    }

    /// Deepest useful decomposition level for a signal of `len` samples
    pub fn max_level(&self, len: usize) -> usize {
        let span = self.filter_len() - 1;
        if len < span {
            return 0;
        }
        (len as f64 / span as f64).log2().floor() as usize
    }

    /// Quadrature-mirror high-pass filter
    fn wavelet_filter(&self) -> Vec<f64> {
        let h = self.scaling_filter();
        let len = h.len();
        (0..len)
            .map(|j| {
                let sign = if j % 2 == 0 { 1.0 } else { -1.0 };
                sign * h[len - 1 - j]
            })
            .collect()
    }
}

impl fmt::Display for Wavelet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Wavelet {
    type Err = OracleError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "haar" | "db1" => Ok(Wavelet::Haar),
            "db2" => Ok(Wavelet::Db2),
            "db4" => Ok(Wavelet::Db4),
            other => Err(OracleError::Signal(format!("Unsupported wavelet: {other}"))),
        }
    }
}

/// Multi-level decomposition: coarsest approximation plus details, finest first
#[derive(Debug, Clone)]
pub struct Decomposition {
    wavelet: Wavelet,
    approximation: Vec<f64>,
    details: Vec<Vec<f64>>,
    // input length at each level, finest first
    lengths: Vec<usize>,
}

impl Decomposition {
    pub fn level(&self) -> usize {
        self.details.len()
    }

    pub fn approximation(&self) -> &[f64] {
        &self.approximation
    }

    pub fn details(&self) -> &[Vec<f64>] {
        &self.details
    }

    fn finest_detail(&self) -> Option<&[f64]> {
        self.details.first().map(Vec::as_slice)
    }
}

fn analysis_step(signal: &[f64], h: &[f64], g: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let mut padded = signal.to_vec();
    if padded.len() % 2 == 1 {
        if let Some(&last) = padded.last() {
            padded.push(last);
        }
    }
    let n = padded.len();
    let half = n / 2;
    let mut approx = vec![0.0; half];
    let mut detail = vec![0.0; half];
    for k in 0..half {
        for (j, (hj, gj)) in h.iter().zip(g).enumerate() {
            let x = padded[(2 * k + j) % n];
            approx[k] += hj * x;
            detail[k] += gj * x;
        }
    }
    (approx, detail)
}

fn synthesis_step(approx: &[f64], detail: &[f64], h: &[f64], g: &[f64], len: usize) -> Vec<f64> {
    let n = 2 * approx.len();
    let mut out = vec![0.0; n];
    for (k, (a, d)) in approx.iter().zip(detail).enumerate() {
        for (j, (hj, gj)) in h.iter().zip(g).enumerate() {
            out[(2 * k + j) % n] += hj * a + gj * d;
        }
    }
    out.truncate(len);
    out
}

/// Periodized multi-level DWT
pub fn decompose(signal: &[f64], wavelet: Wavelet, level: usize) -> Result<Decomposition> {
    if level == 0 {
        return Err(OracleError::Signal("decomposition level must be at least 1".to_string()));
    }
    let h = wavelet.scaling_filter();
    let g = wavelet.wavelet_filter();

    let mut approximation = signal.to_vec();
    let mut details = Vec::with_capacity(level);
    let mut lengths = Vec::with_capacity(level);
    for current in 0..level {
        if approximation.len() < 2 {
            return Err(OracleError::Signal(format!(
                "signal of {} samples cannot be decomposed to level {}",
                signal.len(),
                current + 1
            )));
        }
        lengths.push(approximation.len());
        let (next, detail) = analysis_step(&approximation, h, &g);
        details.push(detail);
        approximation = next;
    }

    Ok(Decomposition {
        wavelet,
        approximation,
        details,
        lengths,
    })
}

/// Inverse of [`decompose`]
pub fn reconstruct(decomposition: &Decomposition) -> Vec<f64> {
    let h = decomposition.wavelet.scaling_filter();
    let g = decomposition.wavelet.wavelet_filter();

    let mut signal = decomposition.approximation.clone();
    for (detail, &len) in decomposition
        .details
        .iter()
        .zip(&decomposition.lengths)
        .rev()
    {
        signal = synthesis_step(&signal, detail, h, &g, len);
    }
    signal
}

fn soft_threshold(value: f64, threshold: f64) -> f64 {
    value.signum() * (value.abs() - threshold).max(0.0)
}

/// Level used for a signal of `len` samples, capped at `max_level_cap`
pub fn denoise_level(wavelet: Wavelet, len: usize, max_level_cap: usize) -> usize {
    wavelet
        .max_level(len)
        .saturating_sub(1)
        .max(1)
        .min(max_level_cap.max(1))
}

/// Soft-threshold every detail band with a scaled universal threshold.
///
/// Noise sigma comes from the finest detail band; the approximation band is
/// left untouched. Output has exactly `signal.len()` samples.
pub fn denoise(
    signal: &[f64],
    wavelet: Wavelet,
    threshold_scale: f64,
    max_level_cap: usize,
) -> Result<Vec<f64>> {
    let len = signal.len();
    if len < 2 {
        return Err(OracleError::Signal(format!(
            "cannot denoise a signal of {len} samples"
        )));
    }
    if signal.iter().any(|v| !v.is_finite()) {
        return Err(OracleError::Signal("signal contains non-finite values".to_string()));
    }

    let level = denoise_level(wavelet, len, max_level_cap);
    let mut decomposition = decompose(signal, wavelet, level)?;

    let sigma = decomposition
        .finest_detail()
        .and_then(stats::mad)
        .map(|mad| mad / NOISE_MAD_RATIO)
        .ok_or_else(|| {
            OracleError::Signal("no detail coefficients to estimate noise".to_string())
        })?;
    let threshold = sigma * (2.0 * (len as f64).ln()).sqrt() * threshold_scale;

    for detail in &mut decomposition.details {
        for coefficient in detail.iter_mut() {
            *coefficient = soft_threshold(*coefficient, threshold);
        }
    }

    let mut denoised = reconstruct(&decomposition);
    if let Some(&last) = denoised.last() {
        denoised.resize(len, last);
    }

    if denoised.len() != len || denoised.iter().any(|v| !v.is_finite()) {
        return Err(OracleError::Signal(
            "wavelet reconstruction produced non-finite values".to_string(),
        ));
    }
    Ok(denoised)
}
