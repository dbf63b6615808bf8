//! Centered rolling Hampel filter

use crate::error::{OracleError, Result};
use crate::stats;

/// Consistency constant turning a MAD into a normal-distribution sigma
pub const MAD_SCALE: f64 = 1.4826;

/// Replace points further than `n_sigma` scaled MADs from their local median.
///
/// The window spans `2 * half_width` points. An even-width centered window
/// cannot sit symmetrically on `i`, so it covers `[i - half_width, i +
/// half_width - 1]`. Points whose window runs off either end of the series
/// keep their value.
pub fn filter(values: &[f64], half_width: usize, n_sigma: f64) -> Result<Vec<f64>> {
    let width = 2 * half_width;
    if half_width == 0 {
        return Err(OracleError::Validation(
            "Hampel window must be at least 1".to_string(),
        ));
    }
    if values.len() < width {
        return Err(OracleError::Validation(format!(
            "series of {} points is shorter than the {width}-point outlier window",
            values.len()
        )));
    }

    let mut cleaned = values.to_vec();
    for i in half_width..=(values.len() - half_width) {
        let window = &values[i - half_width..i + half_width];
        let (Some(center), Some(spread)) = (stats::median(window), stats::mad(window)) else {
            continue;
        };
        if (values[i] - center).abs() > n_sigma * MAD_SCALE * spread {
            cleaned[i] = center;
        }
    }
    Ok(cleaned)
}
