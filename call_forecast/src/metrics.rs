//! Metrics for evaluating forecast accuracy

use crate::error::{ForecastError, Result};
use serde::{Deserialize, Serialize};

/// Point-forecast error metrics over a set of predictions
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ErrorMetrics {
    /// Mean absolute error
    pub mae: f64,
    /// Root mean squared error
    pub rmse: f64,
    /// Mean absolute percentage error, in percent, over non-zero actuals.
    /// `None` when every actual is zero.
    pub mape: Option<f64>,
    /// Number of predictions scored
    pub n: usize,
}

impl ErrorMetrics {
    /// Score predictions against actual values
    pub fn compute(predicted: &[f64], actual: &[f64]) -> Result<Self> {
        if predicted.len() != actual.len() || predicted.is_empty() {
            return Err(ForecastError::DataError(format!(
                "Forecast and actual values must have the same non-zero length ({} vs {})",
                predicted.len(),
                actual.len()
            )));
        }

        let n = predicted.len();
        let mut abs_sum = 0.0;
        let mut sq_sum = 0.0;
        let mut pct_sum = 0.0;
        let mut pct_count = 0usize;

        for (p, a) in predicted.iter().zip(actual) {
            let err = p - a;
            abs_sum += err.abs();
            sq_sum += err * err;
            if a.abs() > f64::EPSILON {
                pct_sum += (err / a).abs();
                pct_count += 1;
            }
        }

        let mape = if pct_count > 0 {
            Some(pct_sum / pct_count as f64 * 100.0)
        } else {
            None
        };

        Ok(Self {
            mae: abs_sum / n as f64,
            rmse: (sq_sum / n as f64).sqrt(),
            mape,
            n,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_metrics() {
        let m = ErrorMetrics::compute(&[110.0, 90.0, 100.0, 4.0], &[100.0, 100.0, 100.0, 0.0]).unwrap();
        assert_relative_eq!(m.mae, 6.0);
        assert_relative_eq!(m.rmse, (216.0f64 / 4.0).sqrt());
        // zero actual is left out of the percentage error
        assert_relative_eq!(m.mape.unwrap(), 20.0 / 3.0, epsilon = 1e-12);
        assert_eq!(m.n, 4);
    }

    #[test]
    fn test_all_zero_actuals_have_no_mape() {
        let m = ErrorMetrics::compute(&[1.0, 2.0], &[0.0, 0.0]).unwrap();
        assert!(m.mape.is_none());
    }

    #[test]
    fn test_length_mismatch() {
        assert!(ErrorMetrics::compute(&[1.0], &[1.0, 2.0]).is_err());
        assert!(ErrorMetrics::compute(&[], &[]).is_err());
    }
}
