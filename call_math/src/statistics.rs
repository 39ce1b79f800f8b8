//! Descriptive statistics over slices of observations
//!
//! Sample statistics use the `n - 1` denominator, population statistics use `n`.

use crate::{MathError, Result};

/// Arithmetic mean of the values
pub fn mean(values: &[f64]) -> Result<f64> {
    if values.is_empty() {
        return Err(MathError::InsufficientData(
            "Cannot compute the mean of an empty slice".to_string(),
        ));
    }

    Ok(values.iter().sum::<f64>() / values.len() as f64)
}

/// Variance with `ddof` delta degrees of freedom (0 = population, 1 = sample)
pub fn variance(values: &[f64], ddof: usize) -> Result<f64> {
    if values.len() <= ddof {
        return Err(MathError::InsufficientData(format!(
            "Variance with ddof={} needs more than {} values, have {}",
            ddof,
            ddof,
            values.len()
        )));
    }

    let m = mean(values)?;
    let sum_sq: f64 = values.iter().map(|v| (v - m).powi(2)).sum();

    Ok(sum_sq / (values.len() - ddof) as f64)
}

/// Sample standard deviation (`n - 1` denominator)
pub fn sample_std_dev(values: &[f64]) -> Result<f64> {
    Ok(variance(values, 1)?.sqrt())
}

/// Population standard deviation (`n` denominator)
pub fn population_std_dev(values: &[f64]) -> Result<f64> {
    Ok(variance(values, 0)?.sqrt())
}

/// Mean and sample standard deviation together.
///
/// A single observation yields a standard deviation of zero instead of an
/// error, which is what baseline thresholds want.
pub fn mean_and_std(values: &[f64]) -> Result<(f64, f64)> {
    let m = mean(values)?;
    let s = if values.len() > 1 {
        sample_std_dev(values)?
    } else {
        0.0
    };

    Ok((m, s))
}

/// Quantile `q` in `[0, 1]`, interpolating linearly between order statistics
pub fn quantile(values: &[f64], q: f64) -> Result<f64> {
    if values.is_empty() {
        return Err(MathError::InsufficientData(
            "Cannot compute a quantile of an empty slice".to_string(),
        ));
    }
    if !(0.0..=1.0).contains(&q) {
        return Err(MathError::InvalidInput(format!("Quantile must be in [0, 1], got {}", q)));
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let position = q * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;

    Ok(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

/// Median of the values
pub fn median(values: &[f64]) -> Result<f64> {
    quantile(values, 0.5)
}

/// Z-score of `value` against a mean and standard deviation.
///
/// Returns 0 when the deviation is degenerate.
pub fn z_score(value: f64, mean: f64, std_dev: f64) -> f64 {
    if std_dev.abs() < 1e-12 || !std_dev.is_finite() {
        0.0
    } else {
        (value - mean) / std_dev
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_mean_and_variance() {
        let data = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_relative_eq!(mean(&data).unwrap(), 5.0);
        assert_relative_eq!(population_std_dev(&data).unwrap(), 2.0);
        assert_relative_eq!(sample_std_dev(&data).unwrap(), 2.138089935299395, epsilon = 1e-12);
    }

    #[test]
    fn test_empty_input_is_rejected() {
        assert!(mean(&[]).is_err());
        assert!(sample_std_dev(&[1.0]).is_err());
        assert!(population_std_dev(&[1.0]).is_ok());
    }

    #[test]
    fn test_mean_and_std_single_value() {
        let (m, s) = mean_and_std(&[42.0]).unwrap();
        assert_relative_eq!(m, 42.0);
        assert_relative_eq!(s, 0.0);
    }

    #[test]
    fn test_quantiles_interpolate() {
        let data = [7.0, 1.0, 3.0, 5.0];
        assert_relative_eq!(median(&data).unwrap(), 4.0);
        assert_relative_eq!(quantile(&data, 0.25).unwrap(), 2.5);
        assert_relative_eq!(quantile(&data, 0.75).unwrap(), 5.5);
        assert_relative_eq!(quantile(&data, 1.0).unwrap(), 7.0);
        assert_relative_eq!(median(&[9.0]).unwrap(), 9.0);
        assert!(quantile(&data, 1.5).is_err());
        assert!(median(&[]).is_err());
    }

    #[test]
    fn test_z_score_degenerate() {
        assert_eq!(z_score(10.0, 10.0, 0.0), 0.0);
        assert_relative_eq!(z_score(12.0, 10.0, 2.0), 1.0);
    }
}
