//! Least-squares regression
//!
//! Contains:
//! - Simple linear trend fitting over an evenly spaced series
//! - Multiple regression with optional per-coefficient ridge penalties

use crate::linalg::solve;
use crate::{MathError, Result};
use serde::{Deserialize, Serialize};

/// Result of fitting `y = intercept + slope * x` with `x = 0, 1, 2, ...`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
}

impl LinearFit {
    /// Value of the fitted line at position `x`
    pub fn value_at(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }
}

/// Fit a straight line through evenly spaced values
pub fn fit_line(values: &[f64]) -> Result<LinearFit> {
    if values.len() < 2 {
        return Err(MathError::InsufficientData(
            "Not enough data for linear regression. Need at least 2 points.".to_string(),
        ));
    }

    let n = values.len() as f64;
    let x_mean = (n - 1.0) / 2.0;
    let y_mean = values.iter().sum::<f64>() / n;

    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for (i, &y) in values.iter().enumerate() {
        let dx = i as f64 - x_mean;
        numerator += dx * (y - y_mean);
        denominator += dx * dx;
    }

    let slope = numerator / denominator;
    let intercept = y_mean - slope * x_mean;

    let ss_total: f64 = values.iter().map(|y| (y - y_mean).powi(2)).sum();
    let ss_residual: f64 = values
        .iter()
        .enumerate()
        .map(|(i, y)| (y - (intercept + slope * i as f64)).powi(2))
        .sum();
    let r_squared = if ss_total.abs() < 1e-12 {
        1.0
    } else {
        1.0 - ss_residual / ss_total
    };

    Ok(LinearFit {
        slope,
        intercept,
        r_squared,
    })
}

/// Slope of the least-squares line through evenly spaced values
pub fn slope(values: &[f64]) -> Result<f64> {
    Ok(fit_line(values)?.slope)
}

/// Solve the (optionally ridge-penalised) least-squares problem
/// `min ||y - X b||^2 + sum_j penalties[j] * b_j^2`.
///
/// `penalties` must be empty (ordinary least squares) or have one entry per column.
pub fn least_squares(rows: &[Vec<f64>], y: &[f64], penalties: &[f64]) -> Result<Vec<f64>> {
    if rows.len() != y.len() {
        return Err(MathError::InvalidInput(format!(
            "Design matrix has {} rows but target has {} values",
            rows.len(),
            y.len()
        )));
    }

    let k = rows.first().map(|r| r.len()).unwrap_or(0);
    if k == 0 {
        return Ok(Vec::new());
    }
    if rows.iter().any(|r| r.len() != k) {
        return Err(MathError::InvalidInput(
            "Design matrix rows have inconsistent lengths".to_string(),
        ));
    }
    if !penalties.is_empty() && penalties.len() != k {
        return Err(MathError::InvalidInput(format!(
            "Expected {} penalties, got {}",
            k,
            penalties.len()
        )));
    }
    if penalties.is_empty() && rows.len() < k {
        return Err(MathError::InsufficientData(format!(
            "Need at least {} observations for {} coefficients, have {}",
            k,
            k,
            rows.len()
        )));
    }

    let mut xtx = vec![vec![0.0; k]; k];
    let mut xty = vec![0.0; k];
    for (row, &target) in rows.iter().zip(y) {
        for i in 0..k {
            xty[i] += row[i] * target;
            for j in i..k {
                xtx[i][j] += row[i] * row[j];
            }
        }
    }
    for i in 0..k {
        for j in 0..i {
            xtx[i][j] = xtx[j][i];
        }
        if let Some(p) = penalties.get(i) {
            xtx[i][i] += p;
        }
    }

    solve(xtx, xty)
}

/// Apply fitted coefficients to one design row
pub fn predict_row(coefficients: &[f64], row: &[f64]) -> f64 {
    coefficients.iter().zip(row).map(|(c, x)| c * x).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_fit_line_exact() {
        let values = [1.0, 3.0, 5.0, 7.0];
        let fit = fit_line(&values).unwrap();
        assert_relative_eq!(fit.slope, 2.0, epsilon = 1e-12);
        assert_relative_eq!(fit.intercept, 1.0, epsilon = 1e-12);
        assert_relative_eq!(fit.r_squared, 1.0, epsilon = 1e-12);
        assert_relative_eq!(fit.value_at(4.0), 9.0, epsilon = 1e-12);
    }

    #[test]
    fn test_fit_line_needs_two_points() {
        assert!(fit_line(&[1.0]).is_err());
    }

    #[test]
    fn test_least_squares_recovers_coefficients() {
        // y = 2 + 3 * x1 - x2
        let rows: Vec<Vec<f64>> = (0..20)
            .map(|i| {
                let x1 = i as f64;
                let x2 = ((i * 7) % 5) as f64;
                vec![1.0, x1, x2]
            })
            .collect();
        let y: Vec<f64> = rows.iter().map(|r| 2.0 + 3.0 * r[1] - r[2]).collect();

        let coef = least_squares(&rows, &y, &[]).unwrap();
        assert_relative_eq!(coef[0], 2.0, epsilon = 1e-8);
        assert_relative_eq!(coef[1], 3.0, epsilon = 1e-8);
        assert_relative_eq!(coef[2], -1.0, epsilon = 1e-8);
        assert_relative_eq!(predict_row(&coef, &rows[4]), y[4], epsilon = 1e-8);
    }

    #[test]
    fn test_ridge_penalty_shrinks() {
        let rows: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64]).collect();
        let y: Vec<f64> = (0..10).map(|i| 2.0 * i as f64).collect();
        let ols = least_squares(&rows, &y, &[0.0]).unwrap();
        let ridge = least_squares(&rows, &y, &[100.0]).unwrap();
        assert!(ridge[0].abs() < ols[0].abs());
    }

    #[test]
    fn test_empty_design_is_trivial() {
        let rows: Vec<Vec<f64>> = vec![vec![]; 3];
        let coef = least_squares(&rows, &[1.0, 2.0, 3.0], &[]).unwrap();
        assert!(coef.is_empty());
    }
}
