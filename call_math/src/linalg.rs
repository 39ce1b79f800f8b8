//! Dense linear algebra for small systems
//!
//! The models only ever solve systems with a few dozen unknowns, so a plain
//! Gaussian elimination is sufficient.

use crate::{MathError, Result};

const PIVOT_TOLERANCE: f64 = 1e-12;

/// Solve `a * x = b` using Gaussian elimination with partial pivoting
pub fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Result<Vec<f64>> {
    let n = b.len();
    if a.len() != n || a.iter().any(|row| row.len() != n) {
        return Err(MathError::InvalidInput(format!(
            "Expected a square {}x{} system",
            n, n
        )));
    }

    for col in 0..n {
        // Partial pivoting
        let pivot_row = (col..n)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .unwrap_or(col);

        if a[pivot_row][col].abs() < PIVOT_TOLERANCE {
            return Err(MathError::CalculationError(format!(
                "Singular system: no usable pivot in column {}",
                col
            )));
        }

        a.swap(col, pivot_row);
        b.swap(col, pivot_row);

        for row in (col + 1)..n {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = ((row + 1)..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }

    if x.iter().any(|v| !v.is_finite()) {
        return Err(MathError::CalculationError(
            "Solution contains non-finite values".to_string(),
        ));
    }

    Ok(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_solve_requires_pivoting() {
        let a = vec![vec![0.0, 2.0], vec![3.0, 1.0]];
        let b = vec![4.0, 5.0];
        let x = solve(a, b).unwrap();
        assert_relative_eq!(x[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(x[1], 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_singular_system() {
        let a = vec![vec![1.0, 2.0], vec![2.0, 4.0]];
        let result = solve(a, vec![1.0, 2.0]);
        assert!(matches!(result, Err(MathError::CalculationError(_))));
    }

    #[test]
    fn test_shape_mismatch() {
        let result = solve(vec![vec![1.0, 2.0]], vec![1.0, 2.0]);
        assert!(matches!(result, Err(MathError::InvalidInput(_))));
    }
}
