//! # Call Math
//!
//! Numeric building blocks for the call volume forecaster.
//! This crate provides the descriptive statistics, rolling windows and
//! least-squares routines that the feature engineering and model crates
//! are built on.

use thiserror::Error;

pub mod linalg;
pub mod regression;
pub mod rolling;
pub mod statistics;

/// Errors that can occur in numeric calculations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MathError {
    #[error("Insufficient data for calculation: {0}")]
    InsufficientData(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Calculation error: {0}")]
    CalculationError(String),
}

/// Result type for numeric operations
pub type Result<T> = std::result::Result<T, MathError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_carry_context() {
        let err = MathError::InsufficientData("need 2 points".to_string());
        assert_eq!(err.to_string(), "Insufficient data for calculation: need 2 points");
    }
}
