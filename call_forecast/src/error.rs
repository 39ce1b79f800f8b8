//! Error types for the call_forecast crate

use crate::models::ModelKind;
use call_math::MathError;
use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

/// Custom error types for the call_forecast crate
#[derive(Debug, Error)]
pub enum ForecastError {
    /// Usable history fell below the minimum for a pipeline stage
    #[error("Insufficient data in {stage}: {available} usable, {required} required")]
    InsufficientData {
        stage: &'static str,
        available: usize,
        required: usize,
    },

    /// A single model trainer could not produce a fit
    #[error("Model {model} failed to fit: {reason}")]
    ModelFit { model: ModelKind, reason: String },

    /// Every model was excluded, so no ensemble can be formed
    #[error("No active models remain for the ensemble")]
    NoActiveModels,

    /// Error related to data validation or processing
    #[error("Data error: {0}")]
    DataError(String),

    /// Error from invalid parameters
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Error from numeric routines
    #[error("Math error: {0}")]
    Math(#[from] MathError),

    /// Error from IO operations
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Error from CSV reading or writing
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Error from JSON (de)serialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ForecastError {
    /// Build a model fit error from any displayable cause
    pub fn model_fit(model: ModelKind, reason: impl ToString) -> Self {
        ForecastError::ModelFit {
            model,
            reason: reason.to_string(),
        }
    }
}

/// Result type with our custom error
pub type Result<T> = std::result::Result<T, ForecastError>;

/// Non-fatal conditions reported alongside normal output
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    /// The first forecast date does not come after the last historical date
    ForecastOverlapsHistory {
        first_forecast: NaiveDate,
        last_historical: NaiveDate,
    },
    /// A model was dropped from the ensemble for this run
    ModelExcluded { model: ModelKind, reason: String },
    /// A fitted model failed while producing forecast values
    ModelPredictionFailed { model: ModelKind, reason: String },
    /// Holiday days were replaced in the training signal
    HolidaysImputed { days: usize },
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Warning::ForecastOverlapsHistory {
                first_forecast,
                last_historical,
            } => write!(
                f,
                "forecast starting {} overlaps history ending {}",
                first_forecast, last_historical
            ),
            Warning::ModelExcluded { model, reason } => {
                write!(f, "model {} excluded: {}", model, reason)
            }
            Warning::ModelPredictionFailed { model, reason } => {
                write!(f, "model {} could not predict: {}", model, reason)
            }
            Warning::HolidaysImputed { days } => {
                write!(f, "{} holiday days imputed in the training series", days)
            }
        }
    }
}
