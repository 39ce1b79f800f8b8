//! Forecasting models for daily call volumes
//!
//! Every model family implements [`ModelTrainer`], which fits a
//! [`FittedModel`] on a training window. The pipeline never branches on the
//! concrete family except to label results.

use crate::error::{ForecastError, Result};
use crate::metrics::ErrorMetrics;
use crate::series::DailySeries;
use crate::utils::{chronological_split, future_dates};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::str::FromStr;
use tracing::debug;

pub mod arima;
pub mod decomposable;
pub mod gradient_boosting;
pub mod random_forest;
pub mod tree;

pub use arima::ArimaTrainer;
pub use decomposable::DecomposableTrainer;
pub use gradient_boosting::GradientBoostingTrainer;
pub use random_forest::RandomForestTrainer;

/// Model family identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    #[serde(alias = "sarima")]
    Arima,
    #[serde(alias = "prophet")]
    Decomposable,
    #[serde(alias = "rf")]
    RandomForest,
    #[serde(alias = "gbm", alias = "xgboost")]
    GradientBoosting,
}

impl ModelKind {
    /// Every model family, in ensemble order
    pub const ALL: [ModelKind; 4] = [
        ModelKind::Arima,
        ModelKind::Decomposable,
        ModelKind::RandomForest,
        ModelKind::GradientBoosting,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ModelKind::Arima => "arima",
            ModelKind::Decomposable => "decomposable",
            ModelKind::RandomForest => "random_forest",
            ModelKind::GradientBoosting => "gradient_boosting",
        }
    }

    /// Whether the family fits on engineered feature rows
    pub fn uses_features(&self) -> bool {
        matches!(self, ModelKind::RandomForest | ModelKind::GradientBoosting)
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for ModelKind {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "arima" | "sarima" => Ok(ModelKind::Arima),
            "decomposable" | "prophet" => Ok(ModelKind::Decomposable),
            "random_forest" | "rf" => Ok(ModelKind::RandomForest),
            "gradient_boosting" | "gbm" | "xgboost" => Ok(ModelKind::GradientBoosting),
            other => Err(ForecastError::InvalidParameter(format!(
                "Unknown model: {}",
                other
            ))),
        }
    }
}

/// A model fitted on one training window
pub trait FittedModel: Debug + Send + Sync {
    /// Predict the call count of each date. Dates are expected to follow the
    /// training window.
    fn predict_dates(&self, dates: &[NaiveDate]) -> Result<Vec<f64>>;

    /// Fitted parameters, for diagnostics
    fn params(&self) -> serde_json::Value;
}

/// A model family that can be fitted on a daily series
pub trait ModelTrainer: Debug + Send + Sync {
    fn kind(&self) -> ModelKind;

    /// Smallest training window the family can fit on
    fn min_window(&self) -> usize;

    /// Fit on the whole window
    fn fit_window(&self, window: &DailySeries) -> Result<Box<dyn FittedModel>>;

    /// Fit and score the model.
    ///
    /// The window is split chronologically: the model is first fitted on the
    /// leading part and scored on the trailing `holdout_ratio` share, then
    /// refitted on the whole window so forecasts start from the latest data.
    fn fit(&self, window: &DailySeries, horizon: usize, holdout_ratio: f64) -> Result<ModelHandle> {
        let kind = self.kind();
        let last_date = window
            .last_date()
            .ok_or_else(|| ForecastError::model_fit(kind, "empty training window"))?;
        if window.len() < self.min_window() {
            return Err(ForecastError::model_fit(
                kind,
                format!(
                    "training window has {} days, at least {} needed",
                    window.len(),
                    self.min_window()
                ),
            ));
        }

        let split = chronological_split(window.len(), holdout_ratio);
        let holdout = if split < window.len() && split >= self.min_window() {
            let train = window.window(0, split);
            let test = window.window(split, window.len());
            let model = self.fit_window(&train)?;
            let predicted = model.predict_dates(&test.dates())?;
            Some(ErrorMetrics::compute(&predicted, &test.values())?)
        } else {
            None
        };

        let model = self.fit_window(window)?;
        let (mae, rmse) = holdout.map(|m| (m.mae, m.rmse)).unwrap_or((f64::NAN, f64::NAN));
        debug!(model = %kind, holdout_mae = mae, holdout_rmse = rmse, "fitted model");

        Ok(ModelHandle {
            model_name: kind.name().to_string(),
            kind,
            fitted_params: model.params(),
            cv_mae: mae,
            cv_rmse: rmse,
            training_horizon: horizon,
            trained_until: last_date,
            model,
        })
    }
}

/// A fitted model plus the metadata the ensemble needs
#[derive(Debug)]
pub struct ModelHandle {
    pub model_name: String,
    pub kind: ModelKind,
    pub fitted_params: serde_json::Value,
    /// Mean absolute error: holdout error after fitting, replaced by the
    /// pooled cross-validation error once validation has run. NaN if unknown.
    pub cv_mae: f64,
    /// Root mean squared error, same provenance as `cv_mae`
    pub cv_rmse: f64,
    pub training_horizon: usize,
    /// Last date of the training window
    pub trained_until: NaiveDate,
    model: Box<dyn FittedModel>,
}

impl ModelHandle {
    /// Predict `horizon` consecutive days after the training window
    pub fn predict(&self, horizon: usize) -> Result<Vec<f64>> {
        let dates = future_dates(self.trained_until + Duration::days(1), horizon);
        self.model.predict_dates(&dates)
    }

    /// Predict specific dates
    pub fn predict_dates(&self, dates: &[NaiveDate]) -> Result<Vec<f64>> {
        self.model.predict_dates(dates)
    }

    /// Replace the holdout error with cross-validated error
    pub fn set_cv_metrics(&mut self, mae: f64, rmse: f64) {
        self.cv_mae = mae;
        self.cv_rmse = rmse;
    }
}

/// Default trainer of a model family
pub fn trainer_for(kind: ModelKind) -> Box<dyn ModelTrainer> {
    match kind {
        ModelKind::Arima => Box::new(ArimaTrainer::default()),
        ModelKind::Decomposable => Box::new(DecomposableTrainer::default()),
        ModelKind::RandomForest => Box::new(RandomForestTrainer::default()),
        ModelKind::GradientBoosting => Box::new(GradientBoostingTrainer::default()),
    }
}

/// Default trainers of the given families, deduplicated and in ensemble order
pub fn default_trainers(kinds: &[ModelKind]) -> Vec<Box<dyn ModelTrainer>> {
    let mut kinds = kinds.to_vec();
    kinds.sort();
    kinds.dedup();
    kinds.into_iter().map(trainer_for).collect()
}

/// Steps between the end of the training window and each date, at least 1
pub(crate) fn steps_ahead(last_date: NaiveDate, dates: &[NaiveDate]) -> Vec<usize> {
    dates
        .iter()
        .map(|&d| (d - last_date).num_days().max(1) as usize)
        .collect()
}
