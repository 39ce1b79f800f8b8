//! Gradient-boosted regression trees on engineered features
//!
//! Squared-error boosting: each round fits a shallow tree to the current
//! residuals on a random subsample of rows and adds it with a shrinkage factor.

use crate::error::{ForecastError, Result};
use crate::features::MAX_LOOKBACK;
use crate::models::tree::{FeatureFrame, FeatureHistory, RegressionTree, TreeParams};
use crate::models::{FittedModel, ModelKind, ModelTrainer};
use crate::series::DailySeries;
use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::SeedableRng;
use serde_json::json;
use tracing::debug;

/// Gradient boosting trainer
#[derive(Debug, Clone)]
pub struct GradientBoostingTrainer {
    n_rounds: usize,
    learning_rate: f64,
    subsample: f64,
    tree: TreeParams,
    seed: u64,
}

impl Default for GradientBoostingTrainer {
    fn default() -> Self {
        Self {
            n_rounds: 100,
            learning_rate: 0.1,
            subsample: 0.8,
            tree: TreeParams {
                max_depth: 6,
                min_samples_split: 5,
                min_samples_leaf: 2,
                max_features: None,
            },
            seed: 42,
        }
    }
}

impl GradientBoostingTrainer {
    pub fn new(n_rounds: usize, learning_rate: f64, subsample: f64, tree: TreeParams, seed: u64) -> Result<Self> {
        if n_rounds == 0 {
            return Err(ForecastError::InvalidParameter(
                "Gradient boosting needs at least one round".to_string(),
            ));
        }
        if learning_rate <= 0.0 || learning_rate > 1.0 {
            return Err(ForecastError::InvalidParameter(format!(
                "Learning rate must be in (0, 1], got {}",
                learning_rate
            )));
        }
        if subsample <= 0.0 || subsample > 1.0 {
            return Err(ForecastError::InvalidParameter(format!(
                "Subsample ratio must be in (0, 1], got {}",
                subsample
            )));
        }

        Ok(Self {
            n_rounds,
            learning_rate,
            subsample,
            tree,
            seed,
        })
    }
}

impl ModelTrainer for GradientBoostingTrainer {
    fn kind(&self) -> ModelKind {
        ModelKind::GradientBoosting
    }

    fn min_window(&self) -> usize {
        MAX_LOOKBACK + 10
    }

    fn fit_window(&self, window: &DailySeries) -> Result<Box<dyn FittedModel>> {
        let frame = FeatureFrame::from_window(window)?;
        let n = frame.targets.len();
        let sample_size = ((n as f64 * self.subsample).round() as usize).clamp(1, n);
        let mut rng = StdRng::seed_from_u64(self.seed);

        let base = frame.targets.iter().sum::<f64>() / n as f64;
        let mut fitted = vec![base; n];
        let mut trees = Vec::with_capacity(self.n_rounds);

        for _ in 0..self.n_rounds {
            let residuals: Vec<f64> = frame
                .targets
                .iter()
                .zip(&fitted)
                .map(|(y, f)| y - f)
                .collect();
            let rows = sample(&mut rng, n, sample_size).into_vec();
            let tree = RegressionTree::fit(&frame.inputs, &residuals, &rows, &self.tree, &mut rng)
                .map_err(|e| ForecastError::model_fit(ModelKind::GradientBoosting, e))?;

            for (f, row) in fitted.iter_mut().zip(&frame.inputs) {
                *f += self.learning_rate * tree.predict(row);
            }
            trees.push(tree);
        }

        let train_rmse = (frame
            .targets
            .iter()
            .zip(&fitted)
            .map(|(y, f)| (y - f).powi(2))
            .sum::<f64>()
            / n as f64)
            .sqrt();
        debug!(rounds = trees.len(), rows = n, train_rmse, "fitted gradient boosting");

        Ok(Box::new(GradientBoostingModel {
            base,
            learning_rate: self.learning_rate,
            trees,
            params: self.tree,
            train_rmse,
            history: frame.history,
        }))
    }
}

/// A fitted gradient boosting model
#[derive(Debug, Clone)]
pub struct GradientBoostingModel {
    base: f64,
    learning_rate: f64,
    trees: Vec<RegressionTree>,
    params: TreeParams,
    train_rmse: f64,
    history: FeatureHistory,
}

impl GradientBoostingModel {
    fn predict_row(&self, row: &[f64]) -> f64 {
        self.base + self.learning_rate * self.trees.iter().map(|t| t.predict(row)).sum::<f64>()
    }
}

impl FittedModel for GradientBoostingModel {
    fn predict_dates(&self, dates: &[NaiveDate]) -> Result<Vec<f64>> {
        let inputs = self.history.inputs_for(dates)?;
        Ok(inputs.iter().map(|row| self.predict_row(row)).collect())
    }

    fn params(&self) -> serde_json::Value {
        json!({
            "n_rounds": self.trees.len(),
            "learning_rate": self.learning_rate,
            "max_depth": self.params.max_depth,
            "base_prediction": self.base,
            "train_rmse": self.train_rmse,
            "trained_until": self.history.last_date(),
        })
    }
}
