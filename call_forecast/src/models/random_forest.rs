//! Bagged regression-tree ensemble on engineered features

use crate::error::{ForecastError, Result};
use crate::features::MAX_LOOKBACK;
use crate::models::tree::{FeatureFrame, FeatureHistory, RegressionTree, TreeParams};
use crate::models::{FittedModel, ModelKind, ModelTrainer};
use crate::series::DailySeries;
use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use tracing::debug;

/// Random forest trainer
#[derive(Debug, Clone)]
pub struct RandomForestTrainer {
    n_trees: usize,
    tree: TreeParams,
    seed: u64,
}

impl Default for RandomForestTrainer {
    fn default() -> Self {
        Self {
            n_trees: 100,
            tree: TreeParams {
                max_depth: 10,
                min_samples_split: 5,
                min_samples_leaf: 2,
                max_features: None,
            },
            seed: 42,
        }
    }
}

impl RandomForestTrainer {
    pub fn new(n_trees: usize, tree: TreeParams, seed: u64) -> Result<Self> {
        if n_trees == 0 {
            return Err(ForecastError::InvalidParameter(
                "Random forest needs at least one tree".to_string(),
            ));
        }
        Ok(Self { n_trees, tree, seed })
    }
}

impl ModelTrainer for RandomForestTrainer {
    fn kind(&self) -> ModelKind {
        ModelKind::RandomForest
    }

    fn min_window(&self) -> usize {
        MAX_LOOKBACK + 10
    }

    fn fit_window(&self, window: &DailySeries) -> Result<Box<dyn FittedModel>> {
        let frame = FeatureFrame::from_window(window)?;
        let n = frame.targets.len();
        let mut rng = StdRng::seed_from_u64(self.seed);

        let trees = (0..self.n_trees)
            .map(|_| {
                let bootstrap: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                RegressionTree::fit(&frame.inputs, &frame.targets, &bootstrap, &self.tree, &mut rng)
            })
            .collect::<Result<Vec<_>>>()
            .map_err(|e| ForecastError::model_fit(ModelKind::RandomForest, e))?;

        debug!(trees = trees.len(), rows = n, "fitted random forest");

        Ok(Box::new(RandomForestModel {
            trees,
            params: self.tree,
            history: frame.history,
        }))
    }
}

/// A fitted random forest
#[derive(Debug, Clone)]
pub struct RandomForestModel {
    trees: Vec<RegressionTree>,
    params: TreeParams,
    history: FeatureHistory,
}

impl RandomForestModel {
    fn predict_row(&self, row: &[f64]) -> f64 {
        self.trees.iter().map(|t| t.predict(row)).sum::<f64>() / self.trees.len() as f64
    }
}

impl FittedModel for RandomForestModel {
    fn predict_dates(&self, dates: &[NaiveDate]) -> Result<Vec<f64>> {
        let inputs = self.history.inputs_for(dates)?;
        Ok(inputs.iter().map(|row| self.predict_row(row)).collect())
    }

    fn params(&self) -> serde_json::Value {
        json!({
            "n_trees": self.trees.len(),
            "max_depth": self.params.max_depth,
            "min_samples_split": self.params.min_samples_split,
            "min_samples_leaf": self.params.min_samples_leaf,
            "deepest_tree": self.trees.iter().map(|t| t.depth()).max().unwrap_or(0),
            "trained_until": self.history.last_date(),
        })
    }
}
