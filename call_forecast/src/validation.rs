//! Rolling-origin cross-validation under strict temporal ordering
//!
//! Fold `k` tests on `test_size` days ending `k * test_size` days before the
//! end of the series, and trains on everything up to `gap` days before the
//! test window. Training data therefore always ends before the first test
//! date. Predictions from every kept fold are pooled before scoring.

use crate::error::{ForecastError, Result};
use crate::metrics::ErrorMetrics;
use crate::models::{ModelKind, ModelTrainer};
use crate::series::DailySeries;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Range;
use tracing::{debug, info, warn};

/// Index ranges of one cross-validation fold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoldPlan {
    pub fold: usize,
    /// Training covers positions `0..train_end`
    pub train_end: usize,
    pub test_start: usize,
    pub test_end: usize,
}

impl FoldPlan {
    pub fn train_range(&self) -> Range<usize> {
        0..self.train_end
    }

    pub fn test_range(&self) -> Range<usize> {
        self.test_start..self.test_end
    }
}

/// Pooled cross-validation metrics of one model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelCvMetrics {
    pub mae_cv: f64,
    pub rmse_cv: f64,
    /// Percent, over non-zero actuals
    pub mape_cv: Option<f64>,
    pub n_predictions: usize,
    pub folds_scored: usize,
}

/// Outcome of a cross-validation run
#[derive(Debug, Clone, Default, Serialize)]
pub struct CvReport {
    pub folds: Vec<FoldPlan>,
    pub metrics: BTreeMap<ModelKind, ModelCvMetrics>,
    /// Models that failed on every fold, with the last failure
    pub failures: BTreeMap<ModelKind, String>,
}

/// Rolling-origin cross-validator
#[derive(Debug, Clone)]
pub struct TemporalCrossValidator {
    horizon: usize,
    n_folds: usize,
}

impl TemporalCrossValidator {
    pub fn new(horizon: usize, n_folds: usize) -> Result<Self> {
        if horizon == 0 || n_folds == 0 {
            return Err(ForecastError::InvalidParameter(format!(
                "Cross-validation needs a positive horizon and fold count, got horizon={} folds={}",
                horizon, n_folds
            )));
        }
        Ok(Self { horizon, n_folds })
    }

    /// Gap between the end of training and the start of testing
    pub fn gap(&self) -> usize {
        self.horizon
    }

    /// Folds for a series of `len` days, latest first. Folds whose training
    /// part would be shorter than the test window are skipped.
    pub fn plan(&self, len: usize) -> Vec<FoldPlan> {
        let test_size = len / (self.n_folds + 1);
        if test_size == 0 {
            return Vec::new();
        }

        (0..self.n_folds)
            .filter_map(|fold| {
                let test_end = len.checked_sub(fold * test_size)?;
                let test_start = test_end.checked_sub(test_size)?;
                let train_end = test_start.checked_sub(self.gap())?;
                (train_end >= test_size).then_some(FoldPlan {
                    fold,
                    train_end,
                    test_start,
                    test_end,
                })
            })
            .collect()
    }

    /// Cross-validate every trainer on the series.
    ///
    /// Folds are evaluated in parallel; a model that fails on a fold simply
    /// contributes no predictions for it.
    pub fn validate(&self, series: &DailySeries, trainers: &[&dyn ModelTrainer]) -> Result<CvReport> {
        let folds = self.plan(series.len());
        if folds.is_empty() {
            warn!(days = series.len(), folds = self.n_folds, "series too short for any validation fold");
        }

        let fold_results: Vec<Vec<FoldOutcome>> = folds
            .par_iter()
            .map(|fold| {
                let train = series.window(0, fold.train_end);
                let test = series.window(fold.test_start, fold.test_end);
                trainers
                    .iter()
                    .map(|trainer| run_fold(*trainer, fold, &train, &test))
                    .collect()
            })
            .collect();

        let mut report = CvReport {
            folds: folds.clone(),
            ..CvReport::default()
        };

        for (position, trainer) in trainers.iter().enumerate() {
            let kind = trainer.kind();
            let mut predicted = Vec::new();
            let mut actual = Vec::new();
            let mut folds_scored = 0;
            let mut last_error = None;

            for outcome in fold_results.iter().map(|per_model| &per_model[position]) {
                match outcome {
                    Ok((p, a)) => {
                        predicted.extend_from_slice(p);
                        actual.extend_from_slice(a);
                        folds_scored += 1;
                    }
                    Err(reason) => last_error = Some(reason.clone()),
                }
            }

            if folds_scored == 0 {
                let reason = last_error.unwrap_or_else(|| "no validation folds".to_string());
                warn!(model = %kind, %reason, "model failed on every fold");
                report.failures.insert(kind, reason);
                continue;
            }

            let scored = ErrorMetrics::compute(&predicted, &actual)?;
            info!(
                model = %kind,
                mae_cv = scored.mae,
                rmse_cv = scored.rmse,
                n_predictions = scored.n,
                folds_scored,
                "cross-validated"
            );
            report.metrics.insert(
                kind,
                ModelCvMetrics {
                    mae_cv: scored.mae,
                    rmse_cv: scored.rmse,
                    mape_cv: scored.mape,
                    n_predictions: scored.n,
                    folds_scored,
                },
            );
        }

        Ok(report)
    }
}

/// Predictions and actuals of one model on one fold, or why it failed
type FoldOutcome = std::result::Result<(Vec<f64>, Vec<f64>), String>;

fn run_fold(trainer: &dyn ModelTrainer, fold: &FoldPlan, train: &DailySeries, test: &DailySeries) -> FoldOutcome {
    let kind = trainer.kind();
    if train.len() < trainer.min_window() {
        return Err(format!(
            "fold {} trains on {} days, {} needs {}",
            fold.fold,
            train.len(),
            kind,
            trainer.min_window()
        ));
    }

    let result = trainer
        .fit_window(train)
        .and_then(|model| model.predict_dates(&test.dates()));

    match result {
        Ok(predicted) if predicted.iter().all(|v| v.is_finite()) => {
            debug!(model = %kind, fold = fold.fold, train_days = train.len(), "fold scored");
            Ok((predicted, test.values()))
        }
        Ok(_) => Err(format!("fold {} produced non-finite predictions", fold.fold)),
        Err(err) => {
            debug!(model = %kind, fold = fold.fold, error = %err, "fold failed");
            Err(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_plan_for_120_days() {
        let cv = TemporalCrossValidator::new(7, 5).unwrap();
        let folds = cv.plan(120);
        let train_ends: Vec<usize> = folds.iter().map(|f| f.train_end).collect();
        assert_eq!(train_ends, vec![93, 73, 53, 33]);
        for f in &folds {
            assert_eq!(f.test_end - f.test_start, 20);
            assert!(f.train_range().end + cv.gap() == f.test_start);
        }
    }

    #[test]
    fn test_plan_for_tiny_series() {
        let cv = TemporalCrossValidator::new(7, 5).unwrap();
        assert!(cv.plan(5).is_empty());
        // test_size 5: the fourth fold would train on 3 days
        assert_eq!(cv.plan(30).len(), 3);
    }

    #[test]
    fn test_rejects_zero_folds() {
        assert!(TemporalCrossValidator::new(7, 0).is_err());
        assert!(TemporalCrossValidator::new(0, 5).is_err());
    }
}
