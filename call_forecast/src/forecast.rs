//! Ensemble forecast generation
//!
//! Each active model predicts the horizon, the predictions are combined with
//! the ensemble weights, and the spread across models gives the interval.
//! Holiday dampening and the non-negativity clamp come last.

use crate::ensemble::EnsembleWeights;
use crate::error::{ForecastError, Result, Warning};
use crate::holidays::{HolidayCategory, HolidaySignal};
use crate::models::{ModelHandle, ModelKind};
use crate::series::DailySeries;
use crate::utils::future_dates;
use call_math::statistics;
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// One forecast day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub yhat_ensemble: f64,
    pub yhat_lower: f64,
    pub yhat_upper: f64,
    /// Spread of the model predictions after holiday dampening
    pub yhat_std: f64,
    pub is_holiday: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub holiday_category: Option<HolidayCategory>,
    /// `yhat_<model>` for each model that predicted this day
    #[serde(flatten)]
    pub model_predictions: BTreeMap<String, f64>,
}

impl ForecastPoint {
    /// Prediction of one model on this day
    pub fn model_prediction(&self, kind: ModelKind) -> Option<f64> {
        self.model_predictions.get(&prediction_key(kind)).copied()
    }
}

fn prediction_key(kind: ModelKind) -> String {
    format!("yhat_{}", kind.name())
}

/// Forecast points plus the non-fatal conditions met while producing them
#[derive(Debug, Clone, Default)]
pub struct ForecastOutput {
    pub points: Vec<ForecastPoint>,
    pub warnings: Vec<Warning>,
}

/// Combines fitted models into an ensemble forecast
#[derive(Debug, Clone)]
pub struct ForecastGenerator {
    interval_z: f64,
    holiday_factor: f64,
    cutoff: Option<NaiveDate>,
}

impl Default for ForecastGenerator {
    fn default() -> Self {
        Self {
            interval_z: 1.96,
            holiday_factor: 1.0,
            cutoff: None,
        }
    }
}

impl ForecastGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Width of the interval in cross-model standard deviations
    pub fn with_interval_z(mut self, z: f64) -> Self {
        self.interval_z = z;
        self
    }

    /// Multiplier applied on holidays
    pub fn with_holiday_factor(mut self, factor: f64) -> Self {
        self.holiday_factor = factor;
        self
    }

    /// Latest date of trusted data
    pub fn with_cutoff(mut self, cutoff: Option<NaiveDate>) -> Self {
        self.cutoff = cutoff;
        self
    }

    /// First forecast date: the day after the series end or the cutoff,
    /// whichever is earlier
    pub fn start_date(&self, series: &DailySeries) -> Result<NaiveDate> {
        let last = series
            .last_date()
            .ok_or_else(|| ForecastError::DataError("Cannot forecast an empty series".to_string()))?;
        let anchor = self.cutoff.map_or(last, |cutoff| cutoff.min(last));
        Ok(anchor + Duration::days(1))
    }

    /// Forecast `horizon` consecutive days
    pub fn generate(
        &self,
        series: &DailySeries,
        handles: &[ModelHandle],
        weights: &EnsembleWeights,
        horizon: usize,
        holidays: &dyn HolidaySignal,
    ) -> Result<ForecastOutput> {
        let start = self.start_date(series)?;
        let dates = future_dates(start, horizon);
        let mut warnings = Vec::new();

        if let Some(last) = series.last_date() {
            if start <= last {
                warn!(first_forecast = %start, last_historical = %last, "forecast overlaps history");
                warnings.push(Warning::ForecastOverlapsHistory {
                    first_forecast: start,
                    last_historical: last,
                });
            }
        }

        let mut predictions: Vec<(ModelKind, f64, Vec<f64>)> = Vec::new();
        for handle in handles {
            let Some(weight) = weights.get(handle.kind) else {
                continue;
            };
            match handle.predict_dates(&dates) {
                Ok(values) if values.len() == dates.len() => predictions.push((handle.kind, weight, values)),
                Ok(values) => warnings.push(Warning::ModelPredictionFailed {
                    model: handle.kind,
                    reason: format!("returned {} values for {} dates", values.len(), dates.len()),
                }),
                Err(err) => {
                    warn!(model = %handle.kind, error = %err, "model could not predict the horizon");
                    warnings.push(Warning::ModelPredictionFailed {
                        model: handle.kind,
                        reason: err.to_string(),
                    });
                }
            }
        }

        if predictions.is_empty() {
            return Err(ForecastError::NoActiveModels);
        }

        let mut points = Vec::with_capacity(horizon);
        for (step, &date) in dates.iter().enumerate() {
            let active: Vec<(ModelKind, f64, f64)> = predictions
                .iter()
                .map(|(kind, weight, values)| (*kind, *weight, values[step]))
                .filter(|(_, _, value)| value.is_finite())
                .collect();

            let weight_sum: f64 = active.iter().map(|(_, w, _)| w).sum();
            if active.is_empty() || weight_sum <= 0.0 {
                return Err(ForecastError::NoActiveModels);
            }

            let ensemble = active.iter().map(|(_, w, v)| w * v).sum::<f64>() / weight_sum;
            let values: Vec<f64> = active.iter().map(|(_, _, v)| *v).collect();
            let spread = if values.len() > 1 {
                statistics::population_std_dev(&values)?
            } else {
                0.0
            };

            let is_holiday = holidays.is_holiday(date);
            let factor = if is_holiday { self.holiday_factor } else { 1.0 };
            let ensemble = ensemble * factor;
            let spread = spread * factor;

            points.push(ForecastPoint {
                date,
                yhat_ensemble: ensemble.max(0.0),
                yhat_lower: (ensemble - self.interval_z * spread).max(0.0),
                yhat_upper: (ensemble + self.interval_z * spread).max(0.0),
                yhat_std: spread,
                is_holiday,
                holiday_category: if is_holiday { holidays.category(date) } else { None },
                model_predictions: active
                    .iter()
                    .map(|(kind, _, v)| (prediction_key(*kind), v.max(0.0)))
                    .collect(),
            });
        }

        info!(
            direction = %series.direction(),
            start = %start,
            horizon,
            models = predictions.len(),
            holidays = points.iter().filter(|p| p.is_holiday).count(),
            "generated ensemble forecast"
        );

        Ok(ForecastOutput { points, warnings })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::holidays::{HolidayCalendar, NoHolidays};
    use crate::models::{FittedModel, ModelTrainer};
    use crate::records::Direction;
    use approx::assert_relative_eq;

    /// Trainer whose model predicts a constant
    #[derive(Debug)]
    struct Constant(ModelKind, f64);

    #[derive(Debug)]
    struct ConstantModel(f64);

    impl FittedModel for ConstantModel {
        fn predict_dates(&self, dates: &[NaiveDate]) -> Result<Vec<f64>> {
            Ok(vec![self.0; dates.len()])
        }

        fn params(&self) -> serde_json::Value {
            serde_json::json!({ "value": self.0 })
        }
    }

    impl ModelTrainer for Constant {
        fn kind(&self) -> ModelKind {
            self.0
        }

        fn min_window(&self) -> usize {
            1
        }

        fn fit_window(&self, _window: &DailySeries) -> Result<Box<dyn FittedModel>> {
            Ok(Box::new(ConstantModel(self.1)))
        }
    }

    fn series() -> DailySeries {
        DailySeries::from_counts(
            Direction::Inbound,
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            &[100; 10],
        )
    }

    fn handles(values: &[(ModelKind, f64)]) -> Vec<ModelHandle> {
        values
            .iter()
            .map(|&(kind, v)| Constant(kind, v).fit(&series(), 7, 0.2).unwrap())
            .collect()
    }

    fn weights(values: &[(ModelKind, f64)]) -> EnsembleWeights {
        values.iter().copied().collect::<BTreeMap<_, _>>().into()
    }

    #[test]
    fn test_weighted_combination_and_interval() {
        let handles = handles(&[(ModelKind::Arima, 100.0), (ModelKind::Decomposable, 200.0)]);
        let weights = weights(&[(ModelKind::Arima, 0.75), (ModelKind::Decomposable, 0.25)]);
        let output = ForecastGenerator::new()
            .generate(&series(), &handles, &weights, 5, &NoHolidays)
            .unwrap();

        assert_eq!(output.points.len(), 5);
        assert!(output.warnings.is_empty());
        let first = &output.points[0];
        assert_eq!(first.date, NaiveDate::from_ymd_opt(2024, 6, 11).unwrap());
        assert_relative_eq!(first.yhat_ensemble, 125.0);
        assert_relative_eq!(first.yhat_std, 50.0);
        assert_relative_eq!(first.yhat_lower, 27.0);
        assert_relative_eq!(first.yhat_upper, 223.0);
        assert_eq!(first.model_prediction(ModelKind::Decomposable), Some(200.0));
        assert_eq!(first.model_prediction(ModelKind::RandomForest), None);
    }

    #[test]
    fn test_holiday_dampening_and_clamp() {
        let handles = handles(&[(ModelKind::Arima, 10.0), (ModelKind::RandomForest, 90.0)]);
        let weights = weights(&[(ModelKind::Arima, 0.5), (ModelKind::RandomForest, 0.5)]);
        let holiday = NaiveDate::from_ymd_opt(2024, 6, 12).unwrap();
        let calendar = HolidayCalendar::from_entries([(holiday, "Feriado")]);

        let output = ForecastGenerator::new()
            .with_holiday_factor(0.5)
            .generate(&series(), &handles, &weights, 3, &calendar)
            .unwrap();

        let normal = &output.points[0];
        let dampened = &output.points[1];
        assert!(dampened.is_holiday && !normal.is_holiday);
        assert_eq!(dampened.holiday_category, Some(HolidayCategory::Other));
        assert_eq!(normal.holiday_category, None);
        assert_relative_eq!(dampened.yhat_ensemble, normal.yhat_ensemble * 0.5);
        // 50 - 1.96 * 40 < 0
        assert_eq!(normal.yhat_lower, 0.0);
        for p in &output.points {
            assert!(p.yhat_lower <= p.yhat_ensemble && p.yhat_ensemble <= p.yhat_upper);
        }
    }

    #[test]
    fn test_cutoff_before_series_end_warns() {
        let handles = handles(&[(ModelKind::Arima, 10.0)]);
        let weights = weights(&[(ModelKind::Arima, 1.0)]);
        let cutoff = NaiveDate::from_ymd_opt(2024, 6, 8).unwrap();
        let output = ForecastGenerator::new()
            .with_cutoff(Some(cutoff))
            .generate(&series(), &handles, &weights, 3, &NoHolidays)
            .unwrap();

        assert_eq!(output.points[0].date, NaiveDate::from_ymd_opt(2024, 6, 9).unwrap());
        assert!(matches!(output.warnings[0], Warning::ForecastOverlapsHistory { .. }));
    }

    #[test]
    fn test_models_without_weight_are_ignored() {
        let handles = handles(&[(ModelKind::Arima, 10.0)]);
        let weights = weights(&[(ModelKind::GradientBoosting, 1.0)]);
        let err = ForecastGenerator::new()
            .generate(&series(), &handles, &weights, 3, &NoHolidays)
            .unwrap_err();
        assert!(matches!(err, ForecastError::NoActiveModels));
    }
}
