//! Per-direction orchestration: build, fit, validate, weight, forecast, alert
//!
//! A trainer that fails is logged and left out of the ensemble. Only when
//! every trainer is gone does the direction fail, and a failing direction
//! never stops the other one.

use crate::alerts::{Alert, AlertDetector};
use crate::audit::DataAudit;
use crate::config::EnsembleConfig;
use crate::ensemble::{EnsembleWeighter, EnsembleWeights};
use crate::error::{ForecastError, Result, Warning};
use crate::forecast::{ForecastGenerator, ForecastPoint};
use crate::holidays::{HolidaySignal, NoHolidays};
use crate::models::{default_trainers, ModelHandle, ModelKind, ModelTrainer};
use crate::records::{CallRecord, Direction};
use crate::series::{DailySeries, TimeSeriesBuilder};
use crate::validation::{CvReport, TemporalCrossValidator};
use chrono::NaiveDate;
use rayon::prelude::*;
use std::collections::BTreeMap;
use tracing::{info, info_span, warn};

/// Everything one direction produced
#[derive(Debug)]
pub struct DirectionRun {
    pub direction: Direction,
    /// Series the models were trained on, after any holiday imputation
    pub series: DailySeries,
    pub handles: Vec<ModelHandle>,
    pub cv: CvReport,
    pub weights: EnsembleWeights,
    pub forecast: Vec<ForecastPoint>,
    pub alerts: Vec<Alert>,
    pub warnings: Vec<Warning>,
    /// Audit of the raw history, present when the run started from records
    pub audit: Option<DataAudit>,
}

impl DirectionRun {
    /// Handle of one model, if it made it into the run
    pub fn handle(&self, kind: ModelKind) -> Option<&ModelHandle> {
        self.handles.iter().find(|h| h.kind == kind)
    }
}

/// Explicit run context passed through every stage
pub struct ForecastPipeline {
    config: EnsembleConfig,
    holidays: Box<dyn HolidaySignal>,
    cutoff: Option<NaiveDate>,
    trainers: Vec<Box<dyn ModelTrainer>>,
}

impl std::fmt::Debug for ForecastPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForecastPipeline")
            .field("config", &self.config)
            .field("cutoff", &self.cutoff)
            .field("trainers", &self.trainers)
            .finish_non_exhaustive()
    }
}

impl ForecastPipeline {
    /// Pipeline with the configured models and no holidays
    pub fn new(config: EnsembleConfig) -> Result<Self> {
        config.validate()?;
        let trainers = default_trainers(&config.active_models);
        Ok(Self {
            config,
            holidays: Box::new(NoHolidays),
            cutoff: None,
            trainers,
        })
    }

    pub fn with_holidays(mut self, holidays: impl HolidaySignal + 'static) -> Self {
        self.holidays = Box::new(holidays);
        self
    }

    /// Latest date of trusted data. Without one, records up to today count.
    pub fn with_cutoff(mut self, cutoff: Option<NaiveDate>) -> Self {
        self.cutoff = cutoff;
        self
    }

    /// Replace the trainers built from `active_models`
    pub fn with_trainers(mut self, trainers: Vec<Box<dyn ModelTrainer>>) -> Self {
        self.trainers = trainers;
        self
    }

    pub fn config(&self) -> &EnsembleConfig {
        &self.config
    }

    pub fn cutoff(&self) -> Option<NaiveDate> {
        self.cutoff
    }

    /// Run every stage for one direction
    pub fn run_direction(&self, records: &[CallRecord], direction: Direction) -> Result<DirectionRun> {
        let span = info_span!("forecast_run", %direction);
        let _guard = span.enter();

        let series = TimeSeriesBuilder::new()
            .with_optional_cutoff(self.cutoff)
            .with_min_days(self.config.min_history_days)
            .build(records, direction)?;

        let audit = match DataAudit::from_records(records, &series) {
            Ok(audit) => Some(audit),
            Err(err) => {
                warn!(%direction, error = %err, "call history audit skipped");
                None
            }
        };
        let mut run = self.run_series(series)?;
        run.audit = audit;
        Ok(run)
    }

    /// Run every stage on an already built series
    pub fn run_series(&self, series: DailySeries) -> Result<DirectionRun> {
        let direction = series.direction();
        let policy = self.config.holiday_policy(direction);
        let mut warnings = Vec::new();

        let series = if policy.exclude_from_training {
            let (imputed, days) = series.impute_holidays(self.holidays.as_ref());
            if days > 0 {
                info!(%direction, days, "replaced holiday counts in training series");
                warnings.push(Warning::HolidaysImputed { days });
            }
            imputed
        } else {
            series
        };

        let handles = self.fit_trainers(&series, &mut warnings);
        if handles.is_empty() {
            return Err(ForecastError::NoActiveModels);
        }

        let fitted: Vec<&dyn ModelTrainer> = self
            .trainers
            .iter()
            .filter(|t| handles.iter().any(|h| h.kind == t.kind()))
            .map(|t| t.as_ref())
            .collect();
        let validator = TemporalCrossValidator::new(self.config.cv_horizon_days, self.config.n_folds)?;
        let cv = validator.validate(&series, &fitted)?;

        let (handles, errors) = self.select_errors(handles, &cv, &mut warnings);
        let weights = EnsembleWeighter::new(self.config.min_weight, self.config.max_weight)?.compute_weights(&errors)?;
        for (kind, weight) in weights.iter() {
            info!(model = %kind, weight, mae = errors.get(&kind).copied().unwrap_or(f64::NAN), "ensemble weight");
        }

        let output = ForecastGenerator::new()
            .with_interval_z(self.config.interval_z)
            .with_holiday_factor(policy.forecast_factor)
            .with_cutoff(self.cutoff)
            .generate(
                &series,
                &handles,
                &weights,
                self.config.forecast_horizon_days,
                self.holidays.as_ref(),
            )?;
        warnings.extend(output.warnings);

        let alerts = AlertDetector::new().detect(&output.points, &series)?;

        info!(
            %direction,
            models = handles.len(),
            points = output.points.len(),
            alerts = alerts.len(),
            warnings = warnings.len(),
            "direction run complete"
        );

        Ok(DirectionRun {
            direction,
            series,
            handles,
            cv,
            weights,
            forecast: output.points,
            alerts,
            warnings,
            audit: None,
        })
    }

    /// Run both directions, keeping each direction's failure to itself
    pub fn run_all(&self, records: &[CallRecord]) -> BTreeMap<Direction, Result<DirectionRun>> {
        Direction::ALL
            .iter()
            .map(|&direction| {
                let result = self.run_direction(records, direction);
                if let Err(err) = &result {
                    warn!(%direction, error = %err, "direction run failed");
                }
                (direction, result)
            })
            .collect()
    }

    fn fit_trainers(&self, series: &DailySeries, warnings: &mut Vec<Warning>) -> Vec<ModelHandle> {
        let results: Vec<(ModelKind, Result<ModelHandle>)> = self
            .trainers
            .par_iter()
            .map(|trainer| {
                let result = trainer.fit(series, self.config.forecast_horizon_days, self.config.holdout_ratio);
                (trainer.kind(), result)
            })
            .collect();

        let mut handles = Vec::with_capacity(results.len());
        for (kind, result) in results {
            match result {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    warn!(model = %kind, error = %err, "model excluded from ensemble");
                    warnings.push(Warning::ModelExcluded {
                        model: kind,
                        reason: err.to_string(),
                    });
                }
            }
        }
        handles
    }

    /// Error each surviving model is weighted by.
    ///
    /// Pooled cross-validation MAE when folds ran. A model that failed on
    /// every fold is dropped. Without any folds the holdout MAE is used.
    fn select_errors(
        &self,
        handles: Vec<ModelHandle>,
        cv: &CvReport,
        warnings: &mut Vec<Warning>,
    ) -> (Vec<ModelHandle>, BTreeMap<ModelKind, f64>) {
        let mut kept = Vec::with_capacity(handles.len());
        let mut errors = BTreeMap::new();

        for mut handle in handles {
            if let Some(metrics) = cv.metrics.get(&handle.kind) {
                handle.set_cv_metrics(metrics.mae_cv, metrics.rmse_cv);
            } else if !cv.folds.is_empty() {
                let reason = cv
                    .failures
                    .get(&handle.kind)
                    .cloned()
                    .unwrap_or_else(|| "no cross-validation result".to_string());
                warn!(model = %handle.kind, %reason, "model excluded after cross-validation");
                warnings.push(Warning::ModelExcluded {
                    model: handle.kind,
                    reason: format!("failed on every validation fold: {}", reason),
                });
                continue;
            }

            if handle.cv_mae.is_finite() {
                errors.insert(handle.kind, handle.cv_mae);
                kept.push(handle);
            } else {
                warnings.push(Warning::ModelExcluded {
                    model: handle.kind,
                    reason: "no validation error available".to_string(),
                });
            }
        }

        (kept, errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HolidayPolicy;
    use crate::holidays::HolidayCalendar;
    use crate::models::FittedModel;
    use crate::utils::simulate_records;
    use chrono::Datelike;

    #[derive(Debug)]
    struct Failing;

    impl ModelTrainer for Failing {
        fn kind(&self) -> ModelKind {
            ModelKind::GradientBoosting
        }

        fn min_window(&self) -> usize {
            1
        }

        fn fit_window(&self, _window: &DailySeries) -> Result<Box<dyn FittedModel>> {
            Err(ForecastError::model_fit(self.kind(), "singular fit"))
        }
    }

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn config() -> EnsembleConfig {
        EnsembleConfig {
            forecast_horizon_days: 14,
            active_models: vec![ModelKind::Arima, ModelKind::Decomposable],
            ..EnsembleConfig::default()
        }
    }

    #[test]
    fn test_failing_trainer_is_excluded() {
        let records = simulate_records(start(), 90, Direction::Inbound, 80.0, 3).unwrap();
        let mut trainers = default_trainers(&[ModelKind::Arima]);
        trainers.push(Box::new(Failing));
        let pipeline = ForecastPipeline::new(config())
            .unwrap()
            .with_cutoff(NaiveDate::from_ymd_opt(2024, 3, 30))
            .with_trainers(trainers);

        let run = pipeline.run_direction(&records, Direction::Inbound).unwrap();
        assert_eq!(run.handles.len(), 1);
        assert!(run
            .warnings
            .iter()
            .any(|w| matches!(w, Warning::ModelExcluded { model: ModelKind::GradientBoosting, .. })));
        assert_eq!(run.forecast.len(), 14);
        assert_eq!(run.forecast[0].date, NaiveDate::from_ymd_opt(2024, 3, 31).unwrap());
    }

    #[test]
    fn test_all_trainers_failing_is_fatal() {
        let records = simulate_records(start(), 60, Direction::Inbound, 80.0, 4).unwrap();
        let pipeline = ForecastPipeline::new(config())
            .unwrap()
            .with_cutoff(NaiveDate::from_ymd_opt(2024, 6, 1))
            .with_trainers(vec![Box::new(Failing)]);
        assert!(matches!(
            pipeline.run_direction(&records, Direction::Inbound),
            Err(ForecastError::NoActiveModels)
        ));
    }

    #[test]
    fn test_outbound_holidays_are_imputed() {
        let records = simulate_records(start(), 70, Direction::Outbound, 40.0, 5).unwrap();
        let calendar = HolidayCalendar::from_entries([
            (NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), "Año Nuevo"),
            (NaiveDate::from_ymd_opt(2024, 3, 29).unwrap(), "Viernes Santo"),
        ]);
        let config = EnsembleConfig {
            forecast_horizon_days: 21,
            outbound: HolidayPolicy {
                exclude_from_training: true,
                forecast_factor: 0.2,
            },
            ..config()
        };
        let pipeline = ForecastPipeline::new(config)
            .unwrap()
            .with_cutoff(NaiveDate::from_ymd_opt(2024, 3, 10))
            .with_holidays(calendar);

        let run = pipeline.run_direction(&records, Direction::Outbound).unwrap();
        assert!(run.warnings.contains(&Warning::HolidaysImputed { days: 1 }));
        let holiday = run
            .forecast
            .iter()
            .find(|p| p.is_holiday)
            .expect("Viernes Santo falls inside the horizon");
        assert_eq!(holiday.date, NaiveDate::from_ymd_opt(2024, 3, 29).unwrap());
    }

    #[test]
    fn test_records_run_carries_history_audit() {
        let records = simulate_records(start(), 60, Direction::Inbound, 80.0, 7).unwrap();
        let pipeline = ForecastPipeline::new(config())
            .unwrap()
            .with_cutoff(NaiveDate::from_ymd_opt(2024, 2, 19));

        let run = pipeline.run_direction(&records, Direction::Inbound).unwrap();
        let audit = run.audit.as_ref().unwrap();
        assert_eq!(audit.direction, Direction::Inbound);
        assert_eq!(audit.quality.total_records, records.len());
        // records after the 2024-02-19 cutoff are counted but not profiled
        assert!(audit.quality.outside_history > 0);
        let workdays = run
            .series
            .points()
            .iter()
            .filter(|p| p.date.weekday().num_days_from_monday() < 5)
            .count();
        assert_eq!(audit.volumes.workdays, workdays);
        assert!(!audit.patterns.peak_hours.is_empty());

        let rerun = pipeline.run_series(run.series.clone()).unwrap();
        assert!(rerun.audit.is_none());
    }

    #[test]
    fn test_run_all_contains_direction_failures() {
        let records = simulate_records(start(), 60, Direction::Inbound, 80.0, 6).unwrap();
        let pipeline = ForecastPipeline::new(config())
            .unwrap()
            .with_cutoff(NaiveDate::from_ymd_opt(2024, 6, 1));

        let runs = pipeline.run_all(&records);
        assert!(runs[&Direction::Inbound].is_ok());
        assert!(matches!(
            runs[&Direction::Outbound],
            Err(ForecastError::InsufficientData { .. })
        ));
    }
}
