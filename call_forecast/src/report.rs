//! Run report export
//!
//! A report bundles metadata, configuration, weights, per-model diagnostics,
//! the forecast, alerts, warnings, summary statistics and the history audit.
//! It is written as pretty JSON next to a `date,forecast,lower,upper` CSV of the forecast.

use crate::alerts::{Alert, Severity};
use crate::audit::DataAudit;
use crate::config::EnsembleConfig;
use crate::ensemble::EnsembleWeights;
use crate::error::{ForecastError, Result, Warning};
use crate::forecast::ForecastPoint;
use crate::health::HealthAssessment;
use crate::models::ModelKind;
use crate::pipeline::DirectionRun;
use crate::records::Direction;
use crate::validation::FoldPlan;
use call_math::statistics;
use chrono::{Local, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Serialize)]
pub struct RunMetadata {
    pub generated_at: NaiveDateTime,
    pub direction: Direction,
    pub system: &'static str,
    pub models: Vec<ModelKind>,
    pub horizon_days: usize,
    pub forecast_start: Option<NaiveDate>,
    pub forecast_end: Option<NaiveDate>,
    pub history_start: Option<NaiveDate>,
    pub history_end: Option<NaiveDate>,
}

/// Everything known about one model after the run
#[derive(Debug, Clone, Serialize)]
pub struct ModelDiagnostics {
    pub model: ModelKind,
    pub weight: f64,
    pub cv_mae: f64,
    pub cv_rmse: f64,
    pub mape_cv: Option<f64>,
    pub n_predictions: usize,
    pub folds_scored: usize,
    pub training_horizon: usize,
    pub trained_until: NaiveDate,
    pub fitted_params: serde_json::Value,
}

/// Summary statistics of the ensemble forecast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastSummary {
    pub mean_daily: f64,
    pub max_day: f64,
    pub min_day: f64,
    pub std_dev: f64,
    pub total_calls: f64,
    /// Weekday and date of the busiest forecast day
    pub peak_day: Option<String>,
    pub critical_alerts: usize,
    pub high_alerts: usize,
}

impl ForecastSummary {
    pub fn from_forecast(points: &[ForecastPoint], alerts: &[Alert]) -> Result<Self> {
        let values: Vec<f64> = points.iter().map(|p| p.yhat_ensemble).collect();
        let (mean_daily, std_dev) = statistics::mean_and_std(&values)?;
        let peak = points
            .iter()
            .max_by(|a, b| a.yhat_ensemble.total_cmp(&b.yhat_ensemble));

        Ok(Self {
            mean_daily,
            max_day: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            min_day: values.iter().copied().fold(f64::INFINITY, f64::min),
            std_dev,
            total_calls: values.iter().sum(),
            peak_day: peak.map(|p| p.date.format("%A %Y-%m-%d").to_string()),
            critical_alerts: alerts.iter().filter(|a| a.severity == Severity::Critica).count(),
            high_alerts: alerts.iter().filter(|a| a.severity == Severity::Alta).count(),
        })
    }
}

/// Serializable record of one direction's run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub metadata: RunMetadata,
    pub config: EnsembleConfig,
    pub weights: EnsembleWeights,
    pub models: Vec<ModelDiagnostics>,
    pub folds: Vec<FoldPlan>,
    pub forecast: Vec<ForecastPoint>,
    pub alerts: Vec<Alert>,
    pub warnings: Vec<Warning>,
    pub summary: ForecastSummary,
    pub health: HealthAssessment,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit: Option<DataAudit>,
}

/// Paths written by [`RunReport::write_to_dir`]
#[derive(Debug, Clone)]
pub struct ReportFiles {
    pub json: PathBuf,
    pub csv: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastCsvRow {
    pub date: NaiveDate,
    pub forecast: f64,
    pub lower: f64,
    pub upper: f64,
}

impl RunReport {
    pub fn from_run(run: &DirectionRun, config: &EnsembleConfig) -> Result<Self> {
        if run.forecast.is_empty() {
            return Err(ForecastError::DataError(format!(
                "No forecast to report for {}",
                run.direction
            )));
        }

        let models = run
            .handles
            .iter()
            .map(|h| {
                let cv = run.cv.metrics.get(&h.kind);
                ModelDiagnostics {
                    model: h.kind,
                    weight: run.weights.get(h.kind).unwrap_or(0.0),
                    cv_mae: h.cv_mae,
                    cv_rmse: h.cv_rmse,
                    mape_cv: cv.and_then(|m| m.mape_cv),
                    n_predictions: cv.map_or(0, |m| m.n_predictions),
                    folds_scored: cv.map_or(0, |m| m.folds_scored),
                    training_horizon: h.training_horizon,
                    trained_until: h.trained_until,
                    fitted_params: h.fitted_params.clone(),
                }
            })
            .collect();

        Ok(Self {
            metadata: RunMetadata {
                generated_at: Local::now().naive_local(),
                direction: run.direction,
                system: "multi_model_ensemble",
                models: run.weights.iter().map(|(k, _)| k).collect(),
                horizon_days: run.forecast.len(),
                forecast_start: run.forecast.first().map(|p| p.date),
                forecast_end: run.forecast.last().map(|p| p.date),
                history_start: run.series.first_date(),
                history_end: run.series.last_date(),
            },
            config: config.clone(),
            weights: run.weights.clone(),
            models,
            folds: run.cv.folds.clone(),
            forecast: run.forecast.clone(),
            alerts: run.alerts.clone(),
            warnings: run.warnings.clone(),
            summary: ForecastSummary::from_forecast(&run.forecast, &run.alerts)?,
            health: HealthAssessment::assess(run, config.mae_target),
            audit: run.audit.clone(),
        })
    }

    /// Rows of the forecast CSV
    pub fn csv_rows(&self) -> Vec<ForecastCsvRow> {
        self.forecast
            .iter()
            .map(|p| ForecastCsvRow {
                date: p.date,
                forecast: p.yhat_ensemble,
                lower: p.yhat_lower,
                upper: p.yhat_upper,
            })
            .collect()
    }

    /// Write the JSON report and forecast CSV, creating the directory if needed
    pub fn write_to_dir<P: AsRef<Path>>(&self, dir: P) -> Result<ReportFiles> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let stem = format!(
            "forecast_{}_{}",
            self.metadata.direction,
            self.metadata.generated_at.format("%Y%m%d_%H%M%S")
        );
        let json = dir.join(format!("{}.json", stem));
        let csv = dir.join(format!("{}.csv", stem));

        let writer = BufWriter::new(File::create(&json)?);
        serde_json::to_writer_pretty(writer, self)?;

        let mut writer = csv::Writer::from_path(&csv)?;
        for row in self.csv_rows() {
            writer.serialize(row)?;
        }
        writer.flush()?;

        info!(json = %json.display(), csv = %csv.display(), "wrote run report");
        Ok(ReportFiles { json, csv })
    }
}

/// Read a forecast CSV written by [`RunReport::write_to_dir`]
pub fn read_forecast_csv<P: AsRef<Path>>(path: P) -> Result<Vec<ForecastCsvRow>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut rows = Vec::new();
    for row in reader.deserialize() {
        rows.push(row?);
    }
    Ok(rows)
}
