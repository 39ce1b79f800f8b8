//! Feature engineering for the tree-ensemble models
//!
//! Every feature of row `i` is computed from values strictly before `i`,
//! except the centred z-score, which is kept as a diagnostic and never fed to
//! a model.

use crate::error::{ForecastError, Result};
use crate::series::DailySeries;
use call_math::regression;
use call_math::rolling::{centered_window_stats, preceding_window_stats, WindowStats};
use call_math::statistics;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Lag offsets in days
pub const LAGS: [usize; 5] = [1, 2, 3, 7, 14];

/// Rolling window lengths in days
pub const ROLLING_WINDOWS: [usize; 3] = [3, 7, 14];

/// Length of the window the short-horizon trend slope is fitted on
pub const TREND_WINDOW: usize = 7;

/// Length of the centred window used for outlier z-scores
pub const OUTLIER_WINDOW: usize = 14;

/// Absolute z-score above which a day is flagged as an outlier
pub const OUTLIER_Z: f64 = 2.0;

/// Leading rows dropped because their lookback is incomplete
pub const MAX_LOOKBACK: usize = 14;

/// Names of the values returned by [`FeatureRow::inputs`], in order
pub const INPUT_NAMES: [&str; 22] = [
    "weekday",
    "day_of_month",
    "iso_week",
    "month",
    "quarter",
    "is_weekend",
    "weekday_sin",
    "weekday_cos",
    "month_sin",
    "month_cos",
    "lag_1",
    "lag_2",
    "lag_3",
    "lag_7",
    "lag_14",
    "rolling_mean_3",
    "rolling_mean_7",
    "rolling_mean_14",
    "rolling_std_3",
    "rolling_std_7",
    "rolling_std_14",
    "trend_7",
];

/// Calendar and cyclical encodings of one date
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalendarFeatures {
    /// 0 = Monday
    pub weekday: u32,
    pub day_of_month: u32,
    pub iso_week: u32,
    pub month: u32,
    pub quarter: u32,
    pub is_weekend: bool,
    pub weekday_sin: f64,
    pub weekday_cos: f64,
    pub month_sin: f64,
    pub month_cos: f64,
}

impl CalendarFeatures {
    pub fn from_date(date: NaiveDate) -> Self {
        let weekday = date.weekday().num_days_from_monday();
        let month = date.month();
        let weekday_angle = 2.0 * PI * weekday as f64 / 7.0;
        let month_angle = 2.0 * PI * month as f64 / 12.0;

        Self {
            weekday,
            day_of_month: date.day(),
            iso_week: date.iso_week().week(),
            month,
            quarter: (month - 1) / 3 + 1,
            is_weekend: weekday >= 5,
            weekday_sin: weekday_angle.sin(),
            weekday_cos: weekday_angle.cos(),
            month_sin: month_angle.sin(),
            month_cos: month_angle.cos(),
        }
    }

    fn push_inputs(&self, out: &mut Vec<f64>) {
        out.extend_from_slice(&[
            self.weekday as f64,
            self.day_of_month as f64,
            self.iso_week as f64,
            self.month as f64,
            self.quarter as f64,
            if self.is_weekend { 1.0 } else { 0.0 },
            self.weekday_sin,
            self.weekday_cos,
            self.month_sin,
            self.month_cos,
        ]);
    }
}

/// Lookback features: lags, rolling statistics and trend
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LookbackFeatures {
    /// Values at [`LAGS`] days back
    pub lags: [f64; 5],
    /// Means over the [`ROLLING_WINDOWS`] preceding days
    pub rolling_mean: [f64; 3],
    /// Sample standard deviations over the [`ROLLING_WINDOWS`] preceding days
    pub rolling_std: [f64; 3],
    /// Least-squares slope over the preceding [`TREND_WINDOW`] days
    pub trend: f64,
}

impl LookbackFeatures {
    fn push_inputs(&self, out: &mut Vec<f64>) {
        out.extend_from_slice(&self.lags);
        out.extend_from_slice(&self.rolling_mean);
        out.extend_from_slice(&self.rolling_std);
        out.push(self.trend);
    }
}

/// One engineered row of a daily series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub date: NaiveDate,
    /// Observed call count, the regression target
    pub target: f64,
    pub calendar: CalendarFeatures,
    pub lookback: LookbackFeatures,
    /// Z-score against a centred 14-day window
    pub z_score: f64,
    pub is_outlier: bool,
}

impl FeatureRow {
    /// Model input vector, ordered as [`INPUT_NAMES`]
    pub fn inputs(&self) -> Vec<f64> {
        model_inputs(&self.calendar, &self.lookback)
    }
}

fn model_inputs(calendar: &CalendarFeatures, lookback: &LookbackFeatures) -> Vec<f64> {
    let mut out = Vec::with_capacity(INPUT_NAMES.len());
    calendar.push_inputs(&mut out);
    lookback.push_inputs(&mut out);
    out
}

/// Turns a daily series into feature rows
#[derive(Debug, Clone)]
pub struct FeatureEngineer {
    min_rows: usize,
}

impl Default for FeatureEngineer {
    fn default() -> Self {
        Self { min_rows: 10 }
    }
}

impl FeatureEngineer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_min_rows(mut self, min_rows: usize) -> Self {
        self.min_rows = min_rows;
        self
    }

    /// Engineer one row per day after the first [`MAX_LOOKBACK`] days
    pub fn transform(&self, series: &DailySeries) -> Result<Vec<FeatureRow>> {
        let available = series.len().saturating_sub(MAX_LOOKBACK);
        if available < self.min_rows {
            return Err(ForecastError::InsufficientData {
                stage: "feature engineering",
                available,
                required: self.min_rows,
            });
        }

        let values = series.values();
        let dates = series.dates();

        let rolling = ROLLING_WINDOWS
            .iter()
            .map(|&w| preceding_window_stats(&values, w))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let centered = centered_window_stats(&values, OUTLIER_WINDOW)?;

        let mut rows = Vec::with_capacity(available);
        for i in MAX_LOOKBACK..values.len() {
            let mut lags = [0.0; 5];
            for (slot, &lag) in lags.iter_mut().zip(LAGS.iter()) {
                *slot = values[i - lag];
            }

            let mut rolling_mean = [0.0; 3];
            let mut rolling_std = [0.0; 3];
            for (j, stats) in rolling.iter().enumerate() {
                let WindowStats { mean, std_dev } = stats[i].ok_or_else(|| {
                    ForecastError::DataError(format!("Missing rolling window at row {}", i))
                })?;
                rolling_mean[j] = mean;
                rolling_std[j] = std_dev;
            }

            let trend = regression::slope(&values[i - TREND_WINDOW..i])?;

            let z_score = centered[i]
                .map(|s| statistics::z_score(values[i], s.mean, s.std_dev))
                .unwrap_or(0.0);

            rows.push(FeatureRow {
                date: dates[i],
                target: values[i],
                calendar: CalendarFeatures::from_date(dates[i]),
                lookback: LookbackFeatures {
                    lags,
                    rolling_mean,
                    rolling_std,
                    trend,
                },
                z_score,
                is_outlier: z_score.abs() > OUTLIER_Z,
            });
        }

        Ok(rows)
    }

    /// Estimate model inputs for dates after the end of `history`.
    ///
    /// Lags that fall inside the history use the observed value; lags that
    /// land on unknown days use the most recent known value of the same
    /// weekday. Rolling statistics and trend come from the tail of the
    /// history. No forecast is fed back into later steps.
    pub fn future_inputs(
        &self,
        history: &[f64],
        last_date: NaiveDate,
        dates: &[NaiveDate],
    ) -> Result<Vec<Vec<f64>>> {
        if history.len() < MAX_LOOKBACK {
            return Err(ForecastError::InsufficientData {
                stage: "future feature estimation",
                available: history.len(),
                required: MAX_LOOKBACK,
            });
        }

        let lookback = tail_lookback(history)?;
        let n = history.len() as i64;

        Ok(dates
            .iter()
            .map(|&date| {
                let position = n - 1 + (date - last_date).num_days();
                let mut lookback = lookback;
                for (slot, &lag) in lookback.lags.iter_mut().zip(LAGS.iter()) {
                    *slot = known_value(history, position - lag as i64);
                }
                model_inputs(&CalendarFeatures::from_date(date), &lookback)
            })
            .collect())
    }
}

/// Rolling statistics and trend over the last days of the history
fn tail_lookback(history: &[f64]) -> Result<LookbackFeatures> {
    let n = history.len();
    let mut rolling_mean = [0.0; 3];
    let mut rolling_std = [0.0; 3];
    for (j, &w) in ROLLING_WINDOWS.iter().enumerate() {
        let (mean, std) = statistics::mean_and_std(&history[n - w..])?;
        rolling_mean[j] = mean;
        rolling_std[j] = std;
    }

    Ok(LookbackFeatures {
        lags: [0.0; 5],
        rolling_mean,
        rolling_std,
        trend: regression::slope(&history[n - TREND_WINDOW..])?,
    })
}

/// Value at `position`, stepping back whole weeks until it is observed
fn known_value(history: &[f64], mut position: i64) -> f64 {
    let n = history.len() as i64;
    while position >= n {
        position -= 7;
    }
    if position < 0 {
        return history.last().copied().unwrap_or(0.0);
    }
    history[position as usize]
}
