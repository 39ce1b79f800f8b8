//! Decomposable trend + weekly seasonality model
//!
//! `y(t) = trend(t) + weekly(t) + day_type(t)`, where the trend is piecewise
//! linear with hinge changepoints in the first part of the history, the
//! weekly term is a Fourier series and the day-type regressors mark the start
//! of the month and the week of the month. All terms are fitted jointly by
//! ridge-penalised least squares on the scaled target.

use crate::error::{ForecastError, Result};
use crate::models::{FittedModel, ModelKind, ModelTrainer};
use crate::series::DailySeries;
use call_math::regression::{least_squares, predict_row};
use chrono::{Datelike, NaiveDate};
use serde_json::json;
use std::f64::consts::PI;
use tracing::debug;

/// Decomposable model trainer
#[derive(Debug, Clone)]
pub struct DecomposableTrainer {
    n_changepoints: usize,
    changepoint_range: f64,
    weekly_order: usize,
    changepoint_penalty: f64,
    seasonality_penalty: f64,
    day_type_regressors: bool,
}

impl Default for DecomposableTrainer {
    fn default() -> Self {
        Self {
            n_changepoints: 10,
            changepoint_range: 0.8,
            weekly_order: 3,
            changepoint_penalty: 1.0,
            seasonality_penalty: 0.01,
            day_type_regressors: true,
        }
    }
}

impl DecomposableTrainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_changepoints(mut self, n: usize) -> Self {
        self.n_changepoints = n;
        self
    }

    pub fn with_weekly_order(mut self, order: usize) -> Self {
        self.weekly_order = order;
        self
    }

    /// Leave out the start-of-month and week-of-month regressors
    pub fn without_day_type_regressors(mut self) -> Self {
        self.day_type_regressors = false;
        self
    }

    /// Hinge locations in scaled time, evenly spread over the first
    /// `changepoint_range` of the history, one per two weeks at most
    fn changepoints(&self, n: usize) -> Vec<f64> {
        let count = self.n_changepoints.min(n / 14);
        (1..=count)
            .map(|j| self.changepoint_range * j as f64 / (count + 1) as f64)
            .collect()
    }
}

impl ModelTrainer for DecomposableTrainer {
    fn kind(&self) -> ModelKind {
        ModelKind::Decomposable
    }

    fn min_window(&self) -> usize {
        14
    }

    fn fit_window(&self, window: &DailySeries) -> Result<Box<dyn FittedModel>> {
        let (first_date, last_date) = match (window.first_date(), window.last_date()) {
            (Some(first), Some(last)) => (first, last),
            _ => return Err(ForecastError::model_fit(ModelKind::Decomposable, "empty training window")),
        };
        if window.len() < self.min_window() {
            return Err(ForecastError::model_fit(
                ModelKind::Decomposable,
                format!("needs at least {} days, have {}", self.min_window(), window.len()),
            ));
        }

        let values = window.values();
        let y_scale = values.iter().fold(0.0f64, |m, v| m.max(v.abs()));
        let y_scale = if y_scale > 0.0 { y_scale } else { 1.0 };
        let target: Vec<f64> = values.iter().map(|v| v / y_scale).collect();

        let design = Design {
            start: first_date,
            span_days: (window.len() - 1).max(1) as f64,
            changepoints: self.changepoints(window.len()),
            weekly_order: self.weekly_order,
            day_type_regressors: self.day_type_regressors,
        };

        let rows: Vec<Vec<f64>> = window.dates().into_iter().map(|d| design.row(d)).collect();
        let penalties = design.penalties(self.changepoint_penalty, self.seasonality_penalty);
        let coefficients = least_squares(&rows, &target, &penalties)
            .map_err(|e| ForecastError::model_fit(ModelKind::Decomposable, e))?;

        let sse: f64 = rows
            .iter()
            .zip(&target)
            .map(|(row, y)| (y - predict_row(&coefficients, row)).powi(2))
            .sum();
        let sigma = (sse / rows.len() as f64).sqrt() * y_scale;

        debug!(
            changepoints = design.changepoints.len(),
            coefficients = coefficients.len(),
            sigma,
            "fitted decomposable model"
        );

        Ok(Box::new(DecomposableModel {
            design,
            coefficients,
            y_scale,
            sigma,
            last_date,
        }))
    }
}

/// Column layout of the regression
#[derive(Debug, Clone)]
struct Design {
    start: NaiveDate,
    span_days: f64,
    changepoints: Vec<f64>,
    weekly_order: usize,
    day_type_regressors: bool,
}

impl Design {
    fn row(&self, date: NaiveDate) -> Vec<f64> {
        let t = (date - self.start).num_days() as f64 / self.span_days;
        let mut row = vec![1.0, t];
        row.extend(self.changepoints.iter().map(|&c| (t - c).max(0.0)));

        // Absolute day number keeps the weekly phase independent of the window start
        let day = date.num_days_from_ce() as f64;
        for k in 1..=self.weekly_order {
            let angle = 2.0 * PI * k as f64 * day / 7.0;
            row.push(angle.sin());
            row.push(angle.cos());
        }

        if self.day_type_regressors {
            row.push(if date.day() <= 5 { 1.0 } else { 0.0 });
            row.push(((date.day() - 1) / 7 + 1) as f64);
        }
        row
    }

    fn penalties(&self, changepoint: f64, seasonality: f64) -> Vec<f64> {
        let mut penalties = vec![0.0, 0.0];
        penalties.extend(std::iter::repeat(changepoint).take(self.changepoints.len()));
        penalties.extend(std::iter::repeat(seasonality).take(2 * self.weekly_order));
        if self.day_type_regressors {
            penalties.extend([seasonality, seasonality]);
        }
        penalties
    }
}

/// A fitted decomposable model
#[derive(Debug, Clone)]
pub struct DecomposableModel {
    design: Design,
    coefficients: Vec<f64>,
    y_scale: f64,
    sigma: f64,
    last_date: NaiveDate,
}

impl DecomposableModel {
    /// Residual standard deviation on the training window
    pub fn sigma(&self) -> f64 {
        self.sigma
    }
}

impl FittedModel for DecomposableModel {
    fn predict_dates(&self, dates: &[NaiveDate]) -> Result<Vec<f64>> {
        Ok(dates
            .iter()
            .map(|&d| predict_row(&self.coefficients, &self.design.row(d)) * self.y_scale)
            .collect())
    }

    fn params(&self) -> serde_json::Value {
        let n_cp = self.design.changepoints.len();
        json!({
            "intercept": self.coefficients.first().copied().unwrap_or(0.0) * self.y_scale,
            "slope": self.coefficients.get(1).copied().unwrap_or(0.0) * self.y_scale,
            "changepoints": self.design.changepoints,
            "changepoint_deltas": self.coefficients.iter().skip(2).take(n_cp).map(|c| c * self.y_scale).collect::<Vec<_>>(),
            "weekly_order": self.design.weekly_order,
            "day_type_regressors": self.design.day_type_regressors,
            "sigma": self.sigma,
            "trained_until": self.last_date,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::Direction;
    use chrono::Duration;

    fn weekly_series(days: usize) -> (DailySeries, impl Fn(usize) -> f64) {
        let pattern = [30.0, 10.0, 5.0, 0.0, -5.0, -15.0, -25.0];
        let truth = move |i: usize| 200.0 + 0.5 * i as f64 + pattern[i % 7];
        let counts: Vec<u32> = (0..days).map(|i| truth(i).round() as u32).collect();
        // 2024-01-01 is a Monday
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        (DailySeries::from_counts(Direction::Inbound, start, &counts), truth)
    }

    #[test]
    fn test_changepoints_stay_in_range() {
        let trainer = DecomposableTrainer::default();
        assert!(trainer.changepoints(20).len() == 1);
        let cps = trainer.changepoints(365);
        assert_eq!(cps.len(), 10);
        assert!(cps.iter().all(|&c| c > 0.0 && c < 0.8));
    }

    #[test]
    fn test_recovers_trend_and_weekly_pattern() {
        let (series, truth) = weekly_series(84);
        let model = DecomposableTrainer::default().fit_window(&series).unwrap();
        let last = series.last_date().unwrap();
        let dates: Vec<NaiveDate> = (1..=7).map(|h| last + Duration::days(h)).collect();
        let predicted = model.predict_dates(&dates).unwrap();

        for (h, p) in predicted.iter().enumerate() {
            let expected = truth(84 + h);
            assert!(
                (p - expected).abs() / expected < 0.05,
                "day {}: predicted {} expected {}",
                h,
                p,
                expected
            );
        }
    }

    #[test]
    fn test_short_window_is_rejected() {
        let (series, _) = weekly_series(10);
        assert!(DecomposableTrainer::default().fit_window(&series).is_err());
    }
}
