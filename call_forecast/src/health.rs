//! Health assessment of a completed run
//!
//! Scores the ensemble against its accuracy target and checks weight
//! balance, error stability across models and basic forecast sanity.

use crate::ensemble::EnsembleWeights;
use crate::forecast::ForecastPoint;
use crate::models::ModelHandle;
use crate::pipeline::DirectionRun;
use crate::records::Direction;
use serde::{Deserialize, Serialize};
use tracing::info;

const MIN_MODELS: usize = 3;
const MIN_FORECAST_DAYS: usize = 20;

/// How evenly the ensemble spreads its weight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceStatus {
    WellBalanced,
    ModeratelyBalanced,
    Unbalanced,
    NoData,
}

/// How similar the model errors are
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StabilityStatus {
    Stable,
    ModeratelyStable,
    Unstable,
    NoMetrics,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityStatus {
    Good,
    Fair,
    Poor,
    NoForecast,
}

/// Overall verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Excellent,
    Good,
    NeedsAttention,
    Critical,
}

impl HealthStatus {
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            HealthStatus::Excellent
        } else if score >= 60.0 {
            HealthStatus::Good
        } else if score >= 40.0 {
            HealthStatus::NeedsAttention
        } else {
            HealthStatus::Critical
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub status: BalanceStatus,
    pub score: f64,
    pub dominant_weight: f64,
}

impl Balance {
    pub fn assess(weights: &EnsembleWeights) -> Self {
        let dominant_weight = weights.max_weight();
        let (status, score) = if weights.is_empty() {
            (BalanceStatus::NoData, 0.0)
        } else if dominant_weight > 0.7 {
            (BalanceStatus::Unbalanced, 30.0)
        } else if dominant_weight > 0.5 {
            (BalanceStatus::ModeratelyBalanced, 70.0)
        } else {
            (BalanceStatus::WellBalanced, 90.0)
        };
        Self {
            status,
            score,
            dominant_weight,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Stability {
    pub status: StabilityStatus,
    pub score: f64,
    /// Coefficient of variation of the model MAEs
    pub variability: Option<f64>,
}

impl Stability {
    /// Judge the spread of positive, finite MAEs
    pub fn assess(maes: &[f64]) -> Self {
        let maes: Vec<f64> = maes.iter().copied().filter(|m| m.is_finite() && *m > 0.0).collect();
        let Ok((mean, _)) = call_math::statistics::mean_and_std(&maes) else {
            return Self {
                status: StabilityStatus::NoMetrics,
                score: 0.0,
                variability: None,
            };
        };
        let std = call_math::statistics::population_std_dev(&maes).unwrap_or(0.0);
        let variability = std / mean;
        let (status, score) = if variability < 0.2 {
            (StabilityStatus::Stable, 90.0)
        } else if variability < 0.5 {
            (StabilityStatus::ModeratelyStable, 70.0)
        } else {
            (StabilityStatus::Unstable, 30.0)
        };
        Self {
            status,
            score,
            variability: Some(variability),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastQuality {
    pub status: QualityStatus,
    pub score: f64,
    pub complete: bool,
    /// Coefficient of variation of the ensemble below 1
    pub consistent: bool,
    pub non_negative: bool,
    pub intervals_consistent: bool,
}

impl ForecastQuality {
    pub fn assess(points: &[ForecastPoint]) -> Self {
        if points.is_empty() {
            return Self {
                status: QualityStatus::NoForecast,
                score: 0.0,
                complete: false,
                consistent: false,
                non_negative: false,
                intervals_consistent: false,
            };
        }

        let values: Vec<f64> = points.iter().map(|p| p.yhat_ensemble).collect();
        let consistent = match call_math::statistics::mean_and_std(&values) {
            Ok((mean, std)) if mean > 0.0 => std / mean < 1.0,
            _ => false,
        };
        let checks = [
            points.len() >= MIN_FORECAST_DAYS,
            consistent,
            values.iter().all(|v| *v >= 0.0),
            points
                .iter()
                .all(|p| p.yhat_lower <= p.yhat_ensemble && p.yhat_ensemble <= p.yhat_upper),
        ];
        let score = share_passed(&checks);
        let status = if score >= 75.0 {
            QualityStatus::Good
        } else if score >= 50.0 {
            QualityStatus::Fair
        } else {
            QualityStatus::Poor
        };
        Self {
            status,
            score,
            complete: checks[0],
            consistent: checks[1],
            non_negative: checks[2],
            intervals_consistent: checks[3],
        }
    }
}

fn share_passed(checks: &[bool]) -> f64 {
    checks.iter().filter(|c| **c).count() as f64 / checks.len() as f64 * 100.0
}

/// Health of one direction's run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthAssessment {
    pub direction: Direction,
    /// Weight-averaged MAE of the active models, None without usable errors
    pub ensemble_mae: Option<f64>,
    pub active_models: usize,
    pub mae_within_target: bool,
    pub enough_models: bool,
    pub forecast_complete: bool,
    /// Share of objectives met, in percent
    pub score: f64,
    pub status: HealthStatus,
    pub balance: Balance,
    pub stability: Stability,
    pub quality: ForecastQuality,
}

impl HealthAssessment {
    pub fn assess(run: &DirectionRun, mae_target: f64) -> Self {
        let ensemble_mae = weighted_mae(&run.handles, &run.weights);
        let mae_within_target = ensemble_mae.map_or(false, |mae| mae <= mae_target);
        let enough_models = run.weights.len() >= MIN_MODELS;
        let forecast_complete = run.forecast.len() >= MIN_FORECAST_DAYS;
        let score = share_passed(&[mae_within_target, enough_models, forecast_complete]);

        let maes: Vec<f64> = run.handles.iter().map(|h| h.cv_mae).collect();
        let assessment = Self {
            direction: run.direction,
            ensemble_mae,
            active_models: run.weights.len(),
            mae_within_target,
            enough_models,
            forecast_complete,
            score,
            status: HealthStatus::from_score(score),
            balance: Balance::assess(&run.weights),
            stability: Stability::assess(&maes),
            quality: ForecastQuality::assess(&run.forecast),
        };

        info!(
            direction = %run.direction,
            mae = assessment.ensemble_mae.unwrap_or(f64::INFINITY),
            score = assessment.score,
            status = ?assessment.status,
            "assessed run health"
        );
        assessment
    }
}

/// Mean of the per-model MAEs weighted by ensemble weight
pub fn weighted_mae(handles: &[ModelHandle], weights: &EnsembleWeights) -> Option<f64> {
    let (sum, weight_sum) = handles
        .iter()
        .filter(|h| h.cv_mae.is_finite() && h.cv_mae > 0.0)
        .filter_map(|h| weights.get(h.kind).map(|w| (h.cv_mae * w, w)))
        .fold((0.0, 0.0), |(s, ws), (v, w)| (s + v, ws + w));
    (weight_sum > 0.0).then(|| sum / weight_sum)
}

/// Mean score over several directions, with its status
pub fn overall(assessments: &[HealthAssessment]) -> Option<(f64, HealthStatus)> {
    if assessments.is_empty() {
        return None;
    }
    let score = assessments.iter().map(|a| a.score).sum::<f64>() / assessments.len() as f64;
    Some((score, HealthStatus::from_score(score)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModelKind;
    use approx::assert_relative_eq;
    use chrono::{Duration, NaiveDate};
    use std::collections::BTreeMap;

    fn points(values: &[f64]) -> Vec<ForecastPoint> {
        let start = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| ForecastPoint {
                date: start + Duration::days(i as i64),
                yhat_ensemble: v,
                yhat_lower: v * 0.9,
                yhat_upper: v * 1.1,
                yhat_std: v * 0.05,
                is_holiday: false,
                holiday_category: None,
                model_predictions: BTreeMap::new(),
            })
            .collect()
    }

    #[test]
    fn test_status_boundaries() {
        assert_eq!(HealthStatus::from_score(80.0), HealthStatus::Excellent);
        assert_eq!(HealthStatus::from_score(66.7), HealthStatus::Good);
        assert_eq!(HealthStatus::from_score(40.0), HealthStatus::NeedsAttention);
        assert_eq!(HealthStatus::from_score(33.3), HealthStatus::Critical);
    }

    #[test]
    fn test_balance() {
        let weights: EnsembleWeights = [(ModelKind::Arima, 0.75), (ModelKind::RandomForest, 0.25)]
            .into_iter()
            .collect::<BTreeMap<_, _>>()
            .into();
        assert_eq!(Balance::assess(&weights).status, BalanceStatus::Unbalanced);
        assert_eq!(Balance::assess(&EnsembleWeights::default()).status, BalanceStatus::NoData);
    }

    #[test]
    fn test_stability() {
        assert_eq!(Stability::assess(&[10.0, 10.5, 9.5]).status, StabilityStatus::Stable);
        let unstable = Stability::assess(&[1.0, 10.0, f64::NAN]);
        assert_eq!(unstable.status, StabilityStatus::Unstable);
        assert_relative_eq!(unstable.variability.unwrap(), 4.5 / 5.5, epsilon = 1e-12);
        assert_eq!(Stability::assess(&[]).status, StabilityStatus::NoMetrics);
    }

    #[test]
    fn test_forecast_quality() {
        let good = ForecastQuality::assess(&points(&[100.0; 28]));
        assert_eq!(good.status, QualityStatus::Good);
        assert_relative_eq!(good.score, 100.0);

        let short = ForecastQuality::assess(&points(&[100.0; 7]));
        assert!(!short.complete);
        assert_relative_eq!(short.score, 75.0);
    }
}
