//! Ensemble configuration
//!
//! Every field has a default, so a JSON file only needs to list the values it
//! overrides.

use crate::error::{ForecastError, Result};
use crate::models::ModelKind;
use crate::records::Direction;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Direction-dependent holiday handling. Both fields are required when a
/// policy is given in a file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HolidayPolicy {
    /// Replace holiday counts in the training series by typical weekday counts
    pub exclude_from_training: bool,
    /// Multiplier applied to forecasts that fall on a holiday
    pub forecast_factor: f64,
}

/// Configuration of one forecasting run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleConfig {
    pub forecast_horizon_days: usize,
    pub cv_horizon_days: usize,
    pub n_folds: usize,
    pub holdout_ratio: f64,
    pub min_weight: f64,
    pub max_weight: f64,
    /// Normal quantile used for the cross-model interval
    pub interval_z: f64,
    pub active_models: Vec<ModelKind>,
    pub inbound: HolidayPolicy,
    pub outbound: HolidayPolicy,
    pub min_history_days: usize,
    /// Ensemble MAE the health assessment treats as acceptable
    pub mae_target: f64,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            forecast_horizon_days: 28,
            cv_horizon_days: 7,
            n_folds: 5,
            holdout_ratio: 0.2,
            min_weight: 0.1,
            max_weight: 0.5,
            interval_z: 1.96,
            active_models: ModelKind::ALL.to_vec(),
            inbound: HolidayPolicy {
                exclude_from_training: false,
                forecast_factor: 0.6,
            },
            outbound: HolidayPolicy {
                exclude_from_training: true,
                forecast_factor: 0.2,
            },
            min_history_days: 10,
            mae_target: 15.0,
        }
    }
}

impl EnsembleConfig {
    /// Load a configuration file, filling missing fields with defaults
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Holiday policy of a direction
    pub fn holiday_policy(&self, direction: Direction) -> HolidayPolicy {
        match direction {
            Direction::Inbound => self.inbound,
            Direction::Outbound => self.outbound,
        }
    }

    /// Interval quantile for a two-sided confidence level
    pub fn with_confidence(mut self, level: f64) -> Result<Self> {
        use statrs::distribution::{ContinuousCDF, Normal};

        if level <= 0.0 || level >= 1.0 {
            return Err(ForecastError::InvalidParameter(format!(
                "Confidence level must be between 0 and 1, got {}",
                level
            )));
        }
        let normal = Normal::new(0.0, 1.0)
            .map_err(|e| ForecastError::InvalidParameter(e.to_string()))?;
        self.interval_z = normal.inverse_cdf(0.5 + level / 2.0);
        Ok(self)
    }

    /// Reject inconsistent settings
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(ForecastError::InvalidParameter(msg));

        if self.forecast_horizon_days == 0 {
            return invalid("forecast_horizon_days must be positive".to_string());
        }
        if self.cv_horizon_days == 0 || self.n_folds == 0 {
            return invalid("cv_horizon_days and n_folds must be positive".to_string());
        }
        if !(0.0..1.0).contains(&self.holdout_ratio) {
            return invalid(format!("holdout_ratio must be in [0, 1), got {}", self.holdout_ratio));
        }
        if !(0.0..=1.0).contains(&self.min_weight)
            || !(0.0..=1.0).contains(&self.max_weight)
            || self.min_weight > self.max_weight
        {
            return invalid(format!(
                "weight bounds must satisfy 0 <= min <= max <= 1, got [{}, {}]",
                self.min_weight, self.max_weight
            ));
        }
        if !(self.interval_z.is_finite() && self.interval_z >= 0.0) {
            return invalid(format!("interval_z must be non-negative, got {}", self.interval_z));
        }
        if self.active_models.is_empty() {
            return invalid("active_models must name at least one model".to_string());
        }
        for (name, policy) in [("inbound", &self.inbound), ("outbound", &self.outbound)] {
            if !(0.0..=1.0).contains(&policy.forecast_factor) {
                return invalid(format!(
                    "{} holiday forecast_factor must be in [0, 1], got {}",
                    name, policy.forecast_factor
                ));
            }
        }
        if self.min_history_days == 0 {
            return invalid("min_history_days must be positive".to_string());
        }
        if !(self.mae_target.is_finite() && self.mae_target > 0.0) {
            return invalid(format!("mae_target must be positive, got {}", self.mae_target));
        }
        Ok(())
    }
}
