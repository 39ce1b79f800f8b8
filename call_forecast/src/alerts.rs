//! Operational alerts derived from a completed forecast
//!
//! Thresholds come from the historical series: `mean + 2.5σ` is critical,
//! `mean + 1.5σ` is high and `mean - 1.5σ` is low, with σ the sample
//! standard deviation. Detection never modifies the forecast.

use crate::error::Result;
use crate::forecast::ForecastPoint;
use crate::series::DailySeries;
use call_math::statistics;
use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

const CRITICAL_SIGMAS: f64 = 2.5;
const HIGH_SIGMAS: f64 = 1.5;
const LOW_SIGMAS: f64 = 1.5;
/// Cross-model spread, as a share of the prediction, that counts as uncertain
const UNCERTAINTY_SHARE: f64 = 0.3;
const MONDAY_FACTOR: f64 = 1.3;
const TREND_POINTS: usize = 5;

/// Alert severity, most urgent first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Critica,
    Alta,
    Media,
    Baja,
}

impl Severity {
    /// Sort rank, 0 for the most urgent
    pub fn rank(&self) -> u8 {
        *self as u8
    }

    pub fn label(&self) -> &'static str {
        match self {
            Severity::Critica => "CRITICA",
            Severity::Alta => "ALTA",
            Severity::Media => "MEDIA",
            Severity::Baja => "BAJA",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// What an alert was raised for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertKind {
    DemandaExtrema,
    DemandaAlta,
    DemandaBaja,
    AltaIncertidumbre,
    LunesAlto,
    TendenciaCreciente,
}

impl AlertKind {
    /// Severity every alert of this kind carries
    pub fn severity(&self) -> Severity {
        match self {
            AlertKind::DemandaExtrema => Severity::Critica,
            AlertKind::DemandaAlta | AlertKind::LunesAlto => Severity::Alta,
            AlertKind::DemandaBaja | AlertKind::AltaIncertidumbre | AlertKind::TendenciaCreciente => {
                Severity::Media
            }
        }
    }
}

/// One ranked alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    #[serde(rename = "type")]
    pub kind: AlertKind,
    pub severity: Severity,
    pub date: NaiveDate,
    pub predicted_value: f64,
    /// Threshold that was crossed, for threshold alerts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    pub message: String,
    pub recommended_action: String,
    /// In `[0, 1]`
    pub confidence: f64,
}

impl Alert {
    fn new(
        kind: AlertKind,
        date: NaiveDate,
        predicted_value: f64,
        message: String,
        recommended_action: &str,
        confidence: f64,
    ) -> Self {
        Self {
            kind,
            severity: kind.severity(),
            date,
            predicted_value: round1(predicted_value),
            threshold: None,
            message,
            recommended_action: recommended_action.to_string(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = Some(round1(threshold));
        self
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Historical thresholds for one series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlertThresholds {
    pub mean: f64,
    pub std_dev: f64,
    pub critical: f64,
    pub high: f64,
    pub low: f64,
}

impl AlertThresholds {
    /// Thresholds from a historical series
    pub fn from_history(history: &DailySeries) -> Result<Self> {
        let (mean, std_dev) = statistics::mean_and_std(&history.values())?;
        Ok(Self {
            mean,
            std_dev,
            critical: mean + CRITICAL_SIGMAS * std_dev,
            high: mean + HIGH_SIGMAS * std_dev,
            low: mean - LOW_SIGMAS * std_dev,
        })
    }
}

/// Scans a forecast for threshold breaches, uncertainty and weekday patterns
#[derive(Debug, Clone, Copy, Default)]
pub struct AlertDetector;

impl AlertDetector {
    pub fn new() -> Self {
        Self
    }

    /// Alerts for a forecast, sorted by severity then date
    pub fn detect(&self, forecast: &[ForecastPoint], history: &DailySeries) -> Result<Vec<Alert>> {
        let thresholds = AlertThresholds::from_history(history)?;
        let mut alerts = Vec::new();

        for point in forecast {
            alerts.extend(threshold_alert(point, &thresholds));

            let predicted = point.yhat_ensemble;
            let spread = point.yhat_std;
            if spread > predicted * UNCERTAINTY_SHARE {
                let share = if predicted > 0.0 {
                    format!("{:.1}% of the prediction", spread / predicted * 100.0)
                } else {
                    "prediction is zero".to_string()
                };
                alerts.push(Alert::new(
                    AlertKind::AltaIncertidumbre,
                    point.date,
                    predicted,
                    format!("High uncertainty: ±{:.1} calls ({})", spread, share),
                    "Monitor closely and keep contingency staff available",
                    0.6,
                ));
            }

            if point.date.weekday() == Weekday::Mon && predicted > thresholds.mean * MONDAY_FACTOR {
                alerts.push(Alert::new(
                    AlertKind::LunesAlto,
                    point.date,
                    predicted,
                    format!("High Monday demand: {:.1} calls after the weekend", predicted),
                    "Reinforce the Monday team and prepare queue management",
                    0.8,
                ));
            }
        }

        if let Some(alert) = trend_alert(forecast) {
            alerts.push(alert);
        }

        alerts.sort_by_key(|a| (a.severity.rank(), a.date));
        info!(
            alerts = alerts.len(),
            critical = alerts.iter().filter(|a| a.severity == Severity::Critica).count(),
            mean = thresholds.mean,
            critical_threshold = thresholds.critical,
            "detected forecast alerts"
        );
        Ok(alerts)
    }
}

fn threshold_alert(point: &ForecastPoint, thresholds: &AlertThresholds) -> Option<Alert> {
    let predicted = point.yhat_ensemble;
    let relative_certainty = |cap: f64| {
        if predicted > 0.0 {
            cap.min(1.0 - point.yhat_std / predicted)
        } else {
            0.5
        }
    };

    if predicted > thresholds.critical {
        Some(
            Alert::new(
                AlertKind::DemandaExtrema,
                point.date,
                predicted,
                format!("Extreme demand predicted: {:.1} calls (> +2.5σ of history)", predicted),
                "Activate the emergency protocol and call in extra staff",
                relative_certainty(0.95),
            )
            .with_threshold(thresholds.critical),
        )
    } else if predicted > thresholds.high {
        Some(
            Alert::new(
                AlertKind::DemandaAlta,
                point.date,
                predicted,
                format!("High demand predicted: {:.1} calls (> +1.5σ of history)", predicted),
                "Schedule additional staff and review capacity",
                relative_certainty(0.9),
            )
            .with_threshold(thresholds.high),
        )
    } else if predicted < thresholds.low {
        let confidence = if predicted != 0.0 {
            0.85f64.min(1.0 - point.yhat_std / predicted.abs())
        } else {
            0.5
        };
        Some(
            Alert::new(
                AlertKind::DemandaBaja,
                point.date,
                predicted,
                format!("Low demand predicted: {:.1} calls (< -1.5σ of history)", predicted),
                "Consider reducing shifts or reassigning staff",
                confidence,
            )
            .with_threshold(thresholds.low),
        )
    } else {
        None
    }
}

/// One alert when the last points of the forecast rise strictly
fn trend_alert(forecast: &[ForecastPoint]) -> Option<Alert> {
    if forecast.len() < TREND_POINTS {
        return None;
    }
    let tail = &forecast[forecast.len() - TREND_POINTS..];
    let rising = tail.windows(2).all(|w| w[1].yhat_ensemble > w[0].yhat_ensemble);
    let last = tail.last()?;
    rising.then(|| {
        Alert::new(
            AlertKind::TendenciaCreciente,
            last.date,
            last.yhat_ensemble,
            format!("Sustained growth over the last {} forecast days", TREND_POINTS),
            "Review capacity for the following week",
            0.75,
        )
    })
}
