//! # Call Forecast
//!
//! A Rust library for forecasting daily call-center volumes with a weighted
//! ensemble of statistical and machine-learning models.
//!
//! ## Features
//!
//! - Daily series building from raw call records, zero-filling missing days
//! - Call history audit: volume outliers, peak hours and record quality
//! - Calendar, lag, rolling and trend features with outlier flags
//! - Four model families: seasonal ARIMA, a decomposable trend/seasonality
//!   model, a random forest and gradient boosting
//! - Rolling-origin cross-validation with a lead-time gap
//! - Inverse-error ensemble weights bounded to `[min_weight, max_weight]`
//! - Forecast intervals from cross-model disagreement and holiday dampening
//! - Ranked operational alerts, run reports and health assessment
//!
//! ## Direction-Dependent Holidays
//!
//! Inbound and outbound calls react differently to holidays. Each direction
//! carries a [`config::HolidayPolicy`]: outbound holidays are replaced by
//! typical weekday volumes before training, and every forecast that falls on
//! a holiday is scaled by the direction's factor.
//!
//! ## Quick Start
//!
//! ```no_run
//! use call_forecast::config::EnsembleConfig;
//! use call_forecast::holidays::HolidayCalendar;
//! use call_forecast::pipeline::ForecastPipeline;
//! use call_forecast::records::{load_records_csv, Direction};
//! use chrono::NaiveDate;
//!
//! # fn main() -> call_forecast::Result<()> {
//! // Load call records
//! let records = load_records_csv("calls.csv")?;
//!
//! // Configure the ensemble and the trusted data boundary
//! let pipeline = ForecastPipeline::new(EnsembleConfig::default())?
//!     .with_cutoff(NaiveDate::from_ymd_opt(2024, 6, 10))
//!     .with_holidays(HolidayCalendar::from_entries([(
//!         NaiveDate::from_ymd_opt(2024, 6, 20).unwrap(),
//!         "Día de los Pueblos Indígenas",
//!     )]));
//!
//! // Fit, validate, weight, forecast and scan for alerts
//! let run = pipeline.run_direction(&records, Direction::Inbound)?;
//! for point in &run.forecast {
//!     println!("{} {:.0} [{:.0}, {:.0}]", point.date, point.yhat_ensemble, point.yhat_lower, point.yhat_upper);
//! }
//! # Ok(())
//! # }
//! ```

pub mod alerts;
pub mod audit;
pub mod config;
pub mod ensemble;
pub mod error;
pub mod features;
pub mod forecast;
pub mod health;
pub mod holidays;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod records;
pub mod report;
pub mod series;
pub mod utils;
pub mod validation;

// Re-export commonly used types
pub use crate::alerts::{Alert, AlertDetector, Severity};
pub use crate::audit::DataAudit;
pub use crate::config::{EnsembleConfig, HolidayPolicy};
pub use crate::ensemble::{EnsembleWeighter, EnsembleWeights};
pub use crate::error::{ForecastError, Result, Warning};
pub use crate::features::{FeatureEngineer, FeatureRow};
pub use crate::forecast::{ForecastGenerator, ForecastPoint};
pub use crate::holidays::{HolidayCalendar, HolidaySignal, NoHolidays};
pub use crate::models::{FittedModel, ModelHandle, ModelKind, ModelTrainer};
pub use crate::pipeline::{DirectionRun, ForecastPipeline};
pub use crate::records::{CallRecord, Direction};
pub use crate::series::{DailySeries, TimeSeriesBuilder};
pub use crate::validation::TemporalCrossValidator;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
