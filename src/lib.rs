//! # Callcast
//!
//! Facade over the call volume forecasting workspace.
//!
//! - [`math`]: descriptive statistics, rolling windows and least squares
//! - [`forecast`]: series building, models, cross-validation, the ensemble,
//!   alerts and reports
//!
//! ## Example
//!
//! ```
//! use callcast_workspace::forecast::ensemble::EnsembleWeighter;
//! use callcast_workspace::forecast::models::ModelKind;
//! use std::collections::BTreeMap;
//!
//! let errors: BTreeMap<ModelKind, f64> =
//!     [(ModelKind::Arima, 1.0), (ModelKind::Decomposable, 100.0)].into_iter().collect();
//! let weights = EnsembleWeighter::default().compute_weights(&errors).unwrap();
//! assert!((weights.sum() - 1.0).abs() < 1e-9);
//! assert!(weights.get(ModelKind::Arima).unwrap() > weights.get(ModelKind::Decomposable).unwrap());
//! ```

pub use call_forecast as forecast;
pub use call_math as math;

pub use call_forecast::{
    Alert, CallRecord, DailySeries, Direction, EnsembleConfig, ForecastError, ForecastPipeline, ForecastPoint,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_facade_exposes_both_crates() {
        assert_eq!(math::statistics::mean(&[1.0, 2.0, 3.0]).unwrap(), 2.0);
        assert_eq!(forecast::NAME, "call_forecast");
        assert_eq!(Direction::ALL.len(), 2);
    }
}
