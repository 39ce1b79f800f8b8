//! ARIMA models for daily call counts
//!
//! Orders are estimated with the two-stage Hannan-Rissanen regression: a long
//! autoregression supplies residual estimates, then the ARMA coefficients are
//! fitted by least squares on lagged values and lagged residuals. A weekly
//! seasonal term adds a lag-7 difference plus lag-7 AR and MA coefficients.
//! The order is picked from a small grid by AIC.

use crate::error::{ForecastError, Result};
use crate::models::{steps_ahead, FittedModel, ModelKind, ModelTrainer};
use crate::series::DailySeries;
use call_math::regression::{least_squares, predict_row};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

/// Weekly season length in days
pub const SEASON: usize = 7;

/// Ridge penalty keeping degenerate regressions solvable
const RIDGE: f64 = 1e-6;

/// Floor applied to the residual variance inside the AIC
const MIN_VARIANCE: f64 = 1e-12;

/// Non-seasonal order plus an optional weekly `(1,1,1)` seasonal term
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArimaOrder {
    pub p: usize,
    pub d: usize,
    pub q: usize,
    pub seasonal: bool,
}

impl ArimaOrder {
    pub fn new(p: usize, d: usize, q: usize, seasonal: bool) -> Self {
        Self { p, d, q, seasonal }
    }

    fn ar_lags(&self) -> Vec<usize> {
        (1..=self.p).chain(self.seasonal.then_some(SEASON)).collect()
    }

    fn ma_lags(&self) -> Vec<usize> {
        (1..=self.q).chain(self.seasonal.then_some(SEASON)).collect()
    }

    /// Differencing lags, applied in order
    fn difference_lags(&self) -> Vec<usize> {
        self.seasonal
            .then_some(SEASON)
            .into_iter()
            .chain(std::iter::repeat(1).take(self.d))
            .collect()
    }

    fn has_constant(&self) -> bool {
        self.d == 0 && !self.seasonal
    }
}

impl std::fmt::Display for ArimaOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ARIMA({},{},{})", self.p, self.d, self.q)?;
        if self.seasonal {
            write!(f, "(1,1,1)[{}]", SEASON)?;
        }
        Ok(())
    }
}

/// Grid-searched ARIMA trainer
#[derive(Debug, Clone)]
pub struct ArimaTrainer {
    max_p: usize,
    max_d: usize,
    max_q: usize,
    seasonal: bool,
    fallback: ArimaOrder,
}

impl Default for ArimaTrainer {
    fn default() -> Self {
        Self {
            max_p: 2,
            max_d: 1,
            max_q: 2,
            seasonal: true,
            fallback: ArimaOrder::new(1, 1, 1, false),
        }
    }
}

impl ArimaTrainer {
    /// Create a trainer searching orders up to `(max_p, max_d, max_q)`
    pub fn new(max_p: usize, max_d: usize, max_q: usize) -> Self {
        Self {
            max_p,
            max_d,
            max_q,
            ..Self::default()
        }
    }

    /// Leave the weekly seasonal term out of the search
    pub fn without_seasonal(mut self) -> Self {
        self.seasonal = false;
        self
    }

    /// Every order the grid search tries
    pub fn candidate_orders(&self) -> Vec<ArimaOrder> {
        let seasonal_options: &[bool] = if self.seasonal { &[false, true] } else { &[false] };
        let mut orders = Vec::new();
        for &seasonal in seasonal_options {
            for p in 0..=self.max_p {
                for d in 0..=self.max_d {
                    for q in 0..=self.max_q {
                        orders.push(ArimaOrder::new(p, d, q, seasonal));
                    }
                }
            }
        }
        orders
    }

    /// Fit every candidate order and keep the lowest AIC
    pub fn search(&self, values: &[f64], last_date: NaiveDate) -> Result<ArimaModel> {
        let mut best: Option<ArimaModel> = None;
        let mut failures = 0usize;

        for order in self.candidate_orders() {
            match fit_order(values, order, last_date).and_then(|m| m.check_stable()) {
                Ok(model) => {
                    if best.as_ref().map_or(true, |b| model.aic < b.aic) {
                        best = Some(model);
                    }
                }
                Err(err) => {
                    failures += 1;
                    debug!(%order, error = %err, "order rejected");
                }
            }
        }

        match best {
            Some(model) => {
                debug!(order = %model.order, aic = model.aic, failures, "selected ARIMA order");
                Ok(model)
            }
            None => {
                warn!(fallback = %self.fallback, "grid search found no feasible order");
                fit_order(values, self.fallback, last_date)
            }
        }
    }
}

impl ModelTrainer for ArimaTrainer {
    fn kind(&self) -> ModelKind {
        ModelKind::Arima
    }

    fn min_window(&self) -> usize {
        2 * SEASON
    }

    fn fit_window(&self, window: &DailySeries) -> Result<Box<dyn FittedModel>> {
        let last_date = window
            .last_date()
            .ok_or_else(|| ForecastError::model_fit(ModelKind::Arima, "empty training window"))?;
        Ok(Box::new(self.search(&window.values(), last_date)?))
    }
}

/// A fitted ARIMA model
#[derive(Debug, Clone)]
pub struct ArimaModel {
    order: ArimaOrder,
    constant: f64,
    ar: Vec<(usize, f64)>,
    ma: Vec<(usize, f64)>,
    /// Series before each differencing stage, with the stage's lag
    stages: Vec<(Vec<f64>, usize)>,
    /// Fully differenced series
    differenced: Vec<f64>,
    residuals: Vec<f64>,
    sigma2: f64,
    aic: f64,
    last_date: NaiveDate,
}

impl ArimaModel {
    pub fn order(&self) -> ArimaOrder {
        self.order
    }

    pub fn aic(&self) -> f64 {
        self.aic
    }

    /// Reject fits whose coefficients can make the recursion explode.
    ///
    /// Uses the sufficient condition that absolute coefficients sum below one.
    fn check_stable(self) -> Result<Self> {
        let ar_sum: f64 = self.ar.iter().map(|(_, c)| c.abs()).sum();
        let ma_sum: f64 = self.ma.iter().map(|(_, c)| c.abs()).sum();
        if ar_sum >= 1.0 || ma_sum >= 1.0 {
            return Err(ForecastError::model_fit(
                ModelKind::Arima,
                format!("{} is not stationary or not invertible", self.order),
            ));
        }
        Ok(self)
    }

    /// Recursive forecast of the next `horizon` values; future shocks are zero
    pub fn forecast(&self, horizon: usize) -> Result<Vec<f64>> {
        let n = self.differenced.len();
        let mut z = self.differenced.clone();
        let mut eps = self.residuals.clone();

        for t in n..n + horizon {
            let value = self.constant
                + lagged_sum(&self.ar, &z, t)
                + lagged_sum(&self.ma, &eps, t);
            z.push(value);
            eps.push(0.0);
        }

        let mut path = z.split_off(n);
        for (history, lag) in self.stages.iter().rev() {
            path = integrate(history, &path, *lag);
        }

        if path.iter().any(|v| !v.is_finite()) {
            return Err(ForecastError::model_fit(
                ModelKind::Arima,
                format!("{} produced a non-finite forecast", self.order),
            ));
        }

        Ok(path)
    }
}

impl FittedModel for ArimaModel {
    fn predict_dates(&self, dates: &[NaiveDate]) -> Result<Vec<f64>> {
        let steps = steps_ahead(self.last_date, dates);
        let horizon = steps.iter().copied().max().unwrap_or(0);
        let path = self.forecast(horizon)?;
        Ok(steps.into_iter().map(|s| path[s - 1]).collect())
    }

    fn params(&self) -> serde_json::Value {
        json!({
            "order": self.order.to_string(),
            "constant": self.constant,
            "ar": self.ar,
            "ma": self.ma,
            "sigma2": self.sigma2,
            "aic": self.aic,
        })
    }
}

/// `sum(coef * series[t - lag])` over lags that fall inside the series
fn lagged_sum(coefficients: &[(usize, f64)], series: &[f64], t: usize) -> f64 {
    coefficients
        .iter()
        .filter(|(lag, _)| *lag <= t)
        .map(|(lag, c)| c * series[t - lag])
        .sum()
}

/// `values[t] - values[t - lag]`
fn difference(values: &[f64], lag: usize) -> Vec<f64> {
    values.windows(lag + 1).map(|w| w[lag] - w[0]).collect()
}

/// Undo one differencing stage for values following `history`
fn integrate(history: &[f64], diffs: &[f64], lag: usize) -> Vec<f64> {
    let n = history.len();
    let mut extended = history.to_vec();
    for &d in diffs {
        let base = extended[extended.len() - lag];
        extended.push(base + d);
    }
    extended.split_off(n)
}

/// Estimate one order
fn fit_order(values: &[f64], order: ArimaOrder, last_date: NaiveDate) -> Result<ArimaModel> {
    let fail = |reason: String| ForecastError::model_fit(ModelKind::Arima, format!("{}: {}", order, reason));

    let mut stages = Vec::new();
    let mut z = values.to_vec();
    for lag in order.difference_lags() {
        if z.len() <= lag + 1 {
            return Err(fail("series too short to difference".to_string()));
        }
        let next = difference(&z, lag);
        stages.push((z, lag));
        z = next;
    }

    let n = z.len();
    let ar_lags = order.ar_lags();
    let ma_lags = order.ma_lags();
    let max_ar = ar_lags.iter().copied().max().unwrap_or(0);
    let max_ma = ma_lags.iter().copied().max().unwrap_or(0);

    // Stage one: long autoregression for residual estimates
    let mut innovations = vec![0.0; n];
    let long_order = if ma_lags.is_empty() {
        0
    } else {
        (max_ar.max(max_ma) + 3).min(n / 4)
    };
    if !ma_lags.is_empty() {
        if long_order == 0 {
            return Err(fail("series too short for residual estimation".to_string()));
        }
        let rows: Vec<Vec<f64>> = (long_order..n)
            .map(|t| {
                std::iter::once(1.0)
                    .chain((1..=long_order).map(|l| z[t - l]))
                    .collect()
            })
            .collect();
        let targets = &z[long_order..];
        let penalties: Vec<f64> = std::iter::once(0.0)
            .chain(std::iter::repeat(RIDGE).take(long_order))
            .collect();
        let coef = least_squares(&rows, targets, &penalties).map_err(|e| fail(e.to_string()))?;
        for (t, row) in (long_order..n).zip(&rows) {
            innovations[t] = z[t] - predict_row(&coef, row);
        }
    }

    // Stage two: regression on lagged values and lagged residual estimates
    let start = max_ar.max(if ma_lags.is_empty() { 0 } else { long_order + max_ma });
    let n_coef = ar_lags.len() + ma_lags.len() + usize::from(order.has_constant());
    if n <= start || n - start < n_coef + 3 {
        return Err(fail(format!("{} usable observations for {} coefficients", n.saturating_sub(start), n_coef)));
    }

    let rows: Vec<Vec<f64>> = (start..n)
        .map(|t| {
            let mut row = Vec::with_capacity(n_coef);
            if order.has_constant() {
                row.push(1.0);
            }
            row.extend(ar_lags.iter().map(|&l| z[t - l]));
            row.extend(ma_lags.iter().map(|&l| innovations[t - l]));
            row
        })
        .collect();
    let mut penalties = vec![RIDGE; n_coef];
    if order.has_constant() {
        penalties[0] = 0.0;
    }
    let coef = least_squares(&rows, &z[start..], &penalties).map_err(|e| fail(e.to_string()))?;

    let mut coef_iter = coef.into_iter();
    let constant = if order.has_constant() {
        coef_iter.next().unwrap_or(0.0)
    } else {
        0.0
    };
    let ar: Vec<(usize, f64)> = ar_lags.iter().copied().zip(coef_iter.by_ref()).collect();
    let ma: Vec<(usize, f64)> = ma_lags.iter().copied().zip(coef_iter).collect();

    // Exact residual recursion with the final coefficients
    let mut residuals = vec![0.0; n];
    for t in max_ar..n {
        let predicted = constant + lagged_sum(&ar, &z, t) + lagged_sum(&ma, &residuals, t);
        residuals[t] = z[t] - predicted;
    }

    let scored = &residuals[max_ar..];
    let sigma2 = scored.iter().map(|e| e * e).sum::<f64>() / scored.len() as f64;
    if !sigma2.is_finite() {
        return Err(fail("residual variance is not finite".to_string()));
    }
    let aic = scored.len() as f64 * sigma2.max(MIN_VARIANCE).ln() + 2.0 * (n_coef + 1) as f64;

    Ok(ArimaModel {
        order,
        constant,
        ar,
        ma,
        stages,
        differenced: z,
        residuals,
        sigma2,
        aic,
        last_date,
    })
}
