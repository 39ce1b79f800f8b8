//! Rolling window calculations
//!
//! Contains the streaming [`RollingWindow`] plus batch helpers that compute
//! window statistics for every position of a series:
//! - preceding windows, which only look at values strictly before a position
//! - centered windows, which straddle a position and are truncated at the edges

use crate::{MathError, Result};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Mean and sample standard deviation of one window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowStats {
    pub mean: f64,
    pub std_dev: f64,
}

/// Fixed-size rolling window with running sums
#[derive(Debug, Clone)]
pub struct RollingWindow {
    period: usize,
    values: VecDeque<f64>,
    sum: f64,
    sum_sq: f64,
}

impl RollingWindow {
    /// Create a new rolling window with the specified period
    pub fn new(period: usize) -> Result<Self> {
        if period == 0 {
            return Err(MathError::InvalidInput(
                "Period must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            period,
            values: VecDeque::with_capacity(period),
            sum: 0.0,
            sum_sq: 0.0,
        })
    }

    /// Push a new value, evicting the oldest one once the window is full
    pub fn update(&mut self, value: f64) {
        self.values.push_back(value);
        self.sum += value;
        self.sum_sq += value * value;

        if self.values.len() > self.period {
            if let Some(old_value) = self.values.pop_front() {
                self.sum -= old_value;
                self.sum_sq -= old_value * old_value;
            }
        }
    }

    /// Whether the window holds `period` values
    pub fn is_full(&self) -> bool {
        self.values.len() == self.period
    }

    /// Current window mean
    pub fn mean(&self) -> Result<f64> {
        if !self.is_full() {
            return Err(MathError::InsufficientData(format!(
                "Not enough data for rolling mean. Need {} values, have {}.",
                self.period,
                self.values.len()
            )));
        }

        Ok(self.sum / self.period as f64)
    }

    /// Current window sample standard deviation
    pub fn std_dev(&self) -> Result<f64> {
        if !self.is_full() || self.period < 2 {
            return Err(MathError::InsufficientData(format!(
                "Not enough data for rolling standard deviation. Need {} values (at least 2), have {}.",
                self.period,
                self.values.len()
            )));
        }

        let n = self.period as f64;
        let variance = (self.sum_sq - self.sum * self.sum / n) / (n - 1.0);

        // Running sums can drift slightly below zero for constant windows
        Ok(variance.max(0.0).sqrt())
    }

    /// Current window statistics, if the window is full
    pub fn stats(&self) -> Option<WindowStats> {
        match (self.mean(), self.std_dev()) {
            (Ok(mean), Ok(std_dev)) => Some(WindowStats { mean, std_dev }),
            _ => None,
        }
    }

    /// Get the current period
    pub fn period(&self) -> usize {
        self.period
    }

    /// Reset the window, clearing all values
    pub fn reset(&mut self) {
        self.values.clear();
        self.sum = 0.0;
        self.sum_sq = 0.0;
    }
}

/// Statistics of the `window` values strictly preceding each position.
///
/// Entry `i` summarises `values[i - window..i]` and is `None` while `i < window`.
pub fn preceding_window_stats(values: &[f64], window: usize) -> Result<Vec<Option<WindowStats>>> {
    let mut rolling = RollingWindow::new(window)?;
    let mut out = Vec::with_capacity(values.len());

    for &value in values {
        out.push(rolling.stats());
        rolling.update(value);
    }

    Ok(out)
}

/// Statistics of a window of `window` values centred on each position.
///
/// Entry `i` summarises `values[i - window / 2..i - window / 2 + window]`,
/// truncated to the slice bounds. Positions whose truncated window has
/// fewer than two values yield `None`.
pub fn centered_window_stats(values: &[f64], window: usize) -> Result<Vec<Option<WindowStats>>> {
    if window < 2 {
        return Err(MathError::InvalidInput(
            "Centered window must span at least 2 values".to_string(),
        ));
    }

    let half = window / 2;
    let out = (0..values.len())
        .map(|i| {
            let start = i.saturating_sub(half);
            let end = (i + window - half).min(values.len());
            let slice = &values[start..end];
            if slice.len() < 2 {
                return None;
            }
            let n = slice.len() as f64;
            let mean = slice.iter().sum::<f64>() / n;
            let variance = slice.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
            Some(WindowStats {
                mean,
                std_dev: variance.sqrt(),
            })
        })
        .collect();

    Ok(out)
}
