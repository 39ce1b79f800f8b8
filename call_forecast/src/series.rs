//! Daily call series construction
//!
//! [`TimeSeriesBuilder`] turns raw per-call records into a [`DailySeries`]:
//! one row per calendar day between the first record and the cutoff, with
//! days that saw no calls filled with zero.

use crate::error::{ForecastError, Result};
use crate::holidays::HolidaySignal;
use crate::records::{CallRecord, Direction};
use chrono::{Datelike, Duration, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Minimum number of distinct days with data for a usable series
pub const MIN_HISTORY_DAYS: usize = 10;

/// Call totals for one calendar day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyCount {
    pub date: NaiveDate,
    pub count: u32,
    pub answered: u32,
}

/// Contiguous, zero-filled daily call counts for one direction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySeries {
    direction: Direction,
    points: Vec<DailyCount>,
}

impl DailySeries {
    /// Build a series from consecutive daily counts starting at `start`
    pub fn from_counts(direction: Direction, start: NaiveDate, counts: &[u32]) -> Self {
        let points = counts
            .iter()
            .enumerate()
            .map(|(i, &count)| DailyCount {
                date: start + Duration::days(i as i64),
                count,
                answered: count,
            })
            .collect();

        Self { direction, points }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn points(&self) -> &[DailyCount] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.points.first().map(|p| p.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.points.last().map(|p| p.date)
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.points.iter().map(|p| p.date).collect()
    }

    /// Daily totals as floating point values, ready for modelling
    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.count as f64).collect()
    }

    /// Daily answered totals
    pub fn answered(&self) -> Vec<u32> {
        self.points.iter().map(|p| p.answered).collect()
    }

    /// Position of a date in the series
    pub fn index_of(&self, date: NaiveDate) -> Option<usize> {
        let first = self.first_date()?;
        let offset = (date - first).num_days();
        if offset < 0 || offset as usize >= self.points.len() {
            None
        } else {
            Some(offset as usize)
        }
    }

    /// Sub-series covering positions `start..end`
    pub fn window(&self, start: usize, end: usize) -> Self {
        let end = end.min(self.points.len());
        let start = start.min(end);
        Self {
            direction: self.direction,
            points: self.points[start..end].to_vec(),
        }
    }

    /// Whether the dates are strictly consecutive calendar days
    pub fn is_contiguous(&self) -> bool {
        self.points
            .windows(2)
            .all(|w| w[1].date - w[0].date == Duration::days(1))
    }

    /// Copy of the series with holiday counts replaced by the mean count of the
    /// same weekday over non-holiday days. Returns the number of replaced days.
    ///
    /// Dates are kept, so the copy stays contiguous.
    pub fn impute_holidays(&self, holidays: &dyn HolidaySignal) -> (Self, usize) {
        let mut sums = [0u64; 7];
        let mut counts = [0u64; 7];
        for p in self.points.iter().filter(|p| !holidays.is_holiday(p.date)) {
            let dow = p.date.weekday().num_days_from_monday() as usize;
            sums[dow] += p.count as u64;
            counts[dow] += 1;
        }

        let mut replaced = 0;
        let points = self
            .points
            .iter()
            .map(|p| {
                if !holidays.is_holiday(p.date) {
                    return *p;
                }
                let dow = p.date.weekday().num_days_from_monday() as usize;
                if counts[dow] == 0 {
                    return *p;
                }
                replaced += 1;
                let typical = (sums[dow] as f64 / counts[dow] as f64).round() as u32;
                DailyCount {
                    date: p.date,
                    count: typical,
                    answered: p.answered.min(typical),
                }
            })
            .collect();

        (
            Self {
                direction: self.direction,
                points,
            },
            replaced,
        )
    }
}

/// Builds zero-filled daily series from call records
#[derive(Debug, Clone)]
pub struct TimeSeriesBuilder {
    cutoff: Option<NaiveDate>,
    min_days: usize,
}

impl Default for TimeSeriesBuilder {
    fn default() -> Self {
        Self {
            cutoff: None,
            min_days: MIN_HISTORY_DAYS,
        }
    }
}

impl TimeSeriesBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest date whose records are trusted as history. Defaults to today.
    pub fn with_cutoff(mut self, cutoff: NaiveDate) -> Self {
        self.cutoff = Some(cutoff);
        self
    }

    pub fn with_optional_cutoff(mut self, cutoff: Option<NaiveDate>) -> Self {
        self.cutoff = cutoff;
        self
    }

    pub fn with_min_days(mut self, min_days: usize) -> Self {
        self.min_days = min_days;
        self
    }

    /// Effective cutoff: the configured one, or today's local date
    pub fn cutoff(&self) -> NaiveDate {
        self.cutoff.unwrap_or_else(|| Local::now().date_naive())
    }

    /// Build the daily series for one direction
    pub fn build(&self, records: &[CallRecord], direction: Direction) -> Result<DailySeries> {
        let cutoff = self.cutoff();

        let mut totals: BTreeMap<NaiveDate, (u32, u32)> = BTreeMap::new();
        let mut future_records = 0usize;
        for record in records.iter().filter(|r| r.direction == direction) {
            let date = record.timestamp.date();
            if date > cutoff {
                future_records += 1;
                continue;
            }
            let entry = totals.entry(date).or_insert((0, 0));
            entry.0 += 1;
            if record.answered {
                entry.1 += 1;
            }
        }

        if future_records > 0 {
            debug!(%direction, future_records, %cutoff, "dropped records dated after cutoff");
        }

        if totals.len() < self.min_days {
            return Err(ForecastError::InsufficientData {
                stage: "time series builder",
                available: totals.len(),
                required: self.min_days,
            });
        }

        let (date_min, date_max) = match (totals.keys().next(), totals.keys().next_back()) {
            (Some(&min), Some(&max)) => (min, max),
            _ => {
                return Err(ForecastError::DataError(
                    "No dated records after filtering".to_string(),
                ))
            }
        };

        let span = (date_max - date_min).num_days() as usize + 1;
        let mut points = Vec::with_capacity(span);
        let mut date = date_min;
        while date <= date_max {
            let (count, answered) = totals.get(&date).copied().unwrap_or((0, 0));
            points.push(DailyCount {
                date,
                count,
                answered,
            });
            date += Duration::days(1);
        }

        debug!(
            %direction,
            days = points.len(),
            with_calls = totals.len(),
            from = %date_min,
            to = %date_max,
            "built daily series"
        );

        Ok(DailySeries { direction, points })
    }
}
