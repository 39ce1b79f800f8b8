//! Call data audit
//!
//! Before any model is trained, the history of one direction is profiled:
//! daily volume statistics with IQR outliers, hour and weekday patterns of
//! the raw calls, and record quality (duplicates, missing phone numbers).
//! Volumes and patterns look at working days (Monday to Friday) only.

use crate::error::{ForecastError, Result};
use crate::records::{CallRecord, Direction};
use crate::series::DailySeries;
use call_math::statistics;
use chrono::{Datelike, NaiveDate, Timelike, Weekday};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use tracing::info;

/// Multiplier of the interquartile range beyond which a day is an outlier
const IQR_FENCE: f64 = 1.5;

/// Entries kept in each peak/quiet ranking
const RANKING_SIZE: usize = 3;

/// Fields per call record counted towards completeness
const RECORD_FIELDS: f64 = 4.0;

const WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

fn is_workday(date: NaiveDate) -> bool {
    date.weekday().num_days_from_monday() < 5
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DayVolume {
    pub date: NaiveDate,
    pub calls: u32,
}

/// Daily volume statistics over working days
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VolumeProfile {
    pub workdays: usize,
    pub mean: f64,
    pub median: f64,
    /// Sample standard deviation
    pub std_dev: f64,
    /// `None` when the mean is zero
    pub coefficient_of_variation: Option<f64>,
    pub busiest_day: DayVolume,
    pub quietest_day: DayVolume,
    pub zero_days: usize,
    pub first_quartile: f64,
    pub third_quartile: f64,
    pub upper_outliers: Vec<NaiveDate>,
    pub lower_outliers: Vec<NaiveDate>,
}

impl VolumeProfile {
    pub fn from_series(series: &DailySeries) -> Result<Self> {
        let days: Vec<DayVolume> = series
            .points()
            .iter()
            .filter(|p| is_workday(p.date))
            .map(|p| DayVolume {
                date: p.date,
                calls: p.count,
            })
            .collect();
        if days.is_empty() {
            return Err(ForecastError::InsufficientData {
                stage: "volume audit",
                available: 0,
                required: 1,
            });
        }

        let values: Vec<f64> = days.iter().map(|d| f64::from(d.calls)).collect();
        let (mean, std_dev) = statistics::mean_and_std(&values)?;
        let q1 = statistics::quantile(&values, 0.25)?;
        let q3 = statistics::quantile(&values, 0.75)?;
        let iqr = q3 - q1;
        let upper_fence = q3 + IQR_FENCE * iqr;
        let lower_fence = q1 - IQR_FENCE * iqr;

        // first occurrence wins on ties
        let mut busiest_day = days[0];
        let mut quietest_day = days[0];
        for day in &days[1..] {
            if day.calls > busiest_day.calls {
                busiest_day = *day;
            }
            if day.calls < quietest_day.calls {
                quietest_day = *day;
            }
        }

        Ok(Self {
            workdays: days.len(),
            mean,
            median: statistics::median(&values)?,
            std_dev,
            coefficient_of_variation: (mean > 0.0).then(|| std_dev / mean),
            busiest_day,
            quietest_day,
            zero_days: days.iter().filter(|d| d.calls == 0).count(),
            first_quartile: q1,
            third_quartile: q3,
            upper_outliers: days
                .iter()
                .filter(|d| f64::from(d.calls) > upper_fence)
                .map(|d| d.date)
                .collect(),
            lower_outliers: days
                .iter()
                .filter(|d| f64::from(d.calls) < lower_fence)
                .map(|d| d.date)
                .collect(),
        })
    }

    pub fn outlier_days(&self) -> usize {
        self.upper_outliers.len() + self.lower_outliers.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HourVolume {
    pub hour: u32,
    pub calls: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WeekdayVolume {
    pub weekday: Weekday,
    pub calls: usize,
}

/// When working-day calls happen
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallPatterns {
    /// Calls per hour of day, hours without calls omitted
    pub hourly: Vec<HourVolume>,
    pub peak_hours: Vec<HourVolume>,
    pub quiet_hours: Vec<HourVolume>,
    pub busiest_weekdays: Vec<WeekdayVolume>,
    /// Coefficient of variation of the hourly counts
    pub hourly_variability: Option<f64>,
    /// Coefficient of variation of the weekday counts
    pub weekday_variability: Option<f64>,
}

impl CallPatterns {
    pub fn from_calls<'a>(calls: impl IntoIterator<Item = &'a CallRecord>) -> Self {
        let mut by_hour: BTreeMap<u32, usize> = BTreeMap::new();
        let mut by_weekday: BTreeMap<u32, usize> = BTreeMap::new();
        for call in calls {
            let date = call.timestamp.date();
            if !is_workday(date) {
                continue;
            }
            *by_hour.entry(call.timestamp.hour()).or_insert(0) += 1;
            *by_weekday.entry(date.weekday().num_days_from_monday()).or_insert(0) += 1;
        }

        let hourly: Vec<HourVolume> = by_hour
            .iter()
            .map(|(&hour, &calls)| HourVolume { hour, calls })
            .collect();
        let weekdays: Vec<WeekdayVolume> = by_weekday
            .iter()
            .filter_map(|(&day, &calls)| {
                WEEKDAYS
                    .get(day as usize)
                    .map(|&weekday| WeekdayVolume { weekday, calls })
            })
            .collect();

        // stable sorts keep the earlier hour or weekday first on ties
        let mut peak_hours = hourly.clone();
        peak_hours.sort_by(|a, b| b.calls.cmp(&a.calls));
        peak_hours.truncate(RANKING_SIZE);

        let mut quiet_hours = hourly.clone();
        quiet_hours.sort_by(|a, b| a.calls.cmp(&b.calls));
        quiet_hours.truncate(RANKING_SIZE);

        let mut busiest_weekdays = weekdays.clone();
        busiest_weekdays.sort_by(|a, b| b.calls.cmp(&a.calls));
        busiest_weekdays.truncate(RANKING_SIZE);

        Self {
            hourly_variability: variability(hourly.iter().map(|h| h.calls)),
            weekday_variability: variability(weekdays.iter().map(|w| w.calls)),
            hourly,
            peak_hours,
            quiet_hours,
            busiest_weekdays,
        }
    }
}

/// Sample coefficient of variation, `None` below two groups
fn variability(counts: impl Iterator<Item = usize>) -> Option<f64> {
    let values: Vec<f64> = counts.map(|c| c as f64).collect();
    if values.len() < 2 {
        return None;
    }
    let (mean, std_dev) = statistics::mean_and_std(&values).ok()?;
    (mean > 0.0).then(|| std_dev / mean)
}

/// Record-level quality of one direction's calls
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataQuality {
    pub total_records: usize,
    /// Exact repeats of an earlier record
    pub duplicate_records: usize,
    pub missing_phone: usize,
    /// Records dated outside the audited series, e.g. after the cutoff
    pub outside_history: usize,
    pub answered_calls: usize,
    pub answer_rate: Option<f64>,
    /// Share of filled record fields, 0 to 100
    pub completeness_score: Option<f64>,
}

impl DataQuality {
    pub fn from_calls(calls: &[&CallRecord], series: &DailySeries) -> Self {
        let total = calls.len();
        let mut seen = HashSet::with_capacity(total);
        let duplicate_records = calls.iter().filter(|call| !seen.insert(**call)).count();
        let missing_phone = calls.iter().filter(|c| c.phone.trim().is_empty()).count();
        let answered_calls = calls.iter().filter(|c| c.answered).count();

        let outside_history = match (series.first_date(), series.last_date()) {
            (Some(first), Some(last)) => calls
                .iter()
                .filter(|c| {
                    let date = c.timestamp.date();
                    date < first || date > last
                })
                .count(),
            _ => total,
        };

        let (answer_rate, completeness_score) = if total > 0 {
            let total = total as f64;
            (
                Some(answered_calls as f64 / total),
                Some(100.0 * (1.0 - missing_phone as f64 / (RECORD_FIELDS * total))),
            )
        } else {
            (None, None)
        };

        Self {
            total_records: total,
            duplicate_records,
            missing_phone,
            outside_history,
            answered_calls,
            answer_rate,
            completeness_score,
        }
    }
}

/// Audit of one direction's call history
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataAudit {
    pub direction: Direction,
    pub volumes: VolumeProfile,
    pub patterns: CallPatterns,
    pub quality: DataQuality,
}

impl DataAudit {
    /// Audit the records of the series' direction against the built series
    pub fn from_records(records: &[CallRecord], series: &DailySeries) -> Result<Self> {
        let direction = series.direction();
        let calls: Vec<&CallRecord> = records.iter().filter(|r| r.direction == direction).collect();

        let volumes = VolumeProfile::from_series(series)?;
        let quality = DataQuality::from_calls(&calls, series);
        let patterns = CallPatterns::from_calls(calls.iter().copied().filter(|c| {
            let date = c.timestamp.date();
            series.first_date().map_or(false, |first| date >= first)
                && series.last_date().map_or(false, |last| date <= last)
        }));

        info!(
            %direction,
            mean_daily = volumes.mean,
            cv = volumes.coefficient_of_variation.unwrap_or(f64::NAN),
            outlier_days = volumes.outlier_days(),
            zero_days = volumes.zero_days,
            duplicates = quality.duplicate_records,
            "audited call history"
        );

        Ok(Self {
            direction,
            volumes,
            patterns,
            quality,
        })
    }
}
