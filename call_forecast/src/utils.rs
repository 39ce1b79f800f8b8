//! Utility functions for the call_forecast crate

use crate::error::{ForecastError, Result};
use crate::records::{CallRecord, Direction};
use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Poisson};

/// Date and timestamp parsing for uploaded data
pub mod date_parser {
    use super::*;
    use chrono::NaiveDateTime;

    const TIMESTAMP_FORMATS: [&str; 6] = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%d-%m-%Y %H:%M:%S",
        "%d/%m/%Y %H:%M:%S",
        "%Y-%m-%d %H:%M",
    ];

    const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%d-%m-%Y", "%d/%m/%Y"];

    /// Parse a calendar date
    pub fn parse_date(value: &str) -> Result<NaiveDate> {
        let value = value.trim();
        DATE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
            .ok_or_else(|| ForecastError::DataError(format!("Unrecognised date: {}", value)))
    }

    /// Parse a call timestamp; a bare date maps to midnight
    pub fn parse_timestamp(value: &str) -> Result<NaiveDateTime> {
        let value = value.trim();
        if let Some(ts) = TIMESTAMP_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        {
            return Ok(ts);
        }

        parse_date(value)
            .map(|d| d.and_time(NaiveTime::MIN))
            .map_err(|_| ForecastError::DataError(format!("Unrecognised timestamp: {}", value)))
    }
}

/// Consecutive calendar days starting at `start`
pub fn future_dates(start: NaiveDate, horizon: usize) -> Vec<NaiveDate> {
    (0..horizon)
        .map(|i| start + Duration::days(i as i64))
        .collect()
}

/// Index that splits `len` chronologically ordered items into train and holdout.
///
/// The holdout always keeps at least one item when `len >= 2`.
pub fn chronological_split(len: usize, holdout_ratio: f64) -> usize {
    if len < 2 || holdout_ratio <= 0.0 || holdout_ratio >= 1.0 {
        return len;
    }

    let train = (len as f64 * (1.0 - holdout_ratio)).floor() as usize;
    train.clamp(1, len - 1)
}

/// Generate synthetic call records with a weekly pattern.
///
/// Daily totals are Poisson draws around `daily_mean`, scaled down on weekends
/// and up on Mondays. The generator is seeded, so equal inputs give equal records.
pub fn simulate_records(
    start: NaiveDate,
    days: usize,
    direction: Direction,
    daily_mean: f64,
    seed: u64,
) -> Result<Vec<CallRecord>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut records = Vec::new();

    for (i, date) in future_dates(start, days).into_iter().enumerate() {
        let weekly = match date.weekday() {
            Weekday::Mon => 1.25,
            Weekday::Sat => 0.45,
            Weekday::Sun => 0.25,
            _ => 1.0,
        };
        let drift = 1.0 + 0.002 * i as f64;
        let lambda = (daily_mean * weekly * drift).max(0.1);
        let poisson = Poisson::new(lambda)
            .map_err(|e| ForecastError::InvalidParameter(format!("Poisson rate {}: {}", lambda, e)))?;
        let calls = poisson.sample(&mut rng) as usize;

        for c in 0..calls {
            let seconds = rng.gen_range(8 * 3600..20 * 3600);
            let time = NaiveTime::from_num_seconds_from_midnight_opt(seconds, 0).unwrap_or(NaiveTime::MIN);
            records.push(CallRecord::new(
                date.and_time(time),
                direction,
                rng.gen_bool(0.85),
                format!("+5622{:07}", (i * 1000 + c) % 10_000_000),
            ));
        }
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();
        assert_eq!(date_parser::parse_date("2024-06-10").unwrap(), expected);
        assert_eq!(date_parser::parse_date("10-06-2024").unwrap(), expected);
        assert_eq!(
            date_parser::parse_timestamp("10-06-2024 14:30:00").unwrap().date(),
            expected
        );
        assert_eq!(
            date_parser::parse_timestamp("2024-06-10").unwrap().date(),
            expected
        );
        assert!(date_parser::parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn test_future_dates_are_consecutive() {
        let start = NaiveDate::from_ymd_opt(2024, 2, 27).unwrap();
        let dates = future_dates(start, 4);
        assert_eq!(dates.len(), 4);
        assert_eq!(dates[3], NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
    }

    #[test]
    fn test_chronological_split() {
        assert_eq!(chronological_split(10, 0.2), 8);
        assert_eq!(chronological_split(26, 0.2), 20);
        assert_eq!(chronological_split(2, 0.2), 1);
        assert_eq!(chronological_split(1, 0.2), 1);
        assert_eq!(chronological_split(10, 0.0), 10);
    }

    #[test]
    fn test_simulation_is_deterministic() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let a = simulate_records(start, 14, Direction::Inbound, 50.0, 7).unwrap();
        let b = simulate_records(start, 14, Direction::Inbound, 50.0, 7).unwrap();
        assert_eq!(a, b);
        assert!(!a.is_empty());
        assert!(a.iter().all(|r| r.direction == Direction::Inbound));
    }
}
