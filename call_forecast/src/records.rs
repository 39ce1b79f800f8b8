//! Raw call records and their ingestion

use crate::error::{ForecastError, Result};
use crate::utils::date_parser;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, warn};

/// Call direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    /// Both directions, in processing order
    pub const ALL: [Direction; 2] = [Direction::Inbound, Direction::Outbound];
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Inbound => write!(f, "inbound"),
            Direction::Outbound => write!(f, "outbound"),
        }
    }
}

impl FromStr for Direction {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "in" | "inbound" | "entrante" | "entrantes" => Ok(Direction::Inbound),
            "out" | "outbound" | "saliente" | "salientes" => Ok(Direction::Outbound),
            other => Err(ForecastError::DataError(format!(
                "Unknown call direction: {}",
                other
            ))),
        }
    }
}

/// One physical call
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallRecord {
    pub timestamp: NaiveDateTime,
    pub direction: Direction,
    pub answered: bool,
    pub phone: String,
}

impl CallRecord {
    pub fn new(timestamp: NaiveDateTime, direction: Direction, answered: bool, phone: impl Into<String>) -> Self {
        Self {
            timestamp,
            direction,
            answered,
            phone: phone.into(),
        }
    }
}

/// CSV row as it appears in an upload, before typing
#[derive(Debug, Deserialize)]
struct RawCallRow {
    timestamp: String,
    direction: String,
    #[serde(default)]
    answered: String,
    #[serde(default)]
    phone: String,
}

fn parse_answered(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "y" | "si" | "sí" | "answered"
    )
}

impl TryFrom<RawCallRow> for CallRecord {
    type Error = ForecastError;

    fn try_from(row: RawCallRow) -> Result<Self> {
        Ok(CallRecord {
            timestamp: date_parser::parse_timestamp(&row.timestamp)?,
            direction: row.direction.parse()?,
            answered: parse_answered(&row.answered),
            phone: row.phone,
        })
    }
}

/// Load call records from a CSV file with a `timestamp,direction,answered,phone` header.
///
/// Rows that cannot be typed are skipped and logged; an unreadable file is an error.
pub fn load_records_csv<P: AsRef<Path>>(path: P) -> Result<Vec<CallRecord>> {
    let file = File::open(path.as_ref())?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    let mut records = Vec::new();
    let mut skipped = 0usize;
    for (line, row) in reader.deserialize::<RawCallRow>().enumerate() {
        match row.map_err(ForecastError::from).and_then(CallRecord::try_from) {
            Ok(record) => records.push(record),
            Err(err) => {
                skipped += 1;
                debug!(line = line + 2, error = %err, "skipping call record");
            }
        }
    }

    if skipped > 0 {
        warn!(skipped, loaded = records.len(), "some call records could not be parsed");
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_aliases() {
        assert_eq!("in".parse::<Direction>().unwrap(), Direction::Inbound);
        assert_eq!("SALIENTE".parse::<Direction>().unwrap(), Direction::Outbound);
        assert_eq!(" outbound ".parse::<Direction>().unwrap(), Direction::Outbound);
        assert!("sideways".parse::<Direction>().is_err());
    }

    #[test]
    fn test_answered_flags() {
        assert!(parse_answered("1"));
        assert!(parse_answered("True"));
        assert!(parse_answered("si"));
        assert!(!parse_answered("0"));
        assert!(!parse_answered(""));
    }
}
