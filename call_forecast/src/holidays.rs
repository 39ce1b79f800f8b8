//! Holiday signal consumed by the forecaster
//!
//! The calendar itself is owned by an external collaborator; the core only
//! asks whether a date is a holiday and which category it belongs to.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Broad holiday category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HolidayCategory {
    Religious,
    Civic,
    Electoral,
    Cultural,
    Other,
}

impl HolidayCategory {
    /// Categorise a holiday from its description
    pub fn from_description(description: &str) -> Self {
        let desc = description.to_lowercase();
        let has_any = |words: &[&str]| words.iter().any(|w| desc.contains(w));

        if has_any(&["navidad", "christmas", "año nuevo", "new year", "santo", "virgen", "inmaculada", "santos", "easter"]) {
            HolidayCategory::Religious
        } else if has_any(&["independencia", "independence", "glorias", "trabajo", "labour", "labor", "patrias"]) {
            HolidayCategory::Civic
        } else if has_any(&["elecciones", "election", "plebiscito", "referendum"]) {
            HolidayCategory::Electoral
        } else if has_any(&["pueblos indígenas", "indigenous", "evangélicas", "evangelical"]) {
            HolidayCategory::Cultural
        } else {
            HolidayCategory::Other
        }
    }
}

impl std::fmt::Display for HolidayCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            HolidayCategory::Religious => "religious",
            HolidayCategory::Civic => "civic",
            HolidayCategory::Electoral => "electoral",
            HolidayCategory::Cultural => "cultural",
            HolidayCategory::Other => "other",
        };
        write!(f, "{}", name)
    }
}

/// Source of holiday information
pub trait HolidaySignal: Send + Sync {
    /// Whether the date is a holiday
    fn is_holiday(&self, date: NaiveDate) -> bool;

    /// Category of the holiday on that date, if any
    fn category(&self, date: NaiveDate) -> Option<HolidayCategory>;
}

/// Signal that never reports a holiday
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHolidays;

impl HolidaySignal for NoHolidays {
    fn is_holiday(&self, _date: NaiveDate) -> bool {
        false
    }

    fn category(&self, _date: NaiveDate) -> Option<HolidayCategory> {
        None
    }
}

/// A holiday entry in a calendar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holiday {
    pub date: NaiveDate,
    pub description: String,
    pub category: HolidayCategory,
}

/// In-memory holiday calendar
#[derive(Debug, Clone, Default)]
pub struct HolidayCalendar {
    holidays: BTreeMap<NaiveDate, Holiday>,
}

impl HolidayCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a holiday, categorising it from its description
    pub fn add(&mut self, date: NaiveDate, description: impl Into<String>) -> &mut Self {
        let description = description.into();
        let category = HolidayCategory::from_description(&description);
        self.holidays.insert(
            date,
            Holiday {
                date,
                description,
                category,
            },
        );
        self
    }

    /// Build a calendar from `(date, description)` pairs
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (NaiveDate, S)>,
        S: Into<String>,
    {
        let mut calendar = Self::new();
        for (date, description) in entries {
            calendar.add(date, description);
        }
        calendar
    }

    pub fn get(&self, date: NaiveDate) -> Option<&Holiday> {
        self.holidays.get(&date)
    }

    pub fn len(&self) -> usize {
        self.holidays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.holidays.is_empty()
    }
}

impl HolidaySignal for HolidayCalendar {
    fn is_holiday(&self, date: NaiveDate) -> bool {
        self.holidays.contains_key(&date)
    }

    fn category(&self, date: NaiveDate) -> Option<HolidayCategory> {
        self.holidays.get(&date).map(|h| h.category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_categorisation() {
        assert_eq!(HolidayCategory::from_description("Navidad"), HolidayCategory::Religious);
        assert_eq!(
            HolidayCategory::from_description("Independencia Nacional"),
            HolidayCategory::Civic
        );
        assert_eq!(
            HolidayCategory::from_description("Elecciones Primarias"),
            HolidayCategory::Electoral
        );
        assert_eq!(
            HolidayCategory::from_description("Día Nacional de los Pueblos Indígenas"),
            HolidayCategory::Cultural
        );
        assert_eq!(HolidayCategory::from_description("Bank holiday"), HolidayCategory::Other);
    }

    #[test]
    fn test_calendar_lookup() {
        let calendar = HolidayCalendar::from_entries([
            (date(2024, 9, 18), "Independencia Nacional"),
            (date(2024, 12, 25), "Navidad"),
        ]);

        assert_eq!(calendar.len(), 2);
        assert!(calendar.is_holiday(date(2024, 12, 25)));
        assert!(!calendar.is_holiday(date(2024, 12, 24)));
        assert_eq!(calendar.category(date(2024, 9, 18)), Some(HolidayCategory::Civic));
        assert!(NoHolidays.category(date(2024, 9, 18)).is_none());
    }
}
