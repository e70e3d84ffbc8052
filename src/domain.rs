use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::FetchError;
use crate::window::AvailabilityWindow;

static STATION_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9]{4,9}$").expect("station id pattern is valid"));

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StationId(String);

impl StationId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn to_lowercase(&self) -> String {
        self.0.to_ascii_lowercase()
    }

    pub fn to_uppercase(&self) -> String {
        self.0.to_ascii_uppercase()
    }

    pub fn eq_ignore_case(&self, other: &StationId) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl fmt::Display for StationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for StationId {
    type Err = FetchError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if !STATION_ID.is_match(trimmed) {
            return Err(FetchError::InvalidStationId(value.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

/// A station as reported by the metadata catalog. Missing operational bounds
/// mean the station is considered active in that direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StationRecord {
    pub id: StationId,
    pub operational_start: Option<NaiveDate>,
    pub operational_stop: Option<NaiveDate>,
}

impl StationRecord {
    pub fn new(id: StationId) -> Self {
        Self {
            id,
            operational_start: None,
            operational_stop: None,
        }
    }

    pub fn with_window(
        id: StationId,
        operational_start: Option<NaiveDate>,
        operational_stop: Option<NaiveDate>,
    ) -> Self {
        Self {
            id,
            operational_start,
            operational_stop,
        }
    }

    pub fn window(&self) -> AvailabilityWindow {
        AvailabilityWindow {
            start: self.operational_start,
            stop: self.operational_stop,
        }
    }
}

/// Inclusive range of calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, FetchError> {
        if end < start {
            return Err(FetchError::InvertedDateRange {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(Self { start, end })
    }

    pub fn parse(start: &str, end: &str) -> Result<Self, FetchError> {
        Self::new(parse_date(start)?, parse_date(end)?)
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn day_count(&self) -> usize {
        self.end.signed_duration_since(self.start).num_days() as usize + 1
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + use<> {
        let end = self.end;
        self.start.iter_days().take_while(move |day| *day <= end)
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}

/// One station-day to download.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct WorkUnit {
    pub station: StationId,
    pub date: NaiveDate,
}

impl WorkUnit {
    pub fn new(station: StationId, date: NaiveDate) -> Self {
        Self { station, date }
    }

    pub fn day_of_year(&self) -> u32 {
        self.date.ordinal()
    }
}

impl fmt::Display for WorkUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.station, self.date)
    }
}

pub fn parse_date(value: &str) -> Result<NaiveDate, FetchError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| FetchError::InvalidDate(value.to_string()))
}

/// Parses an ISO 8601 timestamp or plain date into a calendar day.
///
/// Anything unparseable yields `None` so a bad catalog entry widens the
/// station window instead of failing the run.
pub fn parse_timestamp(value: &str) -> Option<NaiveDate> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.naive_local().date());
    }
    let naive = trimmed.trim_end_matches('Z');
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(naive, format) {
            return Some(parsed.date());
        }
    }
    NaiveDate::parse_from_str(naive, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn date(value: &str) -> NaiveDate {
        parse_date(value).unwrap()
    }

    #[test]
    fn parse_station_id_valid() {
        let id: StationId = " p123 ".parse().unwrap();
        assert_eq!(id.as_str(), "p123");
        assert_eq!(id.to_uppercase(), "P123");
    }

    #[test]
    fn parse_station_id_invalid() {
        assert_matches!(
            "p1".parse::<StationId>(),
            Err(FetchError::InvalidStationId(_))
        );
        assert_matches!(
            "p1/../x".parse::<StationId>(),
            Err(FetchError::InvalidStationId(_))
        );
    }

    #[test]
    fn date_range_rejects_inverted_bounds() {
        let err = DateRange::parse("2021-06-02", "2021-06-01").unwrap_err();
        assert_matches!(err, FetchError::InvertedDateRange { .. });
    }

    #[test]
    fn date_range_days_are_inclusive() {
        let range = DateRange::parse("2020-12-30", "2021-01-02").unwrap();
        let days: Vec<_> = range.days().collect();
        assert_eq!(days.len(), 4);
        assert_eq!(range.day_count(), 4);
        assert_eq!(days[0], date("2020-12-30"));
        assert_eq!(days[3], date("2021-01-02"));
    }

    #[test]
    fn single_day_range() {
        let range = DateRange::parse("2021-06-01", "2021-06-01").unwrap();
        assert_eq!(range.days().count(), 1);
    }

    #[test]
    fn parse_timestamp_variants() {
        let expected = Some(date("2005-03-01"));
        assert_eq!(parse_timestamp("2005-03-01T00:00:00Z"), expected);
        assert_eq!(parse_timestamp("2005-03-01T12:30:00.000Z"), expected);
        assert_eq!(parse_timestamp("2005-03-01T12:30:00"), expected);
        assert_eq!(parse_timestamp("2005-03-01T12:30:00+00:00"), expected);
        assert_eq!(parse_timestamp("2005-03-01"), expected);
    }

    #[test]
    fn parse_timestamp_malformed_is_unbounded() {
        assert_eq!(parse_timestamp(""), None);
        assert_eq!(parse_timestamp("not a date"), None);
        assert_eq!(parse_timestamp("2005-13-40T00:00:00Z"), None);
    }
}
