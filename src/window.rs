use chrono::NaiveDate;
use serde::Serialize;

use crate::domain::DateRange;

/// Known operational interval of a station. `None` on either side means the
/// interval is open in that direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AvailabilityWindow {
    pub start: Option<NaiveDate>,
    pub stop: Option<NaiveDate>,
}

impl AvailabilityWindow {
    pub fn new(start: Option<NaiveDate>, stop: Option<NaiveDate>) -> Self {
        Self { start, stop }
    }

    /// Intersects the window with the requested range.
    ///
    /// Returns `None` when the two do not overlap; callers treat that as a
    /// skipped station, not as a failure.
    pub fn resolve(&self, requested: &DateRange) -> Option<DateRange> {
        let start = self
            .start
            .map_or(requested.start(), |start| start.max(requested.start()));
        let end = self
            .stop
            .map_or(requested.end(), |stop| stop.min(requested.end()));
        DateRange::new(start, end).ok()
    }
}
