use super::models::EventDateTime;
use crate::error::{malformed_input, CalendarResult};
use crate::utils::time::format_instant;
use chrono::{DateTime, NaiveDate, Utc};

/// Instant of a Google date or date-time. All-day dates start at UTC midnight.
pub fn to_utc(value: &EventDateTime) -> CalendarResult<Option<DateTime<Utc>>> {
    if let Some(date_time) = &value.date_time {
        let dt = DateTime::parse_from_rfc3339(date_time)
            .map_err(|e| malformed_input(&format!("Failed to parse datetime '{}': {}", date_time, e)))?;
        Ok(Some(dt.with_timezone(&Utc)))
    } else if let Some(date) = &value.date {
        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map_err(|e| malformed_input(&format!("Failed to parse date '{}': {}", date, e)))?;
        let midnight = date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| malformed_input("Failed to create datetime"))?;
        Ok(Some(midnight.and_utc()))
    } else {
        Ok(None)
    }
}

/// Timed value for an outgoing event
pub fn from_utc(instant: &DateTime<Utc>, time_zone: &str) -> EventDateTime {
    EventDateTime {
        date: None,
        date_time: Some(format_instant(instant)),
        time_zone: Some(time_zone.to_string()),
    }
}
