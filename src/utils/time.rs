use crate::error::{malformed_input, CalendarResult};
use chrono::{DateTime, Duration, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use chrono_tz::Tz;
use std::fmt;
use std::str::FromStr;

/// Separator between the two instants of a wire-format time range
pub const RANGE_SEPARATOR: char = '/';

/// A span of time between two instants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// Create a range, rejecting an end before the start
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> CalendarResult<Self> {
        if end < start {
            return Err(malformed_input(&format!(
                "Range end {} is before its start {}",
                format_instant(&end),
                format_instant(&start)
            )));
        }
        Ok(Self { start, end })
    }

    /// Range of the given length beginning at `start`. Fails when the end
    /// would fall outside the representable calendar.
    pub fn starting_at(start: DateTime<Utc>, duration: Duration) -> CalendarResult<Self> {
        let end = start.checked_add_signed(duration).ok_or_else(|| {
            malformed_input(&format!(
                "Duration {} from {} is out of range",
                duration,
                format_instant(&start)
            ))
        })?;
        Self::new(start, end)
    }

    /// Parse `<start>/<end>`, reading offset-less instants as UTC
    pub fn parse(s: &str) -> CalendarResult<Self> {
        Self::parse_in(s, Tz::UTC)
    }

    /// Parse `<start>/<end>`, reading offset-less instants in `tz`
    pub fn parse_in(s: &str, tz: Tz) -> CalendarResult<Self> {
        let parts: Vec<&str> = s.split(RANGE_SEPARATOR).collect();
        if parts.len() != 2 {
            return Err(malformed_input(&format!(
                "Expected '<start>{}<end>', got {} part(s) in '{}'",
                RANGE_SEPARATOR,
                parts.len(),
                s
            )));
        }
        let start = parse_instant(parts[0], tz)?;
        let end = parse_instant(parts[1], tz)?;
        Self::new(start, end)
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Half-open overlap test: ranges that only touch do not overlap
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start < end && start < self.end
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            format_instant(&self.start),
            RANGE_SEPARATOR,
            format_instant(&self.end)
        )
    }
}

impl FromStr for TimeRange {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TimeRange::parse(s)
    }
}

/// Parse an ISO-8601 instant.
///
/// RFC 3339 strings carry their own offset. A local date-time without an
/// offset (`2024-05-01T10:00:00`) is interpreted in `tz`.
pub fn parse_instant(s: &str, tz: Tz) -> CalendarResult<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    let naive = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .map_err(|e| malformed_input(&format!("Invalid instant '{}': {}", s, e)))?;

    match tz.from_local_datetime(&naive) {
        chrono::LocalResult::Single(dt) => Ok(dt.with_timezone(&Utc)),
        chrono::LocalResult::Ambiguous(_, _) => Err(malformed_input(&format!(
            "Ambiguous local time '{}' in {}",
            s, tz
        ))),
        chrono::LocalResult::None => Err(malformed_input(&format!(
            "Local time '{}' does not exist in {}",
            s, tz
        ))),
    }
}

/// Format an instant as UTC ISO-8601 with the shortest exact fraction
pub fn format_instant(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Parse a human duration such as `2h`, `90m` or `1h 30m`
pub fn parse_duration(s: &str) -> CalendarResult<Duration> {
    let std_duration = humantime::parse_duration(s.trim())
        .map_err(|e| malformed_input(&format!("Invalid duration '{}': {}", s, e)))?;
    Duration::from_std(std_duration)
        .map_err(|_| malformed_input(&format!("Duration '{}' is out of range", s)))
}

/// Parse an IANA time zone name
pub fn parse_time_zone(name: &str) -> CalendarResult<Tz> {
    name.parse::<Tz>()
        .map_err(|_| malformed_input(&format!("Unknown time zone '{}'", name)))
}
