//! Next-free-slot search over a set of events.

use super::models::Event;
use crate::error::{malformed_input, CalendarResult};
use crate::utils::time::TimeRange;
use chrono::{DateTime, Duration, Utc};

/// First range of length `duration`, starting no earlier than now, that does
/// not overlap any of `events`
pub fn find_next_free_time_range(events: &[Event], duration: Duration) -> CalendarResult<TimeRange> {
    find_next_free_time_range_at(events, duration, Utc::now())
}

/// [`find_next_free_time_range`] against an explicit clock.
///
/// Events are visited in start order. An event overlapping the candidate
/// `[candidate, candidate + duration)` pushes the candidate to its end. The
/// candidate never moves backwards and every later event starts no earlier
/// than the ones already visited, so a single pass reaches the fixed point.
pub fn find_next_free_time_range_at(
    events: &[Event],
    duration: Duration,
    now: DateTime<Utc>,
) -> CalendarResult<TimeRange> {
    if duration < Duration::zero() {
        return Err(malformed_input("Free time duration must not be negative"));
    }

    let mut busy: Vec<(DateTime<Utc>, DateTime<Utc>)> = events
        .iter()
        .filter(|e| e.end() > now)
        .map(|e| (e.start(), e.end()))
        .collect();
    busy.sort();

    let mut candidate = TimeRange::starting_at(now, duration)?;
    for (start, end) in busy {
        // A zero-length request only has to avoid landing inside an event
        let blocks = if duration.is_zero() {
            start <= candidate.start && candidate.start < end
        } else {
            candidate.overlaps(start, end)
        };
        if blocks {
            candidate = TimeRange::starting_at(end, duration)?;
        }
    }

    Ok(candidate)
}
