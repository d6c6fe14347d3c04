//! iCalendar conversion for CalDAV resources.

use crate::calendar::models::{Event, Guest};
use crate::error::CalendarResult;
use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use icalendar::parser::{read_calendar, unfold, Component as ParsedComponent, Property as ParsedProperty};
use icalendar::{Calendar, CalendarDateTime, Component, DatePerhapsTime, EventLike, Property};
use tracing::warn;

/// Parse the first master VEVENT of an iCalendar document.
///
/// Floating times and unknown TZIDs are read in `zone`. Returns `None` when
/// the document has no usable event.
pub fn parse_event(content: &str, zone: Tz) -> CalendarResult<Option<Event>> {
    // XML parsers hand calendar-data back with bare LF line endings
    let normalized = content.replace("\r\n", "\n").replace('\n', "\r\n");
    let unfolded = unfold(&normalized);
    let calendar = match read_calendar(&unfolded) {
        Ok(calendar) => calendar,
        Err(e) => {
            warn!("Failed to parse calendar data: {:?}", e);
            return Ok(None);
        }
    };

    let vevents: Vec<&ParsedComponent> = calendar
        .components
        .iter()
        .filter(|c| c.name == "VEVENT")
        .collect();
    // Overrides of a recurring event share the master's resource
    let Some(vevent) = vevents
        .iter()
        .find(|c| c.find_prop("RECURRENCE-ID").is_none())
        .or_else(|| vevents.first())
    else {
        return Ok(None);
    };

    let Some(start_prop) = vevent.find_prop("DTSTART") else {
        return Ok(None);
    };
    let Ok(start_value) = DatePerhapsTime::try_from(start_prop) else {
        return Ok(None);
    };
    let (start, tzid) = to_utc(&start_value, zone);

    let end = match vevent
        .find_prop("DTEND")
        .and_then(|p| DatePerhapsTime::try_from(p).ok())
    {
        Some(value) => to_utc(&value, zone).0,
        // All-day events without DTEND last one day
        None if matches!(start_value, DatePerhapsTime::Date(_)) => start + Duration::days(1),
        None => start,
    };

    let text = |name: &str| {
        vevent
            .find_prop(name)
            .map(|p| p.val.to_string())
            .unwrap_or_default()
    };

    let mut event = Event::new(text("SUMMARY"), start, end.max(start))?
        .with_unique_id(text("UID"))
        .with_description(text("DESCRIPTION"))
        .with_location(text("LOCATION"))
        .with_time_zone(tzid.unwrap_or_else(|| zone.name().to_string()));

    for guest in parse_guests(vevent) {
        event = event.with_guest(guest);
    }
    Ok(Some(event))
}

/// UTC instant of a DTSTART/DTEND value and the TZID it named, if any
fn to_utc(value: &DatePerhapsTime, zone: Tz) -> (DateTime<Utc>, Option<String>) {
    match value {
        DatePerhapsTime::Date(date) => (date.and_time(chrono::NaiveTime::MIN).and_utc(), None),
        DatePerhapsTime::DateTime(CalendarDateTime::Utc(dt)) => (*dt, None),
        DatePerhapsTime::DateTime(CalendarDateTime::Floating(naive)) => (local_to_utc(naive, zone), None),
        DatePerhapsTime::DateTime(CalendarDateTime::WithTimezone { date_time, tzid }) => {
            let tz = tzid.parse::<Tz>().unwrap_or(zone);
            (local_to_utc(date_time, tz), Some(tz.name().to_string()))
        }
    }
}

// Gaps resolve to the later wall time, folds to the earlier one
fn local_to_utc(naive: &NaiveDateTime, tz: Tz) -> DateTime<Utc> {
    tz.from_local_datetime(naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(*naive + Duration::hours(1))).earliest())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| naive.and_utc())
}

/// ORGANIZER first, then every ATTENDEE not already listed
fn parse_guests(vevent: &ParsedComponent) -> Vec<Guest> {
    let mut guests: Vec<Guest> = Vec::new();
    if let Some(organizer) = vevent.find_prop("ORGANIZER") {
        guests.push(parse_guest(organizer).organizer());
    }
    for attendee in vevent.properties.iter().filter(|p| p.name == "ATTENDEE") {
        let guest = parse_guest(attendee);
        if !guests.iter().any(|g| g.email.eq_ignore_ascii_case(&guest.email)) {
            guests.push(guest);
        }
    }
    guests
}

fn parse_guest(prop: &ParsedProperty) -> Guest {
    let value = prop.val.as_ref();
    let email = value
        .strip_prefix("mailto:")
        .or_else(|| value.strip_prefix("MAILTO:"))
        .unwrap_or(value);

    let name = prop
        .params
        .iter()
        .find(|p| p.key == "CN")
        .and_then(|p| p.val.as_ref().map(|v| v.to_string()));

    let guest = Guest::new(email);
    match name {
        Some(name) => guest.with_display_name(name),
        None => guest,
    }
}

/// Render an event as a single-VEVENT iCalendar document with `uid`
pub fn generate_ics(event: &Event, uid: &str) -> String {
    let mut cal = Calendar::new();

    let mut ics_event = icalendar::Event::new();
    ics_event.uid(uid);
    ics_event.summary(event.title());
    ics_event.add_property("DTSTAMP", ics_utc(&Utc::now()));
    ics_event.add_property("DTSTART", ics_utc(&event.start()));
    ics_event.add_property("DTEND", ics_utc(&event.end()));

    if !event.description().is_empty() {
        ics_event.description(event.description());
    }
    if !event.location().is_empty() {
        ics_event.location(event.location());
    }

    for guest in event.guests() {
        let mut prop = Property::new(
            if guest.is_organizer { "ORGANIZER" } else { "ATTENDEE" },
            format!("mailto:{}", guest.email),
        );
        if !guest.display_name.is_empty() {
            prop.add_parameter("CN", &guest.display_name);
        }
        if guest.is_organizer {
            ics_event.append_property(prop);
        } else {
            ics_event.append_multi_property(prop);
        }
    }

    cal.push(ics_event.done());
    let cal = cal.done();
    cal.to_string()
}

fn ics_utc(dt: &DateTime<Utc>) -> String {
    dt.format("%Y%m%dT%H%M%SZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
PRODID:-//Example//EN\r\n\
BEGIN:VEVENT\r\n\
UID:abc-123\r\n\
DTSTAMP:20240101T000000Z\r\n\
DTSTART;TZID=Europe/Helsinki:20240610T090000\r\n\
DTEND;TZID=Europe/Helsinki:20240610T100000\r\n\
SUMMARY:Design review\r\n\
LOCATION:Room 2\r\n\
ORGANIZER;CN=Ada:mailto:ada@example.com\r\n\
ATTENDEE;CN=Ada:mailto:ada@example.com\r\n\
ATTENDEE;CN=Bob:mailto:bob@example.com\r\n\
ATTENDEE:mailto:cy@example.com\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";

    #[test]
    fn test_parse_zoned_event() {
        let event = parse_event(SAMPLE, Tz::UTC).unwrap().unwrap();
        assert_eq!(event.unique_id(), "abc-123");
        assert_eq!(event.title(), "Design review");
        assert_eq!(event.location(), "Room 2");
        assert_eq!(event.time_zone(), "Europe/Helsinki");
        // Helsinki is UTC+3 in June
        assert_eq!(event.start(), Utc.with_ymd_and_hms(2024, 6, 10, 6, 0, 0).unwrap());
        assert_eq!(event.end(), Utc.with_ymd_and_hms(2024, 6, 10, 7, 0, 0).unwrap());

        let emails: Vec<&str> = event.guests().iter().map(|g| g.email.as_str()).collect();
        assert_eq!(emails, vec!["ada@example.com", "bob@example.com", "cy@example.com"]);
        assert!(event.guests()[0].is_organizer);
        assert_eq!(event.guests()[1].display_name, "Bob");
        assert!(!event.guests()[2].is_organizer);
    }

    #[test]
    fn test_all_day_event_without_end() {
        let ics = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nBEGIN:VEVENT\r\nUID:day\r\n\
DTSTART;VALUE=DATE:20240301\r\nSUMMARY:Holiday\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n";
        let event = parse_event(ics, Tz::UTC).unwrap().unwrap();
        assert_eq!(event.start(), Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());
        assert_eq!(event.end(), Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_no_event() {
        let ics = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nEND:VCALENDAR\r\n";
        assert!(parse_event(ics, Tz::UTC).unwrap().is_none());
    }

    #[test]
    fn test_generated_document_parses_back() {
        let event = Event::new(
            "Sprint planning",
            Utc.with_ymd_and_hms(2024, 7, 1, 8, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 7, 1, 9, 30, 0).unwrap(),
        )
        .unwrap()
        .with_description("Bring estimates")
        .with_guest(Guest::new("lead@example.com").with_display_name("Lead").organizer())
        .with_guest(Guest::new("dev@example.com"));

        let ics = generate_ics(&event, "new-uid");
        assert!(ics.contains("UID:new-uid"));
        assert!(ics.contains("DTSTART:20240701T080000Z"));

        let parsed = parse_event(&ics, Tz::UTC).unwrap().unwrap();
        assert_eq!(parsed.unique_id(), "new-uid");
        assert_eq!(parsed.start(), event.start());
        assert_eq!(parsed.end(), event.end());
        assert_eq!(parsed.description(), "Bring estimates");
        assert_eq!(parsed.guests().len(), 2);
        assert!(parsed.guests()[0].is_organizer);
    }
}
