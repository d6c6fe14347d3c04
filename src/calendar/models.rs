//! Provider-neutral event types.
//!
//! Every provider adapter converts its own payloads into these types, and the
//! reconciliation engine, the tree and the query surface only ever see them.

use crate::error::{malformed_input, CalendarResult};
use crate::utils::time::format_instant;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Display time zone used when nothing else is known
pub const DEFAULT_TIME_ZONE: &str = "UTC";

/// A calendar appointment, independent of the provider it came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    unique_id: String,
    title: String,
    description: String,
    location: String,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    time_zone: String,
    calendar: Option<CalendarIdentifier>,
    read_only: bool,
    guests: Vec<Guest>,
}

impl Event {
    /// Create an event that the provider has not seen yet (empty unique id)
    pub fn new(
        title: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> CalendarResult<Self> {
        check_interval(&start, &end)?;
        Ok(Self {
            unique_id: String::new(),
            title: title.into(),
            description: String::new(),
            location: String::new(),
            start,
            end,
            time_zone: DEFAULT_TIME_ZONE.to_string(),
            calendar: None,
            read_only: false,
            guests: Vec::new(),
        })
    }

    pub fn with_unique_id(mut self, unique_id: impl Into<String>) -> Self {
        self.unique_id = unique_id.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn with_time_zone(mut self, time_zone: impl Into<String>) -> Self {
        self.time_zone = time_zone.into();
        self
    }

    pub fn with_calendar(mut self, calendar: CalendarIdentifier) -> Self {
        self.calendar = Some(calendar);
        self
    }

    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn with_guest(mut self, guest: Guest) -> Self {
        self.guests.push(guest);
        self
    }

    /// Record the id the provider assigned on creation
    pub fn set_unique_id(&mut self, unique_id: impl Into<String>) {
        self.unique_id = unique_id.into();
    }

    pub fn set_calendar(&mut self, calendar: CalendarIdentifier) {
        self.calendar = Some(calendar);
    }

    /// Replace both instants at once so `start <= end` always holds
    pub fn set_times(&mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> CalendarResult<()> {
        check_interval(&start, &end)?;
        self.start = start;
        self.end = end;
        Ok(())
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn time_zone(&self) -> &str {
        &self.time_zone
    }

    pub fn calendar(&self) -> Option<&CalendarIdentifier> {
        self.calendar.as_ref()
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn guests(&self) -> &[Guest] {
        &self.guests
    }

    /// True when the event lies within `[range_start, range_end]`, or when it
    /// is happening right now regardless of the range.
    pub fn is_in_range(&self, range_start: DateTime<Utc>, range_end: DateTime<Utc>) -> bool {
        self.is_in_range_at(range_start, range_end, Utc::now())
    }

    /// [`Event::is_in_range`] against an explicit clock
    pub fn is_in_range_at(
        &self,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> bool {
        let contained = self.start >= range_start && self.end <= range_end;
        contained || self.is_ongoing_at(now)
    }

    pub fn is_ongoing_at(&self, now: DateTime<Utc>) -> bool {
        self.start <= now && self.end >= now
    }

    /// Guests as flat records, in insertion order
    pub fn serialize_guests(&self) -> Vec<GuestRecord> {
        self.guests.iter().map(GuestRecord::from).collect()
    }

    /// Guests as a JSON array for tabular consumers
    pub fn guests_json(&self) -> serde_json::Value {
        serde_json::Value::Array(
            self.serialize_guests()
                .into_iter()
                .map(|record| {
                    serde_json::json!({
                        "uid": record.uid,
                        "name": record.name,
                        "email": record.email,
                        "organizer": record.organizer,
                    })
                })
                .collect(),
        )
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} - {})",
            self.title,
            format_instant(&self.start),
            format_instant(&self.end)
        )
    }
}

fn check_interval(start: &DateTime<Utc>, end: &DateTime<Utc>) -> CalendarResult<()> {
    if end < start {
        return Err(malformed_input(&format!(
            "Event ends ({}) before it starts ({})",
            format_instant(end),
            format_instant(start)
        )));
    }
    Ok(())
}

/// A participant of an event
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Guest {
    pub unique_id: String,
    pub display_name: String,
    pub email: String,
    pub is_organizer: bool,
}

impl Guest {
    pub fn new(email: impl Into<String>) -> Self {
        let email = email.into();
        Self {
            unique_id: email.clone(),
            email,
            ..Default::default()
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    pub fn organizer(mut self) -> Self {
        self.is_organizer = true;
        self
    }
}

/// Flattened guest as exposed to tabular consumers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestRecord {
    pub uid: String,
    pub name: String,
    pub email: String,
    pub organizer: bool,
}

impl From<&Guest> for GuestRecord {
    fn from(guest: &Guest) -> Self {
        Self {
            uid: guest.unique_id.clone(),
            name: guest.display_name.clone(),
            email: guest.email.clone(),
            organizer: guest.is_organizer,
        }
    }
}

impl From<&GuestRecord> for Guest {
    fn from(record: &GuestRecord) -> Self {
        Self {
            unique_id: record.uid.clone(),
            display_name: record.name.clone(),
            email: record.email.clone(),
            is_organizer: record.organizer,
        }
    }
}

/// A provider-side sub-calendar. Two identifiers are equal when their uids are.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarIdentifier {
    pub uid: String,
    pub title: String,
}

impl CalendarIdentifier {
    pub fn new(uid: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            title: title.into(),
        }
    }
}

impl PartialEq for CalendarIdentifier {
    fn eq(&self, other: &Self) -> bool {
        self.uid == other.uid
    }
}

impl Eq for CalendarIdentifier {}

impl Hash for CalendarIdentifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.uid.hash(state);
    }
}

/// Selection-list form: `<title>|<uid>`
impl fmt::Display for CalendarIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.title, self.uid)
    }
}

/// Titles may contain `|`, uids may not, so split on the last one.
impl FromStr for CalendarIdentifier {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (title, uid) = s
            .rsplit_once('|')
            .ok_or_else(|| malformed_input(&format!("Expected '<title>|<uid>', got '{}'", s)))?;
        if uid.is_empty() {
            return Err(malformed_input(&format!("Missing calendar uid in '{}'", s)));
        }
        Ok(Self::new(uid, title))
    }
}
