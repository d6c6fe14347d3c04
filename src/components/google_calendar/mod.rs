//! Google Calendar provider over the REST v3 API.

pub mod models;
pub mod time;
pub mod token;

pub use token::TokenManager;

use self::models::{
    Attendee, CalendarListEntry, CalendarListResponse, EventsResponse, GoogleEvent,
};
use crate::calendar::models::{CalendarIdentifier, Event, Guest};
use crate::calendar::provider::CalendarProvider;
use crate::error::{other_error, CalendarResult, Error};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

pub const API_BASE: &str = "https://www.googleapis.com/calendar/v3";

/// Calendar used when an event names no sub-calendar
const PRIMARY_CALENDAR: &str = "primary";

/// Google account. Every calendar in the user's calendar list is a
/// sub-calendar.
#[derive(Clone)]
pub struct GoogleCalendar {
    tokens: TokenManager,
    client: Client,
    api_base: String,
    time_zone: String,
}

impl GoogleCalendar {
    pub fn new(tokens: TokenManager, time_zone: &str) -> Self {
        Self {
            tokens,
            client: Client::new(),
            api_base: API_BASE.to_string(),
            time_zone: time_zone.to_string(),
        }
    }

    /// Talk to a different API root
    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.to_string();
        self
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    fn url(&self, segments: &[&str]) -> CalendarResult<Url> {
        let mut url = Url::parse(&self.api_base)
            .map_err(|e| other_error(&format!("Failed to parse URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| other_error("API base cannot have a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send(&self, request: RequestBuilder) -> CalendarResult<Response> {
        let access_token = self.tokens.access_token().await?;
        let response = request.bearer_auth(access_token).send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Could not read error response".to_string());
            return Err(Error::from_status(status.as_u16(), &error_body));
        }
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> CalendarResult<T> {
        let response = self.send(self.client.get(url)).await?;
        Ok(response.json().await?)
    }

    async fn calendar_list(&self) -> CalendarResult<Vec<CalendarListEntry>> {
        let mut entries = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut url = self.url(&["users", "me", "calendarList"])?;
            if let Some(token) = &page_token {
                url.query_pairs_mut().append_pair("pageToken", token);
            }
            let page: CalendarListResponse = self.get_json(url).await?;
            entries.extend(page.items);
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        Ok(entries)
    }

    async fn calendar_events(&self, calendar_id: &str) -> CalendarResult<Vec<GoogleEvent>> {
        let mut events = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut url = self.url(&["calendars", calendar_id, "events"])?;
            url.query_pairs_mut().append_pair("singleEvents", "true");
            if let Some(token) = &page_token {
                url.query_pairs_mut().append_pair("pageToken", token);
            }
            let page: EventsResponse = self.get_json(url).await?;
            events.extend(page.items);
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        Ok(events)
    }

    /// Normalize one API event. Events without a start are dropped.
    fn convert_event(&self, entry: &CalendarListEntry, event: GoogleEvent) -> CalendarResult<Option<Event>> {
        if event.status.as_deref() == Some("cancelled") {
            return Ok(None);
        }
        let Some(start_value) = &event.start else {
            warn!("Skipping Google event {} without a start", event.id);
            return Ok(None);
        };
        let Some(start) = time::to_utc(start_value)? else {
            return Ok(None);
        };
        let end = match &event.end {
            Some(value) => time::to_utc(value)?.unwrap_or(start),
            None => start,
        };
        let time_zone = start_value
            .time_zone
            .clone()
            .unwrap_or_else(|| self.time_zone.clone());

        let mut converted = Event::new(event.summary.unwrap_or_default(), start, end)?
            .with_unique_id(event.id)
            .with_description(event.description.unwrap_or_default())
            .with_location(event.location.unwrap_or_default())
            .with_time_zone(time_zone)
            .with_read_only(entry.is_read_only())
            .with_calendar(CalendarIdentifier::new(entry.id.clone(), entry.summary.clone()));

        for attendee in event.attendees {
            converted = converted.with_guest(guest_from_attendee(attendee));
        }
        Ok(Some(converted))
    }
}

fn guest_from_attendee(attendee: Attendee) -> Guest {
    let mut guest = Guest::new(attendee.email);
    if let Some(id) = attendee.id {
        guest.unique_id = id;
    }
    if let Some(name) = attendee.display_name {
        guest.display_name = name;
    }
    guest.is_organizer = attendee.organizer;
    guest
}

fn google_event_from(event: &Event) -> GoogleEvent {
    GoogleEvent {
        summary: Some(event.title().to_string()),
        description: Some(event.description().to_string()),
        location: Some(event.location().to_string()).filter(|l| !l.is_empty()),
        start: Some(time::from_utc(&event.start(), event.time_zone())),
        end: Some(time::from_utc(&event.end(), event.time_zone())),
        attendees: event
            .guests()
            .iter()
            .map(|g| Attendee {
                id: None,
                email: g.email.clone(),
                display_name: Some(g.display_name.clone()).filter(|n| !n.is_empty()),
                organizer: g.is_organizer,
            })
            .collect(),
        ..Default::default()
    }
}

#[async_trait]
impl CalendarProvider for GoogleCalendar {
    async fn create_event(&self, event: &mut Event) -> CalendarResult<()> {
        let calendar_id = event
            .calendar()
            .map(|c| c.uid.clone())
            .unwrap_or_else(|| PRIMARY_CALENDAR.to_string());
        let url = self.url(&["calendars", &calendar_id, "events"])?;

        let body = google_event_from(event);
        let response = self.send(self.client.post(url).json(&body)).await?;
        let created: GoogleEvent = response.json().await?;
        if created.id.is_empty() {
            return Err(other_error("Google returned an event without an id"));
        }

        debug!("Google assigned id {} in {}", created.id, calendar_id);
        event.set_unique_id(created.id);
        Ok(())
    }

    async fn delete_event(
        &self,
        uid: &str,
        calendar: Option<&CalendarIdentifier>,
    ) -> CalendarResult<()> {
        let calendar_id = calendar.map(|c| c.uid.as_str()).unwrap_or(PRIMARY_CALENDAR);
        let url = self.url(&["calendars", calendar_id, "events", uid])?;
        self.send(self.client.delete(url)).await?;
        Ok(())
    }

    async fn list_events(&self) -> CalendarResult<Vec<Event>> {
        let mut events = Vec::new();
        for entry in self.calendar_list().await? {
            for raw in self.calendar_events(&entry.id).await? {
                let id = raw.id.clone();
                match self.convert_event(&entry, raw) {
                    Ok(Some(event)) => events.push(event),
                    Ok(None) => {}
                    Err(e) => warn!("Skipping Google event {}: {}", id, e),
                }
            }
        }
        Ok(events)
    }

    async fn list_sub_calendars(&self) -> CalendarResult<Vec<CalendarIdentifier>> {
        Ok(self
            .calendar_list()
            .await?
            .into_iter()
            .map(|entry| CalendarIdentifier::new(entry.id, entry.summary))
            .collect())
    }

    fn supports_multiple_calendars(&self) -> bool {
        true
    }
}
