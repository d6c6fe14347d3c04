//! CalDAV provider: one calendar collection over HTTP with basic auth.

pub mod dav;
pub mod ics;

use crate::calendar::models::{CalendarIdentifier, Event};
use crate::calendar::provider::CalendarProvider;
use crate::config::CalDavConfig;
use crate::error::{other_error, CalendarResult, Error};
use async_trait::async_trait;
use chrono_tz::Tz;
use reqwest::{Client, Method, RequestBuilder, Response};
use tracing::{debug, warn};
use uuid::Uuid;

pub struct CalDavCalendar {
    client: Client,
    collection_url: String,
    username: String,
    password: String,
    zone: Tz,
}

impl CalDavCalendar {
    pub fn new(config: &CalDavConfig, zone: Tz) -> Self {
        Self::with_collection_url(&config.collection_url(), &config.username, &config.password, zone)
    }

    pub fn with_collection_url(collection_url: &str, username: &str, password: &str, zone: Tz) -> Self {
        let mut collection_url = collection_url.to_string();
        if !collection_url.ends_with('/') {
            collection_url.push('/');
        }
        Self {
            client: Client::new(),
            collection_url,
            username: username.to_string(),
            password: password.to_string(),
            zone,
        }
    }

    /// URL of the resource holding event `uid`
    pub fn event_url(&self, uid: &str) -> String {
        format!("{}{}.ics", self.collection_url, uid)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let request = self.client.request(method, url);
        if self.username.is_empty() {
            request
        } else {
            request.basic_auth(&self.username, Some(&self.password))
        }
    }

    async fn send(&self, request: RequestBuilder) -> CalendarResult<Response> {
        let response = request.send().await?;
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
}

#[async_trait]
impl CalendarProvider for CalDavCalendar {
    async fn create_event(&self, event: &mut Event) -> CalendarResult<()> {
        let uid = Uuid::new_v4().to_string();
        let body = ics::generate_ics(event, &uid);

        let request = self
            .request(Method::PUT, &self.event_url(&uid))
            .header("Content-Type", "text/calendar; charset=utf-8")
            .header("If-None-Match", "*")
            .body(body);
        self.send(request).await?;

        debug!("Stored CalDAV event {}", uid);
        event.set_unique_id(uid);
        Ok(())
    }

    async fn delete_event(
        &self,
        uid: &str,
        _calendar: Option<&CalendarIdentifier>,
    ) -> CalendarResult<()> {
        self.send(self.request(Method::DELETE, &self.event_url(uid)))
            .await?;
        Ok(())
    }

    async fn list_events(&self) -> CalendarResult<Vec<Event>> {
        let report = Method::from_bytes(b"REPORT")
            .map_err(|e| other_error(&format!("Invalid method: {}", e)))?;
        let request = self
            .request(report, &self.collection_url)
            .header("Depth", "1")
            .header("Content-Type", "application/xml; charset=utf-8")
            .body(dav::CALENDAR_QUERY);
        let body = self.send(request).await?.text().await?;

        let mut events = Vec::new();
        for resource in dav::parse_multistatus(&body)? {
            match ics::parse_event(&resource.data, self.zone) {
                Ok(Some(event)) => events.push(event.with_unique_id(resource.name())),
                Ok(None) => debug!("No event in {}", resource.href),
                Err(e) => warn!("Skipping {}: {}", resource.href, e),
            }
        }
        Ok(events)
    }

    async fn list_sub_calendars(&self) -> CalendarResult<Vec<CalendarIdentifier>> {
        Ok(Vec::new())
    }

    fn supports_multiple_calendars(&self) -> bool {
        false
    }
}
