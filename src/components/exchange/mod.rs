//! Exchange Web Services provider for a single mailbox calendar.

pub mod soap;
pub mod version;

pub use version::ExchangeVersion;

use crate::calendar::models::{CalendarIdentifier, Event};
use crate::calendar::provider::CalendarProvider;
use crate::config::ExchangeConfig;
use crate::error::{config_error, CalendarResult, Error};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Exchange stores appointments in UTC
pub const EXCHANGE_TIME_ZONE: &str = "UTC";

pub struct ExchangeCalendar {
    client: Client,
    url: String,
    email: String,
    password: String,
    version: ExchangeVersion,
}

impl ExchangeCalendar {
    pub fn new(config: &ExchangeConfig) -> CalendarResult<Self> {
        if config.autodiscover {
            return Err(config_error(&format!(
                "Exchange account {} uses autodiscover, which is not supported; set url",
                config.email
            )));
        }
        let url = config
            .url
            .clone()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| {
                config_error(&format!("Exchange account {} has no EWS url", config.email))
            })?;

        Ok(Self {
            client: Client::new(),
            url,
            email: config.email.clone(),
            password: config.password.clone(),
            version: ExchangeVersion::from_label(config.version.as_deref()),
        })
    }

    pub fn version(&self) -> ExchangeVersion {
        self.version
    }

    /// POST a SOAP envelope and return the response body
    async fn call(&self, envelope: String) -> CalendarResult<String> {
        let response = self
            .client
            .post(&self.url)
            .basic_auth(&self.email, Some(&self.password))
            .header("Content-Type", "text/xml; charset=utf-8")
            .body(envelope)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        // EWS reports SOAP faults with 500 and an XML body worth parsing
        if !status.is_success() && !(status.as_u16() == 500 && body.contains("Envelope")) {
            return Err(Error::from_status(status.as_u16(), &body));
        }
        Ok(body)
    }
}

#[async_trait]
impl CalendarProvider for ExchangeCalendar {
    async fn create_event(&self, event: &mut Event) -> CalendarResult<()> {
        let body = self.call(soap::create_item(self.version, event)).await?;
        let id = soap::parse_created_id(&body)?;
        debug!("Created Exchange item {}", id);
        event.set_unique_id(id);
        Ok(())
    }

    async fn delete_event(
        &self,
        uid: &str,
        _calendar: Option<&CalendarIdentifier>,
    ) -> CalendarResult<()> {
        let body = self.call(soap::delete_item(self.version, uid)).await?;
        soap::parse_delete(&body)
    }

    async fn list_events(&self) -> CalendarResult<Vec<Event>> {
        let (start, end) = soap::view_window(Utc::now());
        let body = self.call(soap::find_items(self.version, start, end)).await?;
        let items = soap::parse_find_items(&body)?;

        let mut bodies = HashMap::new();
        if !items.is_empty() {
            let ids: Vec<String> = items.iter().map(|item| item.id.clone()).collect();
            let body = self.call(soap::get_item_bodies(self.version, &ids)).await?;
            bodies = soap::parse_item_bodies(&body)?;
        }

        let mut events = Vec::new();
        for item in items {
            let description = bodies.remove(&item.id).unwrap_or(item.body);
            match Event::new(item.subject, item.start, item.end) {
                Ok(event) => events.push(
                    event
                        .with_unique_id(item.id)
                        .with_description(description)
                        .with_location(item.location)
                        .with_time_zone(EXCHANGE_TIME_ZONE),
                ),
                Err(e) => warn!("Skipping Exchange item {}: {}", item.id, e),
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
