#![allow(dead_code)]

use async_trait::async_trait;
use calendarlink::calendar::models::{CalendarIdentifier, Event};
use calendarlink::calendar::provider::{AuthStart, Authorizer, CalendarProvider};
use calendarlink::components::account::AccountParts;
use calendarlink::error::{auth_error, not_found_error, transient_error, CalendarResult};
use calendarlink::tree::{MaterializedTree, MemoryTree};
use chrono::{DateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// In-memory provider with switchable failures
#[derive(Default)]
pub struct MockProvider {
    events: Mutex<Vec<Event>>,
    next_id: AtomicU32,
    fail_list: AtomicBool,
    reject_credentials: AtomicBool,
    list_delay: Mutex<Option<Duration>>,
    list_calls: AtomicU32,
    multiple_calendars: AtomicBool,
    created_in: Mutex<Vec<Option<CalendarIdentifier>>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_events(events: Vec<Event>) -> Self {
        let provider = Self::new();
        *provider.events.lock().unwrap() = events;
        provider
    }

    pub fn set_events(&self, events: Vec<Event>) {
        *self.events.lock().unwrap() = events;
    }

    pub fn uids(&self) -> Vec<String> {
        let mut uids: Vec<String> = self
            .events
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.unique_id().to_string())
            .collect();
        uids.sort();
        uids
    }

    pub fn fail_list(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }

    pub fn reject_credentials(&self, reject: bool) {
        self.reject_credentials.store(reject, Ordering::SeqCst);
    }

    pub fn delay_list(&self, delay: Duration) {
        *self.list_delay.lock().unwrap() = Some(delay);
    }

    pub fn list_calls(&self) -> u32 {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Must be set before the account handle is created
    pub fn set_multiple_calendars(&self, multiple: bool) {
        self.multiple_calendars.store(multiple, Ordering::SeqCst);
    }

    /// Calendar each created event was placed in, in creation order
    pub fn created_in(&self) -> Vec<Option<CalendarIdentifier>> {
        self.created_in.lock().unwrap().clone()
    }
}

#[async_trait]
impl CalendarProvider for MockProvider {
    async fn create_event(&self, event: &mut Event) -> CalendarResult<()> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        event.set_unique_id(format!("mock-{}", id));
        self.created_in.lock().unwrap().push(event.calendar().cloned());
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }

    async fn delete_event(
        &self,
        uid: &str,
        _calendar: Option<&CalendarIdentifier>,
    ) -> CalendarResult<()> {
        let mut events = self.events.lock().unwrap();
        let before = events.len();
        events.retain(|e| e.unique_id() != uid);
        if events.len() == before {
            return Err(not_found_error(uid));
        }
        Ok(())
    }

    async fn list_events(&self) -> CalendarResult<Vec<Event>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.list_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.reject_credentials.load(Ordering::SeqCst) {
            return Err(auth_error("token revoked"));
        }
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(transient_error("connection reset"));
        }
        Ok(self.events.lock().unwrap().clone())
    }

    async fn list_sub_calendars(&self) -> CalendarResult<Vec<CalendarIdentifier>> {
        Ok(Vec::new())
    }

    fn supports_multiple_calendars(&self) -> bool {
        self.multiple_calendars.load(Ordering::SeqCst)
    }
}

/// Authorizer that needs one code, `"letmein"`, before it is ready
#[derive(Default)]
pub struct MockAuthorizer {
    authorized: AtomicBool,
}

#[async_trait]
impl Authorizer for MockAuthorizer {
    async fn begin(&self) -> CalendarResult<AuthStart> {
        if self.authorized.load(Ordering::SeqCst) {
            Ok(AuthStart::Ready)
        } else {
            Ok(AuthStart::NeedsCode {
                authorization_url: "https://auth.example.com/consent".to_string(),
            })
        }
    }

    async fn submit_code(&self, code: &str) -> CalendarResult<()> {
        if code != "letmein" {
            return Err(auth_error("invalid_grant"));
        }
        self.authorized.store(true, Ordering::SeqCst);
        Ok(())
    }
}

pub fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, day, hour, 0, 0).unwrap()
}

pub fn event(uid: &str, title: &str, day: u32, hour: u32) -> Event {
    Event::new(title, at(day, hour), at(day, hour + 1))
        .unwrap()
        .with_unique_id(uid)
}

pub fn parts(
    name: &str,
    provider: Arc<MockProvider>,
    tree: Arc<MemoryTree>,
) -> AccountParts {
    let tree: Arc<dyn MaterializedTree> = tree;
    AccountParts {
        name: name.to_string(),
        provider,
        authorizer: None,
        tree,
        display_zone: chrono_tz::Tz::UTC,
    }
}
