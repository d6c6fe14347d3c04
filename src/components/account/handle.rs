use super::actor::{AccountActor, AccountActorHandle};
use super::auth::AuthState;
use super::reconcile::ReconcileReport;
use crate::calendar::free_time::find_next_free_time_range;
use crate::calendar::models::{CalendarIdentifier, Event};
use crate::calendar::provider::{Authorizer, CalendarProvider};
use crate::error::{auth_error, component_error, malformed_input, CalendarResult};
use crate::tree::MaterializedTree;
use crate::utils::scheduler::InFlight;
use crate::utils::time::{parse_duration, TimeRange};
use chrono::Utc;
use chrono_tz::Tz;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::debug;

/// Everything an account needs to run
pub struct AccountParts {
    pub name: String,
    pub provider: Arc<dyn CalendarProvider>,
    pub authorizer: Option<Arc<dyn Authorizer>>,
    pub tree: Arc<dyn MaterializedTree>,
    pub display_zone: Tz,
}

/// What a refresh request amounted to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Completed(ReconcileReport),
    /// Another refresh of the same account was still running
    Skipped,
}

/// User input for a new or replacement event
#[derive(Debug, Clone, Default)]
pub struct EventRequest {
    pub title: String,
    pub description: String,
    pub location: String,
    /// `"<start>/<end>"`
    pub time_range: String,
    /// `"<title>|<uid>"`, only used by multi-calendar providers
    pub calendar: Option<String>,
}

/// Handle for interacting with one account
#[derive(Clone)]
pub struct AccountHandle {
    name: String,
    actor_handle: AccountActorHandle,
    auth_rx: watch::Receiver<AuthState>,
    in_flight: InFlight,
    tree: Arc<dyn MaterializedTree>,
    display_zone: Tz,
    multiple_calendars: bool,
    actor_task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl AccountHandle {
    /// Create a new AccountHandle and spawn the actor
    pub fn new(parts: AccountParts) -> Self {
        let multiple_calendars = parts.provider.supports_multiple_calendars();
        let tree = Arc::clone(&parts.tree);

        let (mut actor, actor_handle, auth_rx) =
            AccountActor::new(parts.name.clone(), parts.provider, parts.authorizer, parts.tree);

        let actor_task = tokio::spawn(async move {
            actor.run().await;
        });

        Self {
            name: parts.name,
            actor_handle,
            auth_rx,
            in_flight: InFlight::new(),
            tree,
            display_zone: parts.display_zone,
            multiple_calendars,
            actor_task: Arc::new(Mutex::new(Some(actor_task))),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn supports_multiple_calendars(&self) -> bool {
        self.multiple_calendars
    }

    pub fn tree(&self) -> Arc<dyn MaterializedTree> {
        Arc::clone(&self.tree)
    }

    /// Reconcile the tree with the provider, unless a refresh is already running.
    /// Fails with an auth error until the account is authorized.
    pub async fn refresh(&self) -> CalendarResult<RefreshOutcome> {
        let state = self.auth_state();
        if !state.is_authorized() {
            return Err(auth_error(&format!("Account {} is {}", self.name, state)));
        }
        let Some(guard) = self.in_flight.try_acquire() else {
            debug!("Refresh of {} skipped, one is already in flight", self.name);
            return Ok(RefreshOutcome::Skipped);
        };
        let report = self.actor_handle.refresh(guard).await?;
        Ok(RefreshOutcome::Completed(report))
    }

    pub fn is_refreshing(&self) -> bool {
        self.in_flight.is_busy()
    }

    /// Create an event on the provider and add it to the tree
    pub async fn create_event(&self, request: &EventRequest) -> CalendarResult<Event> {
        let event = self.build_event(request)?;
        self.actor_handle.create_event(event).await
    }

    /// Replace event `uid` with the one described by `request`
    pub async fn edit_event(&self, uid: &str, request: &EventRequest) -> CalendarResult<Event> {
        let replacement = self.build_event(request)?;
        self.actor_handle
            .edit_event(uid.to_string(), replacement)
            .await
    }

    /// Delete an event on the provider. Deleting an id the provider no longer
    /// knows succeeds.
    pub async fn delete_event(&self, uid: &str, destroy_local_node: bool) -> CalendarResult<()> {
        self.actor_handle
            .delete_event(uid.to_string(), destroy_local_node)
            .await
    }

    /// Events inside `"<start>/<end>"`, plus any event happening right now
    pub async fn events_in_range(&self, range: &str) -> CalendarResult<Vec<Event>> {
        let range = TimeRange::parse_in(range, self.display_zone)?;
        let now = Utc::now();
        let events = self.actor_handle.list_events().await?;
        Ok(events
            .into_iter()
            .filter(|e| e.is_in_range_at(range.start, range.end, now))
            .collect())
    }

    pub async fn sub_calendars(&self) -> CalendarResult<Vec<CalendarIdentifier>> {
        self.actor_handle.list_sub_calendars().await
    }

    /// Next free slot of the given length, e.g. `"1h 30m"`
    pub async fn next_free_time(&self, duration: &str) -> CalendarResult<TimeRange> {
        let duration = parse_duration(duration)?;
        let events = self.actor_handle.list_events().await?;
        find_next_free_time_range(&events, duration)
    }

    pub fn auth_state(&self) -> AuthState {
        self.auth_rx.borrow().clone()
    }

    /// Receiver that sees every auth state change
    pub fn auth_watch(&self) -> watch::Receiver<AuthState> {
        self.auth_rx.clone()
    }

    /// Look at stored credentials again and update the auth state
    pub async fn check_auth(&self) -> CalendarResult<AuthState> {
        self.actor_handle.check_auth().await
    }

    pub async fn submit_auth_code(&self, code: &str) -> CalendarResult<AuthState> {
        if code.trim().is_empty() {
            return Err(malformed_input("Authorization code is empty"));
        }
        self.actor_handle
            .submit_auth_code(code.trim().to_string())
            .await
    }

    /// Shutdown the actor and wait until it has exited. Commands queued
    /// before the shutdown run to completion first.
    pub async fn shutdown(&self) -> CalendarResult<()> {
        self.actor_handle.shutdown().await?;
        let Some(task) = self.actor_task.lock().await.take() else {
            return Ok(());
        };
        task.await
            .map_err(|e| component_error(&format!("Actor of {} ended abnormally: {}", self.name, e)))
    }

    fn build_event(&self, request: &EventRequest) -> CalendarResult<Event> {
        let title = request.title.trim();
        if title.is_empty() {
            return Err(malformed_input("Event title is required"));
        }
        let range = TimeRange::parse_in(&request.time_range, self.display_zone)?;

        let mut event = Event::new(title, range.start, range.end)?
            .with_description(request.description.clone())
            .with_location(request.location.clone())
            .with_time_zone(self.display_zone.name());

        if let Some(selection) = request.calendar.as_deref().filter(|s| !s.is_empty()) {
            if self.multiple_calendars {
                event = event.with_calendar(selection.parse()?);
            } else {
                debug!(
                    "Ignoring calendar selection for single-calendar account {}",
                    self.name
                );
            }
        }
        Ok(event)
    }
}
