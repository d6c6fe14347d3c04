use super::models::{CalendarIdentifier, Event};
use crate::error::{transient_error, CalendarResult};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::warn;

/// Operations every calendar provider adapter supports
#[async_trait]
pub trait CalendarProvider: Send + Sync {
    /// Submit a new event. On success the provider-assigned id is written
    /// back into `event`.
    async fn create_event(&self, event: &mut Event) -> CalendarResult<()>;

    /// Remove an event on the provider side. `calendar` is the sub-calendar
    /// the event lives in, for providers that have more than one.
    async fn delete_event(
        &self,
        uid: &str,
        calendar: Option<&CalendarIdentifier>,
    ) -> CalendarResult<()>;

    /// Full snapshot of every event visible to the account
    async fn list_events(&self) -> CalendarResult<Vec<Event>>;

    /// Sub-calendars of the account; empty unless
    /// [`CalendarProvider::supports_multiple_calendars`] is true
    async fn list_sub_calendars(&self) -> CalendarResult<Vec<CalendarIdentifier>>;

    fn supports_multiple_calendars(&self) -> bool;

    /// Snapshot for query consumers: failures are logged and read as no events
    async fn list_events_or_empty(&self) -> Vec<Event> {
        match self.list_events().await {
            Ok(events) => events,
            Err(e) => {
                warn!("Failed to list events: {}", e);
                Vec::new()
            }
        }
    }
}

/// How an account's credential flow begins
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthStart {
    /// Stored credentials are usable as-is
    Ready,
    /// The operator has to visit the URL and hand back a code
    NeedsCode { authorization_url: String },
}

/// Credential flow for providers that cannot start from static config alone
#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Check stored credentials and report what, if anything, is missing
    async fn begin(&self) -> CalendarResult<AuthStart>;

    /// Exchange an authorization code for credentials and store them
    async fn submit_code(&self, code: &str) -> CalendarResult<()>;
}

/// Bounds every call of the wrapped provider; an expired call is a
/// transient failure
pub struct TimeoutProvider {
    inner: Arc<dyn CalendarProvider>,
    limit: Duration,
}

impl TimeoutProvider {
    pub fn new(inner: Arc<dyn CalendarProvider>, limit: Duration) -> Self {
        Self { inner, limit }
    }

    async fn bounded<T>(
        &self,
        operation: &str,
        call: impl Future<Output = CalendarResult<T>> + Send,
    ) -> CalendarResult<T> {
        timeout(self.limit, call).await.map_err(|_| {
            transient_error(&format!(
                "{} timed out after {}s",
                operation,
                self.limit.as_secs()
            ))
        })?
    }
}

#[async_trait]
impl CalendarProvider for TimeoutProvider {
    async fn create_event(&self, event: &mut Event) -> CalendarResult<()> {
        self.bounded("create_event", self.inner.create_event(event))
            .await
    }

    async fn delete_event(
        &self,
        uid: &str,
        calendar: Option<&CalendarIdentifier>,
    ) -> CalendarResult<()> {
        self.bounded("delete_event", self.inner.delete_event(uid, calendar))
            .await
    }

    async fn list_events(&self) -> CalendarResult<Vec<Event>> {
        self.bounded("list_events", self.inner.list_events()).await
    }

    async fn list_sub_calendars(&self) -> CalendarResult<Vec<CalendarIdentifier>> {
        self.bounded("list_sub_calendars", self.inner.list_sub_calendars())
            .await
    }

    fn supports_multiple_calendars(&self) -> bool {
        self.inner.supports_multiple_calendars()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Stalled;

    #[async_trait]
    impl CalendarProvider for Stalled {
        async fn create_event(&self, _event: &mut Event) -> CalendarResult<()> {
            Ok(())
        }

        async fn delete_event(
            &self,
            _uid: &str,
            _calendar: Option<&CalendarIdentifier>,
        ) -> CalendarResult<()> {
            Ok(())
        }

        async fn list_events(&self) -> CalendarResult<Vec<Event>> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Vec::new())
        }

        async fn list_sub_calendars(&self) -> CalendarResult<Vec<CalendarIdentifier>> {
            Ok(Vec::new())
        }

        fn supports_multiple_calendars(&self) -> bool {
            false
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_call_is_transient() {
        let provider = TimeoutProvider::new(Arc::new(Stalled), Duration::from_secs(30));

        let err = provider.list_events().await.unwrap_err();
        assert!(err.is_transient());
        assert!(provider.list_events_or_empty().await.is_empty());
        assert!(provider.list_sub_calendars().await.unwrap().is_empty());
    }
}
