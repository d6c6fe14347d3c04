pub mod actor;
pub mod auth;
pub mod handle;
pub mod reconcile;
pub mod scheduler;

pub use auth::{AuthEvent, AuthState};
pub use handle::{AccountHandle, AccountParts, EventRequest, RefreshOutcome};
pub use reconcile::ReconcileReport;

use crate::calendar::provider::{Authorizer, CalendarProvider, TimeoutProvider};
use crate::components::caldav::CalDavCalendar;
use crate::components::exchange::ExchangeCalendar;
use crate::components::google_calendar::{GoogleCalendar, TokenManager};
use crate::config::{AccountConfig, Config, ProviderConfig};
use crate::error::CalendarResult;
use crate::tree::MaterializedTree;
use std::sync::Arc;
use tracing::info;

/// Build the provider for a configured account and bundle it with `tree`
pub fn connect(
    account: &AccountConfig,
    config: &Config,
    tree: Arc<dyn MaterializedTree>,
) -> CalendarResult<AccountParts> {
    let zone = config.time_zone()?;

    let (provider, authorizer): (Arc<dyn CalendarProvider>, Option<Arc<dyn Authorizer>>) =
        match &account.provider {
            ProviderConfig::Caldav(caldav) => (Arc::new(CalDavCalendar::new(caldav, zone)), None),
            ProviderConfig::Google(google) => {
                let tokens = TokenManager::new(
                    &account.name,
                    &google.client_id,
                    &google.client_secret,
                    &config.token_dir,
                );
                let calendar = GoogleCalendar::new(tokens.clone(), zone.name());
                (Arc::new(calendar), Some(Arc::new(tokens)))
            }
            ProviderConfig::Exchange(exchange) => {
                (Arc::new(ExchangeCalendar::new(exchange)?), None)
            }
        };

    info!(
        "Connected {} account {} (timeout {:?})",
        account.provider.kind(),
        account.name,
        config.provider_timeout
    );

    Ok(AccountParts {
        name: account.name.clone(),
        provider: Arc::new(TimeoutProvider::new(provider, config.provider_timeout)),
        authorizer,
        tree,
        display_zone: zone,
    })
}
