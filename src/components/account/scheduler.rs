use super::auth::AuthState;
use super::handle::{AccountHandle, RefreshOutcome};
use crate::utils::scheduler::spawn_ticker;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Start the periodic refresh of one account
pub fn start_scheduler(
    handle: AccountHandle,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    spawn_ticker(
        format!("account {}", handle.name()),
        period,
        cancel,
        move || {
            let handle = handle.clone();
            async move { tick(&handle).await }
        },
    )
}

/// One scheduler tick: make sure the account is authorized, then reconcile
pub async fn tick(handle: &AccountHandle) {
    if !handle.auth_state().is_authorized() {
        match handle.check_auth().await {
            Ok(AuthState::Authorized) => {
                info!("Account {} authorized, starting reconciliation", handle.name());
            }
            Ok(state) => {
                debug!("Account {} is {}, not reconciling", handle.name(), state);
                return;
            }
            Err(e) => {
                warn!("Failed to check credentials of {}: {}", handle.name(), e);
                return;
            }
        }
    }

    match handle.refresh().await {
        Ok(RefreshOutcome::Completed(report)) => {
            debug!("Scheduled refresh of {} done: {}", handle.name(), report);
        }
        Ok(RefreshOutcome::Skipped) => {
            debug!("Scheduled refresh of {} skipped", handle.name());
        }
        Err(e) if e.is_auth() => {
            error!("Refresh of {} needs re-authorization: {}", handle.name(), e);
        }
        Err(e) => {
            warn!("Refresh of {} failed, retrying next tick: {}", handle.name(), e);
        }
    }
}
