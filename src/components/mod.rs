use crate::components::account::scheduler::start_scheduler;
use crate::components::account::{connect, AccountHandle, AccountParts, RefreshOutcome};
use crate::config::{AccountConfig, Config};
use crate::error::{component_error, CalendarResult};
use crate::tree::MaterializedTree;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

// Export components
pub mod account;
pub mod caldav;
pub mod exchange;
pub mod google_calendar;

/// A registered account and the ticker driving it
struct RunningAccount {
    handle: AccountHandle,
    ticker: JoinHandle<()>,
    cancel: CancellationToken,
}

/// Owner of every configured account
pub struct AccountManager {
    accounts: RwLock<HashMap<String, RunningAccount>>,
    config: Arc<Config>,
    cancel: CancellationToken,
}

impl fmt::Debug for AccountManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountManager")
            .field("refresh_interval", &self.config.refresh_interval)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl AccountManager {
    /// Create a new account manager
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
            config,
            cancel: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Start an account from ready-made parts and schedule its refreshes
    pub async fn register(&self, parts: AccountParts) -> CalendarResult<AccountHandle> {
        self.register_with_period(parts, self.config.refresh_interval)
            .await
    }

    /// Like [`AccountManager::register`] with an explicit refresh period
    pub async fn register_with_period(
        &self,
        parts: AccountParts,
        period: Duration,
    ) -> CalendarResult<AccountHandle> {
        if self.cancel.is_cancelled() {
            return Err(component_error("Account manager is shut down"));
        }

        let mut accounts = self.accounts.write().await;
        if accounts.contains_key(&parts.name) {
            return Err(component_error(&format!(
                "Account {} is already registered",
                parts.name
            )));
        }

        info!("Registering account: {}", parts.name);
        let handle = AccountHandle::new(parts);
        let cancel = self.cancel.child_token();
        let ticker = start_scheduler(handle.clone(), period, cancel.clone());

        accounts.insert(
            handle.name().to_string(),
            RunningAccount {
                handle: handle.clone(),
                ticker,
                cancel,
            },
        );
        Ok(handle)
    }

    /// Connect a configured account and register it
    pub async fn add_account(
        &self,
        account: &AccountConfig,
        tree: Arc<dyn MaterializedTree>,
    ) -> CalendarResult<AccountHandle> {
        let parts = connect(account, &self.config, tree)?;
        self.register(parts).await
    }

    /// Stop an account and clear its tree. Unknown names are a no-op.
    pub async fn remove_account(&self, name: &str) -> CalendarResult<()> {
        let Some(running) = self.accounts.write().await.remove(name) else {
            return Ok(());
        };

        info!("Removing account: {}", name);
        stop(name, running).await.clear().await
    }

    pub async fn get(&self, name: &str) -> Option<AccountHandle> {
        self.accounts
            .read()
            .await
            .get(name)
            .map(|running| running.handle.clone())
    }

    /// Registered account names, sorted
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.accounts.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Refresh every account concurrently. One account failing does not
    /// affect the others.
    pub async fn refresh_all(&self) -> Vec<(String, CalendarResult<RefreshOutcome>)> {
        let handles: Vec<AccountHandle> = self
            .accounts
            .read()
            .await
            .values()
            .map(|running| running.handle.clone())
            .collect();

        let refreshes = handles.iter().map(|handle| async move {
            (handle.name().to_string(), handle.refresh().await)
        });
        let mut results = futures::future::join_all(refreshes).await;
        results.sort_by(|a, b| a.0.cmp(&b.0));

        for (name, result) in &results {
            if let Err(e) = result {
                error!("Error refreshing account {}: {}", name, e);
            }
        }
        results
    }

    /// Shutdown all accounts
    pub async fn shutdown_all(&self) -> CalendarResult<()> {
        info!("Shutting down all accounts");
        self.cancel.cancel();

        let drained: Vec<(String, RunningAccount)> = self.accounts.write().await.drain().collect();
        for (name, running) in drained {
            info!("Shutting down account: {}", name);
            stop(&name, running).await;
        }

        Ok(())
    }
}

/// Stop the ticker and the actor of one account, returning its tree
async fn stop(name: &str, running: RunningAccount) -> Arc<dyn MaterializedTree> {
    running.cancel.cancel();
    if let Err(e) = running.ticker.await {
        error!("Ticker of account {} ended abnormally: {}", name, e);
    }
    if let Err(e) = running.handle.shutdown().await {
        // Log error but continue with other accounts
        error!("Error shutting down account {}: {:?}", name, e);
    }
    running.handle.tree()
}
