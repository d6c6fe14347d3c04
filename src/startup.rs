use crate::components::AccountManager;
use crate::config::Config;
use crate::error::{other_error, Error};
use crate::shutdown;
use crate::tree::{MaterializedTree, MemoryTree};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Initialize logging with environment-based configuration
pub fn init_logging() -> miette::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,reqwest=warn,hyper=warn")),
        )
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| Error::Other(format!("Failed to set up logging: {}", e)))?;

    Ok(())
}

/// Load and validate the service config
pub async fn load_config() -> miette::Result<Arc<Config>> {
    match Config::load() {
        Ok(config) => Ok(Arc::new(config)),
        Err(e) => {
            error!("Failed to load configuration: {:?}", e);
            Err(e.into())
        }
    }
}

/// Start every configured account and run until a shutdown signal arrives
pub async fn start_service(config: Arc<Config>) -> miette::Result<()> {
    let manager = Arc::new(AccountManager::new(Arc::clone(&config)));

    for account in &config.accounts {
        let tree: Arc<dyn MaterializedTree> = Arc::new(MemoryTree::new());
        if let Err(e) = manager.add_account(account, tree).await {
            // Log error but continue with other accounts
            error!("Error starting account {}: {:?}", account.name, e);
        }
    }

    let running = manager.names().await;
    if running.is_empty() && !config.accounts.is_empty() {
        return Err(other_error("No configured account could be started").into());
    }
    info!(
        "Started {} account(s), refreshing every {:?}",
        running.len(),
        config.refresh_interval
    );

    shutdown::handle_signals(Arc::clone(&manager)).await?;
    info!("Service stopped");
    Ok(())
}
