use crate::components::AccountManager;
use crate::error::{other_error, CalendarResult};
use std::sync::Arc;
use tracing::{error, info};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};
#[cfg(windows)]
use tokio::signal::windows::{ctrl_break, ctrl_c};

/// Wait for a termination signal, then shut every account down
pub async fn handle_signals(manager: Arc<AccountManager>) -> CalendarResult<()> {
    wait_for_signal().await?;

    if let Err(e) = manager.shutdown_all().await {
        error!("Error shutting down accounts: {:?}", e);
    } else {
        info!("All accounts shut down successfully");
    }

    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() -> CalendarResult<()> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| other_error(&format!("Failed to create SIGTERM signal handler: {}", e)))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| other_error(&format!("Failed to create SIGINT signal handler: {}", e)))?;

    tokio::select! {
        _ = sigterm.recv() => {
            info!("Received SIGTERM signal, initiating graceful shutdown");
        }
        _ = sigint.recv() => {
            info!("Received SIGINT signal, initiating graceful shutdown");
        }
    }
    Ok(())
}

#[cfg(windows)]
async fn wait_for_signal() -> CalendarResult<()> {
    let mut ctrlc =
        ctrl_c().map_err(|e| other_error(&format!("Failed to create Ctrl+C handler: {}", e)))?;
    let mut ctrlbreak = ctrl_break()
        .map_err(|e| other_error(&format!("Failed to create Ctrl+Break handler: {}", e)))?;

    tokio::select! {
        _ = ctrlc.recv() => {
            info!("Received Ctrl+C signal, initiating graceful shutdown");
        }
        _ = ctrlbreak.recv() => {
            info!("Received Ctrl+Break signal, initiating graceful shutdown");
        }
    }
    Ok(())
}
