use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Marks a unit of work as running so that late triggers can be dropped
/// instead of queued behind it.
#[derive(Debug, Clone, Default)]
pub struct InFlight(Arc<AtomicBool>);

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the slot, or `None` when work is already running
    pub fn try_acquire(&self) -> Option<InFlightGuard> {
        if self.0.swap(true, Ordering::SeqCst) {
            None
        } else {
            Some(InFlightGuard(Arc::clone(&self.0)))
        }
    }

    pub fn is_busy(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Releases the [`InFlight`] slot when dropped
#[derive(Debug)]
pub struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Run `tick` every `period` until `cancel` fires.
///
/// The first tick fires immediately. Ticks missed while `tick` is still
/// running are skipped, not bursted.
pub fn spawn_ticker<F, Fut>(
    name: String,
    period: Duration,
    cancel: CancellationToken,
    mut tick: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("Ticker for {} started ({:?} period)", name, period);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    debug!("Tick for {}", name);
                    tick().await;
                }
            }
        }

        info!("Ticker for {} stopped", name);
    })
}
