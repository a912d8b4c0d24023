//! Read-after-write consistency.
//!
//! Writes return a [`ChangeReceipt`]. A read presenting one waits until the
//! projection it reads from has applied the receipt's aggregate at least up
//! to the receipt's sequence. Projections that do not consume the
//! aggregate's type are compared by their global cursor against the
//! receipt's position instead.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBuilder};
use futures::future::BoxFuture;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::config::ConsistencyConfig;
use crate::error::{Error, Result};
use crate::model::{AggregateType, ChangeReceipt};
use crate::storage::PositionStore;
use crate::utils::retry::coordinator_backoff;

#[cfg(test)]
mod tests;

/// Source of time for the coordinator.
pub trait Clock: Send + Sync {
    /// Time elapsed since an arbitrary fixed origin.
    fn now(&self) -> Duration;

    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;
}

/// Clock backed by the tokio timer.
#[derive(Debug, Clone)]
pub struct TokioClock {
    origin: tokio::time::Instant,
}

impl Default for TokioClock {
    fn default() -> Self {
        Self {
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Clock that only moves when slept on. Sleeping advances it by the full
/// duration and yields to the runtime once.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<Mutex<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        self.advance(duration);
        Box::pin(tokio::task::yield_now())
    }
}

/// Cancels the waits observing the paired [`CancelSignal`].
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Cancellation observed by a wait.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    /// Signal that never fires.
    pub fn never() -> Self {
        let (_, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancelled. Pending forever if the handle is dropped
    /// without cancelling.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelSignal { rx })
}

/// Waits for projections to catch up with receipts.
pub struct Coordinator {
    positions: Arc<dyn PositionStore>,
    clock: Arc<dyn Clock>,
    backoff: ExponentialBuilder,
    max_delay: Duration,
    timeout: Duration,
}

impl Coordinator {
    pub fn new(
        positions: Arc<dyn PositionStore>,
        clock: Arc<dyn Clock>,
        config: &ConsistencyConfig,
    ) -> Self {
        Self {
            positions,
            clock,
            backoff: coordinator_backoff(config),
            max_delay: config.max_delay(),
            timeout: config.timeout(),
        }
    }

    /// Progress of `projection` comparable with the receipt, as
    /// `(required, observed)`.
    async fn progress(
        &self,
        projection: &str,
        tracks: &[AggregateType],
        receipt: &ChangeReceipt,
    ) -> Result<(u64, u64)> {
        if tracks.contains(&receipt.aggregate_type) {
            let observed = self
                .positions
                .get(projection, receipt.aggregate_type, &receipt.aggregate_id)
                .await?
                .unwrap_or(0);
            Ok((receipt.sequence, observed))
        } else {
            let observed = self.positions.get_cursor(projection).await?;
            Ok((receipt.position, observed))
        }
    }

    /// Wait until `projection`, which consumes the aggregate types
    /// `tracks`, reflects `receipt`.
    ///
    /// Fails with `StaleRead` once the timeout elapses and with `Cancelled`
    /// when `cancel` fires.
    #[tracing::instrument(
        name = "consistency.wait",
        skip_all,
        fields(projection = %projection, aggregate_id = %receipt.aggregate_id, sequence = receipt.sequence)
    )]
    pub async fn wait(
        &self,
        projection: &str,
        tracks: &[AggregateType],
        receipt: &ChangeReceipt,
        cancel: &CancelSignal,
    ) -> Result<()> {
        let deadline = self.clock.now() + self.timeout;
        let mut delays = self.backoff.build();
        let mut cancel = cancel.clone();
        let mut attempts = 0u32;

        loop {
            let (required, observed) = self.progress(projection, tracks, receipt).await?;
            if observed >= required {
                if attempts > 0 {
                    debug!(attempts, "Projection caught up");
                }
                return Ok(());
            }
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let now = self.clock.now();
            if now >= deadline {
                warn!(required, observed, "Projection did not catch up before deadline");
                return Err(Error::StaleRead {
                    projection: projection.to_string(),
                    required,
                    observed,
                });
            }

            let delay = delays
                .next()
                .unwrap_or(self.max_delay)
                .min(deadline - now);
            attempts += 1;
            tokio::select! {
                _ = self.clock.sleep(delay) => {}
                _ = cancel.cancelled() => return Err(Error::Cancelled),
            }
        }
    }
}
