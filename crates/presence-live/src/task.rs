//! Cancellable periodic task on the tokio clock.

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Shortest accepted period; `tokio::time::interval` rejects zero.
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Handle to a recurring callback.
///
/// The callback runs once after `first_delay`, then every `period`. Missed
/// ticks are skipped rather than bunched up. Cancelling (or dropping the
/// handle) guarantees no further callback starts.
pub struct PeriodicTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl PeriodicTask {
    pub fn spawn<F>(first_delay: Duration, period: Duration, mut on_tick: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let period = period.max(MIN_PERIOD);
        let first = Instant::now() + first_delay;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(first, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => on_tick(),
                }
            }
            tracing::debug!("periodic task exited");
        });

        Self { cancel, handle }
    }

    /// Stop the task. Takes effect immediately; idempotent.
    pub fn cancel(&self) {
        self.cancel.cancel();
        self.handle.abort();
    }

    /// True while further ticks may still fire.
    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled() && !self.handle.is_finished()
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.cancel();
    }
}
