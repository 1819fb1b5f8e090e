//! Single repeating timer driving one advance callback.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, trace};
use uuid::Uuid;

use crate::error::{Result, SequencerError};

/// Token identifying one started poller. Required to stop it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PollHandle {
    poller_id: Uuid,
    name: String,
}

impl PollHandle {
    pub fn poller_id(&self) -> Uuid {
        self.poller_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A spawned polling loop
pub(crate) struct RunningPoller {
    handle: PollHandle,
    interval: Duration,
    ticks: Arc<AtomicU64>,
    task: JoinHandle<()>,
}

impl std::fmt::Debug for RunningPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunningPoller")
            .field("poller_id", &self.handle.poller_id)
            .field("name", &self.handle.name)
            .field("interval_ms", &self.interval.as_millis())
            .field("ticks", &self.ticks.load(Ordering::Relaxed))
            .finish()
    }
}

impl RunningPoller {
    /// Spawn the loop on the current tokio runtime.
    ///
    /// `advance` runs to completion inside the loop before the next tick is
    /// awaited, so invocations never overlap. Ticks missed while the runtime
    /// was busy are skipped rather than replayed.
    pub(crate) fn spawn<F>(name: &str, period: Duration, mut advance: F) -> Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        if period.is_zero() {
            return Err(SequencerError::SchedulerError(format!(
                "poller '{name}' needs a non-zero interval"
            )));
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            SequencerError::SchedulerError(format!("poller '{name}' needs a tokio runtime: {e}"))
        })?;

        let handle = PollHandle {
            poller_id: Uuid::new_v4(),
            name: name.to_string(),
        };
        let ticks = Arc::new(AtomicU64::new(0));

        let loop_ticks = Arc::clone(&ticks);
        let poller_id = handle.poller_id;
        let task = runtime.spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                advance();
                let count = loop_ticks.fetch_add(1, Ordering::Relaxed) + 1;
                trace!(poller_id = %poller_id, tick = count, "Poller tick");
            }
        });

        debug!(
            poller_id = %handle.poller_id,
            name = %handle.name,
            interval_ms = period.as_millis() as u64,
            "Started poller"
        );

        Ok(Self {
            handle,
            interval: period,
            ticks,
            task,
        })
    }

    pub(crate) fn handle(&self) -> &PollHandle {
        &self.handle
    }

    pub(crate) fn interval(&self) -> Duration {
        self.interval
    }

    pub(crate) fn tick_count(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub(crate) fn stop(self) {
        debug!(
            poller_id = %self.handle.poller_id,
            name = %self.handle.name,
            ticks = self.tick_count(),
            "Stopping poller"
        );
        self.task.abort();
    }
}

impl Drop for RunningPoller {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_without_runtime_fails() {
        let result = RunningPoller::spawn("orphan", Duration::from_millis(17), || {});
        assert!(matches!(result, Err(SequencerError::SchedulerError(_))));
    }

    #[tokio::test]
    async fn test_zero_interval_rejected() {
        let result = RunningPoller::spawn("zero", Duration::ZERO, || {});
        assert!(matches!(result, Err(SequencerError::SchedulerError(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poller_ticks_until_stopped() {
        let poller = RunningPoller::spawn("ticker", Duration::from_millis(10), || {}).unwrap();
        tokio::time::sleep(Duration::from_millis(95)).await;
        let ticks = poller.tick_count();
        assert!((9..=10).contains(&ticks), "unexpected tick count {ticks}");

        poller.stop();
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}
