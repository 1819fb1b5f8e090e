//! Registry of named pollers with independent intervals.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use super::poller::{PollHandle, RunningPoller};
use crate::error::Result;

/// Owns every timer started through it. Dropping the scheduler stops them all.
#[derive(Debug)]
pub struct PollScheduler {
    scheduler_id: Uuid,
    pollers: DashMap<String, RunningPoller>,
}

impl Default for PollScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl PollScheduler {
    pub fn new() -> Self {
        Self {
            scheduler_id: Uuid::new_v4(),
            pollers: DashMap::new(),
        }
    }

    pub fn scheduler_id(&self) -> Uuid {
        self.scheduler_id
    }

    /// Start invoking `advance` every `period` under `name`.
    ///
    /// Starting a name that is already running is a no-op that returns the
    /// existing handle; `advance` is dropped and no second timer is created.
    pub fn start<F>(&self, name: &str, period: Duration, advance: F) -> Result<PollHandle>
    where
        F: FnMut() + Send + 'static,
    {
        match self.pollers.entry(name.to_string()) {
            Entry::Occupied(existing) => {
                warn!(
                    scheduler_id = %self.scheduler_id,
                    name = %name,
                    poller_id = %existing.get().handle().poller_id(),
                    "Poller already running"
                );
                Ok(existing.get().handle().clone())
            }
            Entry::Vacant(slot) => {
                let poller = RunningPoller::spawn(name, period, advance)?;
                let handle = poller.handle().clone();
                info!(
                    scheduler_id = %self.scheduler_id,
                    name = %name,
                    poller_id = %handle.poller_id(),
                    interval_ms = period.as_millis() as u64,
                    "Registered poller"
                );
                slot.insert(poller);
                Ok(handle)
            }
        }
    }

    /// Stop the poller identified by `handle`. Returns false when it was not
    /// running (already stopped, or the name now belongs to a newer poller).
    pub fn stop(&self, handle: &PollHandle) -> bool {
        let removed = self
            .pollers
            .remove_if(handle.name(), |_, poller| poller.handle() == handle);
        match removed {
            Some((_, poller)) => {
                poller.stop();
                true
            }
            None => false,
        }
    }

    /// Data-poller style registration; same semantics as [`PollScheduler::start`]
    pub fn add<F>(&self, name: &str, period: Duration, advance: F) -> Result<PollHandle>
    where
        F: FnMut() + Send + 'static,
    {
        self.start(name, period, advance)
    }

    /// Stop whatever poller runs under `name`
    pub fn remove(&self, name: &str) -> bool {
        match self.pollers.remove(name) {
            Some((_, poller)) => {
                poller.stop();
                true
            }
            None => false,
        }
    }

    /// Stop every registered poller
    pub fn stop_all(&self) {
        let names: Vec<String> = self.names();
        for name in names {
            self.remove(&name);
        }
    }

    pub fn is_running(&self, handle: &PollHandle) -> bool {
        self.pollers
            .get(handle.name())
            .is_some_and(|poller| poller.handle() == handle)
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.pollers.contains_key(name)
    }

    /// Ticks completed by the poller behind `handle`, if it is still running
    pub fn tick_count(&self, handle: &PollHandle) -> Option<u64> {
        self.pollers
            .get(handle.name())
            .filter(|poller| poller.handle() == handle)
            .map(|poller| poller.tick_count())
    }

    pub fn interval_of(&self, name: &str) -> Option<Duration> {
        self.pollers.get(name).map(|poller| poller.interval())
    }

    pub fn names(&self) -> Vec<String> {
        self.pollers.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.pollers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pollers.is_empty()
    }
}

impl Drop for PollScheduler {
    fn drop(&mut self) {
        self.stop_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    fn counter() -> (Arc<AtomicU64>, impl FnMut() + Send + 'static) {
        let count = Arc::new(AtomicU64::new(0));
        let inner = Arc::clone(&count);
        (count, move || {
            inner.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_start_creates_single_timer() {
        let scheduler = PollScheduler::new();
        let (first_count, first) = counter();
        let (second_count, second) = counter();

        let handle = scheduler.start("engine", Duration::from_millis(17), first).unwrap();
        let again = scheduler.start("engine", Duration::from_millis(17), second).unwrap();
        assert_eq!(handle, again);
        assert_eq!(scheduler.len(), 1);

        tokio::time::sleep(Duration::from_millis(170)).await;

        let invocations = first_count.load(Ordering::SeqCst);
        assert!((10..=11).contains(&invocations), "got {invocations}");
        assert_eq!(second_count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent() {
        let scheduler = PollScheduler::new();
        let (count, advance) = counter();
        let handle = scheduler.start("engine", Duration::from_millis(17), advance).unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(scheduler.stop(&handle));
        assert!(!scheduler.stop(&handle));
        assert!(!scheduler.is_running(&handle));
        assert!(scheduler.is_empty());

        let stopped_at = count.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(count.load(Ordering::SeqCst), stopped_at);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_handle_does_not_stop_newer_poller() {
        let scheduler = PollScheduler::new();
        let (_, first) = counter();
        let (_, second) = counter();

        let old = scheduler.start("engine", Duration::from_millis(17), first).unwrap();
        assert!(scheduler.stop(&old));
        let new = scheduler.start("engine", Duration::from_millis(17), second).unwrap();

        assert_ne!(old, new);
        assert!(!scheduler.stop(&old));
        assert!(scheduler.is_running(&new));
    }

    #[tokio::test(start_paused = true)]
    async fn test_named_pollers_have_independent_intervals() {
        let scheduler = PollScheduler::new();
        let (fast_count, fast) = counter();
        let (slow_count, slow) = counter();

        let fast_handle = scheduler.add("fast", Duration::from_millis(10), fast).unwrap();
        scheduler.add("slow", Duration::from_millis(100), slow).unwrap();
        assert_eq!(scheduler.interval_of("slow"), Some(Duration::from_millis(100)));

        tokio::time::sleep(Duration::from_millis(255)).await;

        assert_eq!(slow_count.load(Ordering::SeqCst), 3);
        assert!(fast_count.load(Ordering::SeqCst) >= 25);
        assert!(scheduler.tick_count(&fast_handle).is_some());

        assert!(scheduler.remove("slow"));
        assert!(!scheduler.remove("slow"));
        assert!(scheduler.is_registered("fast"));

        scheduler.stop_all();
        assert!(scheduler.is_empty());
    }
}
