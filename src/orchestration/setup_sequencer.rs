//! # Setup Sequencer
//!
//! Binds one [`StepEngine`] to its observer, dispatcher and timers. This is
//! the owner of a setup run: construct it when setup should become possible,
//! call [`SetupSequencer::start`], forward the user's confirmation, and call
//! [`SetupSequencer::shutdown`] (or drop it) when the run is torn down.
//! Commands still awaiting confirmation at shutdown are abandoned.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::SequencerConfig;
use crate::constants::{ENGINE_POLLER_NAME, ITEM_REFRESH_POLLER_NAME};
use crate::error::{Result, SequencerError};
use crate::events::{EventPublisher, PublishedEvent};
use crate::logging::log_sequencer_operation;
use crate::observer::{CommandDispatcher, SequencerCommand, StateObserver};
use crate::scheduler::{PollHandle, PollScheduler};
use crate::state_machine::{
    ConfirmationGuard, ProgressReport, SequencerPhase, SequencerState, StepEngine,
};

pub struct SetupSequencer {
    config: SequencerConfig,
    engine: Arc<Mutex<StepEngine>>,
    observer: Arc<dyn StateObserver>,
    dispatcher: Arc<dyn CommandDispatcher>,
    scheduler: PollScheduler,
    publisher: EventPublisher,
    progress: Arc<watch::Sender<ProgressReport>>,
    engine_poller: Mutex<Option<PollHandle>>,
}

impl std::fmt::Debug for SetupSequencer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SetupSequencer")
            .field("sequencer_id", &self.sequencer_id())
            .field("owner_id", &self.config.owner_id)
            .field("progress", &self.progress())
            .field("pollers", &self.scheduler.names())
            .finish()
    }
}

impl SetupSequencer {
    /// Create a sequencer with the default snapshot predicates
    pub fn new(
        config: SequencerConfig,
        observer: Arc<dyn StateObserver>,
        dispatcher: Arc<dyn CommandDispatcher>,
    ) -> Result<Self> {
        config.validate()?;
        let engine = StepEngine::new(&config);
        Self::from_engine(config, engine, observer, dispatcher)
    }

    /// Create a sequencer whose engine confirms steps through `guard`
    pub fn with_guard(
        config: SequencerConfig,
        guard: impl ConfirmationGuard + 'static,
        observer: Arc<dyn StateObserver>,
        dispatcher: Arc<dyn CommandDispatcher>,
    ) -> Result<Self> {
        config.validate()?;
        let engine = StepEngine::new(&config).with_guard(guard);
        Self::from_engine(config, engine, observer, dispatcher)
    }

    fn from_engine(
        config: SequencerConfig,
        engine: StepEngine,
        observer: Arc<dyn StateObserver>,
        dispatcher: Arc<dyn CommandDispatcher>,
    ) -> Result<Self> {
        let publisher = EventPublisher::new(config.event_channel_capacity);
        let engine = engine.with_publisher(publisher.clone());
        let (progress, _) = watch::channel(engine.progress());

        info!(
            sequencer_id = %engine.id(),
            owner_id = config.owner_id,
            required_items = config.required_items.len(),
            transfer_in_progress = config.transfer_in_progress,
            policy = %config.already_active_policy,
            "Creating SetupSequencer"
        );

        Ok(Self {
            config,
            engine: Arc::new(Mutex::new(engine)),
            observer,
            dispatcher,
            scheduler: PollScheduler::new(),
            publisher,
            progress: Arc::new(progress),
            engine_poller: Mutex::new(None),
        })
    }

    /// Start the engine poller (and the item-refresh poller when enabled).
    /// Calling start on a running sequencer is a no-op.
    pub fn start(&self) -> Result<()> {
        let mut engine_poller = self.engine_poller.lock();
        if engine_poller
            .as_ref()
            .is_some_and(|handle| self.scheduler.is_running(handle))
        {
            debug!(sequencer_id = %self.sequencer_id(), "SetupSequencer already running");
            return Ok(());
        }

        if self.config.auto_confirm {
            self.confirm();
        }

        let engine = Arc::clone(&self.engine);
        let observer = Arc::clone(&self.observer);
        let dispatcher = Arc::clone(&self.dispatcher);
        let progress = Arc::clone(&self.progress);
        let handle = self.scheduler.start(
            ENGINE_POLLER_NAME,
            self.config.polling.tick_interval(),
            move || advance(&engine, observer.as_ref(), dispatcher.as_ref(), &progress),
        )?;
        *engine_poller = Some(handle);

        if self.config.polling.refresh_enabled {
            let dispatcher = Arc::clone(&self.dispatcher);
            let owner_id = self.config.owner_id;
            self.scheduler.add(
                ITEM_REFRESH_POLLER_NAME,
                self.config.polling.refresh_interval(),
                move || dispatcher.dispatch(SequencerCommand::FetchItems { owner_id }),
            )?;
        }

        log_sequencer_operation(
            "start",
            self.config.owner_id,
            self.progress().phase,
            "started",
            None,
        );
        Ok(())
    }

    /// Forward the user's confirmation. Returns false outside CONFIRMING.
    pub fn confirm(&self) -> bool {
        let report = {
            let mut engine = self.engine.lock();
            if !engine.confirm(self.dispatcher.as_ref()) {
                return false;
            }
            engine.progress()
        };
        publish_progress(&self.progress, report);
        true
    }

    /// Run one advance immediately, outside the timer
    pub fn tick_now(&self) {
        advance(
            &self.engine,
            self.observer.as_ref(),
            self.dispatcher.as_ref(),
            &self.progress,
        );
    }

    pub fn sequencer_id(&self) -> Uuid {
        self.engine.lock().id()
    }

    pub fn config(&self) -> &SequencerConfig {
        &self.config
    }

    pub fn progress(&self) -> ProgressReport {
        self.engine.lock().progress()
    }

    pub fn state(&self) -> SequencerState {
        self.engine.lock().state().clone()
    }

    /// Human-readable label of the item whose command is awaiting confirmation
    pub fn current_item_label(&self) -> Option<String> {
        let current = self.engine.lock().state().current_item.clone()?;
        let label = self.config.label_for(&current).unwrap_or(&current);
        Some(label.to_string())
    }

    /// Progress updates, delivered after every advance that changed them
    pub fn subscribe(&self) -> watch::Receiver<ProgressReport> {
        self.progress.subscribe()
    }

    /// Lifecycle events from the engine
    pub fn events(&self) -> broadcast::Receiver<PublishedEvent> {
        self.publisher.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.engine_poller
            .lock()
            .as_ref()
            .is_some_and(|handle| self.scheduler.is_running(handle))
    }

    /// Names of the pollers this sequencer currently runs
    pub fn poller_names(&self) -> Vec<String> {
        self.scheduler.names()
    }

    /// Wait until the engine reaches `phase`
    pub async fn wait_for_phase(&self, phase: SequencerPhase) -> Result<ProgressReport> {
        let mut receiver = self.subscribe();
        let report = receiver
            .wait_for(|report| report.phase == phase)
            .await
            .map_err(|e| SequencerError::Internal(format!("progress channel closed: {e}")))?;
        Ok(*report)
    }

    /// Wait until the engine reaches IDLE, giving up after `limit`
    pub async fn wait_until_finished(&self, limit: Duration) -> Result<ProgressReport> {
        tokio::time::timeout(limit, self.wait_for_phase(SequencerPhase::Idle))
            .await
            .map_err(|_| {
                let stalled = self.progress();
                SequencerError::Internal(format!(
                    "setup did not finish within {}ms; stalled in {} at step {}/{}",
                    limit.as_millis(),
                    stalled.phase,
                    stalled.step_index,
                    stalled.total_steps
                ))
            })?
    }

    /// Stop every timer. In-flight commands are abandoned.
    pub fn shutdown(&self) {
        let had_poller = self.engine_poller.lock().take().is_some();
        self.scheduler.stop_all();
        if had_poller {
            log_sequencer_operation(
                "shutdown",
                self.config.owner_id,
                self.progress().phase,
                "stopped",
                None,
            );
        }
    }
}

fn advance(
    engine: &Mutex<StepEngine>,
    observer: &dyn StateObserver,
    dispatcher: &dyn CommandDispatcher,
    progress: &watch::Sender<ProgressReport>,
) {
    let report = {
        let mut engine = engine.lock();
        engine.tick(observer, dispatcher);
        engine.progress()
    };
    publish_progress(progress, report);
}

fn publish_progress(progress: &watch::Sender<ProgressReport>, report: ProgressReport) {
    progress.send_if_modified(|current| {
        if *current == report {
            false
        } else {
            *current = report;
            true
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RequiredItem;
    use crate::observer::{ExternalSnapshot, ItemStatus, SnapshotStore};
    use crate::test_helpers::RecordingDispatcher;

    fn sequencer(
        config: SequencerConfig,
    ) -> (SetupSequencer, SnapshotStore, Arc<RecordingDispatcher>) {
        let store = SnapshotStore::new();
        let dispatcher = Arc::new(RecordingDispatcher::new());
        let sequencer = SetupSequencer::new(
            config,
            Arc::new(store.clone()),
            Arc::clone(&dispatcher) as Arc<dyn CommandDispatcher>,
        )
        .unwrap();
        (sequencer, store, dispatcher)
    }

    fn config() -> SequencerConfig {
        let mut config = SequencerConfig::with_owner(5);
        config.required_items = vec![RequiredItem::new("a", "A")];
        config
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = config();
        config.required_items.clear();
        let result = SetupSequencer::new(
            config,
            Arc::new(SnapshotStore::new()),
            Arc::new(RecordingDispatcher::new()),
        );
        assert!(matches!(result, Err(SequencerError::ConfigurationError(_))));
    }

    #[test]
    fn test_manual_ticks_publish_progress() {
        let (sequencer, store, dispatcher) = sequencer(config());
        let receiver = sequencer.subscribe();
        store.replace_items(ExternalSnapshot::new().with_item("a", ItemStatus::installed()));

        assert!(sequencer.confirm());
        assert!(!sequencer.confirm());
        sequencer.tick_now();

        assert!(receiver.has_changed().unwrap());
        assert_eq!(receiver.borrow().phase, SequencerPhase::Activating);
        assert_eq!(receiver.borrow().total_steps, 1);

        assert!(sequencer.current_item_label().is_none());
        sequencer.tick_now();
        assert_eq!(dispatcher.count_of("activate"), 1);
        assert_eq!(sequencer.state().current_item.as_deref(), Some("a"));
        assert_eq!(sequencer.current_item_label().as_deref(), Some("A"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_idempotent_and_shutdown_stops_pollers() {
        let mut config = config();
        config.polling.refresh_enabled = true;
        config.polling.refresh_interval_ms = 1_000;
        let (sequencer, _store, dispatcher) = sequencer(config);

        sequencer.start().unwrap();
        sequencer.start().unwrap();
        assert!(sequencer.is_running());
        let mut names = sequencer.poller_names();
        names.sort();
        assert_eq!(names, vec![ENGINE_POLLER_NAME, ITEM_REFRESH_POLLER_NAME]);

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        assert_eq!(dispatcher.count_of("fetch_items"), 3);

        sequencer.shutdown();
        sequencer.shutdown();
        assert!(!sequencer.is_running());
        assert!(sequencer.poller_names().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_confirm_runs_to_idle() {
        let mut config = config();
        config.auto_confirm = true;
        let (sequencer, store, dispatcher) = sequencer(config);
        store.replace_items(ExternalSnapshot::new().with_item("a", ItemStatus::installed()));

        sequencer.start().unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(dispatcher.count_of("activate"), 1);

        store.update_item("a", |status| status.active = true);
        let report = sequencer
            .wait_until_finished(Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(report.step_index, 1);
        assert_eq!(report.percent(), 100.0);
        assert_eq!(dispatcher.count_of("mark_setup_complete"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_finished_reports_stall() {
        let mut config = config();
        config.auto_confirm = true;
        let (sequencer, _store, _dispatcher) = sequencer(config);
        sequencer.start().unwrap();

        let err = sequencer
            .wait_until_finished(Duration::from_millis(500))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("stalled in initializing"));
    }
}
