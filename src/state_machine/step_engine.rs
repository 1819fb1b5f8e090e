//! # Step Engine
//!
//! Phase machine that drives required items to "installed and active" by
//! re-reading an external snapshot on every tick. Commands are dispatched
//! fire-and-forget; an item counts as done only once a later snapshot shows
//! the expected status.
//!
//! Every branch of [`StepEngine::tick`] is total. A command that fails
//! remotely looks exactly like one that has not confirmed yet, so the engine
//! stalls in its current phase rather than erroring.

use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use tracing::{debug, info};
use uuid::Uuid;

use super::guards::{ConfirmationGuard, SnapshotConfirmation};
use super::states::{SequencerPhase, WaitingOn};
use crate::config::SequencerConfig;
use crate::constants::{step_costs, AlreadyActivePolicy};
use crate::events::{EventPublisher, SequencerEvent};
use crate::observer::{
    CommandDispatcher, ExternalSnapshot, OwnerId, SequencerCommand, StateObserver,
};

/// Mutable progress of one setup run. Only the engine mutates it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SequencerState {
    pub phase: SequencerPhase,
    pub to_install: VecDeque<String>,
    pub to_activate: VecDeque<String>,
    /// Item whose command was dispatched but is not yet confirmed
    pub current_item: Option<String>,
    pub step_index: u32,
    pub total_steps: u32,
    pub waiting_on: WaitingOn,
}

/// What presentation code needs to draw a progress indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressReport {
    pub phase: SequencerPhase,
    pub step_index: u32,
    pub total_steps: u32,
}

impl ProgressReport {
    /// `step_index / total_steps * 100`, clamped to `[0, 100]`.
    /// Zero total steps reports 0.
    pub fn percent(&self) -> f64 {
        if self.total_steps == 0 {
            return 0.0;
        }
        (f64::from(self.step_index) / f64::from(self.total_steps) * 100.0).clamp(0.0, 100.0)
    }

    pub fn is_finished(&self) -> bool {
        self.phase.is_terminal()
    }
}

/// Single-owner setup state machine
pub struct StepEngine {
    id: Uuid,
    owner_id: OwnerId,
    required_items: Vec<String>,
    transfer_in_progress: bool,
    already_active_policy: AlreadyActivePolicy,
    guard: Box<dyn ConfirmationGuard>,
    publisher: Option<EventPublisher>,
    state: SequencerState,
    requested_transfer_status: bool,
    requested_metadata: HashSet<String>,
}

impl std::fmt::Debug for StepEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepEngine")
            .field("id", &self.id)
            .field("owner_id", &self.owner_id)
            .field("guard", &self.guard.description())
            .field("state", &self.state)
            .finish()
    }
}

impl StepEngine {
    /// Create an engine in CONFIRMING using the default snapshot predicates
    pub fn new(config: &SequencerConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id: config.owner_id,
            required_items: config.required_item_ids(),
            transfer_in_progress: config.transfer_in_progress,
            already_active_policy: config.already_active_policy,
            guard: Box::new(SnapshotConfirmation),
            publisher: None,
            state: SequencerState::default(),
            requested_transfer_status: false,
            requested_metadata: HashSet::new(),
        }
    }

    /// Replace the confirmation predicates
    pub fn with_guard(mut self, guard: impl ConfirmationGuard + 'static) -> Self {
        self.guard = Box::new(guard);
        self
    }

    /// Publish lifecycle events on `publisher`
    pub fn with_publisher(mut self, publisher: EventPublisher) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn owner_id(&self) -> OwnerId {
        self.owner_id
    }

    pub fn state(&self) -> &SequencerState {
        &self.state
    }

    pub fn phase(&self) -> SequencerPhase {
        self.state.phase
    }

    pub fn already_active_policy(&self) -> AlreadyActivePolicy {
        self.already_active_policy
    }

    pub fn progress(&self) -> ProgressReport {
        ProgressReport {
            phase: self.state.phase,
            step_index: self.state.step_index,
            total_steps: self.state.total_steps,
        }
    }

    /// Pass the confirmation gate. Returns false when not in CONFIRMING.
    pub fn confirm(&mut self, dispatcher: &dyn CommandDispatcher) -> bool {
        if self.state.phase != SequencerPhase::Confirming {
            debug!(
                engine_id = %self.id,
                phase = %self.state.phase,
                "Ignoring confirmation outside of confirming phase"
            );
            return false;
        }

        if self.transfer_in_progress {
            self.set_phase(SequencerPhase::Transferring);
            self.request_transfer_status(dispatcher);
        } else {
            self.set_phase(SequencerPhase::Initializing);
        }
        true
    }

    /// Advance the machine by one observation
    pub fn tick(&mut self, observer: &dyn StateObserver, dispatcher: &dyn CommandDispatcher) {
        match self.state.phase {
            SequencerPhase::Confirming | SequencerPhase::Idle => {}
            SequencerPhase::Transferring => self.poll_transfer_status(observer, dispatcher),
            SequencerPhase::Initializing => self.initialize(observer, dispatcher),
            SequencerPhase::Installing => self.install_next(observer, dispatcher),
            SequencerPhase::Activating => self.activate_next(observer, dispatcher),
            SequencerPhase::DoneSuccess => self.finish(dispatcher),
        }
    }

    fn request_transfer_status(&mut self, dispatcher: &dyn CommandDispatcher) {
        if self.requested_transfer_status {
            return;
        }
        self.requested_transfer_status = true;
        self.dispatch(
            dispatcher,
            SequencerCommand::FetchTransferStatus {
                owner_id: self.owner_id,
            },
        );
    }

    fn poll_transfer_status(
        &mut self,
        observer: &dyn StateObserver,
        dispatcher: &dyn CommandDispatcher,
    ) {
        self.request_transfer_status(dispatcher);

        if !self.guard.is_transfer_complete(observer.transfer_status()) {
            return;
        }

        self.set_phase(SequencerPhase::Initializing);
        self.dispatch(
            dispatcher,
            SequencerCommand::FetchItems {
                owner_id: self.owner_id,
            },
        );
        self.state.waiting_on = WaitingOn::ItemList;
    }

    fn initialize(&mut self, observer: &dyn StateObserver, dispatcher: &dyn CommandDispatcher) {
        // An empty list is indistinguishable from one that has not loaded
        let snapshot = match observer.items() {
            Some(snapshot) if !snapshot.is_empty() => snapshot,
            _ => {
                if self.state.waiting_on != WaitingOn::ItemList {
                    debug!(engine_id = %self.id, "Waiting for item list");
                    self.state.waiting_on = WaitingOn::ItemList;
                    self.dispatch(
                        dispatcher,
                        SequencerCommand::FetchItems {
                            owner_id: self.owner_id,
                        },
                    );
                }
                return;
            }
        };

        let plan = self.plan_work(&snapshot);

        let missing_metadata: Vec<String> = plan
            .to_install
            .iter()
            .filter(|item_id| observer.item_metadata(item_id).is_none())
            .cloned()
            .collect();

        if !missing_metadata.is_empty() {
            for item_id in missing_metadata {
                if self.requested_metadata.insert(item_id.clone()) {
                    self.dispatch(dispatcher, SequencerCommand::FetchItemMetadata { item_id });
                }
            }
            if self.state.waiting_on != WaitingOn::ItemMetadata {
                debug!(engine_id = %self.id, "Waiting for item metadata");
                self.state.waiting_on = WaitingOn::ItemMetadata;
            }
            return;
        }

        info!(
            engine_id = %self.id,
            to_install = plan.to_install.len(),
            to_activate = plan.to_activate.len(),
            steps = plan.steps,
            "Computed required work"
        );

        self.state.waiting_on = WaitingOn::Nothing;
        self.state.total_steps = plan.steps;
        self.state.to_install = plan.to_install;
        self.state.to_activate = plan.to_activate;

        if !self.state.to_install.is_empty() {
            self.set_phase(SequencerPhase::Installing);
        } else if !self.state.to_activate.is_empty() {
            self.set_phase(SequencerPhase::Activating);
        } else {
            self.set_phase(SequencerPhase::DoneSuccess);
        }
    }

    fn plan_work(&self, snapshot: &ExternalSnapshot) -> WorkPlan {
        let mut plan = WorkPlan::default();
        for item_id in &self.required_items {
            if !self.guard.is_installed(item_id, snapshot) {
                plan.to_install.push_back(item_id.clone());
                plan.to_activate.push_back(item_id.clone());
                plan.steps += step_costs::INSTALL_AND_ACTIVATE;
            } else if !self.guard.is_activated(item_id, snapshot) {
                plan.to_activate.push_back(item_id.clone());
                plan.steps += step_costs::ACTIVATE_ONLY;
            }
        }
        plan
    }

    fn install_next(&mut self, observer: &dyn StateObserver, dispatcher: &dyn CommandDispatcher) {
        if let Some(item_id) = self.state.current_item.clone() {
            let confirmed = observer
                .items()
                .is_some_and(|snapshot| self.guard.is_installed(&item_id, &snapshot));
            if confirmed {
                self.confirm_current(item_id);
                if self.state.to_install.is_empty() {
                    self.set_phase(SequencerPhase::Activating);
                }
            }
            return;
        }

        let Some(next) = self.state.to_install.front().cloned() else {
            self.set_phase(SequencerPhase::Activating);
            return;
        };

        let Some(metadata) = observer.item_metadata(&next) else {
            debug!(
                engine_id = %self.id,
                item_id = %next,
                "Metadata vanished; waiting before install"
            );
            return;
        };

        self.state.to_install.pop_front();
        self.dispatch(
            dispatcher,
            SequencerCommand::Install {
                owner_id: self.owner_id,
                metadata,
            },
        );
        self.state.current_item = Some(next);
    }

    fn activate_next(&mut self, observer: &dyn StateObserver, dispatcher: &dyn CommandDispatcher) {
        if let Some(item_id) = self.state.current_item.clone() {
            let confirmed = observer
                .items()
                .is_some_and(|snapshot| self.guard.is_activated(&item_id, &snapshot));
            if confirmed {
                self.confirm_current(item_id);
                if self.state.to_activate.is_empty() {
                    self.set_phase(SequencerPhase::DoneSuccess);
                }
            }
            return;
        }

        let Some(next) = self.state.to_activate.front().cloned() else {
            self.set_phase(SequencerPhase::DoneSuccess);
            return;
        };

        let Some(snapshot) = observer.items() else {
            return;
        };
        let Some(status) = snapshot.get(&next).cloned() else {
            debug!(
                engine_id = %self.id,
                item_id = %next,
                "Item not listed yet; waiting before activation"
            );
            return;
        };

        self.state.to_activate.pop_front();

        if self.guard.is_activated(&next, &snapshot) {
            let counted = self.already_active_policy.counts_step();
            if counted {
                self.advance_step();
            }
            debug!(
                engine_id = %self.id,
                item_id = %next,
                counted,
                "Item already active; skipping activation"
            );
            self.publish(SequencerEvent::ActivationSkipped {
                item_id: next,
                counted,
            });
            if self.state.to_activate.is_empty() {
                self.set_phase(SequencerPhase::DoneSuccess);
            }
            return;
        }

        let remote_id = status.remote_id.unwrap_or_else(|| next.clone());
        self.dispatch(
            dispatcher,
            SequencerCommand::Activate {
                owner_id: self.owner_id,
                item_id: next.clone(),
                remote_id,
            },
        );
        self.state.current_item = Some(next);
    }

    fn finish(&mut self, dispatcher: &dyn CommandDispatcher) {
        self.dispatch(
            dispatcher,
            SequencerCommand::MarkSetupComplete {
                owner_id: self.owner_id,
                finished: true,
            },
        );
        self.set_phase(SequencerPhase::Idle);
    }

    fn confirm_current(&mut self, item_id: String) {
        self.state.current_item = None;
        self.advance_step();
        debug!(
            engine_id = %self.id,
            item_id = %item_id,
            step_index = self.state.step_index,
            total_steps = self.state.total_steps,
            "Step confirmed"
        );
        self.publish(SequencerEvent::StepConfirmed {
            item_id,
            phase: self.state.phase,
            step_index: self.state.step_index,
            total_steps: self.state.total_steps,
        });
    }

    fn advance_step(&mut self) {
        self.state.step_index = (self.state.step_index + 1).min(self.state.total_steps);
    }

    fn set_phase(&mut self, to: SequencerPhase) {
        let from = self.state.phase;
        if from == to {
            return;
        }
        self.state.phase = to;
        info!(
            engine_id = %self.id,
            owner_id = self.owner_id,
            from = %from,
            to = %to,
            step_index = self.state.step_index,
            total_steps = self.state.total_steps,
            "Phase transition"
        );
        self.publish(SequencerEvent::PhaseChanged { from, to });
    }

    fn dispatch(&self, dispatcher: &dyn CommandDispatcher, command: SequencerCommand) {
        debug!(
            engine_id = %self.id,
            command_type = command.command_type(),
            item_id = command.item_id(),
            "Dispatching command"
        );
        self.publish(SequencerEvent::CommandDispatched {
            command_type: command.command_type().to_string(),
            item_id: command.item_id().map(str::to_string),
        });
        dispatcher.dispatch(command);
    }

    fn publish(&self, event: SequencerEvent) {
        if let Some(publisher) = &self.publisher {
            publisher.publish(self.id, event);
        }
    }
}

#[derive(Debug, Default)]
struct WorkPlan {
    to_install: VecDeque<String>,
    to_activate: VecDeque<String>,
    steps: u32,
}
