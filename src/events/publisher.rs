use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::constants::{events, DEFAULT_EVENT_CHANNEL_CAPACITY};
use crate::state_machine::SequencerPhase;

/// Lifecycle events emitted by a step engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum SequencerEvent {
    PhaseChanged {
        from: SequencerPhase,
        to: SequencerPhase,
    },
    CommandDispatched {
        command_type: String,
        item_id: Option<String>,
    },
    StepConfirmed {
        item_id: String,
        phase: SequencerPhase,
        step_index: u32,
        total_steps: u32,
    },
    ActivationSkipped {
        item_id: String,
        counted: bool,
    },
}

impl SequencerEvent {
    /// Published event name
    pub fn name(&self) -> &'static str {
        match self {
            Self::PhaseChanged { .. } => events::PHASE_CHANGED,
            Self::CommandDispatched { .. } => events::COMMAND_DISPATCHED,
            Self::StepConfirmed { .. } => events::STEP_CONFIRMED,
            Self::ActivationSkipped { .. } => events::ACTIVATION_SKIPPED,
        }
    }
}

/// Event that has been published
#[derive(Debug, Clone)]
pub struct PublishedEvent {
    pub sequencer_id: Uuid,
    pub event: SequencerEvent,
    pub published_at: chrono::DateTime<chrono::Utc>,
}

/// Broadcast publisher for sequencer lifecycle events
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<PublishedEvent>,
}

impl EventPublisher {
    /// Create a new event publisher with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn publish(&self, sequencer_id: Uuid, event: SequencerEvent) {
        let published = PublishedEvent {
            sequencer_id,
            event,
            published_at: chrono::Utc::now(),
        };
        let _ = self.sender.send(published);
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CHANNEL_CAPACITY)
    }
}
