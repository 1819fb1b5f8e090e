// State machine module for setup sequencing
//
// The step engine owns one setup run's phase, work queues and progress
// counters. Confirmation predicates are injected through `ConfirmationGuard`.

pub mod guards;
pub mod states;
pub mod step_engine;

// Re-export main types for convenient access
pub use guards::{ConfirmationGuard, PresenceConfirmation, SnapshotConfirmation};
pub use states::{SequencerPhase, WaitingOn};
pub use step_engine::{ProgressReport, SequencerState, StepEngine};
