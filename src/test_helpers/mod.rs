//! Test helpers
//!
//! In-process substitutes for the network layer, shared by unit tests,
//! integration tests and the `sequencer-sim` binary.

pub mod recording_dispatcher;
pub mod simulated_backend;

pub use recording_dispatcher::RecordingDispatcher;
pub use simulated_backend::{SimulatedBackend, SimulatedBackendConfig};
