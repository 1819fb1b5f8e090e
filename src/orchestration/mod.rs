//! # Orchestration
//!
//! Ties the step engine, the external state observer and the poll scheduler
//! into one owned setup run.
//!
//! ## Core Components
//!
//! - **SetupSequencer**: owns one engine, its timers, its progress channel and
//!   its event publisher. Tick → read snapshot → dispatch or transition →
//!   publish progress.

pub mod setup_sequencer;

pub use setup_sequencer::SetupSequencer;
