//! # Sequencer Events
//!
//! Broadcast channel for phase changes, dispatched commands and confirmed
//! steps, consumed by whatever presentation or audit layer sits on top.

pub mod publisher;

pub use publisher::{EventPublisher, PublishedEvent, SequencerEvent};
