#![allow(clippy::doc_markdown)] // Allow technical terms like WooCommerce in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Sequencer Core
//!
//! Polling-driven setup sequencer that brings a set of required items
//! (plugins, extensions) to "installed and active" on a remote site.
//!
//! ## Overview
//!
//! The remote backend is only reachable through fire-and-forget commands and
//! an eventually-consistent snapshot of its state. The sequencer never trusts
//! a command to have worked: it re-reads the snapshot on a fixed tick and
//! only counts a step once the snapshot shows the expected status.
//!
//! ## Architecture
//!
//! ```text
//! PollScheduler ──tick──▶ StepEngine ──reads──▶ StateObserver (snapshot)
//!                            │
//!                            ├──dispatch──▶ CommandDispatcher (network layer)
//!                            └──publish───▶ EventPublisher / progress watch
//! ```
//!
//! ## Module Organization
//!
//! - [`scheduler`] - Named, cancellable fixed-interval pollers
//! - [`state_machine`] - Setup phases, confirmation predicates and the step engine
//! - [`observer`] - External snapshot, commands and the dispatcher seam
//! - [`events`] - Lifecycle event publishing
//! - [`orchestration`] - [`SetupSequencer`], the owner of one setup run
//! - [`config`] - Layered YAML/environment configuration
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured console and file logging
//! - [`test_helpers`] - In-process dispatcher and simulated backend
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use sequencer_core::config::SequencerConfig;
//! use sequencer_core::observer::{ChannelDispatcher, SnapshotStore};
//! use sequencer_core::SetupSequencer;
//!
//! # async fn example() -> sequencer_core::Result<()> {
//! let store = SnapshotStore::new();
//! let (dispatcher, _commands) = ChannelDispatcher::new();
//!
//! let sequencer = SetupSequencer::new(
//!     SequencerConfig::with_owner(42),
//!     Arc::new(store.clone()),
//!     Arc::new(dispatcher),
//! )?;
//! sequencer.start()?;
//! sequencer.confirm();
//!
//! // The network layer consumes `_commands` and writes results into `store`
//! let report = sequencer.wait_until_finished(Duration::from_secs(300)).await?;
//! println!("finished at {}%", report.percent());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod logging;
pub mod observer;
pub mod orchestration;
pub mod scheduler;
pub mod state_machine;
pub mod test_helpers;

pub use config::{ConfigManager, SequencerConfig};
pub use constants::AlreadyActivePolicy;
pub use error::{Result, SequencerError};
pub use events::{EventPublisher, PublishedEvent, SequencerEvent};
pub use observer::{
    ChannelDispatcher, CommandDispatcher, ExternalSnapshot, ItemMetadata, ItemStatus,
    SequencerCommand, SnapshotStore, StateObserver, TransferStatus,
};
pub use orchestration::SetupSequencer;
pub use scheduler::{PollHandle, PollScheduler};
pub use state_machine::{ProgressReport, SequencerPhase, StepEngine};
