//! # External State Observer
//!
//! The collaborator surface the step engine consumes: a pull-based read of
//! server-confirmed item status and transfer status, plus a fire-and-forget
//! command dispatcher. Both sides are refreshed and consumed elsewhere, on
//! their own schedule.

pub mod commands;
pub mod snapshot;

pub use commands::{ChannelDispatcher, CommandDispatcher, OwnerId, SequencerCommand};
pub use snapshot::{
    ExternalSnapshot, ItemMetadata, ItemStatus, SnapshotStore, StateObserver, TransferStatus,
};
