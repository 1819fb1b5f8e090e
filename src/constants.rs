//! # Sequencer Constants
//!
//! Cadences, event names and accounting policies that define the operational
//! boundaries of the polling sequencer.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Default UI-driven tick interval (roughly 60 invocations per second)
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 17;

/// Default interval for background data-refresh pollers
pub const DEFAULT_REFRESH_INTERVAL_MS: u64 = 60_000;

/// Default broadcast capacity for sequencer events
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Name under which the sequencer registers its engine poller
pub const ENGINE_POLLER_NAME: &str = "setup-engine";

/// Name under which the sequencer registers its item-refresh poller
pub const ITEM_REFRESH_POLLER_NAME: &str = "item-refresh";

/// Accounting policy applied when ACTIVATING dequeues an item that the
/// snapshot already reports as active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlreadyActivePolicy {
    /// Advance `step_index` as if the activation had been confirmed, so the
    /// step counted during initialization is paid back and progress reaches 100%.
    CountAsStep,
    /// Clear the item without touching `step_index`; progress may finish short of 100%.
    SkipWithoutCounting,
}

impl AlreadyActivePolicy {
    /// Whether the skip path advances `step_index`
    pub fn counts_step(&self) -> bool {
        matches!(self, Self::CountAsStep)
    }
}

impl fmt::Display for AlreadyActivePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CountAsStep => write!(f, "count_as_step"),
            Self::SkipWithoutCounting => write!(f, "skip_without_counting"),
        }
    }
}

/// Policy used when configuration does not override it.
pub const DEFAULT_ALREADY_ACTIVE_POLICY: AlreadyActivePolicy = AlreadyActivePolicy::CountAsStep;

impl Default for AlreadyActivePolicy {
    fn default() -> Self {
        DEFAULT_ALREADY_ACTIVE_POLICY
    }
}

/// Steps an item contributes to `total_steps` during initialization
pub mod step_costs {
    /// Not installed: one install step plus one activate step
    pub const INSTALL_AND_ACTIVATE: u32 = 2;
    /// Installed but inactive: one activate step
    pub const ACTIVATE_ONLY: u32 = 1;
}

/// Event names published on the sequencer event channel
pub mod events {
    pub const PHASE_CHANGED: &str = "sequencer.phase_changed";
    pub const COMMAND_DISPATCHED: &str = "sequencer.command_dispatched";
    pub const STEP_CONFIRMED: &str = "sequencer.step_confirmed";
    pub const ACTIVATION_SKIPPED: &str = "sequencer.activation_skipped";
}
