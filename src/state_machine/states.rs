use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::SequencerError;

/// Phase definitions for the setup step engine, in canonical order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequencerPhase {
    /// Waiting for the user to confirm that setup may begin
    Confirming,
    /// Waiting for a hosting transfer to report completion
    Transferring,
    /// Diffing required items against the snapshot
    Initializing,
    /// Installing queued items one at a time
    Installing,
    /// Activating queued items one at a time
    Activating,
    /// All work confirmed; completion not yet recorded
    DoneSuccess,
    /// Terminal; ticks are no-ops
    Idle,
}

impl SequencerPhase {
    /// Check if this is a terminal phase (no further transitions)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Check if this phase dequeues and dispatches work items
    pub fn is_working(&self) -> bool {
        matches!(self, Self::Installing | Self::Activating)
    }

    /// Check if the engine is past the confirmation gate and not yet done
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Confirming | Self::Idle)
    }
}

impl fmt::Display for SequencerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Confirming => write!(f, "confirming"),
            Self::Transferring => write!(f, "transferring"),
            Self::Initializing => write!(f, "initializing"),
            Self::Installing => write!(f, "installing"),
            Self::Activating => write!(f, "activating"),
            Self::DoneSuccess => write!(f, "done_success"),
            Self::Idle => write!(f, "idle"),
        }
    }
}

impl std::str::FromStr for SequencerPhase {
    type Err = SequencerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "confirming" => Ok(Self::Confirming),
            "transferring" => Ok(Self::Transferring),
            "initializing" => Ok(Self::Initializing),
            "installing" => Ok(Self::Installing),
            "activating" => Ok(Self::Activating),
            "done_success" => Ok(Self::DoneSuccess),
            "idle" => Ok(Self::Idle),
            _ => Err(SequencerError::InvalidPhase(s.to_string())),
        }
    }
}

/// Default phase for new engines
impl Default for SequencerPhase {
    fn default() -> Self {
        Self::Confirming
    }
}

/// Prerequisite data INITIALIZING is blocked on. Used to suppress repeated
/// fetch commands, never to suppress ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitingOn {
    #[default]
    Nothing,
    /// The installed item list has not arrived (or arrived empty)
    ItemList,
    /// Catalogue metadata is missing for at least one required item
    ItemMetadata,
}

impl fmt::Display for WaitingOn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nothing => write!(f, "nothing"),
            Self::ItemList => write!(f, "item_list"),
            Self::ItemMetadata => write!(f, "item_metadata"),
        }
    }
}
