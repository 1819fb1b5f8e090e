//! Error types for the sequencer crate.
//!
//! The step engine itself never fails: unconfirmed and failed remote commands
//! are indistinguishable and simply stall the current phase. These errors
//! cover the surfaces around it (configuration, scheduling, parsing).

use thiserror::Error;

use crate::config::ConfigurationError;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SequencerError {
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
    #[error("Invalid phase: {0}")]
    InvalidPhase(String),
    #[error("Invalid transfer status: {0}")]
    InvalidTransferStatus(String),
    #[error("Scheduler error: {0}")]
    SchedulerError(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ConfigurationError> for SequencerError {
    fn from(error: ConfigurationError) -> Self {
        SequencerError::ConfigurationError(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SequencerError>;
