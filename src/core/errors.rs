//! Error hierarchy for the command server.
//!
//! Handler-level failures are caught at the dispatcher boundary and turned
//! into `status: error` responses; nothing here is allowed to tear down a
//! client session.

use std::time::Duration;

use thiserror::Error;

/// Failures on the actuator (gripper dashboard) channel.
#[derive(Debug, Error)]
pub enum ActuatorError {
    #[error("gripper connection refused: {0}")]
    ConnectionRefused(String),

    #[error("gripper did not acknowledge within {0:?}")]
    Timeout(Duration),

    #[error("unexpected gripper acknowledgement: {0}")]
    Protocol(String),

    #[error("gripper rejected command: {0}")]
    Rejected(String),
}

/// Failures reported by the motion driver.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("motion failed: {0}")]
    Motion(String),

    #[error("motion link lost")]
    ConnectionLost,

    #[error("reconnect failed: {0}")]
    ReconnectFailed(String),
}

/// The step of a pick/place sequence that an error surfaced in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencePhase {
    Approach,
    GripperOpen,
    Contact,
    GripperClose,
    Retreat,
    Release,
}

impl std::fmt::Display for SequencePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SequencePhase::Approach => write!(f, "approach move"),
            SequencePhase::GripperOpen => write!(f, "gripper open"),
            SequencePhase::Contact => write!(f, "contact move"),
            SequencePhase::GripperClose => write!(f, "gripper close"),
            SequencePhase::Retreat => write!(f, "retreat move"),
            SequencePhase::Release => write!(f, "release"),
        }
    }
}

/// A pick or place sequence that short-circuited, tagged with the phase
/// it failed in.
#[derive(Debug, Error)]
pub enum SequenceError {
    #[error("{phase} failed: {source}")]
    Motion {
        phase: SequencePhase,
        #[source]
        source: DriverError,
    },

    #[error("{phase} failed: {source}")]
    Actuator {
        phase: SequencePhase,
        #[source]
        source: ActuatorError,
    },
}

impl SequenceError {
    pub fn motion(phase: SequencePhase, source: DriverError) -> Self {
        SequenceError::Motion { phase, source }
    }

    pub fn actuator(phase: SequencePhase, source: ActuatorError) -> Self {
        SequenceError::Actuator { phase, source }
    }
}

/// Everything a command handler can fail with. The dispatcher converts
/// these into error responses uniformly.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("No command specified")]
    NoCommand,

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("{0}")]
    InvalidArgument(String),

    #[error("Position '{name}' not found")]
    PositionNotFound { name: String, available: Vec<String> },

    #[error("{0}")]
    Motion(#[from] DriverError),

    #[error("{0}")]
    Actuator(#[from] ActuatorError),

    #[error("{0}")]
    Sequence(#[from] SequenceError),
}
