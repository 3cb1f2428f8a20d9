//! Controller and configuration errors.
//!
//! Transport failures during `create` and `start` are returned to the caller.
//! Failures inside the worker are recorded in the controller's sticky error
//! slot and read back with [`Controller::get_error`](crate::Controller::get_error).

use std::path::PathBuf;
use thiserror::Error;

use crate::interface::instruction::InstructionId;
use crate::interface::transport::TransportError;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ControllerError {
    /// The transport could not open the device.
    #[error("failed to open device: {0}")]
    Open(#[source] TransportError),

    /// Enabling host control failed; the worker was not started.
    #[error("failed to enable control mode: {0}")]
    Enable(#[source] TransportError),

    /// Handing control back to the firmware failed while the worker shut down.
    #[error("failed to disable control mode: {0}")]
    Disable(#[source] TransportError),

    /// The transport rejected an instruction.
    #[error("instruction {id} failed: {source}")]
    Execute {
        id: InstructionId,
        #[source]
        source: TransportError,
    },

    /// A keepalive packet sent while the queue was idle failed.
    #[error("idle packet failed: {0}")]
    Idle(#[source] TransportError),

    #[error("failed to close device: {0}")]
    Close(#[source] TransportError),

    /// The worker thread could not be spawned.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(String),

    #[error("controller is already active")]
    AlreadyActive,

    /// Destroy was attempted while the worker is running.
    #[error("controller is still active")]
    StillActive,
}

impl ControllerError {
    /// The transport error underneath, if any.
    pub fn transport_error(&self) -> Option<TransportError> {
        match self {
            ControllerError::Open(e)
            | ControllerError::Enable(e)
            | ControllerError::Disable(e)
            | ControllerError::Idle(e)
            | ControllerError::Close(e)
            | ControllerError::Execute { source: e, .. } => Some(*e),
            ControllerError::Spawn(_)
            | ControllerError::AlreadyActive
            | ControllerError::StillActive => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access config '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize config: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execute_error_message_names_instruction() {
        let err = ControllerError::Execute {
            id: InstructionId(3),
            source: TransportError::Transfer,
        };
        assert_eq!(err.to_string(), "instruction #3 failed: transfer failed");
        assert_eq!(err.transport_error(), Some(TransportError::Transfer));
    }

    #[test]
    fn test_lifecycle_errors_have_no_transport_cause() {
        assert_eq!(ControllerError::StillActive.transport_error(), None);
        assert_eq!(ControllerError::AlreadyActive.transport_error(), None);
    }
}
