//! Controller error type.
//!
//! Input validation never lands here (see [`crate::validate`]). These are
//! the conditions that abort an operation: refused starts, device failures,
//! metadata I/O and illegal state transitions.

use awg_common::card::driver::DeviceError;
use thiserror::Error;

/// Error returned by `SequenceController` operations.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// `start()` refused because segments or steps are flagged.
    #[error("sequence not ready: flagged segments {segments:?}, flagged steps {steps:?}")]
    NotReady {
        /// Flagged segment indices.
        segments: Vec<usize>,
        /// Flagged step indices.
        steps: Vec<u32>,
    },

    /// Device reported an error.
    #[error("device error: {0}")]
    Device(DeviceError),

    /// Reading or writing session metadata failed.
    #[error("metadata persistence failed: {0}")]
    Persistence(String),

    /// The device handle has been released.
    #[error("device handle has been released")]
    Closed,

    /// Operation not allowed in the current sequence state.
    #[error("invalid transition: {0}")]
    InvalidTransition(&'static str),
}

impl From<DeviceError> for ControllerError {
    fn from(err: DeviceError) -> Self {
        match err {
            DeviceError::Closed => Self::Closed,
            other => Self::Device(other),
        }
    }
}

impl From<std::io::Error> for ControllerError {
    fn from(err: std::io::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}

impl From<serde_json::Error> for ControllerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_ready_lists_indices() {
        let err = ControllerError::NotReady {
            segments: vec![1, 3],
            steps: vec![7],
        };
        let text = err.to_string();
        assert!(text.contains("[1, 3]"));
        assert!(text.contains("[7]"));
    }

    #[test]
    fn closed_device_maps_to_closed() {
        assert!(matches!(
            ControllerError::from(DeviceError::Closed),
            ControllerError::Closed
        ));
        assert!(matches!(
            ControllerError::from(DeviceError::Timeout { timeout_ms: 5 }),
            ControllerError::Device(DeviceError::Timeout { timeout_ms: 5 })
        ));
    }
}
