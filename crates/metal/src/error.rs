//! Errors surfaced by the device engine.

use thiserror::Error;

use crate::providers::{ApiError, DeviceStatus};
use crate::validate::ValidationError;

/// Which wait a timeout or cancellation interrupted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitPhase {
    /// Waiting for a new device to become active.
    AwaitingActive,
    /// Waiting for a deleted device to disappear.
    AwaitingRemoval,
}

impl std::fmt::Display for WaitPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AwaitingActive => write!(f, "awaiting active"),
            Self::AwaitingRemoval => write!(f, "awaiting removal"),
        }
    }
}

/// Terminal outcome of a device operation other than success.
#[derive(Error, Debug)]
pub enum DeviceError {
    /// The spec broke a validation rule; nothing was sent to the provider.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The provider refused or failed a call.
    #[error("{}", rejected_message(.id.as_deref(), .source))]
    RemoteRejected {
        id: Option<String>,
        #[source]
        source: ApiError,
    },

    /// The provider reported the device as failed.
    #[error("Device {id} entered '{state}' state while provisioning")]
    ProvisioningFailed { id: String, state: DeviceStatus },

    /// A new device did not become active before the deadline.
    #[error("Device {id} did not become active within deadline ({waited_secs}s)")]
    TimedOut { id: String, waited_secs: u64 },

    /// A deleted device was still present at the deadline.
    #[error("Device {id} not removed in time ({waited_secs}s)")]
    NotRemoved { id: String, waited_secs: u64 },

    /// The caller cancelled the wait; the remote operation was left running.
    #[error("Device {id}: wait cancelled while {phase}")]
    Cancelled { id: String, phase: WaitPhase },

    /// The device no longer exists on the provider.
    #[error("Device {id} no longer exists")]
    Gone { id: String },

    /// The requested change cannot be applied in place.
    #[error("Device {id} must be replaced to change: {}", .fields.join(", "))]
    RequiresReplacement { id: String, fields: Vec<&'static str> },

    /// Devices that should have been destroyed still exist.
    #[error("Devices still exist: {}", .ids.join(", "))]
    StillPresent { ids: Vec<String> },
}

fn rejected_message(id: Option<&str>, source: &ApiError) -> String {
    match id {
        Some(id) => format!("Device {id}: {source}"),
        None => source.to_string(),
    }
}

impl DeviceError {
    pub(crate) fn remote(id: Option<&str>, source: ApiError) -> Self {
        Self::RemoteRejected {
            id: id.map(str::to_string),
            source,
        }
    }

    /// ID of a device that exists remotely even though the operation failed.
    ///
    /// Set for every failure after a successful submission, so the caller can
    /// decide whether to tear the device down.
    #[must_use]
    pub fn partial_id(&self) -> Option<&str> {
        match self {
            Self::RemoteRejected { id, .. } => id.as_deref(),
            Self::ProvisioningFailed { id, .. }
            | Self::TimedOut { id, .. }
            | Self::NotRemoved { id, .. }
            | Self::Cancelled { id, .. }
            | Self::RequiresReplacement { id, .. } => Some(id),
            Self::Validation(_) | Self::Gone { .. } | Self::StillPresent { .. } => None,
        }
    }

    /// Whether the error came from local validation.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}
