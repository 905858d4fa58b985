//! Device provisioning state machine.
//!
//! ```text
//! Pending -> Submitting -> AwaitingActive -> Active
//!               |               |-> Failed
//!               |               `-> TimedOut
//!               `-> Failed
//! ```
//!
//! Submission errors are terminal and surfaced unchanged. While awaiting
//! `active`, transient read errors are retried until the caller's deadline;
//! a provider-reported `failed` state and permanent rejections are terminal.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::device::{DeviceSpec, DeviceState};
use crate::error::{DeviceError, WaitPhase};
use crate::providers::{ApiErrorKind, DeviceApi, DeviceStatus};
use crate::validate::{validate, ValidationError, ValidationErrorKind};
use crate::wait::{clamp_interval, poll_until, Deadline, Poll, WaitError};

/// Lifecycle phases of a device submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecyclePhase {
    /// Not yet submitted.
    Pending,
    /// Create call in flight.
    Submitting,
    /// Submitted, polling for `active`.
    AwaitingActive,
    /// Device is active.
    Active,
    /// Submission rejected or provisioning failed.
    Failed,
    /// Deadline passed or wait cancelled before the device became active.
    TimedOut,
}

impl LifecyclePhase {
    /// Whether no further transitions are possible.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Active | Self::Failed | Self::TimedOut)
    }

    /// Whether `next` directly follows this phase.
    #[must_use]
    pub fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Submitting)
                | (Self::Submitting, Self::AwaitingActive | Self::Failed)
                | (
                    Self::AwaitingActive,
                    Self::Active | Self::Failed | Self::TimedOut
                )
        )
    }
}

impl std::fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Submitting => write!(f, "submitting"),
            Self::AwaitingActive => write!(f, "awaiting_active"),
            Self::Active => write!(f, "active"),
            Self::Failed => write!(f, "failed"),
            Self::TimedOut => write!(f, "timed_out"),
        }
    }
}

/// Progress of one device submission.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    phase: LifecyclePhase,
    device_id: Option<String>,
    history: Vec<LifecyclePhase>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    /// A fresh lifecycle in [`LifecyclePhase::Pending`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            phase: LifecyclePhase::Pending,
            device_id: None,
            history: vec![LifecyclePhase::Pending],
        }
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> LifecyclePhase {
        self.phase
    }

    /// Provider-assigned ID, once submission succeeded.
    #[must_use]
    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    /// Every phase visited, in order.
    #[must_use]
    pub fn history(&self) -> &[LifecyclePhase] {
        &self.history
    }

    fn advance(&mut self, next: LifecyclePhase) {
        debug_assert!(
            self.phase.can_advance_to(next),
            "invalid lifecycle transition {} -> {next}",
            self.phase
        );
        info!(
            device_id = self.device_id.as_deref().unwrap_or("-"),
            from = %self.phase,
            to = %next,
            "Lifecycle transition"
        );
        self.phase = next;
        self.history.push(next);
    }
}

/// A device that reached `active`.
#[derive(Debug, Clone)]
pub struct Provisioned {
    /// Reconciled attributes, root password included.
    pub state: DeviceState,
    /// Phases visited.
    pub history: Vec<LifecyclePhase>,
}

/// Drives devices from submission to `active`.
#[derive(Clone)]
pub struct Provisioner {
    api: Arc<dyn DeviceApi>,
    poll_interval: Duration,
}

impl std::fmt::Debug for Provisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provisioner")
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

impl Provisioner {
    /// Create a provisioner over `api`, polling every `poll_interval`
    /// (at least [`MIN_POLL_INTERVAL`](crate::wait::MIN_POLL_INTERVAL)).
    #[must_use]
    pub fn new(api: Arc<dyn DeviceApi>, poll_interval: Duration) -> Self {
        Self {
            api,
            poll_interval: clamp_interval(poll_interval),
        }
    }

    /// Validate, submit and wait for a device to become active.
    ///
    /// # Errors
    /// See [`Provisioner::run`].
    pub async fn provision(
        &self,
        spec: &DeviceSpec,
        deadline: &Deadline,
    ) -> Result<Provisioned, DeviceError> {
        let mut lifecycle = Lifecycle::new();
        let state = self.run(&mut lifecycle, spec, deadline).await?;
        Ok(Provisioned {
            state,
            history: lifecycle.history,
        })
    }

    /// Drive `lifecycle` to a terminal phase.
    ///
    /// Validation failures leave the lifecycle in `Pending` and make no
    /// remote call.
    ///
    /// # Errors
    /// - [`DeviceError::Validation`] before any remote call
    /// - [`DeviceError::RemoteRejected`] if submission or a poll is refused
    /// - [`DeviceError::ProvisioningFailed`] if the provider reports `failed`
    /// - [`DeviceError::Gone`] if the device vanishes while provisioning
    /// - [`DeviceError::TimedOut`] / [`DeviceError::Cancelled`] if the deadline ends the wait
    pub async fn run(
        &self,
        lifecycle: &mut Lifecycle,
        spec: &DeviceSpec,
        deadline: &Deadline,
    ) -> Result<DeviceState, DeviceError> {
        validate(spec)?;
        let request = spec.to_create_request().ok_or_else(|| ValidationError {
            kind: ValidationErrorKind::InvalidEnum {
                field: "billing_cycle",
                value: spec.billing_cycle.clone(),
            },
            message: format!("\"billing_cycle\": \"{}\" is not valid", spec.billing_cycle),
        })?;

        lifecycle.advance(LifecyclePhase::Submitting);
        let submitted = match self.api.create_device(&request).await {
            Ok(record) => record,
            Err(e) => {
                lifecycle.advance(LifecyclePhase::Failed);
                return Err(DeviceError::remote(None, e));
            }
        };

        let id = submitted.id.clone();
        lifecycle.device_id = Some(id.clone());
        lifecycle.advance(LifecyclePhase::AwaitingActive);

        // Even a device that is active on submission is read back once; the
        // create response may lack the root password.
        match self.await_active(&id, deadline).await {
            Ok(state) => {
                lifecycle.advance(LifecyclePhase::Active);
                info!(device_id = %id, hostname = %state.hostname, "Device is active");
                Ok(state)
            }
            Err(e @ (DeviceError::TimedOut { .. } | DeviceError::Cancelled { .. })) => {
                lifecycle.advance(LifecyclePhase::TimedOut);
                Err(e)
            }
            Err(e) => {
                lifecycle.advance(LifecyclePhase::Failed);
                Err(e)
            }
        }
    }

    async fn await_active(&self, id: &str, deadline: &Deadline) -> Result<DeviceState, DeviceError> {
        let api = &self.api;

        let outcome = poll_until(deadline, self.poll_interval, move || async move {
            match api.get_device(id).await {
                Ok(record) if record.state == DeviceStatus::Active => {
                    Ok(Poll::Ready(DeviceState::from(&record)))
                }
                Ok(record) if record.state == DeviceStatus::Failed => {
                    Err(DeviceError::ProvisioningFailed {
                        id: id.to_string(),
                        state: record.state,
                    })
                }
                Ok(record) => {
                    debug!(
                        device_id = %id,
                        state = %record.state,
                        elapsed_secs = deadline.elapsed_secs(),
                        "Polling device state"
                    );
                    Ok(Poll::Pending)
                }
                Err(e) => match e.kind() {
                    ApiErrorKind::Transient => {
                        warn!(device_id = %id, error = %e, "Transient error while polling, retrying");
                        Ok(Poll::Pending)
                    }
                    ApiErrorKind::NotFound => Err(DeviceError::Gone { id: id.to_string() }),
                    ApiErrorKind::Rejected => Err(DeviceError::remote(Some(id), e)),
                },
            }
        })
        .await;

        outcome.map_err(|e| match e {
            WaitError::Expired => DeviceError::TimedOut {
                id: id.to_string(),
                waited_secs: deadline.elapsed_secs(),
            },
            WaitError::Cancelled => DeviceError::Cancelled {
                id: id.to_string(),
                phase: WaitPhase::AwaitingActive,
            },
            WaitError::Failed(e) => e,
        })
    }
}
