//! Device teardown: delete, then wait for the provider to forget the device.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{DeviceError, WaitPhase};
use crate::providers::{ApiErrorKind, DeviceApi};
use crate::wait::{clamp_interval, poll_until, Deadline, Poll, WaitError};

/// Deletes devices and confirms their absence.
#[derive(Clone)]
pub struct Teardown {
    api: Arc<dyn DeviceApi>,
    poll_interval: Duration,
}

impl std::fmt::Debug for Teardown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Teardown")
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

impl Teardown {
    /// Create a teardown controller over `api`, polling every `poll_interval`
    /// (at least [`MIN_POLL_INTERVAL`](crate::wait::MIN_POLL_INTERVAL)).
    #[must_use]
    pub fn new(api: Arc<dyn DeviceApi>, poll_interval: Duration) -> Self {
        Self {
            api,
            poll_interval: clamp_interval(poll_interval),
        }
    }

    /// Delete device `id` and wait until it is gone.
    ///
    /// A device that is already gone counts as destroyed, so repeated calls
    /// succeed.
    ///
    /// # Errors
    /// - [`DeviceError::RemoteRejected`] if the delete call is refused
    /// - [`DeviceError::NotRemoved`] if the device is still present at the deadline
    /// - [`DeviceError::Cancelled`] if the caller cancels the wait
    pub async fn destroy(&self, id: &str, deadline: &Deadline) -> Result<(), DeviceError> {
        match self.api.delete_device(id).await {
            Ok(()) => info!(device_id = %id, "Delete accepted"),
            Err(e) if e.is_not_found() => {
                info!(device_id = %id, "Device already gone");
                return Ok(());
            }
            Err(e) => return Err(DeviceError::remote(Some(id), e)),
        }

        let api = &self.api;
        let outcome = poll_until(deadline, self.poll_interval, move || async move {
            match api.get_device(id).await {
                Ok(record) => {
                    debug!(device_id = %id, state = %record.state, "Waiting for device removal");
                    Ok(Poll::Pending)
                }
                Err(e) => match e.kind() {
                    ApiErrorKind::NotFound => Ok(Poll::Ready(())),
                    ApiErrorKind::Transient => {
                        warn!(device_id = %id, error = %e, "Transient error while polling, retrying");
                        Ok(Poll::Pending)
                    }
                    ApiErrorKind::Rejected => Err(DeviceError::remote(Some(id), e)),
                },
            }
        })
        .await;

        match outcome {
            Ok(()) => {
                info!(device_id = %id, "Device removed");
                Ok(())
            }
            Err(WaitError::Expired) => Err(DeviceError::NotRemoved {
                id: id.to_string(),
                waited_secs: deadline.elapsed_secs(),
            }),
            Err(WaitError::Cancelled) => Err(DeviceError::Cancelled {
                id: id.to_string(),
                phase: WaitPhase::AwaitingRemoval,
            }),
            Err(WaitError::Failed(e)) => Err(e),
        }
    }
}

/// Confirm that none of `ids` exists on the provider any more.
///
/// # Errors
/// - [`DeviceError::StillPresent`] naming every device that still exists
/// - [`DeviceError::RemoteRejected`] if a lookup fails for another reason
pub async fn check_destroyed(api: &dyn DeviceApi, ids: &[String]) -> Result<(), DeviceError> {
    let mut remaining = Vec::new();

    for id in ids {
        match api.get_device(id).await {
            Ok(record) => {
                warn!(device_id = %id, state = %record.state, "Device still exists");
                remaining.push(id.clone());
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(DeviceError::remote(Some(id), e)),
        }
    }

    if remaining.is_empty() {
        Ok(())
    } else {
        Err(DeviceError::StillPresent { ids: remaining })
    }
}
