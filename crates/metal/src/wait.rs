//! Deadlines and the polling loop shared by provisioning and teardown.
//!
//! All timing goes through `tokio::time`, so tests can run on a paused clock.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Caller-supplied bound on a wait, with optional early cancellation.
#[derive(Debug, Clone)]
pub struct Deadline {
    at: Instant,
    started: Instant,
    cancel: Option<CancellationToken>,
}

impl Deadline {
    /// Deadline `timeout` from now.
    #[must_use]
    pub fn after(timeout: Duration) -> Self {
        let now = Instant::now();
        Self {
            at: now + timeout,
            started: now,
            cancel: None,
        }
    }

    /// Deadline `secs` seconds from now.
    #[must_use]
    pub fn after_secs(secs: u64) -> Self {
        Self::after(Duration::from_secs(secs))
    }

    /// Also end the wait when `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Whether the deadline has passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.at
    }

    /// Whether the caller cancelled the wait.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
    }

    /// Whole seconds since the deadline was created.
    #[must_use]
    pub fn elapsed_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    async fn cancelled(&self) {
        match &self.cancel {
            Some(token) => token.cancelled().await,
            None => std::future::pending().await,
        }
    }
}

/// Shortest pause between two polls.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Raise `interval` to at least [`MIN_POLL_INTERVAL`].
pub(crate) fn clamp_interval(interval: Duration) -> Duration {
    if interval < MIN_POLL_INTERVAL {
        warn!(
            requested_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
            "Poll interval below minimum, using {}s",
            MIN_POLL_INTERVAL.as_secs()
        );
        MIN_POLL_INTERVAL
    } else {
        interval
    }
}

/// Result of one polling step.
#[derive(Debug)]
pub(crate) enum Poll<T> {
    /// The awaited condition holds.
    Ready(T),
    /// Not yet; poll again after the interval.
    Pending,
}

/// Why a wait ended without the condition holding.
#[derive(Debug)]
pub(crate) enum WaitError<E> {
    Expired,
    Cancelled,
    Failed(E),
}

/// Run `step` every `interval` until it is ready, fails, or the deadline ends.
///
/// Each step is itself bounded by the deadline, so a hung request cannot
/// outlive it. Only the deadline bounds the loop; there is no attempt cap.
pub(crate) async fn poll_until<T, E, F, Fut>(
    deadline: &Deadline,
    interval: Duration,
    mut step: F,
) -> Result<T, WaitError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Poll<T>, E>>,
{
    loop {
        if deadline.is_cancelled() {
            return Err(WaitError::Cancelled);
        }
        if deadline.is_expired() {
            return Err(WaitError::Expired);
        }

        let outcome = tokio::select! {
            biased;
            () = deadline.cancelled() => return Err(WaitError::Cancelled),
            outcome = tokio::time::timeout_at(deadline.at, step()) => outcome,
        };

        match outcome {
            Err(_elapsed) => return Err(WaitError::Expired),
            Ok(Ok(Poll::Ready(value))) => return Ok(value),
            Ok(Ok(Poll::Pending)) => {}
            Ok(Err(e)) => return Err(WaitError::Failed(e)),
        }

        let wake = std::cmp::min(Instant::now() + interval, deadline.at);
        tokio::select! {
            biased;
            () = deadline.cancelled() => return Err(WaitError::Cancelled),
            () = tokio::time::sleep_until(wake) => {}
        }
    }
}
