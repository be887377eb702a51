//! Convergence engine: poll a refresh function until a remote object settles.
//!
//! One engine serves every resource kind and both directions of travel. A
//! non-empty target waits for the object to reach a target label, treating
//! `NotFound` as "not propagated yet". An empty target waits for the object to
//! disappear, treating `NotFound` as success.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::cancel::CancelToken;
use crate::clock::{Clock, SystemClock};
use crate::core::budget::remaining_budget;
use crate::core::labels::{Classification, LabelSet, classify};
use crate::core::schedule::PollSchedule;
use crate::error::RemoteError;

/// One refresh result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation<S> {
    Found { label: String, snapshot: S },
    NotFound,
}

impl<S> Observation<S> {
    pub fn found(label: impl Into<String>, snapshot: S) -> Self {
        Observation::Found {
            label: label.into(),
            snapshot,
        }
    }
}

/// Something the engine can poll.
///
/// Implementations must be pure queries: safe to call repeatedly, keeping no
/// state between calls. Any closure `Fn() -> Result<Observation<S>, RemoteError>`
/// qualifies.
pub trait Refresh {
    type Snapshot;

    fn refresh(&self) -> Result<Observation<Self::Snapshot>, RemoteError>;
}

impl<S, F> Refresh for F
where
    F: Fn() -> Result<Observation<S>, RemoteError>,
{
    type Snapshot = S;

    fn refresh(&self) -> Result<Observation<S>, RemoteError> {
        self()
    }
}

/// Polling knobs shared by every wait issued from one configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub schedule: PollSchedule,
    /// Sleep before the first refresh.
    pub delay: Duration,
    /// Longest single sleep between cancellation checks.
    pub cancel_check: Duration,
    /// Consecutive `NotFound`s tolerated while waiting for a non-empty target.
    pub not_found_checks: u32,
    /// Consecutive target observations required before succeeding.
    pub continuous_target_occurrence: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            schedule: PollSchedule::default(),
            delay: Duration::ZERO,
            cancel_check: Duration::from_millis(250),
            not_found_checks: 20,
            continuous_target_occurrence: 1,
        }
    }
}

/// Parameters of one wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitRequest {
    pub pending: LabelSet,
    /// Empty means "wait until the object is gone".
    pub target: LabelSet,
    pub timeout: Duration,
    pub policy: PollPolicy,
}

impl WaitRequest {
    pub fn new(pending: LabelSet, target: LabelSet, timeout: Duration) -> Self {
        Self {
            pending,
            target,
            timeout,
            policy: PollPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn awaits_absence(&self) -> bool {
        self.target.is_empty()
    }

    fn validate(&self) -> Result<(), String> {
        let shared = self.pending.overlap(&self.target);
        if !shared.is_empty() {
            return Err(format!(
                "pending and target share labels: {}",
                shared.join(", ")
            ));
        }
        if self.timeout.is_zero() {
            return Err("timeout must be > 0".to_string());
        }
        // Intervals never shrink, so a non-zero first interval bounds them all.
        if self.policy.schedule.interval(1).is_zero() {
            return Err("poll interval must be > 0".to_string());
        }
        if self.policy.cancel_check.is_zero() {
            return Err("cancel_check must be > 0".to_string());
        }
        if self.policy.continuous_target_occurrence == 0 {
            return Err("continuous_target_occurrence must be >= 1".to_string());
        }
        Ok(())
    }
}

/// Successful end of a wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome<S> {
    /// A target label was observed; carries the snapshot of that refresh.
    Reached { snapshot: S, attempts: u32 },
    /// The target was empty and the object was reported not found.
    Absent { attempts: u32 },
}

impl<S> WaitOutcome<S> {
    pub fn attempts(&self) -> u32 {
        match self {
            WaitOutcome::Reached { attempts, .. } | WaitOutcome::Absent { attempts } => *attempts,
        }
    }
}

#[derive(Debug, Error)]
pub enum WaitError<S: fmt::Debug> {
    #[error("invalid wait request: {0}")]
    InvalidRequest(String),

    #[error("refresh failed after {attempts} calls")]
    Remote {
        #[source]
        source: RemoteError,
        attempts: u32,
    },

    #[error("unexpected state '{label}', wanted target {target}")]
    UnexpectedState {
        label: String,
        target: LabelSet,
        snapshot: S,
    },

    #[error(
        "timeout while waiting for state to become {target} (last state: '{}', timeout: {timeout:?})",
        .last_label.as_deref().unwrap_or("absent")
    )]
    Timeout {
        /// `None` when the last refresh reported the object absent.
        last_label: Option<String>,
        last_snapshot: Option<S>,
        target: LabelSet,
        timeout: Duration,
        attempts: u32,
    },

    #[error("couldn't find resource ({checks} retries)")]
    NotFoundExhausted { checks: u32 },

    #[error("wait cancelled after {attempts} refreshes")]
    Cancelled { attempts: u32 },
}

/// Runs waits against a clock, honouring a cancellation token.
///
/// Holds no per-wait state, so one waiter may serve many concurrent waits.
#[derive(Debug, Clone)]
pub struct Waiter {
    clock: Arc<dyn Clock>,
    cancel: CancelToken,
}

impl Default for Waiter {
    fn default() -> Self {
        Self::system()
    }
}

impl Waiter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            cancel: CancelToken::new(),
        }
    }

    pub fn system() -> Self {
        Self::new(Arc::new(SystemClock))
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Poll `refresh` until the request's target is reached, the object is
    /// confirmed absent (empty target), or the request fails.
    #[instrument(
        skip_all,
        fields(
            pending = %request.pending,
            target = %request.target,
            timeout_secs = request.timeout.as_secs()
        )
    )]
    pub fn wait<R>(
        &self,
        request: &WaitRequest,
        refresh: &R,
    ) -> Result<WaitOutcome<R::Snapshot>, WaitError<R::Snapshot>>
    where
        R: Refresh + ?Sized,
        R::Snapshot: fmt::Debug,
    {
        request.validate().map_err(WaitError::InvalidRequest)?;

        let policy = &request.policy;
        let deadline = self.clock.now() + request.timeout;
        let mut attempts = 0u32;
        let mut not_found = 0u32;
        let mut target_seen = 0u32;
        // Set on every iteration that reaches the deadline check.
        let mut last: Option<(String, R::Snapshot)>;

        if !policy.delay.is_zero() && !self.sleep(policy.delay, policy.cancel_check) {
            return Err(WaitError::Cancelled { attempts });
        }

        loop {
            if self.cancel.is_cancelled() {
                return Err(WaitError::Cancelled { attempts });
            }

            attempts += 1;
            match refresh.refresh() {
                Err(err) => {
                    warn!(attempts, err = %err, "refresh failed");
                    return Err(WaitError::Remote {
                        source: err,
                        attempts,
                    });
                }
                Ok(Observation::NotFound) => {
                    last = None;
                    target_seen = 0;
                    if request.awaits_absence() {
                        debug!(attempts, "object absent");
                        return Ok(WaitOutcome::Absent { attempts });
                    }
                    not_found += 1;
                    debug!(attempts, not_found, "object not found yet");
                    if not_found > policy.not_found_checks {
                        warn!(attempts, not_found, "object never appeared");
                        return Err(WaitError::NotFoundExhausted {
                            checks: policy.not_found_checks,
                        });
                    }
                }
                Ok(Observation::Found { label, snapshot }) => {
                    not_found = 0;
                    debug!(attempts, label = %label, "refreshed");
                    match classify(&label, &request.pending, &request.target) {
                        Classification::Target => {
                            target_seen += 1;
                            if target_seen >= policy.continuous_target_occurrence {
                                return Ok(WaitOutcome::Reached { snapshot, attempts });
                            }
                            last = Some((label, snapshot));
                        }
                        Classification::Pending => {
                            target_seen = 0;
                            last = Some((label, snapshot));
                        }
                        Classification::Unexpected => {
                            warn!(attempts, label = %label, "unexpected state");
                            return Err(WaitError::UnexpectedState {
                                label,
                                target: request.target.clone(),
                                snapshot,
                            });
                        }
                    }
                }
            }

            let Some(remaining) = remaining_budget(deadline, self.clock.now()) else {
                return Err(timeout_error(request, attempts, last));
            };
            let pause = policy.schedule.next_sleep(attempts, remaining);
            if !self.sleep(pause, policy.cancel_check) {
                return Err(WaitError::Cancelled { attempts });
            }
            if remaining_budget(deadline, self.clock.now()).is_none() {
                return Err(timeout_error(request, attempts, last));
            }
        }
    }

    /// Sleep `total` in slices of at most `slice`, returning `false` as soon as
    /// cancellation is observed.
    fn sleep(&self, total: Duration, slice: Duration) -> bool {
        let mut left = total;
        while !left.is_zero() {
            if self.cancel.is_cancelled() {
                return false;
            }
            let step = left.min(slice);
            self.clock.sleep(step);
            left -= step;
        }
        !self.cancel.is_cancelled()
    }
}

fn timeout_error<S: fmt::Debug>(
    request: &WaitRequest,
    attempts: u32,
    last: Option<(String, S)>,
) -> WaitError<S> {
    let (last_label, last_snapshot) = match last {
        Some((label, snapshot)) => (Some(label), Some(snapshot)),
        None => (None, None),
    };
    warn!(attempts, last_label = ?last_label, "wait timed out");
    WaitError::Timeout {
        last_label,
        last_snapshot,
        target: request.target.clone(),
        timeout: request.timeout,
        attempts,
    }
}
