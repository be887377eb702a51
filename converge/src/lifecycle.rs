//! Create/read/update/delete orchestration on top of the convergence engine.
//!
//! A [`ManagedResource`] describes one remote resource kind: how its identifier
//! is laid out, which calls mutate it, how to describe it and which waits follow
//! each mutation. The [`Orchestrator`] drives those calls and waits and turns
//! every failure into a [`LifecycleError`] naming the operation and identifier.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::core::id::{ExternalId, IdLayout};
use crate::core::labels::LabelSet;
use crate::error::{Failure, LifecycleError, Operation, RemoteCall, RemoteError};
use crate::lookup::{self, AbsentErrors, AbsentScope, LookupError};
use crate::wait::{Observation, PollPolicy, WaitError, WaitRequest, Waiter};

/// Set of attribute changes sent to a remote modify call.
pub trait Delta {
    /// `true` when no mutable attribute changed.
    fn is_empty(&self) -> bool;
}

/// Labels and deadline for the wait following one kind of mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitPlan {
    pub pending: LabelSet,
    pub target: LabelSet,
    pub timeout: Duration,
}

impl WaitPlan {
    pub fn until_available(timeout: Duration) -> Self {
        Self {
            pending: LabelSet::new(["creating", "modifying"]),
            target: LabelSet::new(["available"]),
            timeout,
        }
    }

    pub fn until_deleted(timeout: Duration) -> Self {
        Self {
            pending: LabelSet::new(["deleting"]),
            target: LabelSet::empty(),
            timeout,
        }
    }

    fn request(&self, policy: PollPolicy) -> WaitRequest {
        WaitRequest::new(self.pending.clone(), self.target.clone(), self.timeout)
            .with_policy(policy)
    }
}

/// Waits per mutation; `None` means the remote side is synchronous.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LifecycleWaits {
    pub create: Option<WaitPlan>,
    pub update: Option<WaitPlan>,
    pub delete: Option<WaitPlan>,
}

/// One remote resource kind.
///
/// Calls take decoded key parts in layout order. Implementations hold their
/// control-plane client; the orchestrator never reaches global state.
pub trait ManagedResource {
    type Desired;
    type Delta: Delta;
    type Snapshot: Clone + fmt::Debug + Serialize;

    fn kind(&self) -> &'static str;

    fn id_layout(&self) -> IdLayout;

    fn absent_errors(&self) -> &AbsentErrors;

    fn waits(&self) -> &LifecycleWaits;

    /// Changes to mutable attributes between two desired specs.
    fn diff(&self, prior: &Self::Desired, desired: &Self::Desired) -> Self::Delta;

    /// Issue the remote create call, returning the new object's key parts.
    fn create(&self, desired: &Self::Desired) -> Result<Vec<String>, RemoteError>;

    fn modify(&self, parts: &[String], delta: &Self::Delta) -> Result<(), RemoteError>;

    fn delete(&self, parts: &[String]) -> Result<(), RemoteError>;

    /// Query matching records; an empty list means absent.
    fn describe(&self, parts: &[String]) -> Result<Vec<Self::Snapshot>, RemoteError>;

    /// Coarse status label of a snapshot; `"unknown"` when it carries none.
    fn status(&self, snapshot: &Self::Snapshot) -> String;
}

/// Result of a create or update that converged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Converged<S> {
    pub id: ExternalId,
    pub snapshot: S,
    /// Refresh calls made by the wait; zero when no wait ran.
    pub polls: u32,
}

/// Result of a read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleOutcome<S> {
    Present(S),
    /// Deleted out-of-band; the caller should drop its record.
    Absent,
}

/// Result of a delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The delete call reported the object already absent; no wait ran.
    AlreadyGone,
    Deleted { polls: u32 },
}

/// Drives lifecycle operations for one resource kind.
///
/// Holds no per-object state: every operation takes the identifier it acts on,
/// so one orchestrator may serve many objects from many threads.
#[derive(Debug)]
pub struct Orchestrator<R> {
    resource: R,
    waiter: Waiter,
    policy: PollPolicy,
}

impl<R: ManagedResource> Orchestrator<R> {
    pub fn new(resource: R, waiter: Waiter) -> Self {
        Self {
            resource,
            waiter,
            policy: PollPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn resource(&self) -> &R {
        &self.resource
    }

    /// Create the object, wait for it to become available and read it back.
    ///
    /// Once the remote create call succeeds every error carries the new
    /// identifier so the caller can keep tracking a partially created object.
    #[instrument(skip_all, fields(kind = self.resource.kind()))]
    pub fn create(&self, desired: &R::Desired) -> Result<Converged<R::Snapshot>, LifecycleError> {
        let parts = self
            .resource
            .create(desired)
            .map_err(|source| {
                self.fail(Operation::Create, None, remote(RemoteCall::Create, source))
            })?;
        let id = self.resource.id_layout().encode(&parts);
        info!(id = %id, "create requested");

        let parts = self
            .resource
            .id_layout()
            .decode(&id)
            .map_err(|err| self.fail(Operation::Create, Some(&id), err.into()))?;

        let plan = self.resource.waits().create.as_ref();
        let polls = self.converge(Operation::Create, &id, &parts, plan)?;
        let snapshot = self.read_back(Operation::Create, &id, &parts)?;
        info!(id = %id, polls, "created");
        Ok(Converged { id, snapshot, polls })
    }

    /// Single lookup; `Absent` means the object was deleted out-of-band.
    #[instrument(skip_all, fields(kind = self.resource.kind(), id = %id))]
    pub fn read(&self, id: &ExternalId) -> Result<LifecycleOutcome<R::Snapshot>, LifecycleError> {
        match lookup::find(&self.resource, id) {
            Ok(Some(snapshot)) => Ok(LifecycleOutcome::Present(snapshot)),
            Ok(None) => {
                warn!("object not found, dropping from state");
                Ok(LifecycleOutcome::Absent)
            }
            Err(LookupError::Malformed(err)) => {
                Err(self.fail(Operation::Read, Some(id), err.into()))
            }
            Err(LookupError::Remote { source, .. }) => Err(self.fail(
                Operation::Read,
                Some(id),
                remote(RemoteCall::Describe, source),
            )),
        }
    }

    /// Apply changed mutable attributes and wait for the object to settle.
    ///
    /// Without changes no remote modify is issued and the current snapshot is
    /// returned.
    #[instrument(skip_all, fields(kind = self.resource.kind(), id = %id))]
    pub fn update(
        &self,
        id: &ExternalId,
        prior: &R::Desired,
        desired: &R::Desired,
    ) -> Result<Converged<R::Snapshot>, LifecycleError> {
        let parts = self.decode(Operation::Update, id)?;
        let delta = self.resource.diff(prior, desired);

        let polls = if delta.is_empty() {
            info!("no mutable attribute changed, skipping modify");
            0
        } else {
            self.resource.modify(&parts, &delta).map_err(|source| {
                self.fail(Operation::Update, Some(id), remote(RemoteCall::Modify, source))
            })?;
            self.converge(Operation::Update, id, &parts, self.resource.waits().update.as_ref())?
        };

        let snapshot = self.read_back(Operation::Update, id, &parts)?;
        info!(polls, "updated");
        Ok(Converged {
            id: id.clone(),
            snapshot,
            polls,
        })
    }

    /// Delete the object and wait until it is gone.
    #[instrument(skip_all, fields(kind = self.resource.kind(), id = %id))]
    pub fn delete(&self, id: &ExternalId) -> Result<DeleteOutcome, LifecycleError> {
        let parts = self.decode(Operation::Delete, id)?;
        let absent = self.resource.absent_errors();

        if let Err(source) = self.resource.delete(&parts) {
            if absent.is_absent(AbsentScope::Delete, &source) {
                info!(err = %source, "already gone");
                return Ok(DeleteOutcome::AlreadyGone);
            }
            return Err(self.fail(
                Operation::Delete,
                Some(id),
                remote(RemoteCall::Delete, source),
            ));
        }

        let Some(plan) = self.resource.waits().delete.as_ref() else {
            info!("deleted");
            return Ok(DeleteOutcome::Deleted { polls: 0 });
        };
        let refresh = self.refresher(&parts);
        let waited = self.waiter.wait(&plan.request(self.policy), &refresh);
        match waited {
            Ok(outcome) => {
                info!(polls = outcome.attempts(), "deleted");
                Ok(DeleteOutcome::Deleted {
                    polls: outcome.attempts(),
                })
            }
            Err(WaitError::Remote { source, attempts })
                if absent.is_absent(AbsentScope::Delete, &source) =>
            {
                info!(polls = attempts, err = %source, "deleted");
                Ok(DeleteOutcome::Deleted { polls: attempts })
            }
            Err(err) => Err(self.fail(Operation::Delete, Some(id), failure_from_wait(err))),
        }
    }

    fn decode(&self, operation: Operation, id: &ExternalId) -> Result<Vec<String>, LifecycleError> {
        self.resource
            .id_layout()
            .decode(id)
            .map_err(|err| self.fail(operation, Some(id), err.into()))
    }

    fn converge(
        &self,
        operation: Operation,
        id: &ExternalId,
        parts: &[String],
        plan: Option<&WaitPlan>,
    ) -> Result<u32, LifecycleError> {
        let Some(plan) = plan else {
            return Ok(0);
        };
        self.waiter
            .wait(&plan.request(self.policy), &self.refresher(parts))
            .map(|outcome| outcome.attempts())
            .map_err(|err| self.fail(operation, Some(id), failure_from_wait(err)))
    }

    fn read_back(
        &self,
        operation: Operation,
        id: &ExternalId,
        parts: &[String],
    ) -> Result<R::Snapshot, LifecycleError> {
        match lookup::find_by_parts(&self.resource, parts) {
            Ok(Some(snapshot)) => Ok(snapshot),
            Ok(None) => Err(self.fail(operation, Some(id), Failure::Vanished)),
            Err(source) => Err(self.fail(
                operation,
                Some(id),
                remote(RemoteCall::Describe, source),
            )),
        }
    }

    fn refresher<'a>(
        &'a self,
        parts: &'a [String],
    ) -> impl Fn() -> Result<Observation<R::Snapshot>, RemoteError> + 'a {
        move || {
            Ok(match lookup::find_by_parts(&self.resource, parts)? {
                Some(snapshot) => Observation::found(self.resource.status(&snapshot), snapshot),
                None => Observation::NotFound,
            })
        }
    }

    fn fail(
        &self,
        operation: Operation,
        id: Option<&ExternalId>,
        failure: Failure,
    ) -> LifecycleError {
        warn!(operation = %operation, failure = %failure, "lifecycle operation failed");
        LifecycleError {
            kind: self.resource.kind(),
            operation,
            id: id.cloned(),
            failure,
        }
    }
}

fn remote(call: RemoteCall, source: RemoteError) -> Failure {
    Failure::Remote { call, source }
}

fn failure_from_wait<S: fmt::Debug + Serialize>(err: WaitError<S>) -> Failure {
    match err {
        WaitError::InvalidRequest(message) => Failure::InvalidWait(message),
        WaitError::Remote { source, .. } => remote(RemoteCall::Describe, source),
        WaitError::UnexpectedState {
            label, snapshot, ..
        } => Failure::UnexpectedState {
            label,
            snapshot: to_value(&snapshot),
        },
        WaitError::Timeout {
            last_label,
            last_snapshot,
            timeout,
            attempts,
            ..
        } => Failure::Timeout {
            last_label,
            last_snapshot: last_snapshot.as_ref().and_then(to_value),
            timeout,
            attempts,
        },
        WaitError::NotFoundExhausted { checks } => Failure::NotFoundExhausted { checks },
        WaitError::Cancelled { attempts } => Failure::Cancelled { attempts },
    }
}

fn to_value<S: Serialize>(snapshot: &S) -> Option<Value> {
    serde_json::to_value(snapshot).ok()
}
