//! In-process scenario execution against the simulated control plane.
//!
//! Every case runs on a fresh [`SimControlPlane`] and a virtual clock, so a
//! ten-minute deletion timeout finishes instantly and deterministically.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use converge::clock::ManualClock;
use converge::core::id::ExternalId;
use converge::error::{Failure, LifecycleError, RemoteError};
use converge::io::config::ConvergeConfig;
use converge::lifecycle::{DeleteOutcome, LifecycleOutcome, ManagedResource, Orchestrator};
use converge::resources::ResourceKind;
use converge::resources::anomaly_monitor::{AnomalyMonitors, MonitorSpec};
use converge::resources::cluster_endpoint::{self, ClusterEndpoints, EndpointSpec};
use converge::sim::{CallCounts, SimControlPlane};
use converge::wait::Waiter;

use crate::case::{CaseFile, Fault, Step, StepResult};

/// Everything a scenario produced, judged afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    pub steps: Vec<StepRecord>,
    pub calls: CallCounts,
    /// Virtual time slept across all steps.
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepRecord {
    /// 1-based position in the case's step list.
    pub step: usize,
    pub op: String,
    pub result: StepResult,
    pub polls: Option<u32>,
    /// Identifier tracked after the step.
    pub id: Option<String>,
    pub failure: Option<String>,
    pub label: Option<String>,
    pub message: Option<String>,
}

impl StepRecord {
    fn new(step: usize, op: &str, result: StepResult) -> Self {
        Self {
            step,
            op: op.to_string(),
            result,
            polls: None,
            id: None,
            failure: None,
            label: None,
            message: None,
        }
    }

    fn failed(step: usize, op: &str, err: LifecycleError) -> Self {
        let mut record = Self::new(step, op, StepResult::Failed);
        record.failure = Some(failure_class(&err.failure).to_string());
        record.label = failure_label(&err.failure);
        record.message = Some(format!("{:#}", anyhow::Error::from(err)));
        record
    }

    fn untracked(step: usize, op: &str) -> Self {
        let mut record = Self::new(step, op, StepResult::Failed);
        record.failure = Some("untracked".to_string());
        record.message = Some("no identifier is tracked".to_string());
        record
    }
}

/// Run all steps of `case` with configuration `cfg`.
#[instrument(skip_all, fields(case_id = %case.case.id, kind = %case.case.kind))]
pub fn run_scenario(case: &CaseFile, cfg: &ConvergeConfig) -> Result<Transcript> {
    let sim = SimControlPlane::with_behavior(case.remote.behavior.clone());
    for cluster in &case.remote.clusters {
        sim.add_cluster(cluster.clone());
    }
    for fault in &case.remote.faults {
        sim.fail_on(fault.call.into(), fault.nth, remote_error(fault));
    }

    let clock = Arc::new(ManualClock::new());
    let waiter = Waiter::new(clock.clone());
    let policy = cfg.poll.policy();

    let steps = match case.case.kind {
        ResourceKind::ClusterEndpoint => {
            let desired: EndpointSpec = parse_spec(&case.resource)?;
            let seeded = case.remote.seed_status.as_ref().map(|status| {
                sim.seed_endpoint(&desired, status.clone());
                cluster_endpoint::ID_LAYOUT.encode(&[&desired.cluster_id, &desired.endpoint_id])
            });
            let resource = ClusterEndpoints::with_config(&sim, &cfg.resources.cluster_endpoint);
            let orch = Orchestrator::new(resource, waiter).with_policy(policy);
            run_steps(&orch, desired, seeded, &case.steps, |id| {
                cluster_endpoint::ID_LAYOUT
                    .decode_array::<2>(id)
                    .is_ok_and(|[_, endpoint_id]| sim.remove_endpoint(&endpoint_id))
            })?
        }
        ResourceKind::AnomalyMonitor => {
            let desired: MonitorSpec = parse_spec(&case.resource)?;
            let seeded = case
                .remote
                .seed_status
                .as_ref()
                .map(|_| ExternalId::new(sim.seed_monitor(&desired)));
            let resource = AnomalyMonitors::with_config(&sim, &cfg.resources.anomaly_monitor);
            let orch = Orchestrator::new(resource, waiter).with_policy(policy);
            run_steps(&orch, desired, seeded, &case.steps, |id| {
                sim.remove_monitor(id.as_str())
            })?
        }
    };

    let elapsed_ms = u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX);
    info!(steps = steps.len(), elapsed_ms, "scenario finished");
    Ok(Transcript {
        steps,
        calls: sim.calls(),
        elapsed_ms,
    })
}

fn run_steps<R>(
    orch: &Orchestrator<R>,
    mut desired: R::Desired,
    mut tracked: Option<ExternalId>,
    steps: &[Step],
    vanish: impl Fn(&ExternalId) -> bool,
) -> Result<Vec<StepRecord>>
where
    R: ManagedResource,
    R::Desired: Serialize + DeserializeOwned,
{
    let mut records = Vec::with_capacity(steps.len());
    for (index, step) in steps.iter().enumerate() {
        let number = index + 1;
        let op = step.name();

        let record = match (step, tracked.clone()) {
            (Step::Create, _) => match orch.create(&desired) {
                Ok(created) => {
                    let mut record = StepRecord::new(number, op, StepResult::Converged);
                    record.polls = Some(created.polls);
                    tracked = Some(created.id);
                    record
                }
                Err(err) => {
                    tracked = err.tracked_id().cloned();
                    StepRecord::failed(number, op, err)
                }
            },
            (_, None) => StepRecord::untracked(number, op),
            (Step::Read, Some(id)) => match orch.read(&id) {
                Ok(LifecycleOutcome::Present(_)) => {
                    StepRecord::new(number, op, StepResult::Present)
                }
                Ok(LifecycleOutcome::Absent) => {
                    tracked = None;
                    StepRecord::new(number, op, StepResult::Absent)
                }
                Err(err) => StepRecord::failed(number, op, err),
            },
            (Step::Update { set }, Some(id)) => {
                let next = merge_spec(&desired, set)
                    .with_context(|| format!("steps[{index}] update set"))?;
                match orch.update(&id, &desired, &next) {
                    Ok(updated) => {
                        desired = next;
                        let mut record = StepRecord::new(number, op, StepResult::Converged);
                        record.polls = Some(updated.polls);
                        record
                    }
                    Err(err) => StepRecord::failed(number, op, err),
                }
            }
            (Step::Delete, Some(id)) => match orch.delete(&id) {
                Ok(DeleteOutcome::AlreadyGone) => {
                    tracked = None;
                    StepRecord::new(number, op, StepResult::AlreadyGone)
                }
                Ok(DeleteOutcome::Deleted { polls }) => {
                    tracked = None;
                    let mut record = StepRecord::new(number, op, StepResult::Deleted);
                    record.polls = Some(polls);
                    record
                }
                Err(err) => StepRecord::failed(number, op, err),
            },
            (Step::Vanish, Some(id)) => {
                if vanish(&id) {
                    StepRecord::new(number, op, StepResult::Removed)
                } else {
                    let mut record = StepRecord::new(number, op, StepResult::Failed);
                    record.failure = Some("missing".to_string());
                    record.message = Some(format!("{id} was not present remotely"));
                    record
                }
            }
        };

        let record = StepRecord {
            id: tracked.as_ref().map(ExternalId::to_string),
            ..record
        };
        debug!(step = number, op, result = ?record.result, polls = ?record.polls, "step finished");
        records.push(record);
    }
    Ok(records)
}

fn parse_spec<D: DeserializeOwned>(table: &toml::Table) -> Result<D> {
    toml::Value::Table(table.clone())
        .try_into::<D>()
        .context("parse [resource] spec")
}

/// Overlay `set` onto the current desired spec.
fn merge_spec<D: Serialize + DeserializeOwned>(current: &D, set: &toml::Table) -> Result<D> {
    let mut value = toml::Value::try_from(current).context("serialize desired spec")?;
    let table = value
        .as_table_mut()
        .context("desired spec is not a table")?;
    for (key, item) in set {
        table.insert(key.clone(), item.clone());
    }
    value.try_into::<D>().context("parse updated spec")
}

fn remote_error(fault: &Fault) -> RemoteError {
    match &fault.code {
        Some(code) => RemoteError::with_code(code.clone(), fault.message.clone()),
        None => RemoteError::new(fault.message.clone()),
    }
}

/// Stable snake_case name of a failure class, as used in case checks.
pub fn failure_class(failure: &Failure) -> &'static str {
    match failure {
        Failure::MalformedIdentifier(_) => "malformed_identifier",
        Failure::Remote { .. } => "remote",
        Failure::UnexpectedState { .. } => "unexpected_state",
        Failure::Timeout { .. } => "timeout",
        Failure::NotFoundExhausted { .. } => "not_found_exhausted",
        Failure::Cancelled { .. } => "cancelled",
        Failure::Vanished => "vanished",
        Failure::InvalidWait(_) => "invalid_wait",
    }
}

fn failure_label(failure: &Failure) -> Option<String> {
    match failure {
        Failure::UnexpectedState { label, .. } => Some(label.clone()),
        Failure::Timeout { last_label, .. } => last_label.clone(),
        _ => None,
    }
}
