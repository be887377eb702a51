//! Scripted in-memory control plane.
//!
//! Implements both resource APIs against shared state behind one mutex. Each
//! mutation installs a status script: successive describe calls serve the
//! scripted statuses in order, after which the object either holds its last
//! status or vanishes. Remote errors can be injected on the Nth call of any
//! kind. Integration tests and the eval harness drive lifecycles through it.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{RemoteCall, RemoteError};
use crate::resources::anomaly_monitor::{
    AnomalyMonitor, AnomalyMonitorApi, MonitorKind, MonitorSpec, UNKNOWN_MONITOR,
};
use crate::resources::cluster_endpoint::{
    CLUSTER_NOT_FOUND, ClusterEndpoint, ClusterEndpointApi, ENDPOINT_NOT_FOUND, EndpointDelta,
    EndpointSpec,
};

pub const ENDPOINT_ALREADY_EXISTS: &str = "DBClusterEndpointAlreadyExistsFault";
pub const VALIDATION: &str = "ValidationException";

/// Dimensions a dimensional monitor may watch.
const MONITOR_DIMENSIONS: &[&str] = &["SERVICE"];

/// What happens once a status script is exhausted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Settle {
    /// Keep serving the last status.
    #[default]
    Hold,
    /// The object disappears.
    Vanish,
}

/// Statuses served after a mutation.
///
/// An empty script with [`Settle::Hold`] leaves the status set by the mutation
/// call itself (`creating`, `modifying` or `deleting`) in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Transition {
    pub statuses: Vec<String>,
    pub then: Settle,
}

impl Transition {
    /// Serve `statuses`, then hold the last one.
    pub fn settle<I, S>(statuses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            statuses: statuses.into_iter().map(Into::into).collect(),
            then: Settle::Hold,
        }
    }

    /// Serve `statuses`, then disappear.
    pub fn vanish<I, S>(statuses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            statuses: statuses.into_iter().map(Into::into).collect(),
            then: Settle::Vanish,
        }
    }
}

/// Scripts installed by each endpoint mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Behavior {
    pub create: Transition,
    pub modify: Transition,
    pub delete: Transition,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            create: Transition::settle(["available"]),
            modify: Transition::settle(["available"]),
            delete: Transition::vanish(Vec::<String>::new()),
        }
    }
}

/// Remote calls served so far, across both resource kinds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallCounts {
    pub create: u32,
    pub modify: u32,
    pub delete: u32,
    pub describe: u32,
}

impl CallCounts {
    fn bump(&mut self, call: RemoteCall) -> u32 {
        let slot = match call {
            RemoteCall::Create => &mut self.create,
            RemoteCall::Modify => &mut self.modify,
            RemoteCall::Delete => &mut self.delete,
            RemoteCall::Describe => &mut self.describe,
        };
        *slot += 1;
        *slot
    }
}

#[derive(Debug)]
struct Fault {
    call: RemoteCall,
    nth: u32,
    error: RemoteError,
}

#[derive(Debug)]
struct EndpointRecord {
    snapshot: ClusterEndpoint,
    script: VecDeque<String>,
    then: Settle,
}

impl EndpointRecord {
    fn install(&mut self, transition: &Transition) {
        self.script = transition.statuses.iter().cloned().collect();
        self.then = transition.then;
    }
}

#[derive(Debug, Default)]
struct SimState {
    behavior: Behavior,
    clusters: BTreeSet<String>,
    endpoints: BTreeMap<String, EndpointRecord>,
    monitors: BTreeMap<String, AnomalyMonitor>,
    next_monitor: u32,
    faults: Vec<Fault>,
    calls: CallCounts,
}

impl SimState {
    /// Count the call and return an injected fault for it, if any.
    fn enter(&mut self, call: RemoteCall) -> Result<(), RemoteError> {
        let nth = self.calls.bump(call);
        match self
            .faults
            .iter()
            .position(|fault| fault.call == call && fault.nth == nth)
        {
            Some(index) => {
                let fault = self.faults.remove(index);
                debug!(call = %call, nth, err = %fault.error, "injecting fault");
                Err(fault.error)
            }
            None => Ok(()),
        }
    }

    fn require_cluster(&self, cluster_id: &str) -> Result<(), RemoteError> {
        if self.clusters.contains(cluster_id) {
            return Ok(());
        }
        Err(RemoteError::with_code(
            CLUSTER_NOT_FOUND,
            format!("DBCluster {cluster_id} not found."),
        ))
    }

    fn endpoint_mut(&mut self, endpoint_id: &str) -> Result<&mut EndpointRecord, RemoteError> {
        self.endpoints.get_mut(endpoint_id).ok_or_else(|| {
            RemoteError::with_code(
                ENDPOINT_NOT_FOUND,
                format!("DBClusterEndpoint {endpoint_id} not found."),
            )
        })
    }

    fn monitor_missing(arn: &str) -> RemoteError {
        RemoteError::with_code(UNKNOWN_MONITOR, format!("No monitor exists for {arn}"))
    }
}

/// In-memory control plane serving cluster endpoints and anomaly monitors.
#[derive(Debug, Default)]
pub struct SimControlPlane {
    state: Mutex<SimState>,
}

impl SimControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_behavior(behavior: Behavior) -> Self {
        let sim = Self::new();
        sim.set_behavior(behavior);
        sim
    }

    pub fn set_behavior(&self, behavior: Behavior) {
        self.lock().behavior = behavior;
    }

    pub fn add_cluster(&self, cluster_id: impl Into<String>) {
        self.lock().clusters.insert(cluster_id.into());
    }

    /// Fail the `nth` call (1-based, counted from the start) of kind `call`.
    pub fn fail_on(&self, call: RemoteCall, nth: u32, error: RemoteError) {
        self.lock().faults.push(Fault { call, nth, error });
    }

    /// Insert an endpoint that already exists with `status`, adding its cluster.
    pub fn seed_endpoint(&self, spec: &EndpointSpec, status: impl Into<String>) {
        let mut state = self.lock();
        state.clusters.insert(spec.cluster_id.clone());
        let mut snapshot = endpoint_snapshot(spec);
        snapshot.status = Some(status.into());
        state.endpoints.insert(
            spec.endpoint_id.clone(),
            EndpointRecord {
                snapshot,
                script: VecDeque::new(),
                then: Settle::Hold,
            },
        );
    }

    /// Insert an existing monitor and return its ARN.
    pub fn seed_monitor(&self, spec: &MonitorSpec) -> String {
        insert_monitor(&mut self.lock(), spec)
    }

    /// Delete an endpoint out-of-band, bypassing scripts and faults.
    pub fn remove_endpoint(&self, endpoint_id: &str) -> bool {
        self.lock().endpoints.remove(endpoint_id).is_some()
    }

    /// Delete a monitor out-of-band.
    pub fn remove_monitor(&self, arn: &str) -> bool {
        self.lock().monitors.remove(arn).is_some()
    }

    pub fn calls(&self) -> CallCounts {
        self.lock().calls
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn endpoint_snapshot(spec: &EndpointSpec) -> ClusterEndpoint {
    ClusterEndpoint {
        cluster_id: spec.cluster_id.clone(),
        endpoint_id: spec.endpoint_id.clone(),
        endpoint_type: spec.endpoint_type.to_string(),
        endpoint: Some(format!(
            "{}.cluster-custom-{}.sim.local",
            spec.endpoint_id, spec.cluster_id
        )),
        status: None,
        static_members: spec.static_members.clone(),
        excluded_members: spec.excluded_members.clone(),
        arn: Some(format!("arn:sim:rds:cluster-endpoint:{}", spec.endpoint_id)),
    }
}

fn insert_monitor(state: &mut SimState, spec: &MonitorSpec) -> String {
    state.next_monitor += 1;
    let arn = format!(
        "arn:sim:ce::000000000000:anomalymonitor/{:08x}",
        state.next_monitor
    );
    let (dimension, specification) = match &spec.monitor {
        MonitorKind::Dimensional { dimension } => (Some(dimension.clone()), None),
        MonitorKind::Custom { specification } => (None, Some(specification.clone())),
    };
    state.monitors.insert(
        arn.clone(),
        AnomalyMonitor {
            arn: arn.clone(),
            name: spec.name.clone(),
            monitor_type: spec.monitor.type_name().to_string(),
            dimension,
            specification,
        },
    );
    arn
}

impl ClusterEndpointApi for SimControlPlane {
    fn create_endpoint(&self, spec: &EndpointSpec) -> Result<ClusterEndpoint, RemoteError> {
        let mut state = self.lock();
        state.enter(RemoteCall::Create)?;
        state.require_cluster(&spec.cluster_id)?;
        if state.endpoints.contains_key(&spec.endpoint_id) {
            return Err(RemoteError::with_code(
                ENDPOINT_ALREADY_EXISTS,
                format!("DBClusterEndpoint {} already exists.", spec.endpoint_id),
            ));
        }

        let mut snapshot = endpoint_snapshot(spec);
        snapshot.status = Some("creating".to_string());
        let mut record = EndpointRecord {
            snapshot: snapshot.clone(),
            script: VecDeque::new(),
            then: Settle::Hold,
        };
        let transition = state.behavior.create.clone();
        record.install(&transition);
        state.endpoints.insert(spec.endpoint_id.clone(), record);
        Ok(snapshot)
    }

    fn modify_endpoint(&self, endpoint_id: &str, delta: &EndpointDelta) -> Result<(), RemoteError> {
        let mut state = self.lock();
        state.enter(RemoteCall::Modify)?;
        let transition = state.behavior.modify.clone();
        let record = state.endpoint_mut(endpoint_id)?;
        if let Some(endpoint_type) = delta.endpoint_type {
            record.snapshot.endpoint_type = endpoint_type.to_string();
        }
        if let Some(members) = &delta.static_members {
            record.snapshot.static_members = members.clone();
        }
        if let Some(members) = &delta.excluded_members {
            record.snapshot.excluded_members = members.clone();
        }
        record.snapshot.status = Some("modifying".to_string());
        record.install(&transition);
        Ok(())
    }

    fn delete_endpoint(&self, endpoint_id: &str) -> Result<(), RemoteError> {
        let mut state = self.lock();
        state.enter(RemoteCall::Delete)?;
        let transition = state.behavior.delete.clone();
        let record = state.endpoint_mut(endpoint_id)?;
        record.snapshot.status = Some("deleting".to_string());
        record.install(&transition);
        Ok(())
    }

    fn describe_endpoints(
        &self,
        cluster_id: &str,
        endpoint_id: &str,
    ) -> Result<Vec<ClusterEndpoint>, RemoteError> {
        let mut state = self.lock();
        state.enter(RemoteCall::Describe)?;
        state.require_cluster(cluster_id)?;

        let Some(record) = state.endpoints.get_mut(endpoint_id) else {
            return Ok(Vec::new());
        };
        if record.snapshot.cluster_id != cluster_id {
            return Ok(Vec::new());
        }
        if let Some(status) = record.script.pop_front() {
            record.snapshot.status = Some(status);
        } else if record.then == Settle::Vanish {
            state.endpoints.remove(endpoint_id);
            return Ok(Vec::new());
        }
        Ok(vec![record.snapshot.clone()])
    }
}

impl AnomalyMonitorApi for SimControlPlane {
    fn create_monitor(&self, spec: &MonitorSpec) -> Result<String, RemoteError> {
        let mut state = self.lock();
        state.enter(RemoteCall::Create)?;
        if let MonitorKind::Dimensional { dimension } = &spec.monitor
            && !MONITOR_DIMENSIONS.contains(&dimension.as_str())
        {
            return Err(RemoteError::with_code(
                VALIDATION,
                format!("Unsupported dimension {dimension}"),
            ));
        }
        Ok(insert_monitor(&mut state, spec))
    }

    fn rename_monitor(&self, arn: &str, name: &str) -> Result<(), RemoteError> {
        let mut state = self.lock();
        state.enter(RemoteCall::Modify)?;
        let monitor = state
            .monitors
            .get_mut(arn)
            .ok_or_else(|| SimState::monitor_missing(arn))?;
        monitor.name = name.to_string();
        Ok(())
    }

    fn delete_monitor(&self, arn: &str) -> Result<(), RemoteError> {
        let mut state = self.lock();
        state.enter(RemoteCall::Delete)?;
        state
            .monitors
            .remove(arn)
            .map(drop)
            .ok_or_else(|| SimState::monitor_missing(arn))
    }

    fn get_monitors(&self, arn: &str) -> Result<Vec<AnomalyMonitor>, RemoteError> {
        let mut state = self.lock();
        state.enter(RemoteCall::Describe)?;
        state
            .monitors
            .get(arn)
            .cloned()
            .map(|monitor| vec![monitor])
            .ok_or_else(|| SimState::monitor_missing(arn))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::cluster_endpoint::EndpointType;

    fn spec() -> EndpointSpec {
        EndpointSpec {
            cluster_id: "db-1".to_string(),
            endpoint_id: "reader-1".to_string(),
            endpoint_type: EndpointType::Reader,
            static_members: BTreeSet::new(),
            excluded_members: BTreeSet::new(),
        }
    }

    fn statuses(sim: &SimControlPlane, n: usize) -> Vec<Option<String>> {
        (0..n)
            .map(|_| {
                sim.describe_endpoints("db-1", "reader-1")
                    .expect("describe")
                    .first()
                    .and_then(|e| e.status.clone())
            })
            .collect()
    }

    #[test]
    fn create_script_is_served_then_held() {
        let sim = SimControlPlane::with_behavior(Behavior {
            create: Transition::settle(["creating", "available"]),
            ..Behavior::default()
        });
        sim.add_cluster("db-1");
        sim.create_endpoint(&spec()).expect("create");

        assert_eq!(
            statuses(&sim, 3),
            vec![
                Some("creating".to_string()),
                Some("available".to_string()),
                Some("available".to_string())
            ]
        );
    }

    #[test]
    fn delete_script_vanishes() {
        let sim = SimControlPlane::with_behavior(Behavior {
            delete: Transition::vanish(["deleting"]),
            ..Behavior::default()
        });
        sim.seed_endpoint(&spec(), "available");
        sim.delete_endpoint("reader-1").expect("delete");

        assert_eq!(statuses(&sim, 2), vec![Some("deleting".to_string()), None]);
        let err = sim.delete_endpoint("reader-1").expect_err("gone");
        assert_eq!(err.code(), Some(ENDPOINT_NOT_FOUND));
    }

    #[test]
    fn missing_cluster_is_reported() {
        let sim = SimControlPlane::new();
        let err = sim.create_endpoint(&spec()).expect_err("no cluster");
        assert_eq!(err.code(), Some(CLUSTER_NOT_FOUND));
        let err = sim.describe_endpoints("db-1", "reader-1").expect_err("no cluster");
        assert_eq!(err.code(), Some(CLUSTER_NOT_FOUND));
    }

    #[test]
    fn faults_fire_on_the_nth_call_only() {
        let sim = SimControlPlane::new();
        sim.seed_endpoint(&spec(), "available");
        sim.fail_on(RemoteCall::Describe, 2, RemoteError::with_code("Throttling", "slow down"));

        assert!(sim.describe_endpoints("db-1", "reader-1").is_ok());
        assert!(sim.describe_endpoints("db-1", "reader-1").is_err());
        assert!(sim.describe_endpoints("db-1", "reader-1").is_ok());
        assert_eq!(sim.calls().describe, 3);
    }

    #[test]
    fn dimensional_monitor_validates_dimension() {
        let sim = SimControlPlane::new();
        let err = sim
            .create_monitor(&MonitorSpec {
                name: "spend".to_string(),
                monitor: MonitorKind::Dimensional {
                    dimension: "SERVICE2".to_string(),
                },
            })
            .expect_err("invalid");
        assert_eq!(err.code(), Some(VALIDATION));
    }
}
