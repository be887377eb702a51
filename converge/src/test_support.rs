//! Test-only helpers: scripted refresh sequences, a fake resource kind,
//! config files on disk and fixture builders.

use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::clock::ManualClock;
use crate::core::id::IdLayout;
use crate::error::RemoteError;
use crate::lifecycle::{Delta, LifecycleWaits, ManagedResource, WaitPlan};
use crate::lookup::AbsentErrors;
use crate::resources::anomaly_monitor::{MonitorKind, MonitorSpec};
use crate::resources::cluster_endpoint::{EndpointSpec, EndpointType};
use crate::wait::{Observation, Refresh, Waiter};
use tempfile::TempDir;

pub type Step<S> = Result<Observation<S>, RemoteError>;

pub fn found<S>(label: &str, snapshot: S) -> Step<S> {
    Ok(Observation::found(label, snapshot))
}

pub fn not_found<S>() -> Step<S> {
    Ok(Observation::NotFound)
}

/// Refresh serving a fixed sequence; the last entry repeats forever.
#[derive(Debug)]
pub struct ScriptedRefresh<S> {
    steps: Vec<Step<S>>,
    calls: AtomicU32,
}

impl<S: Clone> ScriptedRefresh<S> {
    pub fn new(steps: Vec<Step<S>>) -> Self {
        Self {
            steps,
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl<S: Clone> Refresh for ScriptedRefresh<S> {
    type Snapshot = S;

    fn refresh(&self) -> Step<S> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
        match self.steps.get(call).or_else(|| self.steps.last()) {
            Some(step) => step.clone(),
            None => Ok(Observation::NotFound),
        }
    }
}

/// Waiter on a fresh virtual clock.
pub fn manual_waiter() -> (Waiter, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    (Waiter::new(clock.clone()), clock)
}

/// Temporary directory holding `converge.toml` with `contents`.
///
/// Keep the `TempDir` alive for as long as the path is used.
pub fn config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join(crate::io::config::DEFAULT_PATH);
    fs::write(&path, contents).expect("write config");
    (temp, path)
}

pub fn endpoint_spec(cluster_id: &str, endpoint_id: &str) -> EndpointSpec {
    EndpointSpec {
        cluster_id: cluster_id.to_string(),
        endpoint_id: endpoint_id.to_string(),
        endpoint_type: EndpointType::Reader,
        static_members: BTreeSet::new(),
        excluded_members: BTreeSet::new(),
    }
}

pub fn dimensional_monitor(name: &str) -> MonitorSpec {
    MonitorSpec {
        name: name.to_string(),
        monitor: MonitorKind::Dimensional {
            dimension: "SERVICE".to_string(),
        },
    }
}

const FAKE_LAYOUT: IdLayout = IdLayout::new(":", &["PARENT", "CHILD"]);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FakeDelta {
    pub changed: bool,
}

impl Delta for FakeDelta {
    fn is_empty(&self) -> bool {
        !self.changed
    }
}

/// Two-part resource whose desired spec is its identifier and whose snapshot is
/// its status label. Describe serves a status script, repeating the last entry.
#[derive(Debug)]
pub struct FakeResource {
    statuses: Vec<String>,
    absent: AbsentErrors,
    waits: LifecycleWaits,
    describes: AtomicU32,
    modifies: AtomicU32,
    deleted: Mutex<bool>,
}

impl FakeResource {
    pub fn new<I, S>(statuses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let available = WaitPlan::until_available(Duration::from_secs(60));
        Self {
            statuses: statuses.into_iter().map(Into::into).collect(),
            absent: AbsentErrors::uniform(["NotFound"]),
            waits: LifecycleWaits {
                create: Some(available.clone()),
                update: Some(available),
                delete: Some(WaitPlan::until_deleted(Duration::from_secs(60))),
            },
            describes: AtomicU32::new(0),
            modifies: AtomicU32::new(0),
            deleted: Mutex::new(false),
        }
    }

    pub fn describe_calls(&self) -> u32 {
        self.describes.load(Ordering::SeqCst)
    }

    pub fn modify_calls(&self) -> u32 {
        self.modifies.load(Ordering::SeqCst)
    }
}

impl ManagedResource for FakeResource {
    type Desired = String;
    type Delta = FakeDelta;
    type Snapshot = String;

    fn kind(&self) -> &'static str {
        "fake"
    }

    fn id_layout(&self) -> IdLayout {
        FAKE_LAYOUT
    }

    fn absent_errors(&self) -> &AbsentErrors {
        &self.absent
    }

    fn waits(&self) -> &LifecycleWaits {
        &self.waits
    }

    fn diff(&self, prior: &String, desired: &String) -> FakeDelta {
        FakeDelta {
            changed: prior != desired,
        }
    }

    fn create(&self, desired: &String) -> Result<Vec<String>, RemoteError> {
        Ok(desired.split(':').map(str::to_string).collect())
    }

    fn modify(&self, _parts: &[String], _delta: &FakeDelta) -> Result<(), RemoteError> {
        self.modifies.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn delete(&self, _parts: &[String]) -> Result<(), RemoteError> {
        *self.deleted.lock().unwrap_or_else(PoisonError::into_inner) = true;
        Ok(())
    }

    fn describe(&self, _parts: &[String]) -> Result<Vec<String>, RemoteError> {
        let call = self.describes.fetch_add(1, Ordering::SeqCst) as usize;
        if *self.deleted.lock().unwrap_or_else(PoisonError::into_inner) {
            return Err(RemoteError::with_code("NotFound", "gone"));
        }
        Ok(self
            .statuses
            .get(call)
            .or_else(|| self.statuses.last())
            .cloned()
            .into_iter()
            .collect())
    }

    fn status(&self, snapshot: &String) -> String {
        snapshot.clone()
    }
}
