//! Cost anomaly monitor.
//!
//! Monitors are addressed by their ARN alone and are synchronous on the remote
//! side, so no lifecycle operation waits. Only the name is mutable.

use serde::{Deserialize, Serialize};

use crate::core::id::IdLayout;
use crate::core::labels::UNKNOWN;
use crate::error::RemoteError;
use crate::io::config::AnomalyMonitorConfig;
use crate::lifecycle::{Delta, LifecycleWaits, ManagedResource};
use crate::lookup::AbsentErrors;

pub const KIND: &str = "anomaly_monitor";
/// ARNs contain `:`; a single-part layout never splits.
pub const ID_LAYOUT: IdLayout = IdLayout::new(":", &["MONITOR-ARN"]);

pub const UNKNOWN_MONITOR: &str = "UnknownMonitorException";

/// What a monitor watches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum MonitorKind {
    /// Watches one dimension of spend, e.g. `SERVICE`.
    Dimensional { dimension: String },
    /// Watches spend matched by a JSON expression.
    Custom { specification: String },
}

impl MonitorKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            MonitorKind::Dimensional { .. } => "DIMENSIONAL",
            MonitorKind::Custom { .. } => "CUSTOM",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MonitorSpec {
    pub name: String,
    pub monitor: MonitorKind,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitorDelta {
    pub name: Option<String>,
}

impl Delta for MonitorDelta {
    fn is_empty(&self) -> bool {
        self.name.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnomalyMonitor {
    pub arn: String,
    pub name: String,
    pub monitor_type: String,
    pub dimension: Option<String>,
    pub specification: Option<String>,
}

pub trait AnomalyMonitorApi {
    /// Returns the new monitor's ARN.
    fn create_monitor(&self, spec: &MonitorSpec) -> Result<String, RemoteError>;

    fn rename_monitor(&self, arn: &str, name: &str) -> Result<(), RemoteError>;

    fn delete_monitor(&self, arn: &str) -> Result<(), RemoteError>;

    fn get_monitors(&self, arn: &str) -> Result<Vec<AnomalyMonitor>, RemoteError>;
}

impl<T: AnomalyMonitorApi + ?Sized> AnomalyMonitorApi for &T {
    fn create_monitor(&self, spec: &MonitorSpec) -> Result<String, RemoteError> {
        (**self).create_monitor(spec)
    }

    fn rename_monitor(&self, arn: &str, name: &str) -> Result<(), RemoteError> {
        (**self).rename_monitor(arn, name)
    }

    fn delete_monitor(&self, arn: &str) -> Result<(), RemoteError> {
        (**self).delete_monitor(arn)
    }

    fn get_monitors(&self, arn: &str) -> Result<Vec<AnomalyMonitor>, RemoteError> {
        (**self).get_monitors(arn)
    }
}

#[derive(Debug)]
pub struct AnomalyMonitors<C> {
    client: C,
    absent: AbsentErrors,
    waits: LifecycleWaits,
}

impl<C: AnomalyMonitorApi> AnomalyMonitors<C> {
    pub fn new(client: C) -> Self {
        Self::with_config(client, &AnomalyMonitorConfig::default())
    }

    pub fn with_config(client: C, cfg: &AnomalyMonitorConfig) -> Self {
        Self {
            client,
            absent: AbsentErrors {
                read: cfg.read_absent_codes.iter().cloned().collect(),
                delete: cfg.delete_absent_codes.iter().cloned().collect(),
            },
            waits: LifecycleWaits::default(),
        }
    }
}

impl<C: AnomalyMonitorApi> ManagedResource for AnomalyMonitors<C> {
    type Desired = MonitorSpec;
    type Delta = MonitorDelta;
    type Snapshot = AnomalyMonitor;

    fn kind(&self) -> &'static str {
        KIND
    }

    fn id_layout(&self) -> IdLayout {
        ID_LAYOUT
    }

    fn absent_errors(&self) -> &AbsentErrors {
        &self.absent
    }

    fn waits(&self) -> &LifecycleWaits {
        &self.waits
    }

    fn diff(&self, prior: &MonitorSpec, desired: &MonitorSpec) -> MonitorDelta {
        MonitorDelta {
            name: (prior.name != desired.name).then(|| desired.name.clone()),
        }
    }

    fn create(&self, desired: &MonitorSpec) -> Result<Vec<String>, RemoteError> {
        Ok(vec![self.client.create_monitor(desired)?])
    }

    fn modify(&self, parts: &[String], delta: &MonitorDelta) -> Result<(), RemoteError> {
        match &delta.name {
            Some(name) => self.client.rename_monitor(arn_part(parts), name),
            None => Ok(()),
        }
    }

    fn delete(&self, parts: &[String]) -> Result<(), RemoteError> {
        self.client.delete_monitor(arn_part(parts))
    }

    fn describe(&self, parts: &[String]) -> Result<Vec<AnomalyMonitor>, RemoteError> {
        self.client.get_monitors(arn_part(parts))
    }

    fn status(&self, _snapshot: &AnomalyMonitor) -> String {
        UNKNOWN.to_string()
    }
}

fn arn_part(parts: &[String]) -> &str {
    parts.first().map_or("", String::as_str)
}
