//! Custom endpoint of a graph-database cluster.
//!
//! Endpoints are addressed by `CLUSTER-ID:CLUSTER-ENDPOINT-ID`. Every mutation
//! is asynchronous on the remote side: the object moves through `creating`,
//! `modifying` or `deleting` before it settles.

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::id::IdLayout;
use crate::core::labels::UNKNOWN;
use crate::error::RemoteError;
use crate::io::config::ClusterEndpointConfig;
use crate::lifecycle::{Delta, LifecycleWaits, ManagedResource, WaitPlan};
use crate::lookup::AbsentErrors;

pub const KIND: &str = "cluster_endpoint";
pub const ID_LAYOUT: IdLayout = IdLayout::new(":", &["CLUSTER-ID", "CLUSTER-ENDPOINT-ID"]);

pub const ENDPOINT_NOT_FOUND: &str = "DBClusterEndpointNotFoundFault";
pub const CLUSTER_NOT_FOUND: &str = "DBClusterNotFoundFault";

pub const AVAILABLE_TIMEOUT: Duration = Duration::from_secs(10 * 60);
pub const DELETED_TIMEOUT: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EndpointType {
    Reader,
    Writer,
    Any,
}

impl EndpointType {
    pub fn as_str(self) -> &'static str {
        match self {
            EndpointType::Reader => "READER",
            EndpointType::Writer => "WRITER",
            EndpointType::Any => "ANY",
        }
    }
}

impl fmt::Display for EndpointType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Desired state of an endpoint.
///
/// `cluster_id` and `endpoint_id` are replace-only; changing them never produces
/// a modify call. A changed `endpoint_type` is applied in place through modify
/// rather than by replacing the endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EndpointSpec {
    pub cluster_id: String,
    pub endpoint_id: String,
    pub endpoint_type: EndpointType,
    #[serde(default)]
    pub static_members: BTreeSet<String>,
    #[serde(default)]
    pub excluded_members: BTreeSet<String>,
}

/// Mutable attributes that changed; `None` fields are left untouched remotely.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointDelta {
    pub endpoint_type: Option<EndpointType>,
    pub static_members: Option<BTreeSet<String>>,
    pub excluded_members: Option<BTreeSet<String>>,
}

impl EndpointDelta {
    pub fn between(prior: &EndpointSpec, desired: &EndpointSpec) -> Self {
        Self {
            endpoint_type: changed(&prior.endpoint_type, &desired.endpoint_type),
            static_members: changed(&prior.static_members, &desired.static_members),
            excluded_members: changed(&prior.excluded_members, &desired.excluded_members),
        }
    }
}

fn changed<T: Clone + PartialEq>(prior: &T, desired: &T) -> Option<T> {
    (prior != desired).then(|| desired.clone())
}

impl Delta for EndpointDelta {
    fn is_empty(&self) -> bool {
        self.endpoint_type.is_none()
            && self.static_members.is_none()
            && self.excluded_members.is_none()
    }
}

/// Endpoint as described by the remote control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterEndpoint {
    pub cluster_id: String,
    pub endpoint_id: String,
    pub endpoint_type: String,
    /// DNS name clients connect to.
    pub endpoint: Option<String>,
    pub status: Option<String>,
    pub static_members: BTreeSet<String>,
    pub excluded_members: BTreeSet<String>,
    pub arn: Option<String>,
}

/// Remote calls for cluster endpoints.
pub trait ClusterEndpointApi {
    fn create_endpoint(&self, spec: &EndpointSpec) -> Result<ClusterEndpoint, RemoteError>;

    fn modify_endpoint(&self, endpoint_id: &str, delta: &EndpointDelta) -> Result<(), RemoteError>;

    fn delete_endpoint(&self, endpoint_id: &str) -> Result<(), RemoteError>;

    /// Endpoints of `cluster_id` named `endpoint_id`.
    fn describe_endpoints(
        &self,
        cluster_id: &str,
        endpoint_id: &str,
    ) -> Result<Vec<ClusterEndpoint>, RemoteError>;
}

impl<T: ClusterEndpointApi + ?Sized> ClusterEndpointApi for &T {
    fn create_endpoint(&self, spec: &EndpointSpec) -> Result<ClusterEndpoint, RemoteError> {
        (**self).create_endpoint(spec)
    }

    fn modify_endpoint(&self, endpoint_id: &str, delta: &EndpointDelta) -> Result<(), RemoteError> {
        (**self).modify_endpoint(endpoint_id, delta)
    }

    fn delete_endpoint(&self, endpoint_id: &str) -> Result<(), RemoteError> {
        (**self).delete_endpoint(endpoint_id)
    }

    fn describe_endpoints(
        &self,
        cluster_id: &str,
        endpoint_id: &str,
    ) -> Result<Vec<ClusterEndpoint>, RemoteError> {
        (**self).describe_endpoints(cluster_id, endpoint_id)
    }
}

/// Cluster endpoints managed through a [`ClusterEndpointApi`] client.
#[derive(Debug)]
pub struct ClusterEndpoints<C> {
    client: C,
    absent: AbsentErrors,
    waits: LifecycleWaits,
}

impl<C: ClusterEndpointApi> ClusterEndpoints<C> {
    pub fn new(client: C) -> Self {
        Self::with_config(client, &ClusterEndpointConfig::default())
    }

    pub fn with_config(client: C, cfg: &ClusterEndpointConfig) -> Self {
        let available = WaitPlan::until_available(Duration::from_secs(cfg.available_timeout_secs));
        Self {
            client,
            absent: AbsentErrors {
                read: cfg.read_absent_codes.iter().cloned().collect(),
                delete: cfg.delete_absent_codes.iter().cloned().collect(),
            },
            waits: LifecycleWaits {
                create: Some(available.clone()),
                update: Some(available),
                delete: Some(WaitPlan::until_deleted(Duration::from_secs(
                    cfg.deleted_timeout_secs,
                ))),
            },
        }
    }
}

impl<C: ClusterEndpointApi> ManagedResource for ClusterEndpoints<C> {
    type Desired = EndpointSpec;
    type Delta = EndpointDelta;
    type Snapshot = ClusterEndpoint;

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

    fn diff(&self, prior: &EndpointSpec, desired: &EndpointSpec) -> EndpointDelta {
        EndpointDelta::between(prior, desired)
    }

    fn create(&self, desired: &EndpointSpec) -> Result<Vec<String>, RemoteError> {
        let created = self.client.create_endpoint(desired)?;
        Ok(vec![created.cluster_id, created.endpoint_id])
    }

    fn modify(&self, parts: &[String], delta: &EndpointDelta) -> Result<(), RemoteError> {
        self.client.modify_endpoint(endpoint_part(parts), delta)
    }

    fn delete(&self, parts: &[String]) -> Result<(), RemoteError> {
        self.client.delete_endpoint(endpoint_part(parts))
    }

    fn describe(&self, parts: &[String]) -> Result<Vec<ClusterEndpoint>, RemoteError> {
        let (cluster_id, endpoint_id) = match parts {
            [cluster_id, endpoint_id] => (cluster_id.as_str(), endpoint_id.as_str()),
            _ => return Ok(Vec::new()),
        };
        self.client.describe_endpoints(cluster_id, endpoint_id)
    }

    fn status(&self, snapshot: &ClusterEndpoint) -> String {
        snapshot.status.clone().unwrap_or_else(|| UNKNOWN.to_string())
    }
}

fn endpoint_part(parts: &[String]) -> &str {
    parts.get(1).map_or("", String::as_str)
}
