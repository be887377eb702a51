//! Concrete resource kinds managed through the [`Orchestrator`](crate::lifecycle::Orchestrator).

pub mod anomaly_monitor;
pub mod cluster_endpoint;

use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::core::id::IdLayout;

/// Resource kinds known to this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum ResourceKind {
    ClusterEndpoint,
    AnomalyMonitor,
}

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::ClusterEndpoint => cluster_endpoint::KIND,
            ResourceKind::AnomalyMonitor => anomaly_monitor::KIND,
        }
    }

    pub fn id_layout(self) -> IdLayout {
        match self {
            ResourceKind::ClusterEndpoint => cluster_endpoint::ID_LAYOUT,
            ResourceKind::AnomalyMonitor => anomaly_monitor::ID_LAYOUT,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
