//! Error taxonomy surfaced to callers of the lifecycle orchestrator.
//!
//! Display strings follow the `std::error::Error` convention of not repeating
//! the source; render a full chain with `{:#}` through `anyhow`.

use std::fmt;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use crate::core::id::{ExternalId, MalformedIdentifier};

/// Opaque failure reported by the remote control plane.
///
/// `code` is the machine-readable error code when the remote supplies one; it
/// is what absent-error tables match against.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", render_remote(.code.as_deref(), .message))]
pub struct RemoteError {
    pub code: Option<String>,
    pub message: String,
}

impl RemoteError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: message.into(),
        }
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }
}

fn render_remote(code: Option<&str>, message: &str) -> String {
    match code {
        Some(code) => format!("{code}: {message}"),
        None => message.to_string(),
    }
}

/// Lifecycle operation being attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Create => "create",
            Operation::Read => "read",
            Operation::Update => "update",
            Operation::Delete => "delete",
        })
    }
}

/// Remote control-plane call that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteCall {
    Create,
    Modify,
    Delete,
    Describe,
}

impl fmt::Display for RemoteCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RemoteCall::Create => "create",
            RemoteCall::Modify => "modify",
            RemoteCall::Delete => "delete",
            RemoteCall::Describe => "describe",
        })
    }
}

/// Classified cause of a failed lifecycle operation.
#[derive(Debug, Error)]
pub enum Failure {
    #[error(transparent)]
    MalformedIdentifier(#[from] MalformedIdentifier),

    #[error("remote {call} call failed")]
    Remote {
        call: RemoteCall,
        #[source]
        source: RemoteError,
    },

    #[error("unexpected state '{label}'")]
    UnexpectedState {
        label: String,
        snapshot: Option<Value>,
    },

    #[error(
        "timeout after {timeout:?} ({attempts} refreshes), last state '{}'",
        .last_label.as_deref().unwrap_or("absent")
    )]
    Timeout {
        last_label: Option<String>,
        last_snapshot: Option<Value>,
        timeout: Duration,
        attempts: u32,
    },

    #[error("object still not found after {checks} checks")]
    NotFoundExhausted { checks: u32 },

    #[error("wait cancelled after {attempts} refreshes")]
    Cancelled { attempts: u32 },

    #[error("object not found when reading back")]
    Vanished,

    #[error("invalid wait request: {0}")]
    InvalidWait(String),
}

/// A lifecycle operation failed.
///
/// Carries the resource kind, the operation and the identifier so an operator
/// can inspect the remote object by hand. `id` is `None` only when the remote
/// create call itself failed.
#[derive(Debug, Error)]
#[error("{operation} {kind} ({}) failed", display_id(.id.as_ref()))]
pub struct LifecycleError {
    pub kind: &'static str,
    pub operation: Operation,
    pub id: Option<ExternalId>,
    #[source]
    pub failure: Failure,
}

impl LifecycleError {
    /// Identifier the caller must keep tracking, if the object may exist.
    ///
    /// A create whose wait failed still returns the identifier so a later read or
    /// delete can target the partially created object.
    pub fn tracked_id(&self) -> Option<&ExternalId> {
        self.id.as_ref()
    }
}

fn display_id(id: Option<&ExternalId>) -> String {
    match id {
        Some(id) => id.to_string(),
        None => "no id".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_error_display_includes_code() {
        let err = RemoteError::with_code("DBClusterNotFoundFault", "cluster db-1 not found");
        assert_eq!(err.to_string(), "DBClusterNotFoundFault: cluster db-1 not found");
        assert_eq!(RemoteError::new("throttled").to_string(), "throttled");
    }

    #[test]
    fn lifecycle_error_names_operation_kind_and_id() {
        let err = LifecycleError {
            kind: "cluster_endpoint",
            operation: Operation::Delete,
            id: Some(ExternalId::from("db-1:reader-1")),
            failure: Failure::Timeout {
                last_label: Some("deleting".to_string()),
                last_snapshot: None,
                timeout: Duration::from_secs(600),
                attempts: 66,
            },
        };
        assert_eq!(
            err.to_string(),
            "delete cluster_endpoint (db-1:reader-1) failed"
        );
        let chain = format!("{:#}", anyhow::Error::from(err));
        assert!(chain.contains("last state 'deleting'"), "{chain}");
    }

    #[test]
    fn chain_includes_remote_cause() {
        let err = LifecycleError {
            kind: "cluster_endpoint",
            operation: Operation::Create,
            id: None,
            failure: Failure::Remote {
                call: RemoteCall::Create,
                source: RemoteError::with_code("InvalidParameter", "bad endpoint type"),
            },
        };
        let chain = format!("{:#}", anyhow::Error::from(err));
        assert_eq!(
            chain,
            "create cluster_endpoint (no id) failed: remote create call failed: InvalidParameter: bad endpoint type"
        );
    }
}
