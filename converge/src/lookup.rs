//! Single-query lookup of a remote object by identifier.
//!
//! Absence is an outcome (`Ok(None)`), never an error. Which remote error codes
//! mean "absent" is an explicit per-resource, per-operation table.

use std::collections::BTreeSet;

use thiserror::Error;
use tracing::debug;

use crate::core::id::{ExternalId, MalformedIdentifier};
use crate::error::RemoteError;
use crate::lifecycle::ManagedResource;

/// Operation consulting the absent-error table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbsentScope {
    Read,
    Delete,
}

/// Remote error codes that mean "object absent", keyed by operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AbsentErrors {
    pub read: BTreeSet<String>,
    pub delete: BTreeSet<String>,
}

impl AbsentErrors {
    /// Same codes for both scopes.
    pub fn uniform<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let read: BTreeSet<String> = codes.into_iter().map(Into::into).collect();
        Self {
            delete: read.clone(),
            read,
        }
    }

    pub fn is_absent(&self, scope: AbsentScope, err: &RemoteError) -> bool {
        let codes = match scope {
            AbsentScope::Read => &self.read,
            AbsentScope::Delete => &self.delete,
        };
        err.code().is_some_and(|code| codes.contains(code))
    }
}

#[derive(Debug, Error)]
pub enum LookupError {
    #[error(transparent)]
    Malformed(#[from] MalformedIdentifier),

    #[error("describe {kind} ({id}) failed")]
    Remote {
        kind: &'static str,
        id: ExternalId,
        #[source]
        source: RemoteError,
    },
}

/// Fetch the current snapshot for `id`, or `None` when the object is absent.
///
/// Decodes the identifier first; a malformed identifier never reaches the
/// remote side.
pub fn find<R>(resource: &R, id: &ExternalId) -> Result<Option<R::Snapshot>, LookupError>
where
    R: ManagedResource + ?Sized,
{
    let parts = resource.id_layout().decode(id)?;
    find_by_parts(resource, &parts).map_err(|source| LookupError::Remote {
        kind: resource.kind(),
        id: id.clone(),
        source,
    })
}

/// Like [`find`] for already-decoded key parts.
pub fn find_by_parts<R>(resource: &R, parts: &[String]) -> Result<Option<R::Snapshot>, RemoteError>
where
    R: ManagedResource + ?Sized,
{
    match resource.describe(parts) {
        Ok(records) => {
            let found = records.into_iter().next();
            if found.is_none() {
                debug!(kind = resource.kind(), "describe matched no records");
            }
            Ok(found)
        }
        Err(err) if resource.absent_errors().is_absent(AbsentScope::Read, &err) => {
            debug!(kind = resource.kind(), err = %err, "describe reported absent");
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeResource;

    #[test]
    fn absent_codes_are_scoped_per_operation() {
        let table = AbsentErrors {
            read: ["NotFound".to_string()].into(),
            delete: ["Gone".to_string()].into(),
        };
        let not_found = RemoteError::with_code("NotFound", "missing");
        let gone = RemoteError::with_code("Gone", "already deleted");

        assert!(table.is_absent(AbsentScope::Read, &not_found));
        assert!(!table.is_absent(AbsentScope::Delete, &not_found));
        assert!(table.is_absent(AbsentScope::Delete, &gone));
        assert!(!table.is_absent(AbsentScope::Read, &gone));
    }

    #[test]
    fn find_decodes_before_describing() {
        let resource = FakeResource::new(["available"]);

        let err = find(&resource, &ExternalId::from("no-separator")).expect_err("malformed");

        assert!(matches!(err, LookupError::Malformed(_)));
        assert_eq!(resource.describe_calls(), 0);
    }

    #[test]
    fn find_returns_snapshot_or_none() {
        let resource = FakeResource::new(["available"]);
        let id = ExternalId::from("db-1:ep-1");

        assert_eq!(
            find(&resource, &id).expect("find"),
            Some("available".to_string())
        );
        resource.delete(&[]).expect("delete");
        assert_eq!(find(&resource, &id).expect("find"), None);
    }

    #[test]
    fn empty_describe_is_absent() {
        let resource = FakeResource::new(Vec::<String>::new());
        assert_eq!(
            find_by_parts(&resource, &["db-1".to_string(), "ep-1".to_string()]).expect("find"),
            None
        );
    }

    #[test]
    fn errors_without_code_are_never_absent() {
        let table = AbsentErrors::uniform(["NotFound"]);
        assert!(!table.is_absent(AbsentScope::Read, &RemoteError::new("NotFound")));
    }
}
