//! External identifier codec.
//!
//! A remote object is tracked locally by one string composed of the remote key
//! parts that address it. Each resource kind declares an [`IdLayout`] naming its
//! parts in order; `decode(encode(parts)) == parts` for every well-formed input.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifier string did not decode to the layout's arity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unexpected format for ID ({id}), expected {expected}")]
pub struct MalformedIdentifier {
    pub id: String,
    /// Human-readable template, e.g. `CLUSTER-ID:CLUSTER-ENDPOINT-ID`.
    pub expected: String,
}

/// Locally persisted identifier of a remote object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExternalId(String);

impl ExternalId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExternalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ExternalId {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

impl From<&str> for ExternalId {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

/// Ordered list of remote key parts and the separator joining them.
///
/// A single-part layout never splits: the whole identifier is the part, so
/// values such as ARNs may contain the separator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdLayout {
    pub separator: &'static str,
    pub parts: &'static [&'static str],
}

impl IdLayout {
    pub const fn new(separator: &'static str, parts: &'static [&'static str]) -> Self {
        Self { separator, parts }
    }

    pub fn arity(&self) -> usize {
        self.parts.len()
    }

    /// Render the expected shape, e.g. `CLUSTER-ID:CLUSTER-ENDPOINT-ID`.
    pub fn template(&self) -> String {
        self.parts.join(self.separator)
    }

    /// Join `parts` with the separator.
    ///
    /// Precondition: no part contains the separator. This is not checked here;
    /// an identifier built from such parts fails to decode.
    pub fn encode<S: AsRef<str>>(&self, parts: &[S]) -> ExternalId {
        let joined = parts
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<_>>()
            .join(self.separator);
        ExternalId(joined)
    }

    /// Split `id` into exactly [`arity`](Self::arity) non-empty parts.
    pub fn decode(&self, id: &ExternalId) -> Result<Vec<String>, MalformedIdentifier> {
        let raw = id.as_str();
        let parts: Vec<String> = if self.arity() == 1 {
            vec![raw.to_string()]
        } else {
            raw.split(self.separator).map(str::to_string).collect()
        };

        if parts.len() == self.arity() && parts.iter().all(|part| !part.is_empty()) {
            return Ok(parts);
        }
        Err(self.malformed(raw))
    }

    /// Like [`decode`](Self::decode), returning a fixed-size array.
    pub fn decode_array<const N: usize>(
        &self,
        id: &ExternalId,
    ) -> Result<[String; N], MalformedIdentifier> {
        let parts = self.decode(id)?;
        parts.try_into().map_err(|_| self.malformed(id.as_str()))
    }

    fn malformed(&self, raw: &str) -> MalformedIdentifier {
        MalformedIdentifier {
            id: raw.to_string(),
            expected: self.template(),
        }
    }
}
