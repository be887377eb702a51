//! Case file parsing and validation.
//!
//! Cases are TOML files scripting a simulated control plane, a sequence of
//! lifecycle steps and the checks judged afterwards. See `eval/cases/` for
//! examples.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};

use converge::error::RemoteCall;
use converge::resources::ResourceKind;
use converge::sim::Behavior;

/// A parsed case file.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct CaseFile {
    pub case: CaseMeta,
    #[serde(default)]
    pub config: CaseConfig,
    #[serde(default)]
    pub remote: RemoteScript,
    /// Desired spec of the resource, in the kind's own shape.
    pub resource: toml::Table,
    pub steps: Vec<Step>,
    pub checks: Vec<Check>,
}

/// Case metadata.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct CaseMeta {
    /// Unique identifier (slug format: `[a-z0-9_-]+`).
    pub id: String,
    pub kind: ResourceKind,
    #[serde(default)]
    pub description: String,
}

/// Overrides applied onto the default `converge.toml` settings.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CaseConfig {
    pub initial_interval_ms: Option<u64>,
    pub max_interval_ms: Option<u64>,
    pub fixed_interval_ms: Option<u64>,
    pub delay_ms: Option<u64>,
    pub not_found_checks: Option<u32>,
    pub continuous_target_occurrence: Option<u32>,
    pub available_timeout_secs: Option<u64>,
    pub deleted_timeout_secs: Option<u64>,
    pub read_absent_codes: Option<Vec<String>>,
    pub delete_absent_codes: Option<Vec<String>>,
}

/// How the simulated control plane behaves.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct RemoteScript {
    /// Clusters that exist before the first step.
    pub clusters: Vec<String>,
    pub behavior: Behavior,
    /// Status of a pre-existing object matching `[resource]`; absent when unset.
    pub seed_status: Option<String>,
    pub faults: Vec<Fault>,
}

/// Remote error injected on the Nth call of one kind.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Fault {
    pub call: CallName,
    pub nth: u32,
    pub code: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CallName {
    Create,
    Modify,
    Delete,
    Describe,
}

impl From<CallName> for RemoteCall {
    fn from(call: CallName) -> Self {
        match call {
            CallName::Create => RemoteCall::Create,
            CallName::Modify => RemoteCall::Modify,
            CallName::Delete => RemoteCall::Delete,
            CallName::Describe => RemoteCall::Describe,
        }
    }
}

/// One lifecycle step.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    Create,
    Read,
    /// Change desired attributes by merging `set` into the current spec.
    Update { set: toml::Table },
    Delete,
    /// Remove the object out-of-band, behind the orchestrator's back.
    Vanish,
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Step::Create => "create",
            Step::Read => "read",
            Step::Update { .. } => "update",
            Step::Delete => "delete",
            Step::Vanish => "vanish",
        }
    }
}

/// What a step ended with.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepResult {
    Converged,
    Present,
    Absent,
    AlreadyGone,
    Deleted,
    Removed,
    Failed,
}

/// Verification judged against the transcript.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Check {
    /// Step `step` (1-based) ended with `expect`.
    StepOutcome {
        step: usize,
        expect: StepResult,
        polls: Option<u32>,
        /// Failure class, e.g. `timeout` or `unexpected_state`.
        failure: Option<String>,
        /// Last observed label carried by a failure.
        label: Option<String>,
    },
    /// Total describe calls served by the control plane.
    DescribeCalls { count: u32 },
    /// Virtual time elapsed across all steps.
    ElapsedSecs { secs: u64 },
}

impl CaseFile {
    /// Load and validate a case file from the given path.
    pub fn load(path: &Path) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("read case {}", path.display()))?;
        let case: CaseFile =
            toml::from_str(&contents).with_context(|| format!("parse case {}", path.display()))?;
        case.validate()
            .with_context(|| format!("validate case {}", path.display()))?;
        Ok(case)
    }

    #[cfg(test)]
    pub fn parse_str(contents: &str) -> Result<Self> {
        let case: CaseFile = toml::from_str(contents).context("parse case")?;
        case.validate()?;
        Ok(case)
    }

    fn validate(&self) -> Result<()> {
        validate_case_id(&self.case.id)?;
        if self.steps.is_empty() {
            bail!("steps must be a non-empty array");
        }
        if self.checks.is_empty() {
            bail!("checks must be a non-empty array");
        }
        for (index, fault) in self.remote.faults.iter().enumerate() {
            if fault.nth == 0 {
                bail!("remote.faults[{index}].nth must be >= 1");
            }
        }
        for (index, check) in self.checks.iter().enumerate() {
            check
                .validate(self.steps.len())
                .with_context(|| format!("checks[{}] invalid", index))?;
        }
        Ok(())
    }
}

impl Check {
    fn validate(&self, steps: usize) -> Result<()> {
        if let Check::StepOutcome { step, .. } = self
            && (*step == 0 || *step > steps)
        {
            bail!("step_outcome.step must be within 1..={steps}");
        }
        Ok(())
    }
}

/// Discover and load all case files from a directory.
///
/// Returns cases sorted by id. Errors if duplicate ids are found.
pub fn discover_cases(dir: &Path) -> Result<Vec<CaseFile>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut cases = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("read cases dir {}", dir.display()))? {
        let entry = entry.context("read case entry")?;
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("toml") {
            continue;
        }
        cases.push(CaseFile::load(&path)?);
    }
    cases.sort_by(|left, right| left.case.id.cmp(&right.case.id));
    for pair in cases.windows(2) {
        if pair[0].case.id == pair[1].case.id {
            return Err(anyhow!("duplicate case.id {}", pair[0].case.id));
        }
    }
    Ok(cases)
}

fn validate_case_id(id: &str) -> Result<()> {
    if id.trim().is_empty() {
        bail!("case.id must be non-empty");
    }
    if id.contains('/') || id.contains('\\') {
        bail!("case.id must not contain path separators");
    }
    if id.contains("..") {
        bail!("case.id must not contain '..'");
    }
    if !id
        .chars()
        .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-' || ch == '_')
    {
        bail!("case.id must use [a-z0-9_-] only");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_case() {
        let input = r#"
[case]
id = "endpoint-delete-stuck"
kind = "cluster_endpoint"

[config]
fixed_interval_ms = 30000

[remote]
seed_status = "available"

[remote.behavior.delete]
statuses = ["deleting"]
then = "hold"

[[remote.faults]]
call = "describe"
nth = 3
code = "Throttling"
message = "rate exceeded"

[resource]
cluster_id = "db-1"
endpoint_id = "reader-1"
endpoint_type = "READER"

[[steps]]
op = "update"
set = { endpoint_type = "ANY" }

[[steps]]
op = "delete"

[[checks]]
type = "step_outcome"
step = 2
expect = "failed"
failure = "timeout"
label = "deleting"

[[checks]]
type = "describe_calls"
count = 20
"#;
        let case = CaseFile::parse_str(input).expect("case parses");
        assert_eq!(case.case.kind, ResourceKind::ClusterEndpoint);
        assert_eq!(case.steps.len(), 2);
        assert_eq!(case.remote.behavior.delete.statuses, vec!["deleting"]);
        assert_eq!(case.remote.faults[0].call, CallName::Describe);
        assert!(matches!(
            case.steps[0],
            Step::Update { ref set } if set.contains_key("endpoint_type")
        ));
    }

    #[test]
    fn rejects_invalid_id() {
        let input = r#"
[case]
id = "bad/id"
kind = "anomaly_monitor"

[resource]
name = "spend"

[[steps]]
op = "create"

[[checks]]
type = "describe_calls"
count = 1
"#;
        let err = CaseFile::parse_str(input).expect_err("invalid id");
        assert!(err.to_string().contains("case.id"));
    }

    #[test]
    fn rejects_check_on_missing_step() {
        let input = r#"
[case]
id = "monitor-create"
kind = "anomaly_monitor"

[resource]
name = "spend"

[[steps]]
op = "create"

[[checks]]
type = "step_outcome"
step = 2
expect = "converged"
"#;
        let err = CaseFile::parse_str(input).expect_err("invalid check");
        assert!(format!("{err:#}").contains("step_outcome.step"));
    }
}
