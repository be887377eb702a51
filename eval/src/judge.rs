//! Check execution and outcome recording.
//!
//! Judges a scenario transcript against the case's checks and records each
//! result with the observed values.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::case::{Check, StepResult};
use crate::harness::Transcript;

/// Collected check outcomes for a run.
#[derive(Debug, Serialize, Deserialize)]
pub struct Judgment {
    pub checks: Vec<CheckOutcome>,
}

/// Result of judging a single check.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CheckOutcome {
    StepOutcome {
        step: usize,
        expect: StepResult,
        actual: Option<StepResult>,
        polls: Option<u32>,
        failure: Option<String>,
        label: Option<String>,
        passed: bool,
    },
    DescribeCalls {
        expected: u32,
        actual: u32,
        passed: bool,
    },
    ElapsedSecs {
        expected: u64,
        actual_ms: u64,
        passed: bool,
    },
}

impl CheckOutcome {
    pub fn passed(&self) -> bool {
        match self {
            CheckOutcome::StepOutcome { passed, .. }
            | CheckOutcome::DescribeCalls { passed, .. }
            | CheckOutcome::ElapsedSecs { passed, .. } => *passed,
        }
    }

    /// Stable label used when aggregating pass rates across runs.
    pub fn label(&self) -> String {
        match self {
            CheckOutcome::StepOutcome { step, expect, .. } => {
                format!("step_outcome({step}={expect:?})")
            }
            CheckOutcome::DescribeCalls { expected, .. } => format!("describe_calls({expected})"),
            CheckOutcome::ElapsedSecs { expected, .. } => format!("elapsed_secs({expected})"),
        }
    }
}

/// Judge all checks against the transcript.
#[instrument(skip_all, fields(check_count = checks.len()))]
pub fn run_checks(checks: &[Check], transcript: &Transcript) -> Judgment {
    let mut outcomes = Vec::with_capacity(checks.len());
    for check in checks {
        let outcome = match check {
            Check::StepOutcome {
                step,
                expect,
                polls,
                failure,
                label,
            } => {
                let record = transcript.steps.get(step.saturating_sub(1));
                let actual = record.map(|record| record.result);
                let passed = record.is_some_and(|record| {
                    record.result == *expect
                        && polls.is_none_or(|polls| record.polls == Some(polls))
                        && failure
                            .as_deref()
                            .is_none_or(|failure| record.failure.as_deref() == Some(failure))
                        && label
                            .as_deref()
                            .is_none_or(|label| record.label.as_deref() == Some(label))
                });
                debug!(check = "step_outcome", step, ?expect, ?actual, passed, "check result");
                CheckOutcome::StepOutcome {
                    step: *step,
                    expect: *expect,
                    actual,
                    polls: record.and_then(|record| record.polls),
                    failure: record.and_then(|record| record.failure.clone()),
                    label: record.and_then(|record| record.label.clone()),
                    passed,
                }
            }
            Check::DescribeCalls { count } => {
                let actual = transcript.calls.describe;
                let passed = actual == *count;
                debug!(check = "describe_calls", expected = count, actual, passed, "check result");
                CheckOutcome::DescribeCalls {
                    expected: *count,
                    actual,
                    passed,
                }
            }
            Check::ElapsedSecs { secs } => {
                let passed = transcript.elapsed_ms == secs.saturating_mul(1000);
                debug!(
                    check = "elapsed_secs",
                    expected = secs,
                    actual_ms = transcript.elapsed_ms,
                    passed,
                    "check result"
                );
                CheckOutcome::ElapsedSecs {
                    expected: *secs,
                    actual_ms: transcript.elapsed_ms,
                    passed,
                }
            }
        };
        outcomes.push(outcome);
    }
    Judgment { checks: outcomes }
}

pub fn write_judgment(path: &Path, judgment: &Judgment) -> Result<()> {
    let contents = serde_json::to_string_pretty(judgment).context("serialize checks")?;
    fs::write(path, format!("{contents}\n"))
        .with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::StepRecord;
    use converge::sim::CallCounts;

    fn transcript() -> Transcript {
        Transcript {
            steps: vec![StepRecord {
                step: 1,
                op: "delete".to_string(),
                result: StepResult::Failed,
                polls: None,
                id: Some("db-1:reader-1".to_string()),
                failure: Some("timeout".to_string()),
                label: Some("deleting".to_string()),
                message: None,
            }],
            calls: CallCounts {
                describe: 20,
                ..CallCounts::default()
            },
            elapsed_ms: 600_000,
        }
    }

    #[test]
    fn step_outcome_matches_result_failure_and_label() {
        let checks = vec![
            Check::StepOutcome {
                step: 1,
                expect: StepResult::Failed,
                polls: None,
                failure: Some("timeout".to_string()),
                label: Some("deleting".to_string()),
            },
            Check::StepOutcome {
                step: 1,
                expect: StepResult::Failed,
                polls: None,
                failure: Some("unexpected_state".to_string()),
                label: None,
            },
        ];

        let judgment = run_checks(&checks, &transcript());

        assert!(judgment.checks[0].passed());
        assert!(!judgment.checks[1].passed());
    }

    #[test]
    fn counts_and_elapsed_compare_exactly() {
        let checks = vec![
            Check::DescribeCalls { count: 20 },
            Check::DescribeCalls { count: 21 },
            Check::ElapsedSecs { secs: 600 },
        ];

        let judgment = run_checks(&checks, &transcript());

        let passed: Vec<bool> = judgment.checks.iter().map(CheckOutcome::passed).collect();
        assert_eq!(passed, vec![true, false, true]);
    }

    #[test]
    fn missing_step_fails() {
        let checks = vec![Check::StepOutcome {
            step: 2,
            expect: StepResult::Deleted,
            polls: None,
            failure: None,
            label: None,
        }];

        let judgment = run_checks(&checks, &transcript());

        assert!(!judgment.checks[0].passed());
    }
}
