use serde::{Deserialize, Serialize};

use crate::judge::{CheckOutcome, Judgment};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Fail,
    /// The scenario could not be executed (e.g. an invalid `[resource]` spec).
    Error,
}

pub fn classify_outcome(judgment: Option<&Judgment>) -> Outcome {
    match judgment {
        Some(judgment) if judgment.checks.iter().all(CheckOutcome::passed) => Outcome::Success,
        Some(_) => Outcome::Fail,
        None => Outcome::Error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn judgment(pass: bool) -> Judgment {
        Judgment {
            checks: vec![CheckOutcome::DescribeCalls {
                expected: 3,
                actual: if pass { 3 } else { 4 },
                passed: pass,
            }],
        }
    }

    #[test]
    fn success_when_checks_pass() {
        assert_eq!(classify_outcome(Some(&judgment(true))), Outcome::Success);
    }

    #[test]
    fn fail_when_any_check_fails() {
        assert_eq!(classify_outcome(Some(&judgment(false))), Outcome::Fail);
    }

    #[test]
    fn error_when_scenario_did_not_run() {
        assert_eq!(classify_outcome(None), Outcome::Error);
    }
}
