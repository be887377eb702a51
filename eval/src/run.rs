//! Case execution orchestration.
//!
//! Coordinates configuration, scenario execution, checks, and result capture.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use converge::io::config::ConvergeConfig;
use rand::{Rng, distributions::Alphanumeric};
use tracing::{debug, info, instrument, warn};

use crate::case::CaseFile;
use crate::config::apply_case_config;
use crate::harness::run_scenario;
use crate::judge::{run_checks, write_judgment};
use crate::outcome::{Outcome, classify_outcome};
use crate::results::{CaptureInput, capture_results, update_outcome};

/// Result of running a single case.
#[derive(Debug)]
pub struct RunOutcome {
    /// Unique identifier for this eval run.
    pub eval_run_id: String,
    /// Path to the results directory.
    pub results_dir: PathBuf,
    /// Classified outcome.
    pub outcome: Outcome,
}

/// Run a case end-to-end: configuration, scenario, checks, result capture.
#[instrument(skip_all, fields(case_id = %case.case.id))]
pub fn run_case(results_base: &Path, case_path: &Path, case: &CaseFile) -> Result<RunOutcome> {
    info!("case run started");

    let cfg = apply_case_config(ConvergeConfig::default(), case.case.kind, &case.config)
        .context("apply case config")?;

    let started_at = Utc::now();
    let eval_run_id = eval_run_id();

    debug!("running scenario");
    let scenario = run_scenario(case, &cfg);
    let finished_at = Utc::now();

    let (transcript, error) = match scenario {
        Ok(transcript) => (Some(transcript), None),
        Err(err) => {
            warn!(error = %format!("{err:#}"), "scenario did not run");
            (None, Some(format!("{err:#}")))
        }
    };

    debug!("capturing results");
    let kind = case.case.kind.to_string();
    let capture_input = CaptureInput {
        case_id: &case.case.id,
        case_path,
        kind: &kind,
        eval_run_id: &eval_run_id,
        started_at,
        finished_at,
        transcript: transcript.as_ref(),
        error,
    };
    let results_dir =
        capture_results(results_base, &capture_input).context("capture results")?;

    let judgment = match &transcript {
        Some(transcript) => {
            debug!("running checks");
            let judgment = run_checks(&case.checks, transcript);
            write_judgment(&results_dir.join("checks.json"), &judgment)
                .context("write checks")?;
            Some(judgment)
        }
        None => None,
    };

    let outcome = classify_outcome(judgment.as_ref());
    update_outcome(&results_dir, outcome).context("update outcome")?;

    info!(outcome = ?outcome, results_dir = %results_dir.display(), "case run complete");

    Ok(RunOutcome {
        eval_run_id,
        results_dir,
        outcome,
    })
}

fn eval_run_id() -> String {
    format!("eval-{}-{}", Utc::now().format("%Y%m%d_%H%M%S"), short_id())
}

fn short_id() -> String {
    let mut rng = rand::thread_rng();
    std::iter::repeat_with(|| rng.sample(Alphanumeric))
        .map(char::from)
        .take(6)
        .collect::<String>()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::judge::Judgment;
    use tempfile::tempdir;

    const CASE: &str = r#"
[case]
id = "delete-already-gone"
kind = "cluster_endpoint"

[remote]
seed_status = "available"

[resource]
cluster_id = "db-1"
endpoint_id = "reader-1"
endpoint_type = "READER"

[[steps]]
op = "vanish"

[[steps]]
op = "delete"

[[checks]]
type = "step_outcome"
step = 2
expect = "already_gone"
"#;

    #[test]
    fn eval_run_id_format() {
        let id = eval_run_id();
        assert!(id.starts_with("eval-"));
        assert_eq!(id.rsplit('-').next().map(str::len), Some(6));
    }

    #[test]
    fn run_case_writes_results_and_classifies() {
        let temp = tempdir().expect("tempdir");
        let case_path = temp.path().join("delete-already-gone.toml");
        fs::write(&case_path, CASE).expect("write case");
        let case = CaseFile::load(&case_path).expect("load");

        let outcome = run_case(&temp.path().join("results"), &case_path, &case).expect("run");

        assert_eq!(outcome.outcome, Outcome::Success);
        let judgment: Judgment = serde_json::from_str(
            &fs::read_to_string(outcome.results_dir.join("checks.json")).expect("checks"),
        )
        .expect("parse checks");
        assert_eq!(judgment.checks.len(), 1);
        assert!(outcome.results_dir.join("transcript.json").exists());
    }

    #[test]
    fn shipped_cases_succeed() {
        let cases_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("cases");
        let cases = crate::case::discover_cases(&cases_dir).expect("discover");
        assert!(!cases.is_empty());

        let temp = tempdir().expect("tempdir");
        for case in &cases {
            let case_path = cases_dir.join(format!("{}.toml", case.case.id));
            let outcome = run_case(temp.path(), &case_path, case).expect("run");
            assert_eq!(outcome.outcome, Outcome::Success, "{}", case.case.id);
        }
    }

    #[test]
    fn invalid_resource_spec_is_an_error_outcome() {
        let temp = tempdir().expect("tempdir");
        let case_path = temp.path().join("bad.toml");
        let contents = CASE.replace("endpoint_type = \"READER\"", "endpoint_type = \"PRIMARY\"");
        fs::write(&case_path, &contents).expect("write case");
        let case = CaseFile::load(&case_path).expect("load");

        let outcome = run_case(temp.path(), &case_path, &case).expect("run");

        assert_eq!(outcome.outcome, Outcome::Error);
        assert!(!outcome.results_dir.join("checks.json").exists());
    }
}
