//! Result capture and persistence.
//!
//! Writes the scenario transcript and run metadata to the results directory
//! for later analysis.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument, warn};

use crate::harness::Transcript;
use crate::outcome::Outcome;

/// Input for capturing results from a completed run.
#[derive(Debug)]
pub struct CaptureInput<'a> {
    pub case_id: &'a str,
    pub case_path: &'a Path,
    pub kind: &'a str,
    pub eval_run_id: &'a str,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// `None` when the scenario failed to execute.
    pub transcript: Option<&'a Transcript>,
    /// Why the scenario failed to execute.
    pub error: Option<String>,
}

/// Metadata for an eval run, persisted to `meta.json`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EvalMeta {
    pub case_id: String,
    pub eval_run_id: String,
    /// SHA-256 hash of the case file for reproducibility tracking.
    pub case_hash: String,
    pub kind: String,
    pub outcome: Option<Outcome>,
    pub start_time: String,
    pub end_time: String,
    /// Wall-clock duration of the run.
    pub duration_secs: f64,
    /// Virtual time the waits slept.
    pub virtual_elapsed_secs: Option<f64>,
    /// Non-fatal errors encountered during capture, plus any execution error.
    pub errors: Vec<String>,
}

/// Capture results from a completed run to the results directory.
#[instrument(skip_all, fields(case_id = %input.case_id, eval_run_id = %input.eval_run_id))]
pub fn capture_results(base_dir: &Path, input: &CaptureInput<'_>) -> Result<PathBuf> {
    let results_dir = results_dir(base_dir, input.case_id, input.eval_run_id);
    fs::create_dir_all(&results_dir)
        .with_context(|| format!("create results dir {}", results_dir.display()))?;

    let mut errors = Vec::new();

    let case_hash = match file_sha256(input.case_path) {
        Ok(hash) => hash,
        Err(err) => {
            errors.push(format!("case hash: {err}"));
            String::new()
        }
    };

    if let Some(transcript) = input.transcript {
        write_json(&results_dir.join("transcript.json"), transcript)?;
    }
    if let Some(error) = &input.error {
        errors.push(format!("scenario: {error}"));
    }
    if !errors.is_empty() {
        warn!(errors = ?errors, "capture had errors");
    }

    let duration = input.finished_at - input.started_at;
    let meta = EvalMeta {
        case_id: input.case_id.to_string(),
        eval_run_id: input.eval_run_id.to_string(),
        case_hash,
        kind: input.kind.to_string(),
        outcome: None,
        start_time: input.started_at.to_rfc3339(),
        end_time: input.finished_at.to_rfc3339(),
        duration_secs: duration.num_milliseconds() as f64 / 1000.0,
        virtual_elapsed_secs: input
            .transcript
            .map(|transcript| transcript.elapsed_ms as f64 / 1000.0),
        errors,
    };

    write_json(&results_dir.join("meta.json"), &meta)?;
    debug!(results_dir = %results_dir.display(), "results captured");
    Ok(results_dir)
}

pub fn update_outcome(results_dir: &Path, outcome: Outcome) -> Result<()> {
    let meta_path = results_dir.join("meta.json");
    let mut meta: EvalMeta = serde_json::from_str(
        &fs::read_to_string(&meta_path).with_context(|| format!("read {}", meta_path.display()))?,
    )
    .context("parse meta")?;
    meta.outcome = Some(outcome);
    write_json(&meta_path, &meta)?;
    Ok(())
}

pub fn results_dir(base_dir: &Path, case_id: &str, eval_run_id: &str) -> PathBuf {
    base_dir.join(case_id).join(eval_run_id)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let contents = serde_json::to_string_pretty(value).context("serialize json")?;
    fs::write(path, format!("{contents}\n"))
        .with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

fn file_sha256(path: &Path) -> Result<String> {
    let contents = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let mut hasher = Sha256::new();
    hasher.update(contents);
    let digest = hasher.finalize();
    Ok(hex::encode(digest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use converge::sim::CallCounts;
    use tempfile::tempdir;

    #[test]
    fn results_dir_is_stable() {
        let base = Path::new("/tmp/results");
        let dir = results_dir(base, "case", "run-1");
        assert_eq!(dir, PathBuf::from("/tmp/results/case/run-1"));
    }

    #[test]
    fn writes_meta_and_transcript() {
        let temp = tempdir().expect("tempdir");
        let case_path = temp.path().join("case.toml");
        fs::write(&case_path, "[case]\nid='case'\n").expect("case");
        let transcript = Transcript {
            steps: Vec::new(),
            calls: CallCounts::default(),
            elapsed_ms: 1_500,
        };
        let input = CaptureInput {
            case_id: "case",
            case_path: &case_path,
            kind: "cluster_endpoint",
            eval_run_id: "eval-1",
            started_at: Utc::now(),
            finished_at: Utc::now(),
            transcript: Some(&transcript),
            error: None,
        };

        let output_dir = capture_results(&temp.path().join("results"), &input).expect("capture");
        update_outcome(&output_dir, Outcome::Success).expect("outcome");

        assert!(output_dir.join("transcript.json").exists());
        let meta: EvalMeta = serde_json::from_str(
            &fs::read_to_string(output_dir.join("meta.json")).expect("read meta"),
        )
        .expect("parse meta");
        assert_eq!(meta.case_hash.len(), 64);
        assert_eq!(meta.outcome, Some(Outcome::Success));
        assert_eq!(meta.virtual_elapsed_secs, Some(1.5));
        assert!(meta.errors.is_empty());
    }

    #[test]
    fn missing_case_file_is_recorded_not_fatal() {
        let temp = tempdir().expect("tempdir");
        let input = CaptureInput {
            case_id: "case",
            case_path: &temp.path().join("missing.toml"),
            kind: "anomaly_monitor",
            eval_run_id: "eval-2",
            started_at: Utc::now(),
            finished_at: Utc::now(),
            transcript: None,
            error: Some("parse [resource] spec".to_string()),
        };

        let output_dir = capture_results(temp.path(), &input).expect("capture");
        let meta: EvalMeta = serde_json::from_str(
            &fs::read_to_string(output_dir.join("meta.json")).expect("read meta"),
        )
        .expect("parse meta");

        assert!(meta.case_hash.is_empty());
        assert_eq!(meta.errors.len(), 2);
        assert!(!output_dir.join("transcript.json").exists());
    }
}
