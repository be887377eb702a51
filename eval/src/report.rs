use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::judge::Judgment;
use crate::outcome::Outcome;
use crate::results::EvalMeta;

#[derive(Debug, Default)]
pub struct ReportSummary {
    pub runs: usize,
    pub success: usize,
    pub fail: usize,
    pub error: usize,
    pub avg_duration_secs: Option<f64>,
    pub avg_virtual_secs: Option<f64>,
    pub check_pass_rates: BTreeMap<String, (usize, usize)>,
}

pub fn load_run_dirs(case_results_dir: &Path) -> Result<Vec<PathBuf>> {
    if !case_results_dir.exists() {
        return Ok(Vec::new());
    }
    let mut dirs = Vec::new();
    for entry in fs::read_dir(case_results_dir)
        .with_context(|| format!("read {}", case_results_dir.display()))?
    {
        let entry = entry.context("read entry")?;
        if entry.path().is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

pub fn aggregate(case_results_dir: &Path) -> Result<(ReportSummary, Vec<String>)> {
    let mut summary = ReportSummary::default();
    let mut warnings = Vec::new();
    let mut virtual_runs = 0usize;

    for run_dir in load_run_dirs(case_results_dir)? {
        let meta_path = run_dir.join("meta.json");
        let checks_path = run_dir.join("checks.json");

        let meta: EvalMeta = match fs::read_to_string(&meta_path)
            .with_context(|| format!("read {}", meta_path.display()))
            .and_then(|contents| serde_json::from_str(&contents).context("parse meta"))
        {
            Ok(meta) => meta,
            Err(err) => {
                warnings.push(format!(
                    "skip {}: meta.json invalid ({err})",
                    run_dir.display()
                ));
                continue;
            }
        };

        // Errored runs have no checks.json.
        let judgment: Option<Judgment> = if meta.outcome == Some(Outcome::Error) {
            None
        } else {
            match fs::read_to_string(&checks_path)
                .with_context(|| format!("read {}", checks_path.display()))
                .and_then(|contents| serde_json::from_str(&contents).context("parse checks"))
            {
                Ok(checks) => Some(checks),
                Err(err) => {
                    warnings.push(format!(
                        "skip {}: checks.json invalid ({err})",
                        run_dir.display()
                    ));
                    continue;
                }
            }
        };

        summary.runs += 1;
        match meta.outcome {
            Some(Outcome::Success) => summary.success += 1,
            Some(Outcome::Fail) => summary.fail += 1,
            Some(Outcome::Error) | None => summary.error += 1,
        }

        summary.avg_duration_secs = Some(running_mean(
            summary.avg_duration_secs,
            summary.runs,
            meta.duration_secs,
        ));
        if let Some(secs) = meta.virtual_elapsed_secs {
            virtual_runs += 1;
            summary.avg_virtual_secs =
                Some(running_mean(summary.avg_virtual_secs, virtual_runs, secs));
        }

        if let Some(judgment) = &judgment {
            update_check_pass_rates(&mut summary.check_pass_rates, judgment);
        }
    }

    Ok((summary, warnings))
}

fn running_mean(avg: Option<f64>, count: usize, value: f64) -> f64 {
    match avg {
        None => value,
        Some(avg) => (avg * (count as f64 - 1.0) + value) / count as f64,
    }
}

fn update_check_pass_rates(stats: &mut BTreeMap<String, (usize, usize)>, judgment: &Judgment) {
    for check in &judgment.checks {
        let entry = stats.entry(check.label()).or_insert((0, 0));
        if check.passed() {
            entry.0 += 1;
        }
        entry.1 += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::judge::CheckOutcome;
    use tempfile::tempdir;

    fn write_meta(path: &Path, outcome: Outcome, duration: f64, virtual_secs: Option<f64>) {
        let meta = EvalMeta {
            case_id: "case".to_string(),
            eval_run_id: "run".to_string(),
            case_hash: "hash".to_string(),
            kind: "cluster_endpoint".to_string(),
            outcome: Some(outcome),
            start_time: "now".to_string(),
            end_time: "later".to_string(),
            duration_secs: duration,
            virtual_elapsed_secs: virtual_secs,
            errors: Vec::new(),
        };
        let contents = serde_json::to_string_pretty(&meta).expect("meta json");
        fs::write(path, format!("{contents}\n")).expect("write meta");
    }

    fn write_checks(path: &Path, passed: bool) {
        let judgment = Judgment {
            checks: vec![CheckOutcome::DescribeCalls {
                expected: 4,
                actual: if passed { 4 } else { 5 },
                passed,
            }],
        };
        let contents = serde_json::to_string_pretty(&judgment).expect("checks json");
        fs::write(path, format!("{contents}\n")).expect("write checks");
    }

    #[test]
    fn aggregates_runs() {
        let temp = tempdir().expect("tempdir");
        let run1 = temp.path().join("run1");
        let run2 = temp.path().join("run2");
        let run3 = temp.path().join("run3");
        for dir in [&run1, &run2, &run3] {
            fs::create_dir_all(dir).expect("run dir");
        }

        write_meta(&run1.join("meta.json"), Outcome::Success, 0.5, Some(600.0));
        write_checks(&run1.join("checks.json"), true);

        write_meta(&run2.join("meta.json"), Outcome::Fail, 1.5, Some(0.0));
        write_checks(&run2.join("checks.json"), false);

        write_meta(&run3.join("meta.json"), Outcome::Error, 1.0, None);

        let (summary, warnings) = aggregate(temp.path()).expect("aggregate");
        assert!(warnings.is_empty());
        assert_eq!(summary.runs, 3);
        assert_eq!(summary.success, 1);
        assert_eq!(summary.fail, 1);
        assert_eq!(summary.error, 1);
        assert_eq!(summary.avg_duration_secs, Some(1.0));
        assert_eq!(summary.avg_virtual_secs, Some(300.0));
        assert_eq!(
            summary.check_pass_rates.get("describe_calls(4)"),
            Some(&(1, 2))
        );
    }

    #[test]
    fn skips_runs_with_missing_checks() {
        let temp = tempdir().expect("tempdir");
        let run = temp.path().join("run1");
        fs::create_dir_all(&run).expect("run dir");
        write_meta(&run.join("meta.json"), Outcome::Success, 0.1, Some(1.0));

        let (summary, warnings) = aggregate(temp.path()).expect("aggregate");

        assert_eq!(summary.runs, 0);
        assert_eq!(warnings.len(), 1);
    }
}
