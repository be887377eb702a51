//! Convergence configuration stored in `converge.toml`.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::schedule::PollSchedule;
use crate::resources::anomaly_monitor::UNKNOWN_MONITOR;
use crate::resources::cluster_endpoint::{
    AVAILABLE_TIMEOUT, CLUSTER_NOT_FOUND, DELETED_TIMEOUT, ENDPOINT_NOT_FOUND,
};
use crate::wait::PollPolicy;

/// Default config file name, relative to the working directory.
pub const DEFAULT_PATH: &str = "converge.toml";

/// Convergence configuration (TOML).
///
/// Edited by humans; every field defaults so a partial file is valid.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ConvergeConfig {
    pub poll: PollConfig,
    pub resources: ResourcesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PollConfig {
    /// First sleep of the capped-exponential schedule.
    pub initial_interval_ms: u64,
    pub max_interval_ms: u64,
    /// When > 0, sleep this long between every refresh instead.
    pub fixed_interval_ms: u64,
    /// Floor applied to every sleep.
    pub min_interval_ms: u64,
    /// Sleep before the first refresh.
    pub delay_ms: u64,
    /// Longest sleep slice between cancellation checks.
    pub cancel_check_ms: u64,
    pub not_found_checks: u32,
    pub continuous_target_occurrence: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_interval_ms: 100,
            max_interval_ms: 10_000,
            fixed_interval_ms: 0,
            min_interval_ms: 0,
            delay_ms: 0,
            cancel_check_ms: 250,
            not_found_checks: 20,
            continuous_target_occurrence: 1,
        }
    }
}

impl PollConfig {
    pub fn policy(&self) -> PollPolicy {
        PollPolicy {
            schedule: PollSchedule {
                initial: Duration::from_millis(self.initial_interval_ms),
                max: Duration::from_millis(self.max_interval_ms),
                fixed: (self.fixed_interval_ms > 0)
                    .then(|| Duration::from_millis(self.fixed_interval_ms)),
                min: Duration::from_millis(self.min_interval_ms),
            },
            delay: Duration::from_millis(self.delay_ms),
            cancel_check: Duration::from_millis(self.cancel_check_ms),
            not_found_checks: self.not_found_checks,
            continuous_target_occurrence: self.continuous_target_occurrence,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ResourcesConfig {
    pub cluster_endpoint: ClusterEndpointConfig,
    pub anomaly_monitor: AnomalyMonitorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ClusterEndpointConfig {
    pub available_timeout_secs: u64,
    pub deleted_timeout_secs: u64,
    /// Describe error codes meaning "absent".
    pub read_absent_codes: Vec<String>,
    /// Delete error codes meaning "already gone".
    pub delete_absent_codes: Vec<String>,
}

impl Default for ClusterEndpointConfig {
    fn default() -> Self {
        let codes = vec![ENDPOINT_NOT_FOUND.to_string(), CLUSTER_NOT_FOUND.to_string()];
        Self {
            available_timeout_secs: AVAILABLE_TIMEOUT.as_secs(),
            deleted_timeout_secs: DELETED_TIMEOUT.as_secs(),
            read_absent_codes: codes.clone(),
            delete_absent_codes: codes,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AnomalyMonitorConfig {
    pub read_absent_codes: Vec<String>,
    pub delete_absent_codes: Vec<String>,
}

impl Default for AnomalyMonitorConfig {
    fn default() -> Self {
        Self {
            read_absent_codes: vec![UNKNOWN_MONITOR.to_string()],
            delete_absent_codes: vec![UNKNOWN_MONITOR.to_string()],
        }
    }
}

impl ConvergeConfig {
    pub fn validate(&self) -> Result<()> {
        let poll = &self.poll;
        if poll.initial_interval_ms == 0 {
            return Err(anyhow!("poll.initial_interval_ms must be > 0"));
        }
        if poll.max_interval_ms < poll.initial_interval_ms {
            return Err(anyhow!(
                "poll.max_interval_ms must be >= poll.initial_interval_ms"
            ));
        }
        if poll.cancel_check_ms == 0 {
            return Err(anyhow!("poll.cancel_check_ms must be > 0"));
        }
        if poll.continuous_target_occurrence == 0 {
            return Err(anyhow!("poll.continuous_target_occurrence must be >= 1"));
        }

        let endpoint = &self.resources.cluster_endpoint;
        if endpoint.available_timeout_secs == 0 {
            return Err(anyhow!(
                "resources.cluster_endpoint.available_timeout_secs must be > 0"
            ));
        }
        if endpoint.deleted_timeout_secs == 0 {
            return Err(anyhow!(
                "resources.cluster_endpoint.deleted_timeout_secs must be > 0"
            ));
        }
        validate_codes(
            "resources.cluster_endpoint.read_absent_codes",
            &endpoint.read_absent_codes,
        )?;
        validate_codes(
            "resources.cluster_endpoint.delete_absent_codes",
            &endpoint.delete_absent_codes,
        )?;

        let monitor = &self.resources.anomaly_monitor;
        validate_codes("resources.anomaly_monitor.read_absent_codes", &monitor.read_absent_codes)?;
        validate_codes(
            "resources.anomaly_monitor.delete_absent_codes",
            &monitor.delete_absent_codes,
        )?;
        Ok(())
    }
}

fn validate_codes(field: &str, codes: &[String]) -> Result<()> {
    if codes.iter().any(|code| code.trim().is_empty()) {
        return Err(anyhow!("{field} must not contain empty codes"));
    }
    Ok(())
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `ConvergeConfig::default()`.
pub fn load_config(path: &Path) -> Result<ConvergeConfig> {
    if !path.exists() {
        let cfg = ConvergeConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: ConvergeConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &ConvergeConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::config_file;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, ConvergeConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("nested").join("converge.toml");
        let mut cfg = ConvergeConfig::default();
        cfg.poll.fixed_interval_ms = 5_000;
        cfg.resources.cluster_endpoint.deleted_timeout_secs = 1_200;
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let (_temp, path) = config_file("[poll]\nnot_found_checks = 3\n");

        let cfg = load_config(&path).expect("load");

        assert_eq!(cfg.poll.not_found_checks, 3);
        assert_eq!(cfg.poll.initial_interval_ms, 100);
        assert_eq!(
            cfg.resources.anomaly_monitor.read_absent_codes,
            vec![UNKNOWN_MONITOR.to_string()]
        );
    }

    #[test]
    fn rejects_inverted_interval_bounds() {
        let mut cfg = ConvergeConfig::default();
        cfg.poll.max_interval_ms = 50;
        let err = cfg.validate().expect_err("invalid");
        assert!(err.to_string().contains("max_interval_ms"), "{err}");
    }

    #[test]
    fn rejects_blank_absent_code() {
        let mut cfg = ConvergeConfig::default();
        cfg.resources.cluster_endpoint.read_absent_codes.push("  ".to_string());
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn fixed_interval_selects_fixed_schedule() {
        let mut poll = PollConfig::default();
        assert_eq!(poll.policy().schedule.fixed, None);
        poll.fixed_interval_ms = 30_000;
        let policy = poll.policy();
        assert_eq!(policy.schedule.fixed, Some(Duration::from_secs(30)));
        assert_eq!(policy, PollPolicy {
            schedule: policy.schedule,
            ..PollPolicy::default()
        });
    }
}
