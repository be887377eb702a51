//! Convergence configuration merging.
//!
//! Applies case-specific overrides to the default converge configuration.

use anyhow::Result;
use converge::io::config::ConvergeConfig;
use converge::resources::ResourceKind;

use crate::case::CaseConfig;

/// Apply case configuration overrides to the base config.
///
/// Absent-code overrides target the case's resource kind; timeouts only exist
/// for cluster endpoints.
pub fn apply_case_config(
    mut base: ConvergeConfig,
    kind: ResourceKind,
    overrides: &CaseConfig,
) -> Result<ConvergeConfig> {
    let poll = &mut base.poll;
    if let Some(value) = overrides.initial_interval_ms {
        poll.initial_interval_ms = value;
    }
    if let Some(value) = overrides.max_interval_ms {
        poll.max_interval_ms = value;
    }
    if let Some(value) = overrides.fixed_interval_ms {
        poll.fixed_interval_ms = value;
    }
    if let Some(value) = overrides.delay_ms {
        poll.delay_ms = value;
    }
    if let Some(value) = overrides.not_found_checks {
        poll.not_found_checks = value;
    }
    if let Some(value) = overrides.continuous_target_occurrence {
        poll.continuous_target_occurrence = value;
    }

    let endpoint = &mut base.resources.cluster_endpoint;
    if let Some(value) = overrides.available_timeout_secs {
        endpoint.available_timeout_secs = value;
    }
    if let Some(value) = overrides.deleted_timeout_secs {
        endpoint.deleted_timeout_secs = value;
    }

    let (read, delete) = match kind {
        ResourceKind::ClusterEndpoint => (
            &mut base.resources.cluster_endpoint.read_absent_codes,
            &mut base.resources.cluster_endpoint.delete_absent_codes,
        ),
        ResourceKind::AnomalyMonitor => (
            &mut base.resources.anomaly_monitor.read_absent_codes,
            &mut base.resources.anomaly_monitor.delete_absent_codes,
        ),
    };
    if let Some(codes) = &overrides.read_absent_codes {
        read.clone_from(codes);
    }
    if let Some(codes) = &overrides.delete_absent_codes {
        delete.clone_from(codes);
    }

    base.validate()?;
    Ok(base)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_defaults_without_overrides() {
        let base = ConvergeConfig::default();
        let merged = apply_case_config(
            base.clone(),
            ResourceKind::ClusterEndpoint,
            &CaseConfig::default(),
        )
        .expect("merge");
        assert_eq!(merged, base);
    }

    #[test]
    fn absent_codes_target_the_case_kind() {
        let overrides = CaseConfig {
            read_absent_codes: Some(vec!["Gone".to_string()]),
            fixed_interval_ms: Some(1_000),
            ..CaseConfig::default()
        };
        let merged = apply_case_config(
            ConvergeConfig::default(),
            ResourceKind::AnomalyMonitor,
            &overrides,
        )
        .expect("merge");

        assert_eq!(merged.resources.anomaly_monitor.read_absent_codes, vec!["Gone"]);
        assert_eq!(
            merged.resources.cluster_endpoint,
            ConvergeConfig::default().resources.cluster_endpoint
        );
        assert_eq!(merged.poll.fixed_interval_ms, 1_000);
    }

    #[test]
    fn rejects_overrides_that_fail_validation() {
        let overrides = CaseConfig {
            deleted_timeout_secs: Some(0),
            ..CaseConfig::default()
        };
        assert!(
            apply_case_config(
                ConvergeConfig::default(),
                ResourceKind::ClusterEndpoint,
                &overrides
            )
            .is_err()
        );
    }
}
