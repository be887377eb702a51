//! CLI tests for `converge id` and `converge config`.
//!
//! Spawns the converge binary and verifies output and exit codes.

use std::process::Command;

use converge::exit_codes;
use converge::io::config::{ConvergeConfig, load_config};
use converge::test_support::config_file;

fn converge() -> Command {
    Command::new(env!("CARGO_BIN_EXE_converge"))
}

#[test]
fn encode_prints_joined_identifier() {
    let output = converge()
        .args(["id", "encode", "--kind", "cluster_endpoint", "db-1", "reader-1"])
        .output()
        .expect("converge id encode");

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "db-1:reader-1");
}

#[test]
fn encode_of_part_containing_separator_is_malformed() {
    let status = converge()
        .args(["id", "encode", "--kind", "cluster_endpoint", "db:1", "reader-1"])
        .status()
        .expect("converge id encode");

    assert_eq!(status.code(), Some(exit_codes::MALFORMED));
}

#[test]
fn decode_prints_parts_as_json() {
    let output = converge()
        .args(["id", "decode", "--kind", "cluster_endpoint", "db-1:reader-1"])
        .output()
        .expect("converge id decode");

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let decoded: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(decoded["kind"], "cluster_endpoint");
    assert_eq!(decoded["layout"], "CLUSTER-ID:CLUSTER-ENDPOINT-ID");
    assert_eq!(decoded["parts"], serde_json::json!(["db-1", "reader-1"]));
}

#[test]
fn decode_of_monitor_arn_keeps_it_whole() {
    let arn = "arn:sim:ce::000000000000:anomalymonitor/00000001";
    let output = converge()
        .args(["id", "decode", "--kind", "anomaly_monitor", arn])
        .output()
        .expect("converge id decode");

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let decoded: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(decoded["parts"], serde_json::json!([arn]));
}

#[test]
fn decode_of_wrong_arity_exits_malformed() {
    let output = converge()
        .args(["id", "decode", "--kind", "cluster_endpoint", "db-1"])
        .output()
        .expect("converge id decode");

    assert_eq!(output.status.code(), Some(exit_codes::MALFORMED));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("unexpected format for ID (db-1), expected CLUSTER-ID:CLUSTER-ENDPOINT-ID"),
        "{stderr}"
    );
}

#[test]
fn config_init_writes_loadable_defaults() {
    let temp = tempfile::tempdir().expect("tempdir");

    let status = converge()
        .current_dir(temp.path())
        .args(["config", "init"])
        .status()
        .expect("converge config init");
    assert_eq!(status.code(), Some(exit_codes::OK));

    let cfg = load_config(&temp.path().join("converge.toml")).expect("load");
    assert_eq!(cfg, ConvergeConfig::default());

    let status = converge()
        .current_dir(temp.path())
        .args(["config", "init"])
        .status()
        .expect("converge config init");
    assert_eq!(status.code(), Some(exit_codes::INVALID));

    let status = converge()
        .current_dir(temp.path())
        .args(["config", "init", "--force"])
        .status()
        .expect("converge config init --force");
    assert_eq!(status.code(), Some(exit_codes::OK));
}

#[test]
fn config_check_rejects_invalid_values() {
    let (_temp, path) = config_file("[poll]\ncancel_check_ms = 0\n");

    let output = converge()
        .args(["config", "check", "--config"])
        .arg(&path)
        .output()
        .expect("converge config check");

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("cancel_check_ms"));
}
