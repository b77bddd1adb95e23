//! Smoke tests -- verify the binary runs and the subcommands are wired.

use assert_cmd::Command;
use std::io::Write;

#[test]
fn test_cli_help() {
    Command::cargo_bin("perfanalyzer")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicates::str::contains("Performance anomaly detection"));
}

#[test]
fn test_cli_version() {
    Command::cargo_bin("perfanalyzer")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicates::str::contains("perfanalyzer"));
}

#[test]
fn test_serve_subcommand_exists() {
    Command::cargo_bin("perfanalyzer")
        .unwrap()
        .args(["serve", "--help"])
        .assert()
        .success();
}

#[test]
fn test_demo_subcommand_exists() {
    Command::cargo_bin("perfanalyzer")
        .unwrap()
        .args(["demo", "--help"])
        .assert()
        .success();
}

#[test]
fn test_show_config_prints_file_values() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[detection]
interval_secs = 7

[[detection.queries]]
id = "slow-checkout"
category = "latency"
expr = "checkout_p95 > {{threshold}}"
threshold = 0.3
"#
    )
    .unwrap();

    Command::cargo_bin("perfanalyzer")
        .unwrap()
        .args(["show-config", "--config"])
        .arg(file.path())
        .env_remove("AI_API_KEY")
        .assert()
        .success()
        .stdout(predicates::str::contains("slow-checkout"))
        .stdout(predicates::str::contains("interval_secs = 7"));
}

#[test]
fn test_show_config_rejects_invalid_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[detection]\ninterval_secs = 0").unwrap();

    Command::cargo_bin("perfanalyzer")
        .unwrap()
        .args(["show-config", "--config"])
        .arg(file.path())
        .assert()
        .failure()
        .stderr(predicates::str::contains("detection.interval_secs"));
}

#[test]
fn test_show_config_env_path_missing_falls_back_to_defaults() {
    let workdir = tempfile::tempdir().unwrap();

    Command::cargo_bin("perfanalyzer")
        .unwrap()
        .arg("show-config")
        .env("PERFANALYZER_CONFIG", workdir.path().join("missing.toml"))
        .env_remove("AI_API_KEY")
        .current_dir(workdir.path())
        .assert()
        .success()
        .stdout(predicates::str::contains("p95-latency"))
        .stdout(predicates::str::contains("server-errors"));
}
