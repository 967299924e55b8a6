//! Argument handling for the shipbot binary.

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn no_arguments_prints_usage() {
    Command::cargo_bin("shipbot")
        .unwrap()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn cut_plugin_requires_repo_and_tag() {
    Command::cargo_bin("shipbot")
        .unwrap()
        .args(["--config", "/dev/null", "cut-plugin"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--repo"));
}

#[test]
fn missing_config_file_is_a_fatal_error() {
    Command::cargo_bin("shipbot")
        .unwrap()
        .args([
            "--config",
            "/nonexistent/shipbot.json",
            "cut-plugin",
            "--repo",
            "plugin-x",
            "--tag",
            "v1.2.3",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("config"));
}

#[test]
fn version_flag_works() {
    Command::cargo_bin("shipbot")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("shipbot"));
}
