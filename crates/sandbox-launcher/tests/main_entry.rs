//! Integration tests for the `sandbox-launcher` binary entry point.
//!
//! These only cover failures that happen before or regardless of the host's
//! Landlock support, so they pass on any Linux kernel.

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use predicates::str::contains;

#[test]
fn missing_command_prints_usage_and_fails() {
    let mut command = cargo_bin_cmd!("sandbox-launcher");
    command
        .assert()
        .code(1)
        .stderr(contains("Usage: sandbox-launcher <COMMAND>"));
}

#[test]
fn help_lists_policy_variables() {
    let mut command = cargo_bin_cmd!("sandbox-launcher");
    command.arg("--help");
    command
        .assert()
        .failure()
        .stderr(contains("LL_FS_RO").and(contains("LL_TCP_CONNECT")));
}

#[test]
fn missing_policy_never_runs_the_command() {
    let mut command = cargo_bin_cmd!("sandbox-launcher");
    command
        .env_remove("LL_FS_RO")
        .env_remove("LL_FS_RW")
        .args(["/bin/sh", "-c", "echo escaped"]);
    command
        .assert()
        .code(1)
        .stdout(predicates::str::is_empty());
}

#[test]
fn version_flag_after_the_command_is_not_the_launchers() {
    let mut command = cargo_bin_cmd!("sandbox-launcher");
    command
        .env_remove("LL_FS_RO")
        .env_remove("LL_FS_RW")
        .args(["ls", "--version"]);
    command
        .assert()
        .code(1)
        .stdout(predicates::str::is_empty())
        .stderr(contains("sandbox-launcher 0.1.0").not().and(contains("Usage:").not()));
}
