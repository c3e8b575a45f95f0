//! Behavioural smoke tests for the CLI entrypoint.

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

#[test]
fn cli_without_arguments_prints_help() {
    let mut cmd = cargo_bin_cmd!("cftest");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn run_without_a_provisioning_source_fails_with_guidance() {
    let mut cmd = cargo_bin_cmd!("cftest");
    cmd.arg("run");
    cmd.env_clear();
    cmd.assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("DCOS_TEMPLATE_URL"))
        .stderr(predicate::str::contains("DCOS_STACK_NAME"));
}

#[test]
fn run_with_a_stack_name_requires_the_variant_flag() {
    let mut cmd = cargo_bin_cmd!("cftest");
    cmd.arg("run");
    cmd.env_clear();
    cmd.env("DCOS_STACK_NAME", "existing-stack");
    cmd.assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("DCOS_ADVANCED_TEMPLATE"));
}
