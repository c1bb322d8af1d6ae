//! End-to-end CLI tests that don't require actually launching a sandbox
//! (that needs root + real namespace support, same as the teacher's own
//! e2e suite). These cover the on-disk state layer and argument parsing.

use assert_cmd::Command;
use predicates::prelude::*;

fn sandrun_cmd(home: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("sandrun").unwrap();
    cmd.env("SANDRUN_HOME", home);
    cmd
}

#[test]
fn destroy_unknown_id_fails_with_not_found() {
    let home = tempfile::tempdir().unwrap();
    sandrun_cmd(home.path())
        .args(["destroy", "nonexistent-sandbox"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no state recorded"));
}

#[test]
fn wait_unknown_id_fails_with_not_found() {
    let home = tempfile::tempdir().unwrap();
    sandrun_cmd(home.path())
        .args(["wait", "nonexistent-sandbox", "root"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no state recorded"));
}

#[test]
fn create_without_bundle_fails_fast() {
    let home = tempfile::tempdir().unwrap();
    sandrun_cmd(home.path())
        .args(["create", "some-id", "--platform", "ptrace"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--bundle is required"));
}

#[test]
fn signal_rejects_unrecognized_signal_name() {
    let home = tempfile::tempdir().unwrap();
    // Bails out of signal-name parsing before ever touching on-disk state.
    sandrun_cmd(home.path())
        .args(["signal", "some-id", "root", "NOTASIGNAL"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized signal"));
}

#[test]
fn help_lists_all_subcommands() {
    let home = tempfile::tempdir().unwrap();
    sandrun_cmd(home.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("create"))
        .stdout(predicate::str::contains("destroy"))
        .stdout(predicate::str::contains("exec"));
}
