//! Command-line behaviour that needs no namespaces: every case here fails
//! or exits before the topology is built.

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

fn bench_cmd() -> Command {
    let mut cmd = Command::cargo_bin("transport-bench").unwrap();
    for var in ["BENCH_TRIALS", "BENCH_TIMEOUT", "BENCH_QDISC", "BENCH_LABEL"] {
        cmd.env_remove(var);
    }
    cmd.env("NO_COLOR", "1");
    cmd
}

#[test]
fn test_help_lists_protocols() {
    bench_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("tcp"))
        .stdout(predicate::str::contains("google"))
        .stdout(predicate::str::contains("cloudflare"))
        .stdout(predicate::str::contains("picoquic"))
        .stdout(predicate::str::contains("--qdisc"));
}

#[test]
fn test_subcommand_help_shows_data_size() {
    bench_cmd()
        .args(["picoquic", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--data-size"))
        .stdout(predicate::str::contains("--congestion-control"));
}

#[test]
fn test_missing_subcommand_is_usage_error() {
    bench_cmd().assert().failure().code(2);
}

#[test]
fn test_unsupported_congestion_control_rejected() {
    bench_cmd()
        .args(["google", "--congestion-control", "bbr2"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("bbr2"))
        .stdout(predicate::str::is_empty());
}

#[test]
fn test_proxy_requires_two_segments() {
    bench_cmd()
        .args(["--topology", "direct", "--pep", "tcp"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("two-segment topology"));
}

#[test]
fn test_invalid_option_values() {
    bench_cmd().args(["--qdisc", "sfq", "tcp"]).assert().failure().code(2);
    bench_cmd().args(["tcp", "-n", "lots"]).assert().failure().code(2);
    bench_cmd()
        .args(["--loss1", "150", "tcp"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("loss1"));
}
