//! Process-level startup tests for the `rf-telemetry-bridge` binary.
//!
//! These run the compiled binary and check its exit status and output, the
//! way an operator or a service manager would see it.

use std::process::{Command, Output};

const BIN: &str = env!("CARGO_BIN_EXE_rf-telemetry-bridge");

fn run_bridge(args: &[&str]) -> Output {
    let mut cmd = Command::new(BIN);
    cmd.args(args).env("RUST_LOG", "info");
    for (key, _) in std::env::vars() {
        if key.starts_with("RF_BRIDGE_") {
            cmd.env_remove(key);
        }
    }
    cmd.output().expect("failed to run bridge binary")
}

/// A missing serial device aborts startup before any listener is bound.
#[test]
fn test_nonexistent_port_exits_nonzero() {
    // Arrange
    let port = "/dev/rf-telemetry-bridge-test-missing";

    // Act: port 0 would bind successfully, so only the serial open can fail
    let output = run_bridge(&["--port", port, "--ws-port", "0"]);

    // Assert
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(!output.status.success());
    assert!(stderr.contains(port), "stderr must name the port: {stderr}");
    assert!(
        !stdout.contains("listening"),
        "no listener may be bound: {stdout}"
    );
}

#[test]
fn test_missing_port_exits_nonzero() {
    let output = run_bridge(&[]);

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!output.status.success());
    assert!(stderr.contains("serial port"), "unexpected stderr: {stderr}");
}

#[test]
fn test_invalid_host_exits_nonzero() {
    let output = run_bridge(&["--port", "loop://", "--host", "not-an-ip"]);

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!output.status.success());
    assert!(stderr.contains("not-an-ip"), "unexpected stderr: {stderr}");
}

#[test]
fn test_zero_queue_capacity_exits_nonzero() {
    let output = run_bridge(&["--port", "loop://", "--ingest-capacity", "0"]);
    assert!(!output.status.success());
}
