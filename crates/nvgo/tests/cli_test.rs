//! CLI integration tests.
//!
//! These run the built binary end-to-end.

use serde_json::Value;
use std::io::Write;
use std::process::{Command, Stdio};

fn nvgo() -> Command {
    Command::new(env!("CARGO_BIN_EXE_nvgo"))
}

#[test]
fn test_help_command() {
    let output = nvgo().arg("--help").output().expect("Failed to execute command");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Go tooling sidecar for Neovim"));
    assert!(stdout.contains("--log-level"));
    assert!(stdout.contains("--config"));
}

#[test]
fn test_specs_command() {
    let output = nvgo().arg("specs").output().expect("Failed to execute command");

    assert!(output.status.success());
    let specs: Value = serde_json::from_slice(&output.stdout).expect("specs are JSON");
    let specs = specs.as_array().unwrap();
    assert!(specs
        .iter()
        .any(|s| s["type"] == "command" && s["name"] == "GoBuild"));
    assert!(specs
        .iter()
        .any(|s| s["type"] == "autocmd" && s["name"] == "BufWritePre"));
}

#[test]
fn test_unknown_log_level_exits_2() {
    let output = nvgo()
        .args(["--log-level", "loud"])
        .output()
        .expect("Failed to execute command");

    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown log level"));
}

#[test]
fn test_unreadable_config_exits_2() {
    let dir = tempfile::tempdir().unwrap();
    let output = nvgo()
        .args(["--log-file", "-", "--config"])
        .arg(dir.path().join("missing.json"))
        .stdin(Stdio::null())
        .output()
        .expect("Failed to execute command");

    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("failed to load config"));
}

#[test]
fn test_serve_exits_cleanly_when_editor_closes() {
    let dir = tempfile::tempdir().unwrap();
    let mut child = nvgo()
        .args(["--log-file"])
        .arg(dir.path().join("nvgo.log"))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .expect("Failed to spawn");

    {
        let mut stdin = child.stdin.take().unwrap();
        writeln!(stdin, r#"{{"jsonrpc":"2.0","id":1,"method":"function:GoDebugModes","params":["d"]}}"#).unwrap();
    }

    let output = child.wait_with_output().unwrap();
    assert!(output.status.success());
    let response: Value = serde_json::from_str(String::from_utf8_lossy(&output.stdout).lines().next().unwrap()).unwrap();
    assert_eq!(response["id"], 1);
    assert_eq!(response["result"], serde_json::json!(["debug"]));
}
