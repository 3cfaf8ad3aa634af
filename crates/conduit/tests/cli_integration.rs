//! CLI integration tests for the Conduit command-line interface.
//!
//! These tests do not require a running gateway. Every invocation points
//! `CONDUIT_CONFIG_DIR` at a temp directory so the user's own config and log
//! directory are never touched.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Get a command for the conduit binary with an isolated config directory.
fn conduit(config_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("conduit").unwrap();
    cmd.env("CONDUIT_CONFIG_DIR", config_dir.path())
        .env_remove("CONDUIT_SERVER_URL")
        .env_remove("CONDUIT_ROUTING_STRATEGY")
        .env_remove("CONDUIT_TIMEOUT_SECS")
        .env_remove("CONDUIT_HEALTH_INTERVAL_SECS")
        .env_remove("CONDUIT_DEFAULT_TARGET")
        .env_remove("RUST_LOG");
    cmd
}

// ─────────────────────────────────────────────────────────────────────────────
// Help and Version Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_help_displays() {
    let dir = TempDir::new().unwrap();
    conduit(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Conduit"));
}

#[test]
fn test_version_displays() {
    let dir = TempDir::new().unwrap();
    conduit(&dir)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("conduit"));
}

#[test]
fn test_help_lists_subcommands() {
    let dir = TempDir::new().unwrap();
    conduit(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("gateway"))
        .stdout(predicate::str::contains("bridge"))
        .stdout(predicate::str::contains("status"))
        .stdout(predicate::str::contains("catalog"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_gateway_help_lists_flags() {
    let dir = TempDir::new().unwrap();
    conduit(&dir)
        .args(["gateway", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--strategy"))
        .stdout(predicate::str::contains("--downstream"))
        .stdout(predicate::str::contains("--default-target"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Config Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_config_path_uses_config_dir() {
    let dir = TempDir::new().unwrap();
    let expected = dir.path().join("config.toml");
    conduit(&dir)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains(expected.display().to_string()))
        .stdout(predicate::str::contains("conduit.toml"));
}

#[test]
fn test_config_show_merges_project_file_and_env() {
    let dir = TempDir::new().unwrap();
    let project = TempDir::new().unwrap();
    std::fs::write(
        project.path().join("conduit.toml"),
        r#"
[gateway]
port = 9300

[[servers]]
id = "alpha"
url = "http://localhost:8001"
"#,
    )
    .unwrap();

    conduit(&dir)
        .current_dir(project.path())
        .env("CONDUIT_TIMEOUT_SECS", "7")
        .env("CONDUIT_SERVER_ALPHA_URL", "http://alpha.internal:9001")
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("conduit.toml"))
        .stdout(predicate::str::contains("port = 9300"))
        .stdout(predicate::str::contains("timeout_secs = 7"))
        .stdout(predicate::str::contains("http://alpha.internal:9001"));
}

#[test]
fn test_config_show_warns_on_unknown_server_override() {
    let dir = TempDir::new().unwrap();
    let project = TempDir::new().unwrap();
    conduit(&dir)
        .current_dir(project.path())
        .env("CONDUIT_SERVER_GHOST_URL", "http://ghost:1")
        .args(["config", "show"])
        .assert()
        .success()
        .stderr(predicate::str::contains("warning"))
        .stdout(predicate::str::contains("No config files loaded"));
}

#[test]
fn test_config_show_rejects_bad_env_value() {
    let dir = TempDir::new().unwrap();
    let project = TempDir::new().unwrap();
    conduit(&dir)
        .current_dir(project.path())
        .env("CONDUIT_ROUTING_STRATEGY", "random")
        .args(["config", "show"])
        .assert()
        .failure();
}

// ─────────────────────────────────────────────────────────────────────────────
// Client Command Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_status_when_gateway_not_running() {
    let dir = TempDir::new().unwrap();
    conduit(&dir)
        .args(["--server", "http://127.0.0.1:9", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("not running"));
}

#[test]
fn test_status_json_when_gateway_not_running() {
    let dir = TempDir::new().unwrap();
    conduit(&dir)
        .args(["--json", "--server", "http://127.0.0.1:9", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"running\": false"));
}

#[test]
fn test_catalog_fails_when_gateway_not_running() {
    let dir = TempDir::new().unwrap();
    conduit(&dir)
        .args(["--server", "http://127.0.0.1:9", "catalog"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to fetch catalog"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Invalid Input Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_unknown_subcommand_rejected() {
    let dir = TempDir::new().unwrap();
    conduit(&dir).arg("frobnicate").assert().failure();
}

#[test]
fn test_gateway_rejects_bad_strategy() {
    let dir = TempDir::new().unwrap();
    conduit(&dir)
        .args(["gateway", "--strategy", "random"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("prefix"));
}

#[test]
fn test_gateway_rejects_bad_downstream() {
    let dir = TempDir::new().unwrap();
    conduit(&dir)
        .args(["gateway", "--downstream", "alpha"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("KEY=VALUE"));
}

#[test]
fn test_gateway_without_servers_fails() {
    let dir = TempDir::new().unwrap();
    let project = TempDir::new().unwrap();
    conduit(&dir)
        .current_dir(project.path())
        .arg("gateway")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no downstream servers"));
}

#[test]
fn test_bridge_without_command_fails() {
    let dir = TempDir::new().unwrap();
    let project = TempDir::new().unwrap();
    conduit(&dir)
        .current_dir(project.path())
        .arg("bridge")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no bridge command"));
}
