use apigee_cli::config::ApigeeConfig;
use apigee_cli::constants::{ENV_BASE_URL, ENV_ORG, ENV_PASSWORD, ENV_TOKEN, ENV_USERNAME};
use assert_cmd::Command;
use predicates::prelude::*;
use serial_test::serial;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// `apigee` with a scratch HOME and credentials that never reach the network.
fn apigee(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("apigee").unwrap();
    cmd.env("HOME", home)
        .env("USERPROFILE", home)
        .env(ENV_BASE_URL, "http://127.0.0.1:9")
        .env(ENV_ORG, "acme")
        .env(ENV_USERNAME, "ops@example.com")
        .env(ENV_PASSWORD, "secret")
        .env_remove(ENV_TOKEN)
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_help_lists_pull() {
    let temp = TempDir::new().unwrap();
    apigee(temp.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("pull"));
}

#[test]
fn test_pull_help_lists_options() {
    let temp = TempDir::new().unwrap();
    apigee(temp.path())
        .args(["pull", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--environment"))
        .stdout(predicate::str::contains("--basepath"))
        .stdout(predicate::str::contains("--prefix"));
}

#[test]
fn test_pull_requires_name_and_environment() {
    let temp = TempDir::new().unwrap();
    apigee(temp.path()).args(["pull", "--name", "orders"]).assert().failure();
}

#[test]
fn test_existing_proxy_dir_fails_before_network() {
    let temp = TempDir::new().unwrap();
    let work_tree = temp.path().join("repo");
    fs::create_dir_all(work_tree.join("orders/apiproxy")).unwrap();

    apigee(temp.path())
        .args(["pull", "-n", "orders", "-e", "test", "-r", "3", "--work-tree"])
        .arg(&work_tree)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Refusing to overwrite existing path"))
        .stderr(predicate::str::contains("orders"))
        .stderr(predicate::str::contains("--force"));

    assert!(!work_tree.join("orders.zip").exists());
}

#[test]
fn test_missing_org_is_a_configuration_error() {
    let temp = TempDir::new().unwrap();

    apigee(temp.path())
        .env_remove(ENV_ORG)
        .args(["pull", "-n", "orders", "-e", "test", "-r", "3", "--work-tree"])
        .arg(temp.path().join("repo"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Configuration error"));
}

#[test]
fn test_explicit_config_file_must_exist() {
    let temp = TempDir::new().unwrap();

    apigee(temp.path())
        .args(["--config"])
        .arg(temp.path().join("absent.toml"))
        .args(["pull", "-n", "orders", "-e", "test", "-r", "3"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("config file not found"));
}

#[tokio::test]
#[serial]
async fn test_environment_overrides_config_file() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.toml");
    fs::write(
        &path,
        "org = \"from-file\"\nusername = \"file-user\"\npassword = \"file-pass\"\n",
    )
    .unwrap();

    // SAFETY: serialized with every other test touching the process environment
    unsafe {
        std::env::set_var(ENV_ORG, "from-env");
        std::env::remove_var(ENV_TOKEN);
    }
    let loaded = ApigeeConfig::load(Some(path)).await;
    unsafe {
        std::env::remove_var(ENV_ORG);
    }

    let config = loaded.unwrap();
    assert_eq!(config.org.as_deref(), Some("from-env"));
    assert_eq!(config.username.as_deref(), Some("file-user"));
    assert_eq!(config.with_org(Some("flag".to_string())).require_org().unwrap(), "flag");
}
