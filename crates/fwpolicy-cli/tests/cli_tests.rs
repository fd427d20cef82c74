//! End-to-end tests for the fwpolicy binary

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;

fn fwpolicy(store: &Path) -> Command {
    let mut cmd = Command::cargo_bin("fwpolicy").expect("binary builds");
    cmd.env("NO_COLOR", "1")
        .env_remove("FWPOLICY_CONFIG")
        .arg("--quiet")
        .arg("--store")
        .arg(store);
    cmd
}

#[test]
fn test_suffix_block_applies_to_subdomains() {
    let dir = TempDir::new().unwrap();
    let store = dir.path().join("store.json");

    fwpolicy(&store)
        .args(["domain", "block", "ru", "--kind", "tld"])
        .assert()
        .success();

    fwpolicy(&store)
        .args(["resolve", "domain", "news.example.ru"])
        .assert()
        .success()
        .stdout(predicate::str::contains("block"))
        .stdout(predicate::str::contains("suffix rule"));

    fwpolicy(&store)
        .args(["resolve", "domain", "example.com"])
        .assert()
        .success()
        .stdout(predicate::str::contains("no rule"));
}

#[test]
fn test_exact_whitelist_beats_wildcard_block() {
    let dir = TempDir::new().unwrap();
    let store = dir.path().join("store.json");

    fwpolicy(&store)
        .args(["domain", "block", "*.ads.com"])
        .assert()
        .success();
    fwpolicy(&store)
        .args(["domain", "whitelist", "ok.ads.com"])
        .assert()
        .success();

    fwpolicy(&store)
        .args(["resolve", "domain", "ok.ads.com"])
        .assert()
        .success()
        .stdout(predicate::str::contains("whitelist"));
    fwpolicy(&store)
        .args(["resolve", "domain", "tracker.ads.com"])
        .assert()
        .success()
        .stdout(predicate::str::contains("wildcard rule"));
}

#[test]
fn test_domain_clear_and_list() {
    let dir = TempDir::new().unwrap();
    let store = dir.path().join("store.json");

    fwpolicy(&store)
        .args(["domain", "block", "ads.example.com"])
        .assert()
        .success();
    fwpolicy(&store)
        .args(["domain", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ads.example.com"));

    fwpolicy(&store)
        .args(["domain", "clear", "ads.example.com"])
        .assert()
        .success();
    fwpolicy(&store)
        .args(["domain", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Total rules: 0"));
}

#[test]
fn test_ip_rule_resolves_for_its_uid_only() {
    let dir = TempDir::new().unwrap();
    let store = dir.path().join("store.json");

    fwpolicy(&store)
        .args(["ip", "block", "10100", "203.0.113.7", "--port", "443"])
        .assert()
        .success();

    fwpolicy(&store)
        .args(["resolve", "conn", "10100", "203.0.113.7", "--port", "443"])
        .assert()
        .success()
        .stdout(predicate::str::contains("port 443  block"));
    fwpolicy(&store)
        .args(["resolve", "conn", "10200", "203.0.113.7", "--port", "443"])
        .assert()
        .success()
        .stdout(predicate::str::contains("port 443  none"));

    fwpolicy(&store)
        .args(["ip", "list", "10100"])
        .assert()
        .success()
        .stdout(predicate::str::contains("203.0.113.7"));
}

#[test]
fn test_ip_block_rejects_bad_host() {
    let dir = TempDir::new().unwrap();
    let store = dir.path().join("store.json");

    fwpolicy(&store)
        .args(["ip", "block", "10100", "not-an-address"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid host"));
}

#[test]
fn test_app_set_and_show() {
    let dir = TempDir::new().unwrap();
    let store = dir.path().join("store.json");

    fwpolicy(&store)
        .args([
            "app", "set", "10100", "--firewall", "isolate", "--connection", "metered", "--name",
            "Browser",
        ])
        .assert()
        .success();

    fwpolicy(&store)
        .args(["app", "show", "10100"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Browser"))
        .stdout(predicate::str::contains("isolate"))
        .stdout(predicate::str::contains("metered"));

    fwpolicy(&store)
        .args(["app", "set", "10100", "--firewall", "untracked"])
        .assert()
        .success();
    fwpolicy(&store)
        .args(["app", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Total apps: 0"));
}

#[test]
fn test_config_generate_then_validate() {
    let dir = TempDir::new().unwrap();
    let store = dir.path().join("store.json");
    let config = dir.path().join("fwpolicy.toml");

    fwpolicy(&store)
        .args(["config", "generate", "--output"])
        .arg(&config)
        .assert()
        .success();
    assert!(config.exists());

    fwpolicy(&store)
        .args(["config", "generate", "--output"])
        .arg(&config)
        .assert()
        .failure();

    fwpolicy(&store)
        .args(["config", "validate"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"));
}

#[test]
fn test_config_validate_rejects_zero_capacity() {
    let dir = TempDir::new().unwrap();
    let store = dir.path().join("store.json");
    let config = dir.path().join("bad.toml");
    std::fs::write(&config, "[cache]\ndomain_capacity = 0\n").unwrap();

    fwpolicy(&store)
        .args(["config", "validate"])
        .arg(&config)
        .assert()
        .failure();
}
