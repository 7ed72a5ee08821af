//! Integration tests for the command-line interface

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

const FULL: &str = include_str!("fixtures/full.conf");
const BROKEN: &str = include_str!("fixtures/broken.conf");

/// Helper to create a workspace with an auth.conf and a rule manifest
fn setup_workspace() -> (TempDir, PathBuf, PathBuf) {
    let dir = TempDir::new().unwrap();

    let target = dir.path().join("auth.conf");
    fs::write(&target, FULL).unwrap();

    let rules = dir.path().join("rules.toml");
    fs::write(
        &rules,
        r#"[[rules]]
name = "/facts before first deny"
path = "/facts"
methods = ["find", "save"]
authenticated = "any"
ins_before = "first deny"

[[rules]]
name = "/certificate_request"
ensure = "absent"
"#,
    )
    .unwrap();

    (dir, target, rules)
}

fn run(args: &[&str], target: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_puppet-auth"))
        .args(args)
        .env("PUPPET_AUTH_TARGET", target)
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

#[test]
fn test_apply_help() {
    let output = Command::new(env!("CARGO_BIN_EXE_puppet-auth"))
        .args(["apply", "--help"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Apply the rules in a TOML manifest"));
}

#[test]
fn test_apply_basic() {
    let (_dir, target, rules) = setup_workspace();

    let output = run(&["apply", "--rules", rules.to_str().unwrap()], &target);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert!(stdout.contains("Loading rules"));
    assert!(stdout.contains("/facts before first deny: Created"));
    assert!(stdout.contains("/certificate_request: Removed"));
    assert!(stdout.contains("Summary:"));

    let text = fs::read_to_string(&target).unwrap();
    assert!(text.contains("path /facts\nauth any\nmethod find, save\npath /\n"));
    assert!(!text.contains("path /certificate_request"));
}

#[test]
fn test_apply_idempotent() {
    let (_dir, target, rules) = setup_workspace();

    run(&["apply", "--rules", rules.to_str().unwrap()], &target);
    let after_first = fs::read_to_string(&target).unwrap();

    let output = run(&["apply", "--rules", rules.to_str().unwrap()], &target);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("/facts before first deny: Unchanged"));
    assert!(stdout.contains("/certificate_request: Already absent"));
    assert_eq!(fs::read_to_string(&target).unwrap(), after_first);
}

#[test]
fn test_apply_dry_run_with_diff() {
    let (_dir, target, rules) = setup_workspace();

    let output = run(
        &["apply", "--rules", rules.to_str().unwrap(), "--dry-run", "--diff"],
        &target,
    );
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("DRY RUN"));
    assert!(stdout.contains("Would be created"));
    assert!(stdout.contains("+path /facts"));
    assert!(stdout.contains("-path /certificate_request"));
    assert_eq!(fs::read_to_string(&target).unwrap(), FULL);
}

#[test]
fn test_apply_broken_target_fails() {
    let (_dir, target, rules) = setup_workspace();
    fs::write(&target, BROKEN).unwrap();

    let output = run(&["apply", "--rules", rules.to_str().unwrap()], &target);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success());
    assert!(stderr.contains("ERROR"));
    assert!(stderr.contains("did you mean 'method'"));
    assert_eq!(fs::read_to_string(&target).unwrap(), BROKEN);
}

#[test]
fn test_apply_invalid_manifest() {
    let (dir, target, _) = setup_workspace();
    let rules = dir.path().join("bad.toml");
    fs::write(&rules, "[[rules]]\nname = \"x\"\nmethods = [\"post\"]\n").unwrap();

    let output = run(&["apply", "--rules", rules.to_str().unwrap()], &target);

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("invalid rule manifest"));
    assert_eq!(fs::read_to_string(&target).unwrap(), FULL);
}

#[test]
fn test_list_json() {
    let (_dir, target, _) = setup_workspace();

    let output = run(&["list", "--json"], &target);
    assert!(output.status.success());

    let rules: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let rules = rules.as_array().unwrap();
    assert_eq!(rules.len(), 9);
    assert_eq!(rules[0]["path"], "^/catalog/([^/]+)$");
    assert_eq!(rules[0]["path_regex"], true);
    assert_eq!(rules[7]["name"], "Auth rule for /certificate_request");
    assert_eq!(rules[7]["methods"], serde_json::json!(["find", "save"]));
    assert_eq!(rules[7]["authenticated"], "any");
}

#[test]
fn test_list_text() {
    let (_dir, target, _) = setup_workspace();

    let output = run(&["list"], &target);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("~ ^/node/([^/]+)$"));
    assert!(stdout.contains("methods: find, save"));
}

#[test]
fn test_remove_command() {
    let (_dir, target, _) = setup_workspace();

    let output = run(&["remove", "^/node/([^/]+)$", "--regex"], &target);
    assert!(output.status.success());
    assert!(!fs::read_to_string(&target).unwrap().contains("path ~ ^/node/"));

    let output = run(&["remove", "/missing"], &target);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("Already absent"));
}

#[test]
fn test_print_command() {
    let (_dir, target, _) = setup_workspace();

    let output = run(&["print", "path[.='/report']"], &target);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert_eq!(
        stdout,
        "/path[4] = \"/report\"\n/path[4]/method\n/path[4]/method/1 = \"save\"\n\
         /path[4]/allow\n/path[4]/allow/1 = \"*\"\n"
    );
}

#[test]
fn test_print_bad_expression() {
    let (_dir, target, _) = setup_workspace();

    let output = run(&["print", "path[.='x'"], &target);
    assert!(!output.status.success());
}
