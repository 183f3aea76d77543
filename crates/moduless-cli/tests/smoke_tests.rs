//! Smoke tests for the moduless CLI
//!
//! These tests exercise the commands that need no browser.

#![allow(deprecated)] // Allow deprecated Command::cargo_bin until assert_cmd is updated
#![allow(clippy::expect_used, clippy::unwrap_used)]

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Get a command for the moduless binary, isolated from the user's store
fn moduless(storage: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("moduless").expect("moduless binary should exist");
    cmd.env("MODULESS_STORAGE_DIR", storage.path())
        .env_remove("RUST_LOG")
        .arg("--color")
        .arg("never");
    cmd
}

fn workspace() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("tsconfig.json"),
        r#"{
            // comments are allowed
            "compilerOptions": { "outFile": "build/out.js", },
        }"#,
    )
    .unwrap();
    fs::create_dir_all(dir.path().join("build")).unwrap();
    fs::write(
        dir.path().join("build/out.js"),
        "function coverFirst() {\n    return () => true;\n}\n\
         function notACover() {}\n\
         function coverSecond() {\n    return [() => 1 === 1];\n}\n",
    )
    .unwrap();
    dir
}

// ============================================================================
// Basic CLI Tests
// ============================================================================

#[test]
fn test_version_flag() {
    let storage = TempDir::new().unwrap();
    moduless(&storage)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("0.4.0"));
}

#[test]
fn test_help_flag() {
    let storage = TempDir::new().unwrap();
    moduless(&storage)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("cover"))
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("instrument"));
}

#[test]
fn test_no_args_fails() {
    let storage = TempDir::new().unwrap();
    moduless(&storage).assert().failure();
}

// ============================================================================
// list
// ============================================================================

#[test]
fn test_list_prints_covers_in_order() {
    let storage = TempDir::new().unwrap();
    let dir = workspace();
    moduless(&storage)
        .arg("list")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("  coverFirst\n  coverSecond\n"))
        .stdout(predicate::str::contains("notACover").not());
}

#[test]
fn test_list_missing_path_fails() {
    let storage = TempDir::new().unwrap();
    let dir = TempDir::new().unwrap();
    moduless(&storage)
        .arg("list")
        .arg(dir.path().join("nowhere"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("No project found"));
}

// ============================================================================
// instrument
// ============================================================================

#[test]
fn test_instrument_appends_registrations() {
    let storage = TempDir::new().unwrap();
    let dir = workspace();
    moduless(&storage)
        .arg("instrument")
        .arg(dir.path().join("build/out.js"))
        .assert()
        .success()
        .stdout(predicate::str::contains(";Moduless.addCover(coverFirst);"))
        .stdout(predicate::str::contains(";Moduless.addCover(coverSecond);"))
        .stdout(predicate::str::contains("Moduless.addCover(notACover)").not());
}

#[test]
fn test_instrument_map() {
    let storage = TempDir::new().unwrap();
    let dir = workspace();
    moduless(&storage)
        .args(["instrument", "--map"])
        .arg(dir.path().join("build/out.js"))
        .assert()
        .success()
        .stdout(predicate::str::contains("\"mappings\""));
}

// ============================================================================
// prefs
// ============================================================================

#[test]
fn test_prefs_set_then_show() {
    let storage = TempDir::new().unwrap();
    moduless(&storage)
        .args(["prefs", "set", "browser-shown", "true"])
        .assert()
        .success()
        .stdout(predicate::str::contains("isBrowserShown = true"));

    moduless(&storage)
        .args(["prefs", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("isBrowserShown: true"))
        .stdout(predicate::str::contains("isDevtoolsShown: false"));

    assert_eq!(
        fs::read_to_string(storage.path().join("isBrowserShown")).unwrap(),
        "true"
    );
}

#[test]
fn test_prefs_clear() {
    let storage = TempDir::new().unwrap();
    moduless(&storage)
        .args(["prefs", "set", "devtools-shown", "true"])
        .assert()
        .success();
    moduless(&storage)
        .args(["prefs", "clear"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed"));
    moduless(&storage)
        .arg("prefs")
        .assert()
        .success()
        .stdout(predicate::str::contains("isDevtoolsShown: false"));
}

// ============================================================================
// run
// ============================================================================

#[test]
fn test_run_unknown_cover_fails_before_launch() {
    let storage = TempDir::new().unwrap();
    let dir = workspace();
    moduless(&storage)
        .arg("run")
        .arg(dir.path())
        .arg("coverMissing")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no cover named coverMissing"));
}

#[test]
fn test_run_requires_cover_or_all() {
    let storage = TempDir::new().unwrap();
    let dir = workspace();
    moduless(&storage).arg("run").arg(dir.path()).assert().failure();
}
