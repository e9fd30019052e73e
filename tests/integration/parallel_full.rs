//! Integration tests for `ralph parallel-full`.
//!
//! Every scenario here finishes before any container would be launched, so
//! the tests need neither docker nor a git repository.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Manifest whose sub-specs are all complete already.
const COMPLETE_MANIFEST: &str = r#"{
    "spec": "auth",
    "sub_specs": [
        {"name": "schema", "dependencies": [], "status": "complete"},
        {"name": "api", "dependencies": ["schema"], "status": "complete"}
    ]
}"#;

/// Manifest with a dependency cycle between `api` and `ui`.
const CYCLE_MANIFEST: &str = r#"{
    "subSpecs": [
        {"id": "schema", "deps": [], "status": "complete"},
        {"id": "api", "deps": ["schema", "ui"]},
        {"id": "ui", "deps": ["api"]}
    ]
}"#;

/// Manifest where the only pending sub-spec waits on a failed one.
const STUCK_MANIFEST: &str = r#"{
    "sub_specs": [
        {"name": "schema", "dependencies": [], "status": "failed"},
        {"name": "api", "dependencies": ["schema"]}
    ]
}"#;

/// Get a Command instance for the ralph binary
#[allow(deprecated)]
fn ralph_cmd() -> Command {
    Command::cargo_bin("ralph").expect("Failed to find ralph binary")
}

fn parallel_full(repo: &Path, spec: &str) -> Command {
    let mut cmd = ralph_cmd();
    cmd.current_dir(repo)
        .env_remove("RALPH_PARALLEL")
        .env_remove("RALPH_ITERATIONS")
        .env("RALPH_LOG", "off")
        .args(["parallel-full", spec]);
    cmd
}

/// Lay out `.ralph/` with a spec file, credentials and (optionally) a manifest.
fn setup_repo(manifest: Option<&str>) -> TempDir {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let spec_dir = temp_dir.path().join(".ralph/specs/auth");
    fs::create_dir_all(&spec_dir).expect("Failed to create spec dir");
    fs::write(temp_dir.path().join(".ralph/specs/auth.md"), "# Auth\n")
        .expect("Failed to write spec");
    fs::write(temp_dir.path().join(".ralph/.env"), "ANTHROPIC_API_KEY=test\n")
        .expect("Failed to write env file");
    if let Some(manifest) = manifest {
        fs::write(spec_dir.join("manifest.json"), manifest).expect("Failed to write manifest");
    }
    temp_dir
}

#[test]
fn test_help_lists_options() {
    ralph_cmd()
        .args(["parallel-full", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--parallel"))
        .stdout(predicate::str::contains("--iterations"))
        .stdout(predicate::str::contains("--verbose"))
        .stdout(predicate::str::contains("--base-branch"))
        .stdout(predicate::str::contains("--unit-timeout"));
}

#[test]
fn test_missing_spec_argument_is_usage_error() {
    ralph_cmd()
        .arg("parallel-full")
        .assert()
        .failure()
        .stderr(predicate::str::contains("<SPEC>"));
}

#[test]
fn test_uninitialized_repo_fails() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    parallel_full(temp_dir.path(), "auth")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("ralph init"));
}

#[test]
fn test_unknown_spec_fails() {
    let temp_dir = setup_repo(Some(COMPLETE_MANIFEST));
    parallel_full(temp_dir.path(), "billing")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Spec file not found"));
}

#[test]
fn test_missing_manifest_points_to_decompose() {
    let temp_dir = setup_repo(None);
    parallel_full(temp_dir.path(), "auth")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("ralph decompose"));
}

#[test]
fn test_missing_env_file_fails() {
    let temp_dir = setup_repo(Some(COMPLETE_MANIFEST));
    fs::remove_file(temp_dir.path().join(".ralph/.env")).expect("Failed to remove env file");
    parallel_full(temp_dir.path(), "auth")
        .assert()
        .code(1)
        .stderr(predicate::str::contains(".env"));
}

#[test]
fn test_all_complete_exits_successfully() {
    let temp_dir = setup_repo(Some(COMPLETE_MANIFEST));
    parallel_full(temp_dir.path(), "auth")
        .assert()
        .success()
        .stdout(predicate::str::contains("Parallel Full Mode: auth"))
        .stdout(predicate::str::contains("All sub-specs completed successfully!"));

    let manifest =
        fs::read_to_string(temp_dir.path().join(".ralph/specs/auth/manifest.json")).expect("read");
    assert!(manifest.contains("\"status\": \"complete\""));
}

#[test]
fn test_dependency_cycle_is_reported() {
    let temp_dir = setup_repo(Some(CYCLE_MANIFEST));
    parallel_full(temp_dir.path(), "auth")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Dependency cycle detected among: api, ui"));
}

#[test]
fn test_unsatisfiable_dependency_is_reported() {
    let temp_dir = setup_repo(Some(STUCK_MANIFEST));
    parallel_full(temp_dir.path(), "auth")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("api (waiting on schema is failed)"));
}

#[test]
fn test_invalid_config_file_fails() {
    let temp_dir = setup_repo(Some(COMPLETE_MANIFEST));
    fs::write(temp_dir.path().join(".ralph/config.toml"), "parallel = 0\n")
        .expect("Failed to write config");
    parallel_full(temp_dir.path(), "auth")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("parallel must be at least 1"));
}
