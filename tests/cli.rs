//! End-to-end smoke tests for the freighter binary.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn freighter() -> Command {
    Command::cargo_bin("freighter").unwrap()
}

#[test]
fn new_scaffolds_an_application() {
    let tmp = TempDir::new().unwrap();

    freighter()
        .current_dir(tmp.path())
        .args(["new", "my-app"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Created application `my-app`"));

    assert!(tmp.path().join("my-app/Freighter.toml").is_file());
    assert!(tmp.path().join("my-app/template/template.toml").is_file());
}

#[test]
fn create_materializes_the_skeleton() {
    let tmp = TempDir::new().unwrap();

    freighter()
        .current_dir(tmp.path())
        .args(["new", "my-app"])
        .assert()
        .success();

    let app_dir = tmp.path().join("my-app");

    freighter()
        .current_dir(&app_dir)
        .arg("create")
        .assert()
        .success()
        .stderr(predicate::str::contains("create"));

    // The starter template rendered with the app's identity.
    let build_dir = app_dir.join("build");
    let readme = walkdir::WalkDir::new(&build_dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .find(|e| e.file_name() == "README.md")
        .expect("rendered README.md in the skeleton");
    let contents = std::fs::read_to_string(readme.path()).unwrap();
    assert!(contents.contains("# my-app"));
    assert!(contents.contains("0.1.0"));
}

#[test]
fn unconfigured_stage_fails_as_unsupported() {
    let tmp = TempDir::new().unwrap();

    freighter()
        .current_dir(tmp.path())
        .args(["new", "my-app"])
        .assert()
        .success();

    // The starter manifest configures no build command.
    freighter()
        .current_dir(tmp.path().join("my-app"))
        .arg("build")
        .assert()
        .failure()
        .stderr(predicate::str::contains("not supported"));
}

#[test]
fn missing_manifest_suggests_new() {
    let tmp = TempDir::new().unwrap();

    freighter()
        .current_dir(tmp.path())
        .arg("doctor")
        .assert()
        .failure()
        .stderr(predicate::str::contains("freighter new"));
}

#[test]
fn doctor_lists_targets() {
    let tmp = TempDir::new().unwrap();

    freighter()
        .current_dir(tmp.path())
        .args(["new", "my-app"])
        .assert()
        .success();

    freighter()
        .current_dir(tmp.path().join("my-app"))
        .arg("doctor")
        .assert()
        .success()
        .stdout(predicate::str::contains("backend `script`"))
        .stdout(predicate::str::contains("create, update"));
}

#[test]
fn bad_target_is_rejected() {
    let tmp = TempDir::new().unwrap();

    freighter()
        .current_dir(tmp.path())
        .args(["new", "my-app"])
        .assert()
        .success();

    freighter()
        .current_dir(tmp.path().join("my-app"))
        .args(["create", "--target", "beos:app"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown platform"));
}
