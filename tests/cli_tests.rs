use assert_cmd::Command;
use predicates::prelude::*;

const CREDENTIAL_VARS: &[&str] = &[
    "APPLE_TEAM_ID",
    "APPLE_API_ISSUER",
    "APPLE_API_KEY",
    "APPLE_API_KEY_PATH",
    "APPLE_API_KEY_CONTENT",
    "KODEGEN_PKG_CONFIG",
];

fn packager() -> Command {
    let mut cmd = Command::cargo_bin("kodegen_bundler_pkg").expect("binary builds");
    for var in CREDENTIAL_VARS {
        cmd.env_remove(var);
    }
    cmd
}

const NOTARY: &[&str] = &[
    "--api-issuer",
    "69a6de7e-0000-47e3-e053-5b8c7c11a4d1",
    "--api-key-id",
    "ABC123DEFG",
    "--api-key-path",
    "AuthKey_ABC123DEFG.p8",
];

#[test]
fn test_help_lists_subcommands() {
    packager()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("package"))
        .stdout(predicate::str::contains("notarize"))
        .stdout(predicate::str::contains("doctor"));
}

#[test]
fn test_invalid_version_is_a_usage_error() {
    packager()
        .args(["package", "two-point-one", "--team-id", "ABCDE12345"])
        .args(NOTARY)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("not a semantic version"));
}

#[test]
fn test_package_requires_team_id() {
    packager()
        .args(["package", "2.1.0"])
        .args(NOTARY)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--team-id"));
}

#[test]
fn test_notarize_missing_package_is_a_usage_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    packager()
        .arg("notarize")
        .arg(dir.path().join("Viewer-2.1.0.unnotarized.pkg"))
        .args(NOTARY)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("package not found"));
}

#[test]
fn test_missing_tools_fail_preflight() {
    let dir = tempfile::tempdir().expect("tempdir");
    packager()
        .current_dir(dir.path())
        .env("PATH", dir.path())
        .args(["package", "2.1.0", "--team-id", "ABCDE12345"])
        .args(NOTARY)
        .assert()
        .failure()
        .stderr(predicate::str::contains("codesign"));
}
