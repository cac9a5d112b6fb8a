use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;

const PASSWORD: &str = "Secret#123";

/// A chequeman command with HOME redirected into `home`.
fn cheq(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("chequeman").unwrap();
    cmd.env("HOME", home)
        .env("CHEQUEMAN_PASSWORD", PASSWORD)
        .env_remove("RUST_LOG");
    cmd
}

fn setup() -> tempfile::TempDir {
    let home = tempfile::tempdir().unwrap();
    let data = home.path().join("data");
    cheq(home.path())
        .args(["init", "--data-dir", data.to_str().unwrap(), "--company", "Test SARL"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created administrator 'admin'"));
    cheq(home.path())
        .args(["login", "admin"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Logged in"));
    home
}

fn seed_cheque(home: &Path) {
    cheq(home).args(["branches", "add", "Centre", "--bank", "AWB"]).assert().success();
    cheq(home)
        .args(["clients", "add", "Atlas SARL", "--type", "company"])
        .assert()
        .success();
    cheq(home)
        .args(["cheques", "add", "A1", "--amount", "1000", "--due", "2030-01-01", "--branch", "1", "--client", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Recorded cheque A1"));
}

#[test]
fn test_status_before_init() {
    let home = tempfile::tempdir().unwrap();
    cheq(home.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Database not found"));
}

#[test]
fn test_commands_require_login() {
    let home = setup();
    cheq(home.path()).arg("logout").assert().success();
    cheq(home.path())
        .args(["banks", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not logged in"));
}

#[test]
fn test_wrong_password_is_rejected() {
    let home = setup();
    cheq(home.path())
        .env("CHEQUEMAN_PASSWORD", "nope")
        .args(["login", "admin"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Authentication failed"));
}

#[test]
fn test_seeded_banks_are_listed() {
    let home = setup();
    cheq(home.path())
        .args(["banks", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Attijariwafa Bank"));
}

#[test]
fn test_same_number_at_same_branch_is_refused() {
    let home = setup();
    seed_cheque(home.path());
    cheq(home.path())
        .args([
            "cheques", "add", "A1", "--amount", "1000", "--due", "2030-01-01", "--branch", "1", "--client", "1",
            "--force",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists at branch 1"));
}

#[test]
fn test_likely_duplicate_needs_force() {
    let home = setup();
    seed_cheque(home.path());
    cheq(home.path()).args(["branches", "add", "Maarif", "--bank", "AWB"]).assert().success();
    cheq(home.path())
        .args(["cheques", "add", "A1", "--amount", "1000", "--due", "2030-01-01", "--branch", "2", "--client", "1"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("Possible duplicates"))
        .stderr(predicate::str::contains("duplicate"));
    cheq(home.path())
        .args([
            "cheques", "add", "A1", "--amount", "1000", "--due", "2030-01-01", "--branch", "2", "--client", "1",
            "--force",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Recorded cheque A1"));
}

#[test]
fn test_client_update_and_monthly_report() {
    let home = setup();
    seed_cheque(home.path());
    cheq(home.path())
        .args(["clients", "update", "1", "Atlas Group", "--type", "company", "--phone", "0612345678"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Updated client 1: Atlas Group"));
    cheq(home.path())
        .args(["clients", "search", "Group"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Atlas Group"));
    cheq(home.path())
        .args(["report", "monthly", "--year", "2030"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2030-01"));
}

#[test]
fn test_status_lifecycle() {
    let home = setup();
    seed_cheque(home.path());
    cheq(home.path())
        .args(["cheques", "status", "1", "cleared"])
        .assert()
        .success()
        .stdout(predicate::str::contains("now"));
    cheq(home.path())
        .args(["cheques", "status", "1", "pending"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Cannot move cheque from cleared to pending"));
    cheq(home.path())
        .args(["notifications", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("encaissé"));
}

#[test]
fn test_export_register_json() {
    let home = setup();
    seed_cheque(home.path());
    let out = home.path().join("register.json");
    cheq(home.path())
        .args(["export", "register", "--format", "json", "--output", out.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 record(s)"));
    let body = std::fs::read_to_string(&out).unwrap();
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["record_count"], 1);
    cheq(home.path())
        .args(["export", "history"])
        .assert()
        .success()
        .stdout(predicate::str::contains("register.json"));
}

#[test]
fn test_readonly_user_cannot_record_cheques() {
    let home = setup();
    cheq(home.path())
        .args(["users", "add", "viewer", "--role", "readonly"])
        .assert()
        .success();
    cheq(home.path()).args(["login", "viewer"]).assert().success();
    cheq(home.path())
        .args(["cheques", "add", "B1", "--amount", "50", "--due", "2030-01-01", "--branch", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Permission denied"));
    cheq(home.path())
        .arg("whoami")
        .assert()
        .success()
        .stdout(predicate::str::contains("readonly"));
}

#[test]
fn test_audit_records_logins() {
    let home = setup();
    cheq(home.path())
        .args(["audit", "list", "--action", "login"])
        .assert()
        .success()
        .stdout(predicate::str::contains("admin"));
}

#[test]
fn test_completions() {
    let home = tempfile::tempdir().unwrap();
    cheq(home.path())
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("chequeman"));
}
