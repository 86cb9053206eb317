use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn tablesync() -> Command {
    let mut cmd = Command::cargo_bin("tablesync").unwrap();
    cmd.env_remove("RUST_LOG");
    cmd
}

// ============================================================
// classify
// ============================================================

#[test]
fn classify_prints_backoff_schedule() {
    tablesync()
        .args(["classify", "NETWORK_ERROR", "--attempts", "3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Category:   network"))
        .stdout(predicate::str::contains("failure 1: retry in 3000 ms"))
        .stdout(predicate::str::contains("failure 3: retry in 12000 ms"));
}

#[test]
fn classify_accepts_negative_numbers() {
    tablesync()
        .args(["classify", "-3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("PERMISSION_DENIED"))
        .stdout(predicate::str::contains("failure 1: give up"));
}

#[test]
fn classify_rejects_unknown_names() {
    tablesync()
        .args(["classify", "NOT_A_CODE"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("NOT_A_CODE"));
}

// ============================================================
// replay
// ============================================================

#[test]
fn replay_prints_final_grid() {
    let dir = TempDir::new().unwrap();
    let script = dir.path().join("demo.json");
    std::fs::write(
        &script,
        r#"{ "steps": [
            { "op": "added", "key": "table_7", "payload": { "status": "DIRTY" } },
            { "op": "added", "key": "table_2", "payload": { "status": "OCCUPIED" } }
        ] }"#,
    )
    .unwrap();

    tablesync()
        .arg("replay")
        .arg(&script)
        .assert()
        .success()
        .stdout(predicate::str::contains("State: Active"))
        .stdout(predicate::str::contains("alert #7: Table 7 needs cleaning!"))
        .stdout(predicate::str::contains("Alerts: 7"));
}

#[test]
fn replay_uses_config_file() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("tablesync.toml");
    std::fs::write(&config, "[retry]\nmax_attempts = 1\n").unwrap();
    let script = dir.path().join("fail.json");
    std::fs::write(
        &script,
        r#"{ "steps": [
            { "op": "cancelled", "code": "NETWORK_ERROR" },
            { "op": "wait", "ms": 3500 },
            { "op": "cancelled", "code": "NETWORK_ERROR" }
        ] }"#,
    )
    .unwrap();

    tablesync()
        .arg("--config")
        .arg(&config)
        .arg("replay")
        .arg(&script)
        .assert()
        .success()
        .stdout(predicate::str::contains("gave up after 1 retries"))
        .stdout(predicate::str::contains("State: Idle"));
}

#[test]
fn replay_rejects_malformed_script() {
    let dir = TempDir::new().unwrap();
    let script = dir.path().join("bad.json");
    std::fs::write(&script, "{ not json").unwrap();

    tablesync()
        .arg("replay")
        .arg(&script)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid replay script"));
}
