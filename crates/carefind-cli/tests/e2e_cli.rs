//! E2E CLI tests covering:
//! - `carefind init` / `ingest` / `search` against a fresh store
//! - The line-delimited `carefind tool` bridge
//! - `stats`, `verify` (including stale rows) and `config`
//! - Structured JSON errors and exit codes
//!
//! Each test runs the `carefind` binary as a subprocess in an isolated temp
//! directory, with the dependency-free hashing encoder.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Test Harness
// ---------------------------------------------------------------------------

/// Build a Command targeting the carefind binary, rooted in `dir`.
fn carefind_cmd(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("carefind"));
    cmd.current_dir(dir);
    cmd.env("CAREFIND_LOG", "error");
    cmd.env("CAREFIND_EMBEDDING_MODEL", "hashing-384");
    cmd.env("CAREFIND_DB", db_path(dir));
    cmd.env_remove("CAREFIND_FORMAT");
    cmd.env_remove("CAREFIND_BATCH_SIZE");
    cmd.env_remove("CAREFIND_ENCODE_BATCH_SIZE");
    // Keep any real user config out of the picture.
    cmd.env("HOME", dir);
    cmd.env("XDG_CONFIG_HOME", dir.join(".config"));
    cmd
}

fn db_path(dir: &Path) -> PathBuf {
    dir.join("store").join("providers.db")
}

fn fixture() -> Value {
    json!([
        {
            "id": 1,
            "full_name": "Dr. Alice Smith",
            "specialty": "Cardiology",
            "address": {"street": "1 Main St", "city": "Austin", "state": "TX", "postal_code": "78701"},
            "accepting_new_patients": true,
            "rating": 4.8,
            "insurance_accepted": ["Aetna", "Cigna"],
            "languages": ["English", "Spanish"]
        },
        {
            "id": 2,
            "full_name": "Dr. Bob Jones",
            "specialty": "Pediatric Cardiology",
            "address": {"city": "Austin", "state": "TX"},
            "accepting_new_patients": false,
            "rating": 4.1,
            "insurance_accepted": ["Humana"],
            "languages": ["English"]
        },
        {
            "id": 3,
            "full_name": "Dr. Carol White",
            "specialty": "Dermatology",
            "address": {"city": "Dallas", "state": "TX"},
            "accepting_new_patients": true,
            "rating": null,
            "insurance_accepted": ["Aetna"],
            "languages": ["English", "French"]
        }
    ])
}

fn write_records(dir: &Path, name: &str, records: &Value) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, serde_json::to_vec(records).expect("serialize")).expect("write records");
    path
}

/// Create the store and ingest the fixture.
fn seeded_project() -> TempDir {
    let dir = tempfile::tempdir().expect("create temp dir");
    let file = write_records(dir.path(), "providers.json", &fixture());
    carefind_cmd(dir.path()).args(["init"]).assert().success();
    carefind_cmd(dir.path())
        .arg("ingest")
        .arg(&file)
        .assert()
        .success();
    dir
}

fn run_json(dir: &Path, args: &[&str]) -> Value {
    let output = carefind_cmd(dir)
        .args(args)
        .arg("--json")
        .output()
        .expect("command should not crash");
    assert!(
        output.status.success(),
        "{args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout should be JSON")
}

fn result_ids(payload: &Value) -> Vec<i64> {
    payload["results"]
        .as_array()
        .expect("results array")
        .iter()
        .map(|hit| hit["provider"]["id"].as_i64().expect("integer id"))
        .collect()
}

// ---------------------------------------------------------------------------
// Store lifecycle
// ---------------------------------------------------------------------------

#[test]
fn init_creates_store() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let report = run_json(dir.path(), &["init"]);

    assert_eq!(report["schema_version"], 2);
    assert!(db_path(dir.path()).exists());
}

#[test]
fn init_write_config_refuses_to_overwrite() {
    let dir = tempfile::tempdir().expect("create temp dir");
    carefind_cmd(dir.path())
        .args(["init", "--write-config"])
        .assert()
        .success();
    assert!(dir.path().join("carefind.toml").exists());

    carefind_cmd(dir.path())
        .args(["init", "--write-config"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn ingest_reports_counts() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let file = write_records(dir.path(), "providers.json", &fixture());
    let file = file.to_string_lossy().into_owned();

    let report = run_json(dir.path(), &["ingest", &file, "--batch-size", "2"]);
    assert_eq!(report["processed"], 3);
    assert_eq!(report["batches"], 2);
    assert_eq!(report["model"], "hashing-384");

    let stats = run_json(dir.path(), &["stats"]);
    assert_eq!(stats["providers"], 3);
    assert_eq!(stats["embedding_model"], "hashing-384");
    assert_eq!(stats["last_ingest_count"], 3);
}

#[test]
fn malformed_record_fails_with_code_and_writes_nothing() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let mut records = fixture();
    records[1]["rating"] = json!("excellent");
    let file = write_records(dir.path(), "bad.json", &records);

    let output = carefind_cmd(dir.path())
        .arg("ingest")
        .arg(&file)
        .arg("--json")
        .output()
        .expect("command should not crash");
    assert!(!output.status.success());

    let err: Value = serde_json::from_slice(&output.stderr).expect("stderr should be JSON");
    assert_eq!(err["error"]["error_code"], "E3001");
    let message = err["error"]["message"].as_str().expect("message");
    assert!(message.contains("position 1"), "{message}");
    assert!(message.contains("rating"), "{message}");

    let stats = run_json(dir.path(), &["stats"]);
    assert_eq!(stats["providers"], 0);
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

#[test]
fn search_by_city_returns_only_that_city() {
    let dir = seeded_project();
    let payload = run_json(dir.path(), &["search", "--city", "Austin"]);

    let mut ids = result_ids(&payload);
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 2]);
    assert_eq!(payload["count"], 2);
    assert_eq!(payload["query_text"], "Austin");
}

#[test]
fn search_combines_filters() {
    let dir = seeded_project();
    let payload = run_json(
        dir.path(),
        &[
            "search",
            "--specialty",
            "CARDIO",
            "--accepting",
            "true",
            "--language",
            "Spanish",
        ],
    );
    assert_eq!(result_ids(&payload), vec![1]);
}

#[test]
fn min_rating_excludes_unrated_providers() {
    let dir = seeded_project();
    let payload = run_json(dir.path(), &["search", "--min-rating", "0"]);

    let mut ids = result_ids(&payload);
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 2]);
}

#[test]
fn search_results_are_ordered_by_distance() {
    let dir = seeded_project();
    let payload = run_json(dir.path(), &["search", "--state", "TX", "-n", "3"]);

    let distances: Vec<f64> = payload["results"]
        .as_array()
        .expect("results")
        .iter()
        .map(|hit| hit["distance"].as_f64().expect("distance"))
        .collect();
    assert_eq!(distances.len(), 3);
    assert!(distances.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn backends_agree() {
    let dir = seeded_project();
    let auto = run_json(dir.path(), &["search", "--state", "TX", "--backend", "auto"]);
    let rust = run_json(dir.path(), &["search", "--state", "TX", "--backend", "rust"]);
    assert_eq!(result_ids(&auto), result_ids(&rust));
}

#[test]
fn no_matches_is_an_empty_success() {
    let dir = seeded_project();
    let payload = run_json(dir.path(), &["search", "--city", "Boston"]);
    assert_eq!(payload["count"], 0);
    assert_eq!(result_ids(&payload), Vec::<i64>::new());
}

#[test]
fn zero_limit_is_an_invalid_query() {
    let dir = seeded_project();
    let output = carefind_cmd(dir.path())
        .args(["search", "-n", "0", "--json"])
        .output()
        .expect("command should not crash");
    assert!(!output.status.success());

    let err: Value = serde_json::from_slice(&output.stderr).expect("stderr should be JSON");
    assert_eq!(err["error"]["error_code"], "E4001");
    assert!(output.stdout.is_empty());
}

#[test]
fn text_output_is_tab_separated() {
    let dir = seeded_project();
    carefind_cmd(dir.path())
        .args(["search", "--city", "Dallas", "--format", "text"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("3\t"))
        .stdout(predicate::str::contains("Dr. Carol White"));
}

// ---------------------------------------------------------------------------
// Tool bridge
// ---------------------------------------------------------------------------

#[test]
fn tool_bridge_answers_each_line() {
    let dir = seeded_project();
    let input = concat!(
        r#"{"id": 1, "arguments": {"city": "Dallas"}}"#,
        "\n",
        r#"{"id": 2, "arguments": {"limit": 0}}"#,
        "\n",
        "\n",
        r#"{"id": 3, "describe": true}"#,
        "\n",
    );

    let output = carefind_cmd(dir.path())
        .arg("tool")
        .write_stdin(input)
        .output()
        .expect("command should not crash");
    assert!(output.status.success());

    let lines: Vec<Value> = String::from_utf8(output.stdout)
        .expect("utf-8")
        .lines()
        .map(|line| serde_json::from_str(line).expect("response line is JSON"))
        .collect();
    assert_eq!(lines.len(), 3);

    assert_eq!(lines[0]["id"], 1);
    assert_eq!(lines[0]["ok"], true);
    assert_eq!(lines[0]["results"][0]["id"], 3);
    assert!(lines[0]["results"][0].get("distance").is_none());

    assert_eq!(lines[1]["ok"], false);
    assert_eq!(lines[1]["error"]["code"], "E4001");

    assert_eq!(lines[2]["tool"]["name"], "search_providers");
}

#[test]
fn tool_describe_prints_schema() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let output = carefind_cmd(dir.path())
        .args(["tool", "--describe"])
        .output()
        .expect("command should not crash");
    assert!(output.status.success());

    let descriptor: Value = serde_json::from_slice(&output.stdout).expect("JSON descriptor");
    assert_eq!(descriptor["name"], "search_providers");
    assert!(descriptor["input_schema"]["properties"]["min_rating"].is_object());
}

// ---------------------------------------------------------------------------
// Verify / config
// ---------------------------------------------------------------------------

#[test]
fn verify_is_clean_after_ingest() {
    let dir = seeded_project();
    let report = run_json(dir.path(), &["verify"]);
    assert_eq!(report["checked"], 3);
    assert_eq!(report["stale_ids"], json!([]));
    assert_eq!(report["model_matches"], true);
}

#[test]
fn verify_flags_rows_edited_behind_its_back() {
    let dir = seeded_project();
    let conn = rusqlite::Connection::open(db_path(dir.path())).expect("open db");
    conn.execute("UPDATE providers SET specialty = 'Oncology' WHERE id = 2", [])
        .expect("edit row");
    drop(conn);

    let output = carefind_cmd(dir.path())
        .args(["verify", "--json"])
        .output()
        .expect("command should not crash");
    assert_eq!(output.status.code(), Some(2));

    let report: Value = serde_json::from_slice(&output.stdout).expect("report JSON");
    assert_eq!(report["stale_ids"], json!([2]));
}

#[test]
fn config_reflects_flags_and_env() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let config = run_json(dir.path(), &["config"]);
    assert_eq!(config["embedding"]["model"], "hashing-384");

    let config = run_json(dir.path(), &["config", "--db", "elsewhere.db"]);
    assert_eq!(config["store"]["path"], "elsewhere.db");
}

#[test]
fn invalid_env_override_is_a_config_error() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let output = carefind_cmd(dir.path())
        .env("CAREFIND_BATCH_SIZE", "lots")
        .args(["config", "--json"])
        .output()
        .expect("command should not crash");
    assert!(!output.status.success());

    let err: Value = serde_json::from_slice(&output.stderr).expect("stderr should be JSON");
    assert_eq!(err["error"]["error_code"], "E5001");
}

#[test]
fn completions_are_generated() {
    let dir = tempfile::tempdir().expect("create temp dir");
    carefind_cmd(dir.path())
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("carefind"));
}
