#![allow(clippy::uninlined_format_args)]

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde_json::Value;
use ulid::Ulid;

fn bel_binary_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_bel"))
}

fn bel_output(db_path: &Path, args: &[&str]) -> Output {
    let output = Command::new(bel_binary_path())
        .arg("--db")
        .arg(db_path)
        .args(args)
        .output();
    match output {
        Ok(value) => value,
        Err(err) => panic!("failed to run bel: {err}"),
    }
}

fn bel_json(db_path: &Path, args: &[&str]) -> Value {
    let output = bel_output(db_path, args);
    assert!(
        output.status.success(),
        "bel {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    match serde_json::from_slice(&output.stdout) {
        Ok(value) => value,
        Err(err) => panic!(
            "bel {:?} printed invalid JSON: {err}\n{}",
            args,
            String::from_utf8_lossy(&output.stdout)
        ),
    }
}

struct TempDb {
    path: PathBuf,
}

impl TempDb {
    fn new() -> Self {
        Self {
            path: std::env::temp_dir().join(format!("bel-test-{}.sqlite3", Ulid::new())),
        }
    }
}

impl Drop for TempDb {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let mut candidate = self.path.clone().into_os_string();
            candidate.push(suffix);
            let _ = std::fs::remove_file(candidate);
        }
    }
}

fn str_field<'a>(value: &'a Value, field: &str) -> &'a str {
    match value.get(field).and_then(Value::as_str) {
        Some(text) => text,
        None => panic!("expected string field {field} in {value}"),
    }
}

#[test]
fn brand_init_and_show_roundtrip() {
    let db = TempDb::new();

    let created = bel_json(&db.path, &["brand", "init", "--plan", "growth"]);
    let brand_id = str_field(&created, "brand_id").to_string();
    assert_eq!(created["plan"], "growth");
    assert_eq!(created["version_history"].as_array().map(Vec::len), Some(1));

    let shown = bel_json(&db.path, &["brand", "show", "--brand-id", &brand_id]);
    assert_eq!(shown["plan"], "growth");
    assert_eq!(str_field(&shown, "brand_id"), brand_id);
}

#[test]
fn performance_loop_through_the_binary() {
    let db = TempDb::new();

    let created = bel_json(&db.path, &["brand", "init", "--plan", "scale"]);
    let brand_id = str_field(&created, "brand_id").to_string();

    let variant_json = format!(
        r#"{{"id":"{}","rendered_content":"Try it today.","frameworks_used":["AIDA"],"tone_markers":["urgent"],"structural_signature":"hook-body-cta"}}"#,
        Ulid::new()
    );
    let sample_json = format!(
        r#"{{"variant_id":"{}","impressions":10000,"clicks":200,"conversions":9,"spend":100.0,"revenue":400.0}}"#,
        Ulid::new()
    );

    let patterns = bel_json(
        &db.path,
        &[
            "perf",
            "ingest",
            "--brand-id",
            &brand_id,
            "--variant-json",
            &variant_json,
            "--sample-json",
            &sample_json,
        ],
    );
    let entries = match patterns.as_array() {
        Some(value) => value,
        None => panic!("expected a pattern array: {patterns}"),
    };
    // One framework, one tone marker, one structural signature.
    assert_eq!(entries.len(), 3);
    for entry in entries {
        assert_eq!(entry["sample_size"], 1);
    }

    let listed = bel_json(&db.path, &["patterns", "list", "--brand-id", &brand_id]);
    assert_eq!(listed.as_array().map(Vec::len), Some(3));

    // A single observation clears no merge threshold.
    let applied = bel_json(&db.path, &["patterns", "apply", "--brand-id", &brand_id]);
    assert_eq!(applied["merged"], false);
}

#[test]
fn event_journal_and_summary_through_the_binary() {
    let db = TempDb::new();

    let created = bel_json(&db.path, &["brand", "init"]);
    let brand_id = str_field(&created, "brand_id").to_string();

    let recorded = bel_json(
        &db.path,
        &[
            "events",
            "record",
            "--brand-id",
            &brand_id,
            "--event",
            "strategy-update",
            "--source",
            "campaign_service",
            "--action",
            "strategy rollout",
            "--after-json",
            r#"{"strategies":["evergreen"]}"#,
            "--impact-area",
            "market_positioning",
            "--delta",
            "0.2",
            "--confidence",
            "0.9",
            "--samples",
            "150",
        ],
    );
    assert_eq!(recorded["event_type"], "strategy_update");
    assert!(recorded["event_seq"].as_i64().is_some_and(|seq| seq > 0));

    let listed = bel_json(&db.path, &["events", "list", "--brand-id", &brand_id]);
    assert_eq!(listed.as_array().map(Vec::len), Some(1));

    let notable = bel_json(
        &db.path,
        &["events", "significant", "--brand-id", &brand_id],
    );
    assert_eq!(notable.as_array().map(Vec::len), Some(1));

    let summary = bel_json(&db.path, &["brand", "summary", "--brand-id", &brand_id]);
    assert_eq!(summary["total_changes"], 1);
    assert_eq!(summary["performance_trend"], "improving");
    assert!(summary["active_strategies"]
        .as_array()
        .is_some_and(|strategies| strategies.iter().any(|s| s == "evergreen")));
}

#[test]
fn tuning_is_rejected_on_the_starter_plan() {
    let db = TempDb::new();

    let created = bel_json(&db.path, &["brand", "init", "--plan", "starter"]);
    let brand_id = str_field(&created, "brand_id").to_string();

    let output = bel_output(
        &db.path,
        &[
            "tune",
            "apply",
            "--brand-id",
            &brand_id,
            "--voice-scale",
            "0.5",
            "--cta-style",
            "soft",
            "--positioning",
            "value",
            "--applied-by",
            "admin@example.com",
        ],
    );
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("starter"), "unexpected stderr: {stderr}");
}

#[test]
fn tone_check_requires_a_fingerprint() {
    let db = TempDb::new();

    let created = bel_json(&db.path, &["brand", "init"]);
    let brand_id = str_field(&created, "brand_id").to_string();

    let output = bel_output(
        &db.path,
        &[
            "tone",
            "check",
            "--brand-id",
            &brand_id,
            "--content",
            "Hello there.",
        ],
    );
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("fingerprint"),
        "unexpected stderr: {stderr}"
    );
}

#[test]
fn model_update_bumps_the_version() {
    let db = TempDb::new();

    let created = bel_json(&db.path, &["brand", "init", "--plan", "growth"]);
    let brand_id = str_field(&created, "brand_id").to_string();

    let report = bel_json(
        &db.path,
        &[
            "model",
            "update",
            "--brand-id",
            &brand_id,
            "--updates-json",
            r#"{"content_formats":{"video":0.9}}"#,
        ],
    );
    assert_eq!(report["version"], 2);
    assert!(report["changes"]
        .as_array()
        .is_some_and(|changes| changes.iter().any(|c| c == "content_formats.video")));

    let versions = bel_json(&db.path, &["model", "versions", "--brand-id", &brand_id]);
    assert_eq!(versions.as_array().map(Vec::len), Some(2));
}
