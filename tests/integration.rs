use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn csync_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("csync");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    // Port 9 (discard) refuses connections, so any upstream call fails fast.
    let config_content = format!(
        r#"[db]
path = "{}/data/congress.sqlite"

[api]
base_url = "http://127.0.0.1:9"
request_delay_ms = 0
max_retries = 1
base_delay_ms = 1
timeout_secs = 2

[archive]
dir = "{}/raw"
retention_days = 30
"#,
        root.display(),
        root.display()
    );

    let config_path = config_dir.join("csync.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_csync(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = csync_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run csync binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_csync(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/congress.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_csync(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_csync(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_csync(&tmp.path().join("nope.toml"), &["status"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"), "stderr: {}", stderr);
}

#[test]
fn test_status_on_fresh_database() {
    let (_tmp, config_path) = setup_test_env();
    run_csync(&config_path, &["init"]);

    let (stdout, stderr, success) = run_csync(&config_path, &["status"]);
    assert!(success, "status failed: {}", stderr);
    assert!(stdout.contains("bills"));
    assert!(stdout.contains("No syncs recorded yet."));
}

#[test]
fn test_sync_fails_when_upstream_unreachable() {
    let (_tmp, config_path) = setup_test_env();
    run_csync(&config_path, &["init"]);

    let (stdout, stderr, success) = run_csync(&config_path, &["sync", "bills", "--days", "3"]);
    assert!(!success, "sync should fail: stdout={}", stdout);
    assert!(stderr.contains("sync bill failed"), "stderr: {}", stderr);

    // The failed run is visible in the status report.
    let (stdout, _, success) = run_csync(&config_path, &["status"]);
    assert!(success);
    assert!(stdout.contains("failed"), "status: {}", stdout);
}

#[test]
fn test_validate_text_and_json() {
    let (tmp, config_path) = setup_test_env();
    run_csync(&config_path, &["init"]);

    let (stdout, stderr, success) = run_csync(&config_path, &["validate"]);
    assert!(success, "validate failed: {}", stderr);
    assert!(stdout.contains("Bill Validation Results"));
    assert!(stdout.contains("Missing Summaries (0):"));

    let report = tmp.path().join("missing.json");
    let (stdout, _, success) = run_csync(
        &config_path,
        &["validate", "--format", "json", "--output", report.to_str().unwrap()],
    );
    assert!(success);
    assert!(stdout.contains("ok"));
    let doc: serde_json::Value = serde_json::from_str(&fs::read_to_string(&report).unwrap()).unwrap();
    assert_eq!(doc["categories"].as_array().unwrap().len(), 6);
    assert_eq!(doc["categories"][0]["category"], "text_versions");
}

#[test]
fn test_bio_import_unknown_member() {
    let (tmp, config_path) = setup_test_env();
    run_csync(&config_path, &["init"]);

    let bio = tmp.path().join("bio.json");
    fs::write(
        &bio,
        r#"[{"bioguideId": "Z999999", "profileText": "Served.", "bioDirectory": "ZED, Zoe", "fetchDate": "2024-01-01"}]"#,
    )
    .unwrap();

    let (stdout, stderr, success) = run_csync(&config_path, &["bio", "import", bio.to_str().unwrap()]);
    assert!(success, "bio import failed: {}", stderr);
    assert!(stdout.contains("records: 1"));
    assert!(stdout.contains("unknown members: 1"));

    let (stdout, _, _) = run_csync(&config_path, &["status"]);
    assert!(stdout.contains("member/bio"));
    assert!(stdout.contains("completed_with_errors"));
}

#[test]
fn test_batch_requires_selector() {
    let (_tmp, config_path) = setup_test_env();
    run_csync(&config_path, &["init"]);

    let (_, stderr, success) = run_csync(&config_path, &["batch", "bills"]);
    assert!(!success);
    assert!(stderr.contains("--missing"));
}

#[test]
fn test_batch_dry_run_lists_nothing_on_empty_store() {
    let (_tmp, config_path) = setup_test_env();
    run_csync(&config_path, &["init"]);

    let (stdout, stderr, success) = run_csync(
        &config_path,
        &["batch", "bills", "--missing", "actions", "--dry-run"],
    );
    assert!(success, "batch failed: {}", stderr);
    assert!(stdout.contains("dry-run"));
    assert!(stdout.contains("selected: 0"));

    let (stdout, _, success) = run_csync(
        &config_path,
        &["batch", "members", "--missing", "biography"],
    );
    assert!(success);
    assert!(stdout.contains("bio import"));
}
