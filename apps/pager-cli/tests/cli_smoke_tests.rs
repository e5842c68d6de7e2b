//! CLI smoke tests for the pager-cli binary
//!
//! These run the compiled binary and check its JSON output and exit codes.

use serde_json::Value as Json;
use std::path::Path;
use std::process::{Command, Output, Stdio};
use tempfile::TempDir;

/// Helper to run the pager-cli binary with given arguments
fn run_pager_cli(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_pager-cli"))
        .args(args)
        .env_remove("RUST_LOG")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .expect("Failed to execute pager-cli")
}

fn stdout_json(output: &Output) -> Json {
    assert!(
        output.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout should be JSON")
}

fn write_products(dir: &Path) -> String {
    let path = dir.join("products.json");
    let rows = serde_json::json!([
        {"id": 1, "name": "apple", "price": 30},
        {"id": 2, "name": "banana", "price": 10},
        {"id": 3, "name": "cherry", "price": 30},
        {"id": 4, "name": "date", "price": 20},
        {"id": 5, "name": "elderberry", "price": 5}
    ]);
    std::fs::write(&path, rows.to_string()).unwrap();
    path.to_string_lossy().to_string()
}

fn ids(page: &Json) -> Vec<i64> {
    page["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|row| row["id"].as_i64().unwrap())
        .collect()
}

#[test]
fn test_cli_help_command() {
    let output = run_pager_cli(&["--help"]);

    assert!(output.status.success(), "Help command should succeed");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Usage:"), "Should contain usage information");
    for sub in ["filter", "order", "cursor", "page", "check"] {
        assert!(stdout.contains(sub), "Should contain '{sub}' subcommand");
    }
    assert!(stdout.contains("--config"), "Should mention config option");
}

#[test]
fn test_cli_version_command() {
    let output = run_pager_cli(&["--version"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("pager-cli"));
    assert!(stdout.contains("0.1.0"));
}

#[test]
fn test_cli_invalid_command() {
    let output = run_pager_cli(&["frobnicate"]);
    assert!(!output.status.success(), "Invalid command should fail");
}

#[test]
fn test_cli_no_arguments() {
    let output = run_pager_cli(&[]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("no command given"));
}

#[test]
fn test_cli_config_missing_file() {
    let output = run_pager_cli(&["--config", "/nonexistent/pager.yaml", "check"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("config file not found"));
}

#[test]
fn test_cli_filter_reports_fields_and_fingerprint() {
    let output = run_pager_cli(&[
        "filter",
        "price > 10 && name.startsWith('a')",
        "--field",
        "price=i64",
        "--field",
        "name=string",
    ]);
    let out = stdout_json(&output);

    assert_eq!(out["fields"], serde_json::json!(["name", "price"]));
    assert!(out["nodes"].as_u64().unwrap() >= 5);
    let fingerprint = out["fingerprint"].as_str().unwrap();
    assert_eq!(fingerprint.len(), 16);
}

#[test]
fn test_cli_filter_fingerprint_ignores_spacing() {
    let a = stdout_json(&run_pager_cli(&["filter", "price>10", "--field", "price=int"]));
    let b = stdout_json(&run_pager_cli(&["filter", "  price  >  10 ", "--field", "price=int"]));
    assert_eq!(a["fingerprint"], b["fingerprint"]);
}

#[test]
fn test_cli_filter_unknown_field() {
    let output = run_pager_cli(&["filter", "secret == 1", "--field", "price=i64"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("[FILTER_INVALID]"), "stderr: {stderr}");
}

#[test]
fn test_cli_filter_syntax_error() {
    let output = run_pager_cli(&["filter", "price >", "--field", "price=i64"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("[FILTER_PARSE_ERROR]"), "stderr: {stderr}");
}

#[test]
fn test_cli_bad_field_argument() {
    let output = run_pager_cli(&["order", "name", "--field", "name"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("NAME=KIND"));
}

#[test]
fn test_cli_order_appends_tiebreaker() {
    let out = stdout_json(&run_pager_cli(&[
        "order",
        "-created_at",
        "--field",
        "created_at=datetime",
        "--field",
        "id=i64",
    ]));
    assert_eq!(out["signed"], "-created_at,+id");
    assert_eq!(out["order"], "created_at desc, id asc");
}

#[test]
fn test_cli_cursor_encode_then_decode() {
    let encoded = stdout_json(&run_pager_cli(&[
        "cursor",
        "encode",
        "--order",
        "-price,+id",
        "--values",
        r#"{"price": 30, "id": 3}"#,
        "--prev",
    ]));
    let token = encoded["cursor"].as_str().unwrap().to_string();
    assert!(!token.contains('='), "token should be unpadded");

    let decoded = stdout_json(&run_pager_cli(&["cursor", "decode", &token]));
    assert_eq!(decoded["ordering"], "-price,+id");
    assert_eq!(decoded["direction"], "prev");
    assert_eq!(decoded["values"]["price"], 30);
    assert_eq!(decoded["values"]["id"], 3);
    assert!(decoded["filter_hash"].is_null());
}

#[test]
fn test_cli_cursor_decode_garbage() {
    let output = run_pager_cli(&["cursor", "decode", "!!!"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("[CURSOR_INVALID_BASE64]"), "stderr: {stderr}");
}

#[test]
fn test_cli_page_walks_forward_and_back() {
    let dir = TempDir::new().unwrap();
    let data = write_products(dir.path());

    let first = stdout_json(&run_pager_cli(&[
        "page", "--data", &data, "--order", "-price", "--limit", "2",
    ]));
    assert_eq!(ids(&first), vec![1, 3]);
    assert_eq!(first["has_next"], true);
    assert_eq!(first["has_prev"], false);
    assert!(first["prev_cursor"].is_null());

    let next = first["next_cursor"].as_str().unwrap();
    let second = stdout_json(&run_pager_cli(&[
        "page", "--data", &data, "--limit", "2", "--cursor", next,
    ]));
    assert_eq!(ids(&second), vec![4, 2]);
    assert_eq!(second["has_prev"], true);

    let next = second["next_cursor"].as_str().unwrap();
    let third = stdout_json(&run_pager_cli(&[
        "page", "--data", &data, "--limit", "2", "--cursor", next,
    ]));
    assert_eq!(ids(&third), vec![5]);
    assert_eq!(third["has_next"], false);
    assert!(third["next_cursor"].is_null());

    let prev = third["prev_cursor"].as_str().unwrap();
    let back = stdout_json(&run_pager_cli(&[
        "page", "--data", &data, "--limit", "2", "--cursor", prev,
    ]));
    assert_eq!(ids(&back), vec![4, 2]);
}

#[test]
fn test_cli_page_filter_and_total() {
    let dir = TempDir::new().unwrap();
    let data = write_products(dir.path());

    let out = stdout_json(&run_pager_cli(&[
        "page",
        "--data",
        &data,
        "--filter",
        "price >= 20",
        "--order",
        "name",
        "--limit",
        "2",
        "--total",
    ]));
    assert_eq!(ids(&out), vec![1, 3]);
    assert_eq!(out["total_size"], 3);
    assert_eq!(out["has_next"], true);
}

#[test]
fn test_cli_page_cursor_rejects_other_filter() {
    let dir = TempDir::new().unwrap();
    let data = write_products(dir.path());

    let first = stdout_json(&run_pager_cli(&[
        "page", "--data", &data, "--filter", "price > 5", "--limit", "1",
    ]));
    let next = first["next_cursor"].as_str().unwrap();

    let output = run_pager_cli(&[
        "page", "--data", &data, "--filter", "price > 6", "--cursor", next,
    ]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("[FILTER_MISMATCH]"), "stderr: {stderr}");
}

#[test]
fn test_cli_max_page_size_override() {
    let dir = TempDir::new().unwrap();
    let data = write_products(dir.path());

    let out = stdout_json(&run_pager_cli(&[
        "--max-page-size",
        "3",
        "page",
        "--data",
        &data,
        "--limit",
        "50",
    ]));
    assert_eq!(ids(&out), vec![1, 2, 3]);
}

#[test]
fn test_cli_print_config() {
    let output = run_pager_cli(&["--print-config"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("paging:"));
    assert!(stdout.contains("tiebreaker: id"));
}

#[test]
fn test_cli_check_with_config() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("pager.yaml");
    std::fs::write(
        &config_path,
        r#"
paging:
  default_page_size: 10
  max_page_size: 50
fields:
  id: i64
  name: string
  price: decimal
"#,
    )
    .unwrap();

    let out = stdout_json(&run_pager_cli(&[
        "--config",
        config_path.to_str().unwrap(),
        "check",
    ]));
    assert_eq!(out["status"], "ok");
    assert_eq!(out["fields"], 3);
    assert_eq!(out["max_page_size"], 50);
}

#[test]
fn test_cli_check_rejects_unknown_tiebreaker() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("pager.yaml");
    std::fs::write(
        &config_path,
        "paging:\n  tiebreaker: pk\nfields:\n  name: string\n",
    )
    .unwrap();

    let output = run_pager_cli(&["-c", config_path.to_str().unwrap(), "check"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("tiebreaker 'pk'"));
}

#[test]
fn test_cli_config_invalid_yaml() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("broken.yaml");
    std::fs::write(&config_path, "paging: [not, a, map").unwrap();

    let output = run_pager_cli(&["--config", config_path.to_str().unwrap(), "check"]);
    assert!(!output.status.success());
}
