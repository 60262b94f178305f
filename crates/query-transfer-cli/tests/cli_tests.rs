//! CLI integration tests for query-transfer.
//!
//! These tests cover argument parsing, help output, configuration checks
//! and exit codes. None of them opens a database connection.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

/// Get a command for the query-transfer binary.
fn cmd() -> Command {
    let mut cmd = Command::cargo_bin("query-transfer").unwrap();
    cmd.env_remove("QT_SOURCE_PASSWORD")
        .env_remove("QT_TARGET_PASSWORD");
    cmd
}

fn config_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{}", contents).unwrap();
    file
}

const FULL_CONFIG: &str = r#"
source:
  connection_string: "DSN=hive"
  user: hive
  password: hive_secret
target:
  connection_string: "DSN=oracle"
  user: scott
  password: tiger_secret
  schema: ANALYTICS
  table: DAILY_TOTALS
transfer:
  query: "SELECT region, SUM(amount) FROM sales GROUP BY region"
  insert_batch_size: 250
"#;

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
fn test_help_shows_all_commands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("check-config"));
}

#[test]
fn test_run_subcommand_help() {
    cmd()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--target-table"))
        .stdout(predicate::str::contains("--query-file"))
        .stdout(predicate::str::contains("--insert-batch-size"))
        .stdout(predicate::str::contains("--commit-batch-count"))
        .stdout(predicate::str::contains("--no-retry-prompt"))
        .stdout(predicate::str::contains("--output-json"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("query-transfer"));
}

#[test]
fn test_log_flags_have_defaults() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("[default: text]"))
        .stdout(predicate::str::contains("[default: info]"));
}

#[test]
fn test_no_subcommand_shows_usage() {
    cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}

#[test]
fn test_query_and_query_file_conflict() {
    cmd()
        .args(["check-config", "--query", "SELECT 1", "--query-file", "q.hql"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("cannot be used with"));
}

// =============================================================================
// Exit Code Tests
// =============================================================================

#[test]
fn test_missing_options_exit_with_code_1() {
    cmd()
        .args(["check-config", "--source-user", "hive"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("target.connection_string"))
        .stderr(predicate::str::contains("Error:").count(1));
}

#[test]
fn test_password_prompt_without_terminal_exits_with_code_7() {
    let file = config_file(
        &FULL_CONFIG
            .replace("  password: hive_secret\n", "")
            .replace("  password: tiger_secret\n", ""),
    );
    cmd()
        .args(["--config", file.path().to_str().unwrap(), "run"])
        .assert()
        .code(7)
        .stderr(predicate::str::contains("not a terminal"));
}

#[test]
fn test_run_without_table_fails_before_prompting() {
    cmd()
        .args([
            "run",
            "--source-user",
            "hive",
            "--target",
            "DSN=oracle",
            "--target-user",
            "scott",
            "--query",
            "SELECT 1",
        ])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("target.table"));
}

#[test]
fn test_zero_batch_size_exits_with_code_1() {
    let file = config_file(FULL_CONFIG);
    cmd()
        .args(["--config", file.path().to_str().unwrap()])
        .args(["check-config", "--insert-batch-size", "0"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("insert_batch_size"));
}

#[test]
fn test_missing_config_file_exits_with_code_7() {
    cmd()
        .args(["--config", "nonexistent_config_file.yaml", "check-config"])
        .assert()
        .code(7);
}

#[test]
fn test_invalid_yaml_exits_with_code_1() {
    let file = config_file("invalid: yaml: content: [");
    cmd()
        .args(["--config", file.path().to_str().unwrap(), "check-config"])
        .assert()
        .code(1);
}

#[test]
fn test_missing_query_file_exits_with_code_7() {
    let file = config_file(FULL_CONFIG);
    cmd()
        .args(["--config", file.path().to_str().unwrap()])
        .args(["check-config", "--query-file", "/nonexistent/query.hql"])
        .assert()
        .code(7);
}

// =============================================================================
// check-config Tests
// =============================================================================

#[test]
fn test_check_config_prints_resolved_options() {
    let file = config_file(FULL_CONFIG);
    cmd()
        .args(["--config", file.path().to_str().unwrap(), "check-config"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ANALYTICS.DAILY_TOTALS"))
        .stdout(predicate::str::contains("\"insert_batch_size\": 250"))
        .stdout(predicate::str::contains("\"commit_batch_count\": 20"))
        .stdout(predicate::str::contains("tiger_secret").not())
        .stdout(predicate::str::contains("hive_secret").not());
}

#[test]
fn test_flags_override_config_file() {
    let file = config_file(FULL_CONFIG);
    cmd()
        .args(["--config", file.path().to_str().unwrap()])
        .args([
            "check-config",
            "--target-table",
            "WEEKLY_TOTALS",
            "--commit-batch-count",
            "5",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("ANALYTICS.WEEKLY_TOTALS"))
        .stdout(predicate::str::contains("\"commit_batch_count\": 5"));
}

#[test]
fn test_query_file_replaces_inline_query() {
    let config = config_file(FULL_CONFIG);
    let query = config_file("SELECT id FROM events;\n");
    cmd()
        .args(["--config", config.path().to_str().unwrap()])
        .args(["check-config", "--query-file", query.path().to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("SELECT id FROM events"))
        .stdout(predicate::str::contains("events;").not());
}

#[test]
fn test_check_config_from_flags_only() {
    cmd()
        .args([
            "check-config",
            "--source-user",
            "hive",
            "--target",
            "DSN=oracle",
            "--target-user",
            "scott",
            "--target-table",
            "T1",
            "--query",
            "SELECT 1",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Cloudera ODBC Driver for Apache Hive"))
        .stdout(predicate::str::contains("\"insert_batch_size\": 500"));
}
