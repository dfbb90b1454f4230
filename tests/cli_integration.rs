#![allow(deprecated)]

/// Binary-level tests for configuration handling and the history commands
///
/// Every invocation points `--storage-path` at a temporary SQLite file so the
/// user's data directory is never touched.
use assert_cmd::Command;
use chrono::{TimeZone, Utc};
use predicates::prelude::*;
use streamforge::storage::{ChatSession, Message, SessionDocuments};
use tempfile::TempDir;

mod common;

fn streamforge(config: &std::path::Path, db: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("streamforge").unwrap();
    cmd.env("NO_COLOR", "1")
        .env_remove("STREAMFORGE_HISTORY_PAGE_SIZE")
        .env_remove("STREAMFORGE_SESSION_MESSAGE_PAGE_SIZE")
        .env_remove("STREAMFORGE_STORAGE_BACKEND")
        .env_remove("STREAMFORGE_BASE_URL")
        .env_remove("STREAMFORGE_PROVIDER")
        .arg("--config")
        .arg(config)
        .arg("--storage-path")
        .arg(db);
    cmd
}

#[test]
fn test_help_lists_commands() {
    let mut cmd = Command::cargo_bin("streamforge").unwrap();
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("history"));
}

#[test]
fn test_history_list_on_empty_store() {
    let tmp = TempDir::new().unwrap();
    let config = tmp.path().join("missing.yaml");
    let db = tmp.path().join("sessions.db");

    streamforge(&config, &db)
        .arg("history")
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No chat history found."));
}

#[tokio::test]
async fn test_history_list_and_show_stored_session() {
    let (storage, tmp) = common::create_temp_storage();
    let at = Utc.with_ymd_and_hms(2024, 3, 3, 10, 30, 0).unwrap();
    let session = ChatSession {
        id: "s-cli".to_string(),
        user_id: Some("alice".to_string()),
        messages: vec![Message::user("How do lifetimes work?"), Message::bot("Carefully.")],
        created_at: at,
        last_updated: at,
    };
    storage.save(&session).await.unwrap();
    let db = storage.db_path().to_path_buf();
    let config = tmp.path().join("missing.yaml");

    streamforge(&config, &db)
        .args(["history", "list", "--user", "alice"])
        .assert()
        .success()
        .stdout(predicate::str::contains("3rd March 2024"))
        .stdout(predicate::str::contains("s-cli"))
        .stdout(predicate::str::contains("How do lifetimes work?"));

    streamforge(&config, &db)
        .args(["history", "show", "s-cli"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Carefully."));
}

#[test]
fn test_history_show_unknown_session_fails() {
    let tmp = TempDir::new().unwrap();
    let config = tmp.path().join("missing.yaml");
    let db = tmp.path().join("sessions.db");

    streamforge(&config, &db)
        .args(["history", "show", "ghost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Not found"));
}

#[test]
fn test_invalid_page_size_is_rejected() {
    let (temp_dir, config_path) =
        common::temp_config_file("server:\n  history_page_size: 0\n");
    let db = temp_dir.path().join("sessions.db");

    streamforge(&config_path, &db)
        .args(["history", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("must be greater than 0"));
}
