use std::path::{Path, PathBuf};
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::str::contains;
use serde_json::{json, Value};
use tempfile::TempDir;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use boardsync_core::config::config_path_at;
use boardsync_core::{BoardId, Config};
use boardsync_store::{Params, RecordStore, SqliteStore};

fn boardsync_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("boardsync"));
    cmd.env("HOME", home)
        .env("USERPROFILE", home)
        .env_remove("BOARD_API_TOKEN")
        .env_remove("BOARD_ID_FRAGRANCES")
        .env_remove("BOARD_ID_ORDERS");
    cmd
}

/// Write a config whose store lives in `dir` and whose board is `api_url`.
fn write_config(dir: &Path, api_url: &str) -> PathBuf {
    let mut config = Config::default();
    config.board.api_url = api_url.to_string();
    config.store.path = dir.join("records.db");
    config.throttle.min_delay_ms = 0;
    for (area, board) in config.areas.iter_mut().zip(["100", "200"]) {
        area.board_id = BoardId::from(board);
    }
    let path = dir.join("boardsync.yaml");
    config.save(&path).expect("save config");
    path
}

async fn mock_empty_board() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"boards": [{"items_page": {"cursor": null, "items": []}}]}
        })))
        .mount(&server)
        .await;
    server
}

// ── config ──────────────────────────────────────────────────────

#[test]
fn config_init_writes_defaults_once() {
    let home = TempDir::new().expect("home");

    boardsync_cmd(home.path())
        .args(["config", "init"])
        .assert()
        .success()
        .stdout(contains("Wrote default config"));
    assert!(config_path_at(home.path()).exists());

    boardsync_cmd(home.path())
        .args(["config", "init"])
        .assert()
        .success()
        .stdout(contains("already exists"));
}

#[test]
fn config_show_prints_areas_with_env_overrides() {
    let home = TempDir::new().expect("home");
    boardsync_cmd(home.path())
        .args(["config", "init"])
        .assert()
        .success();

    boardsync_cmd(home.path())
        .args(["config", "show"])
        .env("BOARD_ID_ORDERS", "555777")
        .assert()
        .success()
        .stdout(contains("fragrances"))
        .stdout(contains("text_order_id"))
        .stdout(contains("555777"));
}

#[test]
fn missing_config_points_at_init() {
    let home = TempDir::new().expect("home");
    boardsync_cmd(home.path())
        .args(["config", "show"])
        .assert()
        .failure()
        .stderr(contains("boardsync config init"));
}

#[test]
fn explicit_config_path_is_used() {
    let home = TempDir::new().expect("home");
    let path = write_config(home.path(), "http://127.0.0.1:9/v2");

    boardsync_cmd(home.path())
        .args(["config", "show", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(contains("records.db"));
}

// ── sync / plan ─────────────────────────────────────────────────

#[test]
fn sync_requires_an_area_or_all() {
    let home = TempDir::new().expect("home");
    boardsync_cmd(home.path())
        .arg("sync")
        .assert()
        .failure()
        .stderr(contains("--all"));
}

#[test]
fn sync_without_a_token_fails() {
    let home = TempDir::new().expect("home");
    let path = write_config(home.path(), "http://127.0.0.1:9/v2");

    boardsync_cmd(home.path())
        .args(["sync", "--all", "--config"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(contains("BOARD_API_TOKEN"));
}

#[tokio::test(flavor = "multi_thread")]
async fn plan_lists_records_missing_from_the_board() {
    let home = TempDir::new().expect("home");
    let server = mock_empty_board().await;
    let path = write_config(home.path(), &format!("{}/v2", server.uri()));

    let config = Config::load(&path).expect("load");
    let store = SqliteStore::open(&config.store).expect("store");
    let mut params = Params::new();
    params.insert("name".into(), json!("Rose"));
    params.insert("category".into(), Value::Null);
    store.query("AddFragrance", &params).await.expect("insert");
    drop(store);

    let home_path = home.path().to_path_buf();
    let output = tokio::task::spawn_blocking(move || {
        boardsync_cmd(&home_path)
            .args(["plan", "fragrances", "--json", "--config"])
            .arg(&path)
            .env("BOARD_API_TOKEN", "test-token")
            .output()
            .expect("run plan")
    })
    .await
    .expect("join");

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let plans: Value = serde_json::from_slice(&output.stdout).expect("plan JSON");
    assert_eq!(plans[0]["area"], "fragrances");
    assert_eq!(plans[0]["records"], 1);
    assert_eq!(plans[0]["changes"]["to_create"][0]["name"], "Rose");
    assert_eq!(plans[0]["changes"]["to_delete"], json!([]));
}

#[tokio::test(flavor = "multi_thread")]
async fn dry_run_of_an_unknown_area_fails_without_mutating() {
    let home = TempDir::new().expect("home");
    let server = mock_empty_board().await;
    let path = write_config(home.path(), &format!("{}/v2", server.uri()));

    let home_path = home.path().to_path_buf();
    let output = tokio::task::spawn_blocking(move || {
        boardsync_cmd(&home_path)
            .args(["sync", "candles", "--dry-run", "--config"])
            .arg(&path)
            .env("BOARD_API_TOKEN", "test-token")
            .output()
            .expect("run sync")
    })
    .await
    .expect("join");

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown area 'candles'"));
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}
