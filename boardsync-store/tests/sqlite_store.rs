use boardsync_core::StoreConfig;
use boardsync_store::{Params, RecordStore, SqliteStore, StoreError};
use serde_json::json;
use tempfile::TempDir;

fn file_config(dir: &TempDir) -> StoreConfig {
    StoreConfig {
        path: dir.path().join("records.db"),
        ..StoreConfig::default()
    }
}

#[tokio::test]
async fn file_store_persists_across_reopen() {
    let dir = TempDir::new().expect("tempdir");
    let config = file_config(&dir);

    {
        let store = SqliteStore::open(&config).expect("open");
        let mut params = Params::new();
        params.insert("name".into(), json!("Order for Ada"));
        params.insert("number_of_kits".into(), json!(2));
        let outcome = store.query("CreateOrder", &params).await.expect("create");
        assert_eq!(outcome.generated_id, Some(1));
    }

    let reopened = SqliteStore::open(&config).expect("reopen");
    let rows = reopened
        .query("GetAllOrders", &Params::new())
        .await
        .expect("list")
        .rows;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["number_of_kits"], json!(2));
    assert_eq!(rows[0]["status"], json!("received"), "status defaults on insert");
}

#[tokio::test]
async fn link_then_delete_by_board_item_id() {
    let store = SqliteStore::open_in_memory(&StoreConfig::default()).expect("open");
    let mut params = Params::new();
    params.insert("name".into(), json!("Rose"));
    let id = store
        .query("AddFragrance", &params)
        .await
        .expect("create")
        .generated_id
        .expect("generated id");

    let mut link = Params::new();
    link.insert("id".into(), json!(id));
    link.insert("board_item_id".into(), json!("9001"));
    assert_eq!(
        store.query("LinkFragranceBoardItem", &link).await.expect("link").affected,
        1
    );

    let mut delete = Params::new();
    delete.insert("board_item_id".into(), json!("9001"));
    assert_eq!(
        store.query("DeleteFragrance", &delete).await.expect("delete").affected,
        1
    );
    assert_eq!(
        store.query("DeleteFragrance", &delete).await.expect("delete again").affected,
        0,
        "second delete finds nothing"
    );
}

#[tokio::test]
async fn failing_statement_names_the_operation() {
    let mut config = StoreConfig::default();
    config
        .operations
        .insert("Broken".into(), "SELECT * FROM no_such_table".into());
    let store = SqliteStore::open_in_memory(&config).expect("open");

    let err = store.query("Broken", &Params::new()).await.unwrap_err();
    assert!(matches!(err, StoreError::Query { .. }), "got: {err}");
    assert!(err.to_string().contains("Broken"));
}

#[test]
fn invalid_schema_is_reported() {
    let config = StoreConfig {
        schema: Some("CREATE TABLE (".into()),
        ..StoreConfig::default()
    };
    let err = SqliteStore::open_in_memory(&config).err().expect("schema error");
    assert!(matches!(err, StoreError::Schema(_)));
}
