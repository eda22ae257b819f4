use std::sync::Arc;

use serde_json::{json, Value};

use boardsync_board::{MemoryBoard, Mutation};
use boardsync_core::{BoardId, BoardItem, Config, ExternalId, RecordId, StoreConfig};
use boardsync_store::{Params, RecordStore, SqliteStore};
use boardsync_sync::{
    IdempotencyGuard, MemoryGuard, RecordGateway, ReconcileJob, SyncError,
};

struct Harness {
    config: Config,
    store: Arc<SqliteStore>,
    board: MemoryBoard,
    guard: Arc<MemoryGuard>,
    job: ReconcileJob,
}

impl Harness {
    fn new() -> Self {
        let mut config = Config::default();
        config.throttle.min_delay_ms = 0;
        for (area, board) in config.areas.iter_mut().zip(["100", "200"]) {
            area.board_id = BoardId::from(board);
        }
        let store = Arc::new(SqliteStore::open_in_memory(&StoreConfig::default()).unwrap());
        let board = MemoryBoard::new(2);
        let guard = Arc::new(MemoryGuard::new());
        let job = ReconcileJob::from_config(
            &config,
            store.clone(),
            Arc::new(board.clone()),
            guard.clone(),
        );
        Self {
            config,
            store,
            board,
            guard,
            job,
        }
    }

    fn fragrance_board(&self) -> BoardId {
        BoardId::from("100")
    }

    fn gateway(&self, area: &str) -> RecordGateway {
        RecordGateway::new(self.store.clone(), self.config.area(area).unwrap().clone())
    }

    async fn add_fragrance(&self, name: &str, category: Option<&str>) {
        let mut params = Params::new();
        params.insert("name".into(), json!(name));
        params.insert("category".into(), category.map_or(Value::Null, |c| json!(c)));
        self.store.query("AddFragrance", &params).await.unwrap();
    }
}

#[tokio::test]
async fn new_record_is_created_on_the_board_and_linked_back() {
    let h = Harness::new();
    h.add_fragrance("Rose", None).await;

    let summary = h.job.run("fragrances").await.expect("run");
    let report = &summary.areas[0];
    assert_eq!((report.created, report.updated, report.deleted), (1, 0, 0));
    assert_eq!(report.linked, 1);
    assert!(report.failures.is_empty());

    let items = h.board.items(&h.fragrance_board()).await;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].name, "Rose");
    assert_eq!(items[0].values["text8__1"], "1");

    let records = h.gateway("fragrances").list().await.unwrap();
    assert_eq!(records[0].external_id.as_ref(), Some(&items[0].id));
}

#[tokio::test]
async fn changed_category_plans_an_update_of_the_matched_item() {
    let h = Harness::new();
    h.add_fragrance("Rose", Some("Floral")).await;
    h.board
        .seed(
            &h.fragrance_board(),
            BoardItem::new("9", "Rose").with("text8__1", "1").with("text0", "Woody"),
        )
        .await;

    let plan = h.job.plan("fragrances").await.expect("plan");
    assert!(plan.changes.to_create.is_empty());
    assert!(plan.changes.to_delete.is_empty());
    assert_eq!(plan.changes.to_update.len(), 1);
    let (item, record) = &plan.changes.to_update[0];
    assert_eq!(item, &ExternalId::from("9"));
    assert_eq!(record.id, RecordId(1));
    assert!(h.board.mutations().await.is_empty(), "plan must not mutate");
}

#[tokio::test]
async fn board_item_without_a_record_is_deleted() {
    let h = Harness::new();
    h.board
        .seed(&h.fragrance_board(), BoardItem::new("9", "Rose").with("text8__1", "1"))
        .await;

    let plan = h.job.plan("fragrances").await.unwrap();
    assert_eq!(plan.changes.to_delete, vec![ExternalId::from("9")]);

    let summary = h.job.run("fragrances").await.unwrap();
    assert_eq!(summary.areas[0].deleted, 1);
    assert!(h.board.items(&h.fragrance_board()).await.is_empty());
}

#[tokio::test]
async fn second_pass_without_changes_is_empty() {
    let h = Harness::new();
    for name in ["Rose", "Oud", "Vetiver"] {
        h.add_fragrance(name, Some("Woody")).await;
    }
    h.job.run("fragrances").await.unwrap();

    let plan = h.job.plan("fragrances").await.unwrap();
    assert!(plan.changes.is_empty(), "unexpected plan: {:?}", plan.changes);

    h.board.clear_mutations().await;
    let summary = h.job.run("fragrances").await.unwrap();
    assert_eq!(summary.mutation_count(), 0);
    assert!(h.board.mutations().await.is_empty());
}

#[tokio::test]
async fn one_rejected_create_does_not_stop_the_batch() {
    let h = Harness::new();
    for name in ["Rose", "Bad", "Oud"] {
        h.add_fragrance(name, None).await;
    }
    h.board.reject_name("Bad").await;

    let summary = h.job.run("fragrances").await.expect("partial failure is not fatal");
    let report = &summary.areas[0];
    assert_eq!(report.created, 2);
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].item.contains("Bad"));
    assert_eq!(summary.failure_count(), 1);

    let records = h.gateway("fragrances").list().await.unwrap();
    let unlinked: Vec<_> = records
        .iter()
        .filter(|r| r.external_id.is_none())
        .map(|r| r.name.as_str())
        .collect();
    assert_eq!(unlinked, ["Bad"]);
}

#[tokio::test]
async fn fetch_failure_ends_the_pass_before_any_mutation() {
    let h = Harness::new();
    h.add_fragrance("Rose", None).await;
    h.board.break_page(None).await;

    let err = h.job.run("fragrances").await.unwrap_err();
    match err {
        SyncError::Fetch(fetch) => assert_eq!(fetch.cursor, None),
        other => panic!("expected fetch error, got {other}"),
    }
    assert!(h.board.mutations().await.is_empty());
}

#[tokio::test]
async fn unknown_area_is_an_error() {
    let h = Harness::new();
    assert!(matches!(
        h.job.run("candles").await,
        Err(SyncError::UnknownArea(name)) if name == "candles"
    ));
}

#[tokio::test]
async fn run_forgets_only_its_own_area_and_plan_forgets_nothing() {
    let h = Harness::new();
    h.guard.mark_processed("fragrances:create:1").unwrap();
    h.guard.mark_processed("orders:create:1").unwrap();

    h.job.plan("fragrances").await.unwrap();
    assert!(h.guard.has_processed("fragrances:create:1"));

    h.job.run("fragrances").await.unwrap();
    assert!(!h.guard.has_processed("fragrances:create:1"));
    assert!(h.guard.has_processed("orders:create:1"));

    h.job.run_all().await.unwrap();
    assert!(h.guard.is_empty());
}

#[tokio::test]
async fn run_all_reconciles_every_area_in_order() {
    let h = Harness::new();
    h.add_fragrance("Rose", None).await;
    let mut order = Params::new();
    order.insert("name".into(), json!("Ada L"));
    order.insert("number_of_kits".into(), json!(2));
    h.store.query("CreateOrder", &order).await.unwrap();

    let summary = h.job.run_all().await.unwrap();
    let areas: Vec<_> = summary.areas.iter().map(|a| a.area.0.as_str()).collect();
    assert_eq!(areas, ["fragrances", "orders"]);
    assert_eq!(summary.mutation_count(), 2);

    let orders = h.board.items(&BoardId::from("200")).await;
    assert_eq!(orders[0].values["numbers"], "2");
    assert_eq!(orders[0].values["status"], "received");

    let creates = h
        .board
        .mutations()
        .await
        .into_iter()
        .filter(|m| matches!(m, Mutation::CreateItem { .. }))
        .count();
    assert_eq!(creates, 2);
}

#[tokio::test]
async fn summary_serializes_with_per_area_reports() {
    let h = Harness::new();
    h.add_fragrance("Rose", None).await;
    let summary = h.job.run("fragrances").await.unwrap();

    let json = serde_json::to_value(&summary).unwrap();
    assert_eq!(json["areas"][0]["area"], "fragrances");
    assert_eq!(json["areas"][0]["created"], 1);
    assert!(json["started_at"].is_string());
}
