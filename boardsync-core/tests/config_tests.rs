//! Config load/save error messages, atomic-write safety and init behaviour.

use assert_fs::prelude::*;
use boardsync_core::{
    config::config_path_at, AreaName, ColumnEncoding, Config, ConfigError, GuardConfig,
};
use predicates::prelude::predicate;
use std::fs;

// ---------------------------------------------------------------------------
// 1. Load error messages
// ---------------------------------------------------------------------------

#[test]
fn load_missing_config_returns_not_found() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let err = Config::load_at(home.path()).unwrap_err();
    assert!(matches!(err, ConfigError::NotFound { .. }), "got: {err}");
    assert!(err.to_string().contains("config not found"));
    assert!(err.to_string().contains("config.yaml"));
}

#[test]
fn load_corrupt_yaml_returns_parse_error_with_path() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let path = config_path_at(home.path());
    fs::create_dir_all(path.parent().unwrap()).expect("mkdir");
    fs::write(&path, b": : corrupt : yaml : !!!\n  - broken: [unclosed").expect("write");

    let err = Config::load(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
    assert!(err.to_string().contains("config.yaml"));
}

#[test]
fn load_rejects_structurally_invalid_document() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let file = home.child("config.yaml");
    file.write_str("throttle:\n  min_delay_ms: 0\n  concurrency: 0\n")
        .expect("write");

    let err = Config::load(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)), "got: {err}");
}

// ---------------------------------------------------------------------------
// 2. Partial documents fall back to defaults
// ---------------------------------------------------------------------------

#[test]
fn minimal_document_uses_builtin_areas_and_defaults() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let file = home.child("config.yaml");
    file.write_str("listen: 127.0.0.1:9000\n").expect("write");

    let config = Config::load(file.path()).expect("load");
    assert_eq!(config.listen, "127.0.0.1:9000");
    assert_eq!(config.throttle.min_delay_ms, 350);
    assert_eq!(config.board.page_size, 100);
    assert_eq!(config.guard, GuardConfig::Memory);
    assert_eq!(config.areas.len(), 2);
    assert!(config.sync_interval_secs.is_none());
}

#[test]
fn custom_area_document_parses() {
    let yaml = r#"
store:
  path: data.db
  operations:
    ListPlants: SELECT id, name, species, board_item_id FROM plants
    AddPlant: INSERT INTO plants (name, species) VALUES (:name, :species)
    UpdatePlant: UPDATE plants SET species = COALESCE(:species, species) WHERE board_item_id = :board_item_id
    DeletePlant: DELETE FROM plants WHERE board_item_id = :board_item_id
    LinkPlant: UPDATE plants SET board_item_id = :board_item_id WHERE id = :id
areas:
  - name: plants
    board_id: "991"
    mapping:
      join_column: plant_id
      columns:
        - field: species
          column: text0
          title: Species
        - field: height
          column: numbers
          encoding: number
    operations:
      list: ListPlants
      create: AddPlant
      update: UpdatePlant
      delete: DeletePlant
      link: LinkPlant
"#;
    let home = assert_fs::TempDir::new().expect("tempdir");
    let file = home.child("config.yaml");
    file.write_str(yaml).expect("write");

    let config = Config::load(file.path()).expect("load");
    let area = config.area("plants").expect("plants area");
    assert_eq!(area.name, AreaName::from("plants"));
    assert_eq!(area.mapping.columns[0].encoding, ColumnEncoding::Text);
    assert_eq!(area.mapping.columns[1].encoding, ColumnEncoding::Number);
    assert!(config.store.schema.is_some(), "schema defaults when omitted");
}

// ---------------------------------------------------------------------------
// 3. Save / init
// ---------------------------------------------------------------------------

#[test]
fn save_then_load_roundtrips() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let path = config_path_at(home.path());
    let mut config = Config::default();
    config.sync_interval_secs = Some(600);
    config.guard = GuardConfig::File {
        path: home.path().join("guard.json"),
    };

    config.save(&path).expect("save");
    let loaded = Config::load(&path).expect("load");
    assert_eq!(loaded, config);
}

#[test]
fn save_leaves_no_tmp_file_behind() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let path = config_path_at(home.path());
    Config::default().save(&path).expect("save");

    home.child(".boardsync/config.yaml")
        .assert(predicate::path::exists());
    home.child(".boardsync/config.yaml.tmp")
        .assert(predicate::path::missing());
}

#[test]
fn init_is_idempotent() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let (path, created) = Config::init_at(home.path()).expect("first init");
    assert!(created);

    fs::write(&path, "listen: 127.0.0.1:1\n").expect("edit");
    let (_, created_again) = Config::init_at(home.path()).expect("second init");
    assert!(!created_again, "existing config must not be overwritten");
    home.child(".boardsync/config.yaml")
        .assert(predicate::str::contains("127.0.0.1:1"));
}

#[test]
#[cfg(unix)]
fn saved_config_is_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    let home = assert_fs::TempDir::new().expect("tempdir");
    let path = config_path_at(home.path());
    Config::default().save(&path).expect("save");
    let mode = fs::metadata(&path).expect("meta").permissions().mode() & 0o777;
    assert_eq!(mode, 0o600);
}
