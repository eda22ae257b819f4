//! YAML configuration document.
//!
//! # Storage layout
//!
//! ```text
//! ~/.boardsync/
//!   config.yaml   (mode 0600, created by `boardsync config init`)
//! ```
//!
//! # API pattern
//!
//! Path-taking functions come in two forms:
//! - `fn_at(home: &Path, …)`: explicit home; used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`
//!
//! The API token is never stored here: [`BoardConfig::api_token_env`] names the
//! environment variable that holds it.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{io_err, ConfigError};
use crate::mapping::{ColumnEncoding, ColumnMapping, ColumnSpec};
use crate::types::{AreaName, BoardId};

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// Root configuration document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Socket address the HTTP server binds to.
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Browser origin allowed by CORS; `None` disables the CORS layer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cors_origin: Option<String>,
    #[serde(default)]
    pub board: BoardConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub throttle: ThrottleConfig,
    #[serde(default)]
    pub guard: GuardConfig,
    /// Run a full reconciliation on this interval while serving.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_interval_secs: Option<u64>,
    #[serde(default = "default_areas")]
    pub areas: Vec<AreaConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            cors_origin: Some("http://localhost:3000".to_string()),
            board: BoardConfig::default(),
            store: StoreConfig::default(),
            throttle: ThrottleConfig::default(),
            guard: GuardConfig::default(),
            sync_interval_secs: None,
            areas: default_areas(),
        }
    }
}

/// Board service connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    pub api_url: String,
    /// Name of the environment variable holding the API token.
    pub api_token_env: String,
    pub page_size: u32,
    pub timeout_secs: u64,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.monday.com/v2".to_string(),
            api_token_env: "BOARD_API_TOKEN".to_string(),
            page_size: 100,
            timeout_secs: 30,
        }
    }
}

impl BoardConfig {
    /// Read the API token from the configured environment variable.
    pub fn api_token(&self) -> Option<String> {
        std::env::var(&self.api_token_env)
            .ok()
            .filter(|token| !token.trim().is_empty())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// System-of-record settings: database path, bootstrap schema and the
/// catalog of named operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
    /// SQL run once when the store is opened.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    /// Named operation -> parameterized statement.
    pub operations: BTreeMap<String, String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("boardsync.db"),
            schema: Some(BUILTIN_SCHEMA.to_string()),
            operations: builtin_operations(),
        }
    }
}

/// Pacing of outbound board mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    /// Minimum delay between consecutive board calls; `0` lets a phase run
    /// concurrently.
    pub min_delay_ms: u64,
    /// Upper bound on in-flight calls when no delay is configured.
    pub concurrency: usize,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: 350,
            concurrency: 4,
        }
    }
}

impl ThrottleConfig {
    pub fn min_delay(&self) -> Duration {
        Duration::from_millis(self.min_delay_ms)
    }
}

/// Where processed webhook event keys are kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum GuardConfig {
    #[default]
    Memory,
    File { path: PathBuf },
}

/// One synchronized domain area: a store entity paired with a board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AreaConfig {
    pub name: AreaName,
    pub board_id: BoardId,
    pub mapping: ColumnMapping,
    pub operations: AreaOperations,
}

/// Names of the store operations serving an area.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AreaOperations {
    pub list: String,
    pub create: String,
    pub update: String,
    pub delete: String,
    pub link: String,
}

impl AreaOperations {
    pub fn all(&self) -> [&str; 5] {
        [
            self.list.as_str(),
            self.create.as_str(),
            self.update.as_str(),
            self.delete.as_str(),
            self.link.as_str(),
        ]
    }
}

// ---------------------------------------------------------------------------
// Load / save
// ---------------------------------------------------------------------------

/// `<home>/.boardsync/config.yaml`. Pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    home.join(".boardsync").join("config.yaml")
}

impl Config {
    /// Load and validate the config at `path`.
    ///
    /// Returns `ConfigError::NotFound` if absent, `ConfigError::Parse` (with
    /// path + line context) if malformed YAML.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
        let config: Config = serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load `<home>/.boardsync/config.yaml`.
    pub fn load_at(home: &Path) -> Result<Self, ConfigError> {
        Self::load(&config_path_at(home))
    }

    /// `load_at` convenience wrapper.
    pub fn load_default() -> Result<Self, ConfigError> {
        Self::load_at(&home()?)
    }

    /// Save atomically: write `<path>.tmp`, then rename.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        }
        let yaml = serde_yaml::to_string(self)?;
        let tmp = path.with_extension("yaml.tmp");
        std::fs::write(&tmp, yaml).map_err(|e| io_err(&tmp, e))?;
        set_file_permissions(&tmp)?;
        std::fs::rename(&tmp, path).map_err(|e| io_err(path, e))?;
        Ok(())
    }

    /// Write the default config under `home` unless one already exists.
    ///
    /// Returns the config path and whether a file was created.
    pub fn init_at(home: &Path) -> Result<(PathBuf, bool), ConfigError> {
        let path = config_path_at(home);
        if path.exists() {
            return Ok((path, false));
        }
        Config::default().save(&path)?;
        Ok((path, true))
    }

    pub fn area(&self, name: &str) -> Option<&AreaConfig> {
        self.areas.iter().find(|area| area.name.0 == name)
    }

    /// Check structural rules that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.throttle.concurrency == 0 {
            return Err(ConfigError::Invalid(
                "throttle.concurrency must be at least 1".to_string(),
            ));
        }

        let mut area_names = HashSet::new();
        for area in &self.areas {
            if !area_names.insert(&area.name) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate area '{}'",
                    area.name
                )));
            }

            let mut columns = HashSet::new();
            let mut fields = HashSet::new();
            for spec in &area.mapping.columns {
                if spec.column == area.mapping.join_column {
                    return Err(ConfigError::Invalid(format!(
                        "area '{}': field '{}' reuses the join column '{}'",
                        area.name, spec.field, spec.column
                    )));
                }
                if !columns.insert(&spec.column) {
                    return Err(ConfigError::Invalid(format!(
                        "area '{}': column '{}' is mapped twice",
                        area.name, spec.column
                    )));
                }
                if !fields.insert(spec.field.as_str()) {
                    return Err(ConfigError::Invalid(format!(
                        "area '{}': field '{}' is mapped twice",
                        area.name, spec.field
                    )));
                }
            }

            for op in area.operations.all() {
                if !self.store.operations.contains_key(op) {
                    return Err(ConfigError::Invalid(format!(
                        "area '{}': store operation '{op}' is not defined",
                        area.name
                    )));
                }
            }
        }
        Ok(())
    }

    /// Apply `BOARD_ID_<AREA>` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply board id overrides from `lookup`, keyed `BOARD_ID_<AREA>`.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        for area in &mut self.areas {
            let key = format!("BOARD_ID_{}", area.name.0.to_ascii_uppercase());
            if let Some(board) = lookup(&key).filter(|v| !v.trim().is_empty()) {
                area.board_id = BoardId(board.trim().to_string());
            }
        }
    }
}

fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Built-in areas
// ---------------------------------------------------------------------------

fn default_listen() -> String {
    "0.0.0.0:3010".to_string()
}

fn default_areas() -> Vec<AreaConfig> {
    vec![fragrances_area(), orders_area()]
}

fn fragrances_area() -> AreaConfig {
    let mut mapping = ColumnMapping::new(
        "text8__1",
        vec![
            ColumnSpec::new("description", "long_text", ColumnEncoding::Text)
                .titled("Description"),
            ColumnSpec::new("category", "text0", ColumnEncoding::Text).titled("Category"),
            ColumnSpec::new("image_url", "text4", ColumnEncoding::Text).titled("Image URL"),
            ColumnSpec::new("created_at", "date4", ColumnEncoding::Timestamp).titled("Created At"),
            ColumnSpec::new("updated_at", "date5", ColumnEncoding::Timestamp).titled("Updated At"),
        ],
    );
    mapping.join_title = Some("Fragrance ID".to_string());

    AreaConfig {
        name: AreaName::from("fragrances"),
        board_id: BoardId::from("0"),
        mapping,
        operations: AreaOperations {
            list: "GetAllFragrances".to_string(),
            create: "AddFragrance".to_string(),
            update: "UpdateFragrance".to_string(),
            delete: "DeleteFragrance".to_string(),
            link: "LinkFragranceBoardItem".to_string(),
        },
    }
}

fn orders_area() -> AreaConfig {
    let mut mapping = ColumnMapping::new(
        "text_order_id",
        vec![
            ColumnSpec::new("first_name", "text1", ColumnEncoding::Text).titled("First Name"),
            ColumnSpec::new("last_name", "text2", ColumnEncoding::Text).titled("Last Name"),
            ColumnSpec::new("number_of_kits", "numbers", ColumnEncoding::Number)
                .titled("Number of Kits"),
            ColumnSpec::new("fragrance1_id", "numbers1", ColumnEncoding::Number)
                .titled("Fragrance 1"),
            ColumnSpec::new("fragrance2_id", "numbers2", ColumnEncoding::Number)
                .titled("Fragrance 2"),
            ColumnSpec::new("fragrance3_id", "numbers3", ColumnEncoding::Number)
                .titled("Fragrance 3"),
            ColumnSpec::new("status", "status", ColumnEncoding::Text).titled("Status"),
            ColumnSpec::new("created_at", "date4", ColumnEncoding::Timestamp).titled("Created At"),
        ],
    );
    mapping.join_title = Some("Order ID".to_string());

    AreaConfig {
        name: AreaName::from("orders"),
        board_id: BoardId::from("0"),
        mapping,
        operations: AreaOperations {
            list: "GetAllOrders".to_string(),
            create: "CreateOrder".to_string(),
            update: "UpdateOrder".to_string(),
            delete: "DeleteOrder".to_string(),
            link: "LinkOrderBoardItem".to_string(),
        },
    }
}

/// Bootstrap schema for the bundled SQLite store.
pub const BUILTIN_SCHEMA: &str = "\
CREATE TABLE IF NOT EXISTS fragrances (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    name          TEXT NOT NULL,
    description   TEXT,
    category      TEXT,
    image_url     TEXT,
    created_at    TEXT,
    updated_at    TEXT,
    board_item_id TEXT UNIQUE
);
CREATE TABLE IF NOT EXISTS orders (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    name           TEXT NOT NULL,
    first_name     TEXT,
    last_name      TEXT,
    number_of_kits INTEGER,
    fragrance1_id  INTEGER,
    fragrance2_id  INTEGER,
    fragrance3_id  INTEGER,
    status         TEXT,
    created_at     TEXT,
    board_item_id  TEXT UNIQUE
);
";

fn builtin_operations() -> BTreeMap<String, String> {
    let ops = [
        (
            "GetAllFragrances",
            "SELECT id, name, description, category, image_url, created_at, updated_at, \
             board_item_id FROM fragrances ORDER BY id",
        ),
        (
            "AddFragrance",
            "INSERT INTO fragrances (name, description, category, image_url, created_at, \
             updated_at, board_item_id) VALUES (:name, :description, :category, :image_url, \
             :created_at, :updated_at, :board_item_id)",
        ),
        (
            "DeleteFragrance",
            "DELETE FROM fragrances WHERE board_item_id = :board_item_id",
        ),
        (
            "LinkFragranceBoardItem",
            "UPDATE fragrances SET board_item_id = :board_item_id WHERE id = :id",
        ),
        (
            "GetAllOrders",
            "SELECT id, name, first_name, last_name, number_of_kits, fragrance1_id, \
             fragrance2_id, fragrance3_id, status, created_at, board_item_id \
             FROM orders ORDER BY id",
        ),
        (
            "CreateOrder",
            "INSERT INTO orders (name, first_name, last_name, number_of_kits, fragrance1_id, \
             fragrance2_id, fragrance3_id, status, created_at, board_item_id) VALUES (:name, \
             :first_name, :last_name, :number_of_kits, :fragrance1_id, :fragrance2_id, \
             :fragrance3_id, COALESCE(:status, 'received'), :created_at, :board_item_id)",
        ),
        (
            "DeleteOrder",
            "DELETE FROM orders WHERE board_item_id = :board_item_id",
        ),
        (
            "LinkOrderBoardItem",
            "UPDATE orders SET board_item_id = :board_item_id WHERE id = :id",
        ),
    ];
    let mut ops: BTreeMap<String, String> = ops
        .into_iter()
        .map(|(name, sql)| (name.to_string(), sql.to_string()))
        .collect();
    ops.insert(
        "UpdateFragrance".to_string(),
        partial_update(
            "fragrances",
            &["description", "category", "image_url", "created_at", "updated_at"],
        ),
    );
    ops.insert(
        "UpdateOrder".to_string(),
        partial_update(
            "orders",
            &[
                "first_name",
                "last_name",
                "number_of_kits",
                "fragrance1_id",
                "fragrance2_id",
                "fragrance3_id",
                "status",
                "created_at",
            ],
        ),
    );
    ops
}

/// Update keyed by `board_item_id`. A NULL parameter keeps the stored value;
/// the field named by `:clear` is set to NULL.
fn partial_update(table: &str, fields: &[&str]) -> String {
    let mut sets = vec!["name = COALESCE(:name, name)".to_string()];
    sets.extend(fields.iter().map(|field| {
        format!("{field} = CASE WHEN :clear = '{field}' THEN NULL ELSE COALESCE(:{field}, {field}) END")
    }));
    format!(
        "UPDATE {table} SET {} WHERE board_item_id = :board_item_id",
        sets.join(", ")
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        Config::default().validate().expect("default config validates");
    }

    #[test]
    fn default_areas_reference_defined_operations() {
        let config = Config::default();
        assert_eq!(config.areas.len(), 2);
        assert!(config.area("fragrances").is_some());
        assert!(config.area("orders").is_some());
        assert!(config.area("customers").is_none());
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let mut config = Config::default();
        config.throttle.concurrency = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("concurrency"));
    }

    #[test]
    fn join_column_collision_is_rejected() {
        let mut config = Config::default();
        let join = config.areas[0].mapping.join_column.clone();
        config.areas[0].mapping.columns[0].column = join;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("join column"), "got: {err}");
    }

    #[test]
    fn undefined_operation_is_rejected() {
        let mut config = Config::default();
        config.areas[1].operations.delete = "DropEverything".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("DropEverything"));
    }

    #[test]
    fn board_id_overrides_use_upper_case_area_name() {
        let mut config = Config::default();
        config.apply_overrides_from(|key| match key {
            "BOARD_ID_FRAGRANCES" => Some(" 1234 ".to_string()),
            "BOARD_ID_ORDERS" => Some(String::new()),
            _ => None,
        });
        assert_eq!(config.areas[0].board_id, BoardId::from("1234"));
        assert_eq!(config.areas[1].board_id, BoardId::from("0"));
    }

    #[test]
    fn guard_config_is_tagged_by_kind() {
        let guard: GuardConfig =
            serde_yaml::from_str("kind: file\npath: /tmp/guard.json\n").expect("parse");
        assert_eq!(
            guard,
            GuardConfig::File {
                path: PathBuf::from("/tmp/guard.json")
            }
        );
    }
}
