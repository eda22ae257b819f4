//! boardsync core library: domain types, column mapping, configuration, errors.
//!
//! Public API surface:
//! - [`types`]: newtypes, [`DomainRecord`], [`BoardItem`], [`FieldValue`]
//! - [`mapping`]: the bidirectional [`ColumnMapping`] between record fields
//!   and board columns
//! - [`config`]: the YAML configuration document
//! - [`error`]: [`ConfigError`], [`MappingError`]

pub mod config;
pub mod error;
pub mod mapping;
pub mod types;

pub use config::{
    AreaConfig, AreaOperations, BoardConfig, Config, GuardConfig, StoreConfig, ThrottleConfig,
};
pub use error::{ConfigError, MappingError};
pub use mapping::{ColumnEncoding, ColumnMapping, ColumnSpec};
pub use types::{
    AreaName, BoardId, BoardItem, ColumnId, Cursor, DomainRecord, ExternalId, FieldValue, RecordId,
};
