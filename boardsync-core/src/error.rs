//! Error types for boardsync-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from loading, saving or validating the config.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure, with the path that was being accessed.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML serialization error (save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load; includes file path and line context from serde_yaml.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None`; cannot locate `~/.boardsync/`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    /// The config file did not exist at the expected path.
    #[error("config not found at {path}")]
    NotFound { path: PathBuf },

    /// The document parsed but violates a structural rule.
    #[error("invalid config: {0}")]
    Invalid(String),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}

/// A value could not be converted between its record and board representations.
///
/// Fatal to the single item being mapped; batch callers record it as a
/// per-item failure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MappingError {
    /// The value cannot be represented under the column's encoding rule.
    #[error("field '{field}' cannot be encoded as {encoding}: {value}")]
    InvalidValue {
        field: String,
        encoding: &'static str,
        value: String,
    },

    /// The field is not part of the column mapping.
    #[error("field '{field}' is not mapped to a board column")]
    UnknownField { field: String },
}
