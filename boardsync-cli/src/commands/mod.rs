pub mod config;
pub mod plan;
pub mod serve;
pub mod sync;

use std::path::Path;

use anyhow::{Context, Result};

use boardsync_core::Config;

/// Load `path`, or `~/.boardsync/config.yaml` when none is given, then apply
/// `BOARD_ID_<AREA>` overrides.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config '{}'", path.display()))?,
        None => {
            let home = dirs::home_dir().context("could not determine home directory")?;
            Config::load_at(&home)
                .context("failed to load config; run `boardsync config init` first")?
        }
    };
    config.apply_env_overrides();
    Ok(config)
}

pub fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")
}
