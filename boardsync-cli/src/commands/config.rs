//! `boardsync config init|show`

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Subcommand;

use boardsync_core::Config;

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Write the default configuration unless one already exists.
    Init,
    /// Print the effective configuration as YAML.
    Show,
}

pub fn run(command: ConfigCommand, config: Option<&Path>) -> Result<()> {
    match command {
        ConfigCommand::Init => init(config),
        ConfigCommand::Show => {
            let config = super::load_config(config)?;
            let yaml = serde_yaml::to_string(&config).context("failed to serialize config")?;
            print!("{yaml}");
            Ok(())
        }
    }
}

fn init(path: Option<&Path>) -> Result<()> {
    let (path, created): (PathBuf, bool) = match path {
        Some(path) if path.exists() => (path.to_path_buf(), false),
        Some(path) => {
            Config::default()
                .save(path)
                .with_context(|| format!("failed to write '{}'", path.display()))?;
            (path.to_path_buf(), true)
        }
        None => {
            let home = dirs::home_dir().context("could not determine home directory")?;
            Config::init_at(&home).context("failed to write default config")?
        }
    };

    if created {
        println!("✓ Wrote default config to {}", path.display());
        println!("  Set the board token in $BOARD_API_TOKEN and the board ids per area before syncing.");
    } else {
        println!("Config already exists at {}", path.display());
    }
    Ok(())
}
