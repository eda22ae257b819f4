//! `boardsync serve`: run the HTTP server in the foreground.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Emit JSON log lines instead of compact text.
    #[arg(long)]
    pub log_json: bool,
}

impl ServeArgs {
    pub fn run(self, config: Option<&Path>) -> Result<()> {
        let config = super::load_config(config)?;
        boardsync_server::start_blocking(config, self.log_json).context("server exited with error")
    }
}
