//! `boardsync plan <area>`: preview the changes a sync would make.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use boardsync_server::Services;
use boardsync_sync::AreaPlan;

#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Area to plan.
    pub area: String,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl PlanArgs {
    pub fn run(self, config: Option<&Path>) -> Result<()> {
        let config = super::load_config(config)?;
        let services = Services::from_config(&config).context("failed to open store and board")?;
        let plan = super::runtime()?
            .block_on(services.job.plan(&self.area))
            .with_context(|| format!("planning '{}' failed", self.area))?;
        print_plans(&[plan], self.json)
    }
}

#[derive(Tabled)]
struct ChangeRow {
    #[tabled(rename = "action")]
    action: &'static str,
    #[tabled(rename = "record")]
    record: String,
    #[tabled(rename = "item")]
    item: String,
    #[tabled(rename = "name")]
    name: String,
}

pub fn print_plans(plans: &[AreaPlan], json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(plans).context("failed to serialize plan")?
        );
        return Ok(());
    }

    for plan in plans {
        let changes = &plan.changes;
        if changes.is_empty() {
            println!(
                "[dry-run] ✓ '{}' ({} records, {} items): nothing to do",
                plan.area, plan.records, plan.board_items
            );
            continue;
        }
        println!(
            "[dry-run] '{}' on board {}: {} to create, {} to update, {} to delete",
            plan.area.to_string().bold(),
            plan.board,
            changes.to_create.len(),
            changes.to_update.len(),
            changes.to_delete.len(),
        );

        let creates = changes.to_create.iter().map(|record| ChangeRow {
            action: "create",
            record: record.id.to_string(),
            item: "-".to_string(),
            name: record.name.clone(),
        });
        let updates = changes.to_update.iter().map(|(item, record)| ChangeRow {
            action: "update",
            record: record.id.to_string(),
            item: item.to_string(),
            name: record.name.clone(),
        });
        let deletes = changes.to_delete.iter().map(|item| ChangeRow {
            action: "delete",
            record: "-".to_string(),
            item: item.to_string(),
            name: String::new(),
        });
        let mut table = Table::new(creates.chain(updates).chain(deletes));
        table.with(Style::rounded());
        println!("{table}");
    }
    Ok(())
}
