//! `boardsync sync`: reconcile areas against their boards.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::SecondsFormat;
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use boardsync_server::Services;
use boardsync_sync::{ReconcileJob, SyncSummary};

use super::plan::print_plans;

/// Arguments for `boardsync sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Area to reconcile (omit when using `--all`).
    pub area: Option<String>,

    /// Reconcile every configured area.
    #[arg(long, conflicts_with = "area")]
    pub all: bool,

    /// Show the planned changes without mutating the board.
    #[arg(long)]
    pub dry_run: bool,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl SyncArgs {
    pub fn run(self, config: Option<&Path>) -> Result<()> {
        if !self.all && self.area.is_none() {
            anyhow::bail!("provide an area name or use --all");
        }

        let config = super::load_config(config)?;
        let services = Services::from_config(&config).context("failed to open store and board")?;
        let job = services.job;
        let runtime = super::runtime()?;

        if self.dry_run {
            let areas: Vec<String> = match &self.area {
                Some(area) => vec![area.clone()],
                None => job.areas().map(|area| area.0.clone()).collect(),
            };
            let plans = runtime.block_on(async {
                let mut plans = Vec::with_capacity(areas.len());
                for area in &areas {
                    let plan = job
                        .plan(area)
                        .await
                        .with_context(|| format!("planning '{area}' failed"))?;
                    plans.push(plan);
                }
                Ok::<_, anyhow::Error>(plans)
            })?;
            return print_plans(&plans, self.json);
        }

        let summary = runtime.block_on(reconcile(&job, self.area.as_deref()))?;
        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&summary).context("failed to serialize summary")?
            );
            return Ok(());
        }
        print_summary(&summary);
        Ok(())
    }
}

async fn reconcile(job: &ReconcileJob, area: Option<&str>) -> Result<SyncSummary> {
    match area {
        Some(area) => job
            .run(area)
            .await
            .with_context(|| format!("sync failed for '{area}'")),
        None => job.run_all().await.context("sync --all failed"),
    }
}

#[derive(Tabled)]
struct SummaryRow {
    #[tabled(rename = "area")]
    area: String,
    #[tabled(rename = "board")]
    board: String,
    #[tabled(rename = "records")]
    records: usize,
    #[tabled(rename = "items")]
    items: usize,
    #[tabled(rename = "created")]
    created: usize,
    #[tabled(rename = "updated")]
    updated: usize,
    #[tabled(rename = "deleted")]
    deleted: usize,
    #[tabled(rename = "failures")]
    failures: usize,
}

fn print_summary(summary: &SyncSummary) {
    println!(
        "Sync started {} | {} areas | {} mutations | {} ms",
        summary
            .started_at
            .to_rfc3339_opts(SecondsFormat::Secs, true),
        summary.areas.len(),
        summary.mutation_count(),
        summary.duration_ms,
    );

    let rows: Vec<SummaryRow> = summary
        .areas
        .iter()
        .map(|report| SummaryRow {
            area: report.area.to_string(),
            board: report.board.to_string(),
            records: report.records,
            items: report.board_items,
            created: report.created,
            updated: report.updated,
            deleted: report.deleted,
            failures: report.failures.len(),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    let failures = summary.failure_count();
    if failures == 0 {
        println!("{}", "✓ board matches store".green());
        return;
    }
    println!("{}", format!("✗ {failures} item(s) failed").red().bold());
    for report in &summary.areas {
        for failure in &report.failures {
            println!("  {} {}: {}", report.area, failure.item, failure.error);
        }
    }
}
