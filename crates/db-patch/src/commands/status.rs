//! Read-only status report.
//!
//! Shows the recorded revision and what an `apply` would run, without
//! prompting or writing. Supports JSON output for programmatic use.

use anyhow::Result;
use colored::Colorize;
use dbpatch_core::{DirSource, PatchApplier, PatchUnit, Preview, Revision};
use serde::Serialize;

use super::{Access, open_database};
use crate::config::Config;

/// Status for JSON output.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub database: String,
    pub patch_dir: String,
    pub marker_table: String,
    /// `None` when the marker table does not exist
    pub current: Option<Revision>,
    pub latest: Option<Revision>,
    pub discovered: usize,
    pub pending: Vec<PatchUnit>,
}

impl StatusReport {
    fn new(config: &Config, preview: Preview) -> Self {
        Self {
            database: config.database_path().display().to_string(),
            patch_dir: config.patches.dir.display().to_string(),
            marker_table: config.marker.marker_table.clone(),
            current: preview.current,
            latest: preview.patches.last().map(|u| u.revision),
            discovered: preview.patches.len(),
            pending: preview.pending,
        }
    }
}

pub fn execute(json: bool, config: &Config) -> Result<()> {
    let db = open_database(config, Access::ReadOnly)?;
    let applier = PatchApplier::new(db, DirSource::new(&config.patches.dir), config.marker.clone())?;
    let report = StatusReport::new(config, applier.preview()?);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    Ok(())
}

fn print_report(report: &StatusReport) {
    println!("{}", "db-patch status".cyan().bold());
    println!("{}", "─".repeat(50));
    println!("  Database:    {}", report.database);
    println!("  Patch dir:   {}", report.patch_dir);

    print!("  Marker:      ");
    match report.current {
        Some(current) => println!("{} (table `{}`)", format!("patch#{}", current).green(), report.marker_table),
        None => println!("{}", format!("✗ table `{}` does not exist", report.marker_table).yellow()),
    }

    let latest = report.latest.map(|r| r.to_string()).unwrap_or_else(|| "-".into());
    println!("  Discovered:  {} (latest #{})", report.discovered, latest);

    println!();
    if report.pending.is_empty() {
        println!("{}", "✓ Up to date".green().bold());
    } else {
        println!("{}", format!("{} pending patch(es):", report.pending.len()).yellow().bold());
        for unit in &report.pending {
            println!("  • #{} {}", unit.revision, unit.name);
        }
    }
}
