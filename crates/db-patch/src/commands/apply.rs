//! Apply pending patches.

use anyhow::{Context, Result};
use colored::Colorize;
use dbpatch_core::{AssumeYes, DecisionKind, DirSource, Gate, Outcome, PatchApplier, run};
use tracing::{debug, error};

use super::{Access, open_database};
use crate::config::Config;
use crate::prompt::ConsoleGate;

pub fn execute(config: &Config, assume_yes: bool) -> Result<()> {
    debug!(
        db = %config.database_path().display(),
        patch_dir = %config.patches.dir.display(),
        table = %config.marker.marker_table,
        marker_mode = %config.marker.marker_mode,
        "db-patch"
    );

    let db = open_database(config, Access::ReadWrite)?;
    let source = DirSource::new(&config.patches.dir);
    let mut applier = PatchApplier::new(db, source, config.marker.clone())?;

    let mut gate: Box<dyn Gate> = if assume_yes {
        Box::new(AssumeYes)
    } else {
        Box::new(ConsoleGate::new())
    };

    match run(&mut applier, gate.as_mut()) {
        Ok(outcome) => {
            print_outcome(&outcome);
            Ok(())
        }
        Err(e) => {
            if e.needs_reconciliation() {
                error!(
                    table = %config.marker.marker_table,
                    "set the marker to the revision of the committed patch by hand before running again"
                );
            }
            Err(e).context("patch run aborted")
        }
    }
}

fn print_outcome(outcome: &Outcome) {
    match outcome {
        Outcome::Applied { from, to, units } => {
            println!(
                "{} applied {} patch(es): {} → {}",
                "✓".green().bold(),
                units.len(),
                from,
                to
            );
        }
        Outcome::UpToDate { revision } => {
            println!("{} up to date at patch#{}", "✓".green().bold(), revision);
        }
        Outcome::Declined { at: DecisionKind::Bootstrap, .. } => {
            println!("{}", "○ patch table not created, nothing applied".yellow());
        }
        Outcome::Declined { at: DecisionKind::Apply, revision } => {
            let revision = revision.map(|r| r.to_string()).unwrap_or_else(|| "-".into());
            println!("{} patches not applied, still at patch#{}", "○".yellow(), revision);
        }
    }
}
