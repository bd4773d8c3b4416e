//! Interactive operator prompts.

use colored::Colorize;
use dbpatch_core::{Decision, Error, Gate};
use dialoguer::Confirm;
use dialoguer::theme::ColorfulTheme;

/// Asks the operator on the terminal.
///
/// An empty answer counts as yes for both questions.
pub struct ConsoleGate {
    theme: ColorfulTheme,
}

impl ConsoleGate {
    pub fn new() -> Self {
        Self {
            theme: ColorfulTheme::default(),
        }
    }
}

impl Default for ConsoleGate {
    fn default() -> Self {
        Self::new()
    }
}

impl Gate for ConsoleGate {
    fn confirm(&mut self, decision: &Decision) -> dbpatch_core::Result<bool> {
        let prompt = match decision {
            Decision::Bootstrap { table } => {
                format!("patch table `{}` does not exist, create patch table now?", table)
            }
            Decision::Apply { current, pending } => {
                println!();
                println!("  {} {}", "Current patch:".cyan(), current);
                println!("  {}", "Pending:".cyan());
                for unit in pending {
                    println!("    {} {}", format!("#{}", unit.revision).bold(), unit.name);
                }
                println!();
                format!("Apply {} patch(es)?", pending.len())
            }
        };

        Confirm::with_theme(&self.theme)
            .with_prompt(prompt)
            .default(true)
            .interact()
            .map_err(|e| Error::Prompt(e.to_string()))
    }
}
