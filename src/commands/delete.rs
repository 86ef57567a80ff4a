//! Stop and remove a session.
//!
//! Deletion always converges: the command reports whether it tore a
//! session down or merely confirmed there was nothing left.

use anyhow::Result;
use colored::Colorize;
use std::fmt::Write;

use crate::config::Config;
use crate::session::orchestrator::DeleteOutcome;

/// Runs the delete command.
pub async fn run(config: Config, id: &str) -> Result<()> {
    let orchestrator = super::bootstrap(&config).await?;
    let outcome = orchestrator.delete(id).await;
    print!("{}", format_outcome(id, outcome));
    Ok(())
}

/// Formats the delete outcome for the terminal.
fn format_outcome(id: &str, outcome: DeleteOutcome) -> String {
    let mut out = String::new();
    match outcome {
        DeleteOutcome::Removed => {
            writeln!(&mut out, "\n{} Session {} deleted.", "✓".green(), id.cyan()).unwrap();
        }
        DeleteOutcome::AlreadyGone => {
            writeln!(
                &mut out,
                "\n{} Session {} was already gone.",
                "ℹ".blue(),
                id.cyan()
            )
            .unwrap();
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_outcome_removed() {
        let output = format_outcome("3f8a2b14", DeleteOutcome::Removed);
        assert!(output.contains("deleted"));
        assert!(output.contains("3f8a2b14"));
    }

    #[test]
    fn test_format_outcome_already_gone() {
        let output = format_outcome("3f8a2b14", DeleteOutcome::AlreadyGone);
        assert!(output.contains("already gone"));
    }
}
