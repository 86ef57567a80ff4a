//! List sessions with their live status.
//!
//! Formatting is pure and takes the already refreshed records.

use anyhow::Result;
use colored::{ColoredString, Colorize};
use std::fmt::Write;

use crate::config::Config;
use crate::session::{Session, SessionStatus};

/// Runs the list command.
pub async fn run(config: Config) -> Result<()> {
    let orchestrator = super::bootstrap(&config).await?;
    let sessions = orchestrator.list().await;
    print!("{}", format_sessions(&sessions));
    Ok(())
}

/// Renders the session table, or a hint when the fleet is empty.
fn format_sessions(sessions: &[Session]) -> String {
    let mut out = String::new();

    if sessions.is_empty() {
        writeln!(&mut out, "\n{} No sessions found.", "ℹ".blue()).unwrap();
        writeln!(&mut out, "  Run {} to start one.", "corral create".green()).unwrap();
        return out;
    }

    writeln!(&mut out, "\n{}", "━".repeat(78).dimmed()).unwrap();
    writeln!(
        &mut out,
        "  {:<10} {:<16} {:<9} {:<8} {:<9} {:<9} CREATED",
        "ID", "NAME", "STATUS", "CONTROL", "DISPLAY", "GATEWAY"
    )
    .unwrap();
    writeln!(&mut out, "{}", "━".repeat(78).dimmed()).unwrap();

    for session in sessions {
        writeln!(
            &mut out,
            "  {:<10} {:<16} {} {:<8} {:<9} {:<9} {}",
            short_id(&session.id),
            session.name,
            status_cell(session.status),
            session.control_state.as_str(),
            session.display_port,
            session.gateway_port,
            session
                .created_at
                .format("%Y-%m-%d %H:%M UTC")
                .to_string()
                .dimmed()
        )
        .unwrap();
    }

    writeln!(&mut out, "{}", "━".repeat(78).dimmed()).unwrap();
    out
}

/// First eight characters of the id, enough to address a session.
fn short_id(id: &str) -> String {
    id.chars().take(8).collect()
}

/// Pads before coloring so ANSI escapes never skew the columns.
fn status_cell(status: SessionStatus) -> ColoredString {
    let padded = format!("{:<9}", status.as_str());
    match status {
        SessionStatus::Running => padded.green(),
        SessionStatus::Exited => padded.red(),
        SessionStatus::Unknown => padded.yellow(),
    }
}
