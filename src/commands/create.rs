//! Create a new sandboxed browser session.
//!
//! Naming and formatting are pure; Docker IO happens in `run`.

use anyhow::Result;
use colored::Colorize;
use std::fmt::Write;

use crate::config::Config;
use crate::session::Session;

/// Runs the create command.
pub async fn run(config: Config, name: Option<String>) -> Result<()> {
    let orchestrator = super::bootstrap(&config).await?;

    let name = match name {
        Some(name) => name,
        None => default_name(orchestrator.list().await.len()),
    };

    let session = orchestrator.create(&name).await?;
    print!("{}", format_created(&session));
    Ok(())
}

/// Names an unnamed session after the current fleet size.
fn default_name(existing: usize) -> String {
    format!("session-{}", existing + 1)
}

/// Formats the freshly created session for the terminal.
fn format_created(session: &Session) -> String {
    let mut out = String::new();
    writeln!(
        &mut out,
        "\n{} Session {} created.",
        "✓".green(),
        session.name.cyan().bold()
    )
    .unwrap();
    writeln!(&mut out, "  Id:       {}", session.id.cyan()).unwrap();
    writeln!(
        &mut out,
        "  Display:  {}",
        format!("vnc://localhost:{}", session.display_port).cyan()
    )
    .unwrap();
    writeln!(&mut out, "  Gateway:  {}", session.gateway_url.cyan()).unwrap();
    out
}
