//! Show one session in detail.

use anyhow::Result;
use colored::Colorize;
use std::fmt::Write;

use crate::config::Config;
use crate::session::{Session, SessionStatus};

/// Runs the show command.
pub async fn run(config: Config, id: &str) -> Result<()> {
    let orchestrator = super::bootstrap(&config).await?;
    let session = orchestrator.get(id).await?;
    print!("{}", format_session(&session));
    Ok(())
}

/// Renders the full session record.
fn format_session(session: &Session) -> String {
    let mut out = String::new();

    writeln!(&mut out, "\n{}", "━".repeat(50).dimmed()).unwrap();
    writeln!(
        &mut out,
        "{}",
        format!("   🖥  Session {}", session.name).yellow().bold()
    )
    .unwrap();
    writeln!(&mut out, "{}", "━".repeat(50).dimmed()).unwrap();

    writeln!(&mut out, "  Id:            {}", session.id.cyan()).unwrap();

    let status = match session.status {
        SessionStatus::Running => "running".green().bold(),
        SessionStatus::Exited => "exited".red(),
        SessionStatus::Unknown => "unknown".yellow(),
    };
    writeln!(&mut out, "  Status:        {status}").unwrap();
    writeln!(
        &mut out,
        "  Control:       {}",
        session.control_state.as_str().cyan()
    )
    .unwrap();
    writeln!(&mut out, "  Sandbox:       {}", session.runtime_ref.cyan()).unwrap();
    writeln!(
        &mut out,
        "  Display:       {}",
        format!("vnc://localhost:{}", session.display_port).cyan()
    )
    .unwrap();
    writeln!(&mut out, "  Gateway:       {}", session.gateway_url.cyan()).unwrap();
    writeln!(
        &mut out,
        "  Created:       {}",
        session
            .created_at
            .format("%Y-%m-%d %H:%M:%S UTC")
            .to_string()
            .cyan()
    )
    .unwrap();

    if let Some(instructions) = &session.last_instructions {
        writeln!(&mut out, "  Instructions:  {}", instructions.cyan()).unwrap();
        if let Some(at) = session.last_instruction_time {
            writeln!(
                &mut out,
                "  Injected:      {}",
                at.format("%Y-%m-%d %H:%M:%S UTC").to_string().cyan()
            )
            .unwrap();
        }
    }

    writeln!(&mut out, "{}", "━".repeat(50).dimmed()).unwrap();
    out
}
