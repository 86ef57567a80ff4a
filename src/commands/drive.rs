//! Drive a session with an interactive control loop.
//!
//! Starts an engine against the session's gateway and turns stdin into
//! a small REPL: keywords steer the loop, anything else becomes new
//! instructions. The engine is stopped on every way out.

use anyhow::Result;
use colored::Colorize;
use std::fmt::Write;
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;

use crate::ai::ClaudeDecider;
use crate::browser::HttpConnector;
use crate::config::Config;
use crate::controller::{ControllerRegistry, ControllerStatus};
use crate::session::orchestrator::SessionOrchestrator;

/// What one REPL line asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ReplCommand {
    Quit,
    Pause,
    Resume,
    Status,
    Instruct(String),
    Nothing,
}

/// Runs the drive command.
pub async fn run(config: Config, id: &str, instructions: Option<String>) -> Result<()> {
    let orchestrator = super::bootstrap(&config).await?;
    let session = orchestrator.get(id).await?;

    if let Some(text) = &instructions {
        orchestrator.inject_instructions(&session.id, text).await?;
    }

    let connector = Arc::new(HttpConnector::new(config.controller.connect_timeout())?);
    let decider = Arc::new(ClaudeDecider::from_env(config.ai.clone())?);
    let registry = ControllerRegistry::new(connector, decider, config.controller.clone());

    registry.create(&session.id, &session.gateway_url).await?;
    if let Some(text) = &instructions {
        registry.update_instructions(&session.id, text).await?;
    }

    print!("{}", format_intro(&session.name, &session.gateway_url));

    let result = repl(&orchestrator, &registry, &session.id).await;

    // Teardown happens whether the REPL ended cleanly or not
    if registry.remove(&session.id).await.is_ok() {
        println!("\n{} Control loop stopped.", "✓".green());
    }
    result
}

/// Reads stdin lines until quit, EOF, or Ctrl-C.
async fn repl(
    orchestrator: &SessionOrchestrator,
    registry: &ControllerRegistry,
    id: &str,
) -> Result<()> {
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!();
                return Ok(());
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    return Ok(());
                };
                match parse_command(&line) {
                    ReplCommand::Quit => return Ok(()),
                    ReplCommand::Nothing => {}
                    ReplCommand::Pause => {
                        orchestrator.pause_control(id).await?;
                        registry.pause(id).await?;
                        println!("{} Control loop paused.", "⏸".yellow());
                    }
                    ReplCommand::Resume => {
                        orchestrator.resume_control(id).await?;
                        registry.resume(id).await?;
                        println!("{} Control loop resumed.", "▶".green());
                    }
                    ReplCommand::Status => {
                        let status = registry.status(id).await?;
                        print!("{}", format_status(&status));
                    }
                    ReplCommand::Instruct(text) => {
                        orchestrator.inject_instructions(id, &text).await?;
                        registry.update_instructions(id, &text).await?;
                        println!("{} Instructions updated.", "✓".green());
                    }
                }
            }
        }
    }
}

/// Maps a raw stdin line onto a REPL command. Keywords are matched
/// case-insensitively; instruction text keeps its original casing.
fn parse_command(line: &str) -> ReplCommand {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return ReplCommand::Nothing;
    }

    match trimmed.to_lowercase().as_str() {
        "quit" | "exit" | "q" => ReplCommand::Quit,
        "pause" => ReplCommand::Pause,
        "resume" => ReplCommand::Resume,
        "status" => ReplCommand::Status,
        _ => ReplCommand::Instruct(trimmed.to_string()),
    }
}

fn format_intro(name: &str, gateway_url: &str) -> String {
    let mut out = String::new();
    writeln!(&mut out, "\n{}", "━".repeat(50).dimmed()).unwrap();
    writeln!(
        &mut out,
        "{}",
        format!("   🚗 Driving session {name}").yellow().bold()
    )
    .unwrap();
    writeln!(&mut out, "{}", "━".repeat(50).dimmed()).unwrap();
    writeln!(&mut out, "  Gateway:   {}", gateway_url.cyan()).unwrap();
    writeln!(
        &mut out,
        "  Commands:  {}",
        "pause, resume, status, quit".cyan()
    )
    .unwrap();
    writeln!(&mut out, "  Anything else becomes new instructions.").unwrap();
    writeln!(&mut out, "{}", "━".repeat(50).dimmed()).unwrap();
    out
}

/// Formats an engine status snapshot for the terminal.
fn format_status(status: &ControllerStatus) -> String {
    let mut out = String::new();

    let state = if !status.running {
        "stopped".red()
    } else if status.paused {
        "paused".yellow()
    } else {
        "running".green().bold()
    };
    writeln!(&mut out, "  State:         {state}").unwrap();
    writeln!(&mut out, "  Instructions:  {}", status.instructions.cyan()).unwrap();
    match status.last_action_time {
        Some(at) => writeln!(
            &mut out,
            "  Last action:   {}",
            at.format("%Y-%m-%d %H:%M:%S UTC").to_string().cyan()
        )
        .unwrap(),
        None => writeln!(&mut out, "  Last action:   {}", "none yet".dimmed()).unwrap(),
    }

    out
}
