use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod ai;
mod browser;
mod commands;
mod config;
mod controller;
mod error;
mod runtime;
mod session;

use config::Config;

#[derive(Parser)]
#[command(name = "corral")]
#[command(
    author,
    version,
    about = "Sandboxed browser sessions driven by autonomous control loops"
)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new sandboxed browser session
    Create {
        /// Session name (derived from the fleet size when omitted)
        #[arg(short, long)]
        name: Option<String>,
    },

    /// List sessions with their live status
    List,

    /// Show one session in detail
    Show {
        /// Session id
        id: String,
    },

    /// Stop and remove a session
    Delete {
        /// Session id
        id: String,
    },

    /// Drive a session with an interactive control loop
    Drive {
        /// Session id
        id: String,

        /// Initial instructions for the control loop
        #[arg(short, long)]
        instructions: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    let config = Config::load(&cwd)?;

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("corral=debug")
    } else {
        EnvFilter::new("corral=info")
    };

    // The appender guard must outlive every command
    let _guard = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "corral.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(fmt::layer().json().with_ansi(false).with_writer(writer))
                .with(filter)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .init();
            None
        }
    };

    match cli.command {
        Commands::Create { name } => {
            commands::create::run(config, name).await?;
        }
        Commands::List => {
            commands::list::run(config).await?;
        }
        Commands::Show { id } => {
            commands::show::run(config, &id).await?;
        }
        Commands::Delete { id } => {
            commands::delete::run(config, &id).await?;
        }
        Commands::Drive { id, instructions } => {
            commands::drive::run(config, &id, instructions).await?;
        }
    }

    Ok(())
}
