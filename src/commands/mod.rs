//! CLI command implementations.
//!
//! Each submodule implements one corral CLI command with pure
//! formatting helpers separated from IO. Commands share [`bootstrap`]
//! for Docker wiring and session recovery.

pub mod create;
pub mod delete;
pub mod drive;
pub mod list;
pub mod show;

use anyhow::Result;
use std::sync::Arc;

use crate::config::Config;
use crate::runtime::DockerRuntime;
use crate::session::orchestrator::SessionOrchestrator;

/// Connects to Docker, builds the orchestrator, and adopts whatever
/// labeled sandboxes an earlier process left behind.
pub(crate) async fn bootstrap(config: &Config) -> Result<SessionOrchestrator> {
    let runtime = DockerRuntime::connect(config.runtime.pull_if_missing).await?;
    let orchestrator = SessionOrchestrator::new(Arc::new(runtime), config);
    orchestrator.recover().await?;
    Ok(orchestrator)
}
