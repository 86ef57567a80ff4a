//! Runtime adapter: the seam between session orchestration and the
//! container engine.
//!
//! The orchestrator only ever talks to [`SandboxRuntime`]; the bollard
//! implementation lives in [`docker`], and tests drive the same code
//! paths through an in-memory fake.

pub mod docker;
#[cfg(test)]
pub(crate) mod fake;

pub use docker::DockerRuntime;

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

use crate::session::SessionStatus;

/// One host-to-container port publication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortMapping {
    /// Port inside the sandbox
    pub container: u16,
    /// Port bound on the host
    pub host: u16,
}

/// Everything the runtime needs to bring up one sandbox.
#[derive(Debug, Clone)]
pub struct SandboxSpec {
    /// Runtime-level name for the sandbox (deterministic per session)
    pub name: String,
    /// Image to run
    pub image: String,
    /// Bridge network the sandbox joins
    pub network: String,
    /// Environment passed into the sandbox
    pub env: Vec<(String, String)>,
    /// Host port publications
    pub ports: Vec<PortMapping>,
    /// Identity labels for later recovery
    pub labels: HashMap<String, String>,
}

/// A labeled sandbox discovered in the runtime.
#[derive(Debug, Clone)]
pub struct SandboxSummary {
    /// Handle the runtime knows the sandbox by
    pub runtime_ref: String,
    /// Labels attached at creation
    pub labels: HashMap<String, String>,
    /// Current state as the runtime reports it
    pub status: SessionStatus,
}

/// Capability trait over the container engine.
///
/// Implementations map engine-specific errors themselves: `inspect`
/// reports definitive absence as `Ok(None)` (anything else is a real
/// failure), and `stop`/`remove` treat an already-gone sandbox as
/// success so teardown stays idempotent.
#[async_trait]
pub trait SandboxRuntime: Send + Sync {
    /// Returns the runtime name for display.
    fn name(&self) -> &'static str;

    /// Creates the shared bridge network if it does not exist yet.
    async fn ensure_network(&self, network: &str) -> Result<()>;

    /// Creates and starts a sandbox, returning the runtime ref.
    async fn create_sandbox(&self, spec: &SandboxSpec) -> Result<String>;

    /// Looks up a sandbox by ref or name. `Ok(None)` means the runtime
    /// definitively has no such sandbox.
    async fn inspect(&self, sandbox: &str) -> Result<Option<SessionStatus>>;

    /// Gracefully stops a sandbox, escalating after `grace`.
    async fn stop(&self, sandbox: &str, grace: Duration) -> Result<()>;

    /// Forcibly removes a sandbox.
    async fn remove(&self, sandbox: &str) -> Result<()>;

    /// Lists every sandbox carrying this crate's identity labels.
    async fn list_sandboxes(&self) -> Result<Vec<SandboxSummary>>;
}
