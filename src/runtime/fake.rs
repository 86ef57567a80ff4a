//! In-memory runtime for orchestrator tests.
//!
//! Tracks per-method call counts and supports scripted failures plus
//! out-of-band destruction, so tests can exercise reconciliation and
//! teardown without a Docker daemon.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::session::SessionStatus;

use super::{SandboxRuntime, SandboxSpec, SandboxSummary};

#[derive(Debug, Clone)]
struct FakeSandbox {
    name: String,
    labels: HashMap<String, String>,
    status: SessionStatus,
}

/// A scriptable in-memory [`SandboxRuntime`].
#[derive(Default)]
pub(crate) struct FakeRuntime {
    sandboxes: Mutex<HashMap<String, FakeSandbox>>,
    networks: Mutex<Vec<String>>,
    next_ref: AtomicUsize,
    fail_create: AtomicBool,
    fail_inspect: AtomicBool,
    create_calls: AtomicUsize,
    inspect_calls: AtomicUsize,
    stop_calls: AtomicUsize,
    remove_calls: AtomicUsize,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `create_sandbox` calls fail.
    pub fn fail_next_create(&self) {
        self.fail_create.store(true, Ordering::SeqCst);
    }

    /// Makes `inspect` error (as if the daemon were unreachable).
    pub fn fail_inspect(&self, fail: bool) {
        self.fail_inspect.store(fail, Ordering::SeqCst);
    }

    /// Destroys a sandbox out-of-band, as an external `docker rm` would.
    pub fn destroy(&self, sandbox: &str) {
        let mut sandboxes = self.sandboxes.lock().unwrap();
        let key = resolve(&sandboxes, sandbox);
        if let Some(key) = key {
            sandboxes.remove(&key);
        }
    }

    /// Overrides the reported status of a sandbox.
    pub fn set_status(&self, sandbox: &str, status: SessionStatus) {
        let mut sandboxes = self.sandboxes.lock().unwrap();
        let key = resolve(&sandboxes, sandbox);
        if let Some(key) = key {
            if let Some(entry) = sandboxes.get_mut(&key) {
                entry.status = status;
            }
        }
    }

    pub fn sandbox_count(&self) -> usize {
        self.sandboxes.lock().unwrap().len()
    }

    pub fn networks(&self) -> Vec<String> {
        self.networks.lock().unwrap().clone()
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn inspect_calls(&self) -> usize {
        self.inspect_calls.load(Ordering::SeqCst)
    }

    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }

    pub fn remove_calls(&self) -> usize {
        self.remove_calls.load(Ordering::SeqCst)
    }
}

/// Accepts a ref or a name, like the Docker daemon does.
fn resolve(sandboxes: &HashMap<String, FakeSandbox>, key: &str) -> Option<String> {
    if sandboxes.contains_key(key) {
        return Some(key.to_string());
    }
    sandboxes
        .iter()
        .find(|(_, sandbox)| sandbox.name == key)
        .map(|(found, _)| found.clone())
}

#[async_trait]
impl SandboxRuntime for FakeRuntime {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn ensure_network(&self, network: &str) -> Result<()> {
        let mut networks = self.networks.lock().unwrap();
        if !networks.iter().any(|existing| existing == network) {
            networks.push(network.to_string());
        }
        Ok(())
    }

    async fn create_sandbox(&self, spec: &SandboxSpec) -> Result<String> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_create.swap(false, Ordering::SeqCst) {
            anyhow::bail!("scripted create failure");
        }

        let runtime_ref = format!("sbx-{}", self.next_ref.fetch_add(1, Ordering::SeqCst));
        self.sandboxes.lock().unwrap().insert(
            runtime_ref.clone(),
            FakeSandbox {
                name: spec.name.clone(),
                labels: spec.labels.clone(),
                status: SessionStatus::Running,
            },
        );
        Ok(runtime_ref)
    }

    async fn inspect(&self, sandbox: &str) -> Result<Option<SessionStatus>> {
        self.inspect_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_inspect.load(Ordering::SeqCst) {
            anyhow::bail!("scripted inspect failure");
        }

        let sandboxes = self.sandboxes.lock().unwrap();
        let key = resolve(&sandboxes, sandbox);
        Ok(key.map(|key| sandboxes[&key].status))
    }

    async fn stop(&self, sandbox: &str, _grace: Duration) -> Result<()> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        let mut sandboxes = self.sandboxes.lock().unwrap();
        let key = resolve(&sandboxes, sandbox);
        if let Some(key) = key {
            if let Some(entry) = sandboxes.get_mut(&key) {
                entry.status = SessionStatus::Exited;
            }
        }
        Ok(())
    }

    async fn remove(&self, sandbox: &str) -> Result<()> {
        self.remove_calls.fetch_add(1, Ordering::SeqCst);
        let mut sandboxes = self.sandboxes.lock().unwrap();
        let key = resolve(&sandboxes, sandbox);
        if let Some(key) = key {
            sandboxes.remove(&key);
        }
        Ok(())
    }

    async fn list_sandboxes(&self) -> Result<Vec<SandboxSummary>> {
        let sandboxes = self.sandboxes.lock().unwrap();
        Ok(sandboxes
            .iter()
            .map(|(runtime_ref, sandbox)| SandboxSummary {
                runtime_ref: runtime_ref.clone(),
                labels: sandbox.labels.clone(),
                status: sandbox.status,
            })
            .collect())
    }
}
