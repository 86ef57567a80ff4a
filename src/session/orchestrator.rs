//! Session lifecycle: provisioning, reconciliation, and teardown.
//!
//! The orchestrator owns the authoritative session table. Reads go
//! through the runtime first (`list`/`get` refresh each record and
//! evict sessions whose sandbox has vanished), creates claim ports and
//! provision under one write-lock hold so concurrent creates can never
//! overlap, and delete converges on "gone" no matter how much of the
//! teardown had already happened.

use anyhow::{Context, Result};
use chrono::Utc;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{Config, DisplayConfig, PortsConfig, RuntimeConfig};
use crate::error::Error;
use crate::runtime::{PortMapping, SandboxRuntime, SandboxSpec};

use super::{gateway_url, ports, sandbox_name, ControlState, Session, SessionStatus};

/// How a delete call converged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// A registered session was torn down
    Removed,
    /// Nothing was registered under the id; absence was confirmed
    /// against the runtime (and any orphaned sandbox cleaned up)
    AlreadyGone,
}

/// Manages the fleet of sandboxed browser sessions.
pub struct SessionOrchestrator {
    runtime: Arc<dyn SandboxRuntime>,
    runtime_config: RuntimeConfig,
    display_config: DisplayConfig,
    ports_config: PortsConfig,
    sessions: RwLock<HashMap<String, Session>>,
    network_ready: AtomicBool,
}

impl SessionOrchestrator {
    /// Creates an orchestrator over the given runtime adapter.
    pub fn new(runtime: Arc<dyn SandboxRuntime>, config: &Config) -> Self {
        Self {
            runtime,
            runtime_config: config.runtime.clone(),
            display_config: config.display.clone(),
            ports_config: config.ports.clone(),
            sessions: RwLock::new(HashMap::new()),
            network_ready: AtomicBool::new(false),
        }
    }

    /// Creates a session: allocates both ports, provisions the sandbox,
    /// and registers the record.
    ///
    /// Port claim and registry insert happen under one write-lock hold,
    /// so concurrent creates serialize and cannot allocate overlapping
    /// ports. A provisioning failure leaves no trace in the registry.
    pub async fn create(&self, name: &str) -> Result<Session, Error> {
        let mut sessions = self.sessions.write().await;

        let mut used: BTreeSet<u16> = sessions
            .values()
            .flat_map(|session| [session.display_port, session.gateway_port])
            .collect();
        let display_port = ports::first_free(self.ports_config.display_range(), &used)?;
        used.insert(display_port);
        let gateway_port = ports::first_free(self.ports_config.gateway_range(), &used)?;

        if !self.network_ready.load(Ordering::SeqCst) {
            self.runtime
                .ensure_network(&self.runtime_config.network)
                .await
                .map_err(|err| Error::provisioning_failed(format!("{err:#}")))?;
            self.network_ready.store(true, Ordering::SeqCst);
        }

        let id = Uuid::new_v4().to_string();
        let mut session = Session {
            id: id.clone(),
            name: name.to_string(),
            runtime_ref: String::new(),
            display_port,
            gateway_port,
            gateway_url: gateway_url(gateway_port),
            status: SessionStatus::Running,
            control_state: ControlState::Active,
            created_at: Utc::now(),
            last_instructions: None,
            last_instruction_time: None,
        };

        let spec = SandboxSpec {
            name: sandbox_name(&self.runtime_config.container_prefix, &id),
            image: self.runtime_config.image.clone(),
            network: self.runtime_config.network.clone(),
            env: vec![
                ("VNC_PW".to_string(), self.display_config.password.clone()),
                (
                    "VNC_RESOLUTION".to_string(),
                    self.display_config.resolution.clone(),
                ),
            ],
            ports: vec![
                PortMapping {
                    container: self.ports_config.display_container,
                    host: display_port,
                },
                PortMapping {
                    container: self.ports_config.gateway_container,
                    host: gateway_port,
                },
            ],
            labels: session.to_labels(),
        };

        session.runtime_ref = self
            .runtime
            .create_sandbox(&spec)
            .await
            .map_err(|err| Error::provisioning_failed(format!("{err:#}")))?;

        info!(
            "Created session '{}' ({}) on ports {}/{}",
            session.name, session.id, display_port, gateway_port
        );
        sessions.insert(id, session.clone());
        Ok(session)
    }

    /// Returns every live session, reconciling each against the runtime.
    ///
    /// Sessions whose sandbox has vanished are evicted and omitted.
    /// Output is sorted by creation time.
    pub async fn list(&self) -> Vec<Session> {
        let ids: Vec<String> = {
            let sessions = self.sessions.read().await;
            sessions.keys().cloned().collect()
        };

        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(session) = self.reconcile(&id).await {
                out.push(session);
            }
        }
        out.sort_by_key(|session| session.created_at);
        out
    }

    /// Returns one session after reconciling it against the runtime.
    pub async fn get(&self, id: &str) -> Result<Session, Error> {
        self.reconcile(id)
            .await
            .ok_or_else(|| Error::not_found(id))
    }

    /// Tears a session down. Lenient by design: an already-gone session
    /// (or an id this process never knew) converges to `AlreadyGone`,
    /// and stop/remove failures are logged rather than surfaced.
    ///
    /// A session's control loop must be stopped first; the orchestrator
    /// never reaches into the controller registry itself.
    pub async fn delete(&self, id: &str) -> DeleteOutcome {
        let record = {
            let mut sessions = self.sessions.write().await;
            sessions.remove(id)
        };

        let (target, outcome) = match record {
            Some(session) => (session.runtime_ref, DeleteOutcome::Removed),
            // No record: confirm absence via the deterministic name,
            // reaping an orphan from a previous process if one exists
            None => (
                sandbox_name(&self.runtime_config.container_prefix, id),
                DeleteOutcome::AlreadyGone,
            ),
        };

        if outcome == DeleteOutcome::Removed {
            if let Err(err) = self
                .runtime
                .stop(&target, self.runtime_config.stop_grace())
                .await
            {
                warn!("Failed to stop sandbox for session {}: {:#}", id, err);
            }
        }
        if let Err(err) = self.runtime.remove(&target).await {
            warn!("Failed to remove sandbox for session {}: {:#}", id, err);
        }

        info!("Deleted session {} ({:?})", id, outcome);
        outcome
    }

    /// Marks the session's control loop as intentionally paused.
    ///
    /// Pure intent: no runtime interaction. Callers route the same
    /// signal into the controller registry for a live engine.
    pub async fn pause_control(&self, id: &str) -> Result<Session, Error> {
        self.set_control_state(id, ControlState::Paused).await
    }

    /// Marks the session's control loop as active again.
    pub async fn resume_control(&self, id: &str) -> Result<Session, Error> {
        self.set_control_state(id, ControlState::Active).await
    }

    /// Records operator instructions on the session.
    pub async fn inject_instructions(
        &self,
        id: &str,
        instructions: &str,
    ) -> Result<Session, Error> {
        if instructions.trim().is_empty() {
            return Err(Error::EmptyInstructions);
        }

        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(id).ok_or_else(|| Error::not_found(id))?;
        session.last_instructions = Some(instructions.to_string());
        session.last_instruction_time = Some(Utc::now());
        Ok(session.clone())
    }

    /// Rebuilds registry records from labeled sandboxes found in the
    /// runtime. Returns how many were adopted.
    ///
    /// Sessions carry their identity as sandbox labels precisely so a
    /// fresh process can pick up where the previous one left off.
    pub async fn recover(&self) -> Result<usize> {
        let summaries = self
            .runtime
            .list_sandboxes()
            .await
            .context("Failed to list sandboxes for recovery")?;

        let mut sessions = self.sessions.write().await;
        let mut adopted = 0;
        for summary in summaries {
            let Some(session) =
                Session::from_labels(&summary.runtime_ref, &summary.labels, summary.status)
            else {
                warn!(
                    "Skipping sandbox {} with unusable labels",
                    summary.runtime_ref
                );
                continue;
            };
            if sessions.contains_key(&session.id) {
                continue;
            }
            debug!("Adopted session {} from the runtime", session.id);
            sessions.insert(session.id.clone(), session);
            adopted += 1;
        }

        if adopted > 0 {
            info!("Recovered {} session(s) from the runtime", adopted);
        }
        Ok(adopted)
    }

    /// Refreshes one record from the runtime. `None` means the session
    /// is unknown or was just evicted.
    async fn reconcile(&self, id: &str) -> Option<Session> {
        let runtime_ref = {
            let sessions = self.sessions.read().await;
            sessions.get(id)?.runtime_ref.clone()
        };

        match self.runtime.inspect(&runtime_ref).await {
            Ok(Some(status)) => {
                let mut sessions = self.sessions.write().await;
                sessions.get_mut(id).map(|session| {
                    session.status = status;
                    session.clone()
                })
            }
            Ok(None) => {
                let mut sessions = self.sessions.write().await;
                if sessions.remove(id).is_some() {
                    info!("Evicted session {}: sandbox is gone", id);
                }
                None
            }
            Err(err) => {
                // Can't tell whether the sandbox is alive; keep the
                // record and say so instead of evicting
                warn!("Failed to inspect sandbox for session {}: {:#}", id, err);
                let mut sessions = self.sessions.write().await;
                sessions.get_mut(id).map(|session| {
                    session.status = SessionStatus::Unknown;
                    session.clone()
                })
            }
        }
    }

    async fn set_control_state(
        &self,
        id: &str,
        control_state: ControlState,
    ) -> Result<Session, Error> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(id).ok_or_else(|| Error::not_found(id))?;
        session.control_state = control_state;
        debug!("Session {} control state -> {}", id, control_state.as_str());
        Ok(session.clone())
    }
}
