//! The per-session control loop engine.
//!
//! An engine owns one supervised loop task that runs observe → decide →
//! act on a fixed tick. Start connects to the session's browser first
//! and only then spawns the loop; stop cancels cooperatively, waits a
//! bounded time for the task, and tears the connection down whether or
//! not the task made the deadline — a straggler cycle then finds the
//! connection closed and dies quietly on its next call.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::ai::{Decision, DecisionProvider};
use crate::browser::{Browser, BrowserConnector};
use crate::config::ControllerConfig;
use crate::error::Error;

/// Where an engine is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EngineState {
    Stopped,
    Running,
    Paused,
}

/// Snapshot of an engine for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct ControllerStatus {
    /// Session the engine drives
    pub session_id: String,
    /// True while the loop task is alive (paused counts as running)
    pub running: bool,
    /// True when cycles are being skipped on purpose
    pub paused: bool,
    /// Instructions the next cycle will use
    pub instructions: String,
    /// When an action last executed successfully
    pub last_action_time: Option<DateTime<Utc>>,
}

/// State shared between the engine handle and its loop task.
struct Shared {
    session_id: String,
    state: Mutex<EngineState>,
    instructions: RwLock<String>,
    last_action_time: Mutex<Option<DateTime<Utc>>>,
    browser: Mutex<Option<Arc<dyn Browser>>>,
}

/// One session's control loop engine.
///
/// Handles are deliberately not handed out of this crate; the registry
/// owns every engine and is the only sanctioned way to stop one.
pub(crate) struct Controller {
    shared: Arc<Shared>,
    connector: Arc<dyn BrowserConnector>,
    decider: Arc<dyn DecisionProvider>,
    config: ControllerConfig,
    endpoint: String,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Controller {
    pub(crate) fn new(
        session_id: String,
        endpoint: String,
        connector: Arc<dyn BrowserConnector>,
        decider: Arc<dyn DecisionProvider>,
        config: ControllerConfig,
    ) -> Self {
        let shared = Arc::new(Shared {
            session_id,
            state: Mutex::new(EngineState::Stopped),
            instructions: RwLock::new(config.default_instructions.clone()),
            last_action_time: Mutex::new(None),
            browser: Mutex::new(None),
        });

        Self {
            shared,
            connector,
            decider,
            config,
            endpoint,
            cancel: CancellationToken::new(),
            task: None,
        }
    }

    /// Connects to the browser endpoint and spawns the loop task.
    ///
    /// No-op success when the engine is already running or paused. A
    /// connect failure (or timeout) surfaces as `ConnectionFailed` and
    /// leaves the engine stopped. Returns as soon as the task is
    /// spawned; progress is observed through `status`.
    pub(crate) async fn start(&mut self) -> Result<(), Error> {
        {
            let state = self.shared.state.lock().await;
            if *state != EngineState::Stopped {
                debug!(
                    "Control loop for session {} already running",
                    self.shared.session_id
                );
                return Ok(());
            }
        }

        let browser = tokio::time::timeout(
            self.config.connect_timeout(),
            self.connector.connect(&self.endpoint),
        )
        .await
        .map_err(|_| Error::connection_failed(format!("timed out connecting to {}", self.endpoint)))?
        .map_err(|err| Error::connection_failed(format!("{err:#}")))?;

        *self.shared.browser.lock().await = Some(browser);
        *self.shared.state.lock().await = EngineState::Running;

        let cancel = CancellationToken::new();
        self.cancel = cancel.clone();
        self.task = Some(tokio::spawn(run_loop(
            Arc::clone(&self.shared),
            Arc::clone(&self.decider),
            self.config.clone(),
            cancel,
        )));

        info!("Control loop started for session {}", self.shared.session_id);
        Ok(())
    }

    /// Stops the engine: cancel, bounded join, unconditional teardown.
    ///
    /// Idempotent. A task that misses the join deadline is abandoned,
    /// never aborted; closing the browser underneath it is what
    /// guarantees its eventual exit does nothing.
    pub(crate) async fn stop(&mut self) {
        {
            let state = self.shared.state.lock().await;
            if *state == EngineState::Stopped {
                debug!(
                    "Control loop for session {} already stopped",
                    self.shared.session_id
                );
                return;
            }
        }

        self.cancel.cancel();

        if let Some(task) = self.task.take() {
            match tokio::time::timeout(self.config.stop_timeout(), task).await {
                Ok(Ok(())) => debug!(
                    "Control loop for session {} joined",
                    self.shared.session_id
                ),
                Ok(Err(err)) => warn!(
                    "Control loop task for session {} panicked: {}",
                    self.shared.session_id, err
                ),
                Err(_) => warn!(
                    "Control loop for session {} did not exit within {:?}; abandoning the task",
                    self.shared.session_id,
                    self.config.stop_timeout()
                ),
            }
        }

        if let Some(browser) = self.shared.browser.lock().await.take() {
            browser.close().await;
        }

        *self.shared.state.lock().await = EngineState::Stopped;
        info!("Control loop stopped for session {}", self.shared.session_id);
    }

    /// Suspends cycles without touching the loop task or connection.
    ///
    /// No-op when already paused — and on a stopped engine, which it
    /// must never start.
    pub(crate) async fn pause(&self) {
        let mut state = self.shared.state.lock().await;
        if *state == EngineState::Running {
            *state = EngineState::Paused;
            info!("Control loop paused for session {}", self.shared.session_id);
        }
    }

    /// Resumes cycles. No-op when already running or stopped.
    pub(crate) async fn resume(&self) {
        let mut state = self.shared.state.lock().await;
        if *state == EngineState::Paused {
            *state = EngineState::Running;
            info!("Control loop resumed for session {}", self.shared.session_id);
        }
    }

    /// Replaces the instructions. Valid in any state; the cycle that
    /// begins next reads the new text, a cycle already in flight keeps
    /// what it captured.
    pub(crate) async fn update_instructions(&self, instructions: impl Into<String>) {
        *self.shared.instructions.write().await = instructions.into();
        debug!(
            "Instructions updated for session {}",
            self.shared.session_id
        );
    }

    /// Reports the engine's current state.
    pub(crate) async fn status(&self) -> ControllerStatus {
        let state = *self.shared.state.lock().await;
        ControllerStatus {
            session_id: self.shared.session_id.clone(),
            running: matches!(state, EngineState::Running | EngineState::Paused),
            paused: state == EngineState::Paused,
            instructions: self.shared.instructions.read().await.clone(),
            last_action_time: *self.shared.last_action_time.lock().await,
        }
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        if self.task.is_some() {
            warn!(
                "Controller for session {} dropped without stop; cancelling its loop",
                self.shared.session_id
            );
            self.cancel.cancel();
        }
    }
}

/// The supervised loop: tick, skip if paused, run one cycle, repeat
/// until cancelled. A failed cycle is logged and the loop carries on.
async fn run_loop(
    shared: Arc<Shared>,
    decider: Arc<dyn DecisionProvider>,
    config: ControllerConfig,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(config.tick());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                debug!("Control loop for session {} cancelled", shared.session_id);
                break;
            }
            _ = ticker.tick() => {}
        }

        if *shared.state.lock().await == EngineState::Paused {
            continue;
        }

        let Some(browser) = shared.browser.lock().await.clone() else {
            break;
        };
        // Captured once per cycle; an update lands on the next one
        let instructions = shared.instructions.read().await.clone();

        match run_cycle(&*browser, &*decider, &instructions, &config).await {
            Ok(()) => {
                *shared.last_action_time.lock().await = Some(Utc::now());
            }
            Err(err) => {
                warn!(
                    "Control cycle failed for session {}: {:#}",
                    shared.session_id, err
                );
            }
        }
    }

    info!("Control loop exited for session {}", shared.session_id);
}

/// One observe → decide → act pass.
async fn run_cycle(
    browser: &dyn Browser,
    decider: &dyn DecisionProvider,
    instructions: &str,
    config: &ControllerConfig,
) -> anyhow::Result<()> {
    use anyhow::Context as _;

    if config.actions.is_empty() {
        anyhow::bail!("no available actions configured");
    }

    let page = browser
        .observe()
        .await
        .context("failed to observe page state")?;

    let decision = match decider
        .decide_next_action(&page, instructions, &config.actions)
        .await
    {
        Ok(decision) => decision,
        Err(err) => {
            warn!(
                "Decision provider failed: {:#}; falling back to '{}'",
                err, config.actions[0]
            );
            Decision::fallback(&config.actions[0], "Decision provider failed")
        }
    };
    let decision = validate_action(decision, &config.actions);

    browser
        .execute(&decision.action, &decision.parameters)
        .await
        .with_context(|| format!("failed to execute action '{}'", decision.action))?;

    debug!("Executed action '{}'", decision.action);
    Ok(())
}

/// Clamps a decision to the offered actions, falling back to the first
/// entry when the provider picked something else.
fn validate_action(decision: Decision, available: &[String]) -> Decision {
    if available.iter().any(|action| *action == decision.action) {
        return decision;
    }

    warn!(
        "Decided action '{}' is not available; falling back to '{}'",
        decision.action, available[0]
    );
    Decision::fallback(
        &available[0],
        "The originally suggested action was not available",
    )
}
