//! Session records and the states they move through.
//!
//! A session is one sandboxed browser environment plus the bookkeeping
//! needed to reach it: its two host ports, the derived gateway URL, the
//! last runtime status observed, and the operator's control intent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub mod orchestrator;
pub mod ports;

/// Last-observed runtime state of a session's sandbox.
///
/// This is a cache refreshed on every `list`/`get`, not a promise about
/// the present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Running,
    Exited,
    Unknown,
}

impl SessionStatus {
    /// Maps a runtime state string (as Docker reports it) onto the
    /// three states callers care about.
    pub fn from_runtime_state(state: &str) -> Self {
        match state {
            "running" => Self::Running,
            "exited" | "dead" => Self::Exited,
            _ => Self::Unknown,
        }
    }

    /// Lowercase name, matching the serialized form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Exited => "exited",
            Self::Unknown => "unknown",
        }
    }
}

/// Operator intent for a session's control loop.
///
/// Independent of [`SessionStatus`]: a sandbox can be running while its
/// control loop is paused, and vice versa.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlState {
    Active,
    Paused,
}

impl ControlState {
    /// Lowercase name, matching the serialized form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
        }
    }
}

/// One managed browser session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Immutable UUID assigned at creation
    pub id: String,
    /// Operator-facing name
    pub name: String,
    /// Handle the runtime adapter knows the sandbox by
    pub runtime_ref: String,
    /// Host port for the raw display (VNC) slot
    pub display_port: u16,
    /// Host port for the web gateway slot
    pub gateway_port: u16,
    /// Where a front end reaches the session's gateway
    pub gateway_url: String,
    /// Last-observed sandbox state
    pub status: SessionStatus,
    /// Whether the control loop should be driving this session
    pub control_state: ControlState,
    /// Creation time (UTC)
    pub created_at: DateTime<Utc>,
    /// Most recent injected instructions, if any
    pub last_instructions: Option<String>,
    /// When those instructions were injected
    pub last_instruction_time: Option<DateTime<Utc>>,
}

// Label keys carried by every sandbox so a fresh process can rebuild
// its registry from the runtime.
pub(crate) const LABEL_ID: &str = "corral.session-id";
pub(crate) const LABEL_NAME: &str = "corral.session-name";
pub(crate) const LABEL_DISPLAY_PORT: &str = "corral.display-port";
pub(crate) const LABEL_GATEWAY_PORT: &str = "corral.gateway-port";
pub(crate) const LABEL_CREATED_AT: &str = "corral.created-at";

impl Session {
    /// Identity labels stamped onto the session's sandbox at creation.
    pub(crate) fn to_labels(&self) -> HashMap<String, String> {
        HashMap::from([
            (LABEL_ID.to_string(), self.id.clone()),
            (LABEL_NAME.to_string(), self.name.clone()),
            (
                LABEL_DISPLAY_PORT.to_string(),
                self.display_port.to_string(),
            ),
            (
                LABEL_GATEWAY_PORT.to_string(),
                self.gateway_port.to_string(),
            ),
            (LABEL_CREATED_AT.to_string(), self.created_at.to_rfc3339()),
        ])
    }

    /// Rebuilds a record from sandbox labels, or `None` when the
    /// identity labels are missing or unparsable.
    ///
    /// Control intent and instructions are not label-backed; recovered
    /// sessions come back `active` with no instruction history.
    pub(crate) fn from_labels(
        runtime_ref: &str,
        labels: &HashMap<String, String>,
        status: SessionStatus,
    ) -> Option<Self> {
        let id = labels.get(LABEL_ID)?.clone();
        let name = labels.get(LABEL_NAME)?.clone();
        let display_port: u16 = labels.get(LABEL_DISPLAY_PORT)?.parse().ok()?;
        let gateway_port: u16 = labels.get(LABEL_GATEWAY_PORT)?.parse().ok()?;
        let created_at = labels
            .get(LABEL_CREATED_AT)
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map_or_else(Utc::now, |t| t.with_timezone(&Utc));

        Some(Self {
            id,
            name,
            runtime_ref: runtime_ref.to_string(),
            display_port,
            gateway_port,
            gateway_url: gateway_url(gateway_port),
            status,
            control_state: ControlState::Active,
            created_at,
            last_instructions: None,
            last_instruction_time: None,
        })
    }
}

/// Gateway URL for a host port.
pub(crate) fn gateway_url(gateway_port: u16) -> String {
    format!("http://localhost:{gateway_port}")
}

/// Deterministic sandbox name: prefix plus the short session id.
///
/// Derivable without a registry record, which is what lets delete
/// clean up orphans a previous process left behind.
pub(crate) fn sandbox_name(prefix: &str, id: &str) -> String {
    let short: String = id.chars().take(8).collect();
    format!("{prefix}-{short}")
}
