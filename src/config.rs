//! Typed configuration loaded from `corral.toml`.
//!
//! Every section rejects unknown keys so a typo fails loudly at load
//! time instead of being silently absorbed. The Anthropic API key is
//! never read from the file; see [`crate::ai::claude`].

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::session::ports::PortRange;

const CONFIG_FILE: &str = "corral.toml";

/// Top-level configuration for the orchestrator, runtime, and controllers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Directory for daily-rolling log files (console-only when unset)
    #[serde(default)]
    pub log_dir: Option<String>,

    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub ports: PortsConfig,
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(default)]
    pub ai: AiConfig,
}

/// Container runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Image each sandbox runs (a VNC-enabled desktop with a browser)
    #[serde(default = "default_image")]
    pub image: String,

    /// Pull the image on first use if the daemon does not have it
    #[serde(default = "default_true")]
    pub pull_if_missing: bool,

    /// Shared bridge network joining all sandboxes
    #[serde(default = "default_network")]
    pub network: String,

    /// Container name prefix; the short session id is appended
    #[serde(default = "default_container_prefix")]
    pub container_prefix: String,

    /// Grace window for SIGTERM before a stop escalates, in seconds
    #[serde(default = "default_stop_grace")]
    pub stop_grace_secs: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            image: default_image(),
            pull_if_missing: true,
            network: default_network(),
            container_prefix: default_container_prefix(),
            stop_grace_secs: default_stop_grace(),
        }
    }
}

impl RuntimeConfig {
    /// Graceful-stop window as a `Duration`.
    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_secs)
    }
}

/// Remote-display settings passed into each sandbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DisplayConfig {
    /// Fixed resolution for the in-guest display
    #[serde(default = "default_resolution")]
    pub resolution: String,

    /// VNC password for the in-guest display server
    #[serde(default = "default_vnc_password")]
    pub password: String,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            resolution: default_resolution(),
            password: default_vnc_password(),
        }
    }
}

/// Host port ranges and fixed container-side ports.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PortsConfig {
    /// First host port for the display (VNC) slot
    #[serde(default = "default_display_start")]
    pub display_start: u16,

    /// Last host port for the display slot, inclusive
    #[serde(default = "default_display_end")]
    pub display_end: u16,

    /// First host port for the gateway (web viewer) slot
    #[serde(default = "default_gateway_start")]
    pub gateway_start: u16,

    /// Last host port for the gateway slot, inclusive
    #[serde(default = "default_gateway_end")]
    pub gateway_end: u16,

    /// Container-side display port (fixed by the image)
    #[serde(default = "default_display_container")]
    pub display_container: u16,

    /// Container-side gateway port (fixed by the image)
    #[serde(default = "default_gateway_container")]
    pub gateway_container: u16,
}

impl Default for PortsConfig {
    fn default() -> Self {
        Self {
            display_start: default_display_start(),
            display_end: default_display_end(),
            gateway_start: default_gateway_start(),
            gateway_end: default_gateway_end(),
            display_container: default_display_container(),
            gateway_container: default_gateway_container(),
        }
    }
}

impl PortsConfig {
    /// Host range scanned for the display slot.
    pub fn display_range(&self) -> PortRange {
        PortRange::new(self.display_start, self.display_end)
    }

    /// Host range scanned for the gateway slot.
    pub fn gateway_range(&self) -> PortRange {
        PortRange::new(self.gateway_start, self.gateway_end)
    }
}

/// Control-loop engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ControllerConfig {
    /// Interval between control cycles, in milliseconds
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    /// How long `stop` waits for the loop task before abandoning it
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_secs: u64,

    /// Bound on establishing the browser connection during `start`
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Actions the engine will execute; decisions outside this set fall
    /// back to the first entry
    #[serde(default = "default_actions")]
    pub actions: Vec<String>,

    /// Instructions a controller starts with until the operator injects
    /// new ones
    #[serde(default = "default_instructions")]
    pub default_instructions: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            stop_timeout_secs: default_stop_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            actions: default_actions(),
            default_instructions: default_instructions(),
        }
    }
}

impl ControllerConfig {
    /// Cycle interval as a `Duration`.
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    /// Stop join bound as a `Duration`.
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }

    /// Connect bound as a `Duration`.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Decision-provider (Anthropic API) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AiConfig {
    /// Model asked to choose the next action
    #[serde(default = "default_model")]
    pub model: String,

    /// Messages API endpoint
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Retries for transient API failures (exponential backoff)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Per-request timeout, in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Page content beyond this many characters is truncated before
    /// being sent to the model
    #[serde(default = "default_max_page_chars")]
    pub max_page_chars: usize,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            endpoint: default_endpoint(),
            max_retries: default_max_retries(),
            request_timeout_secs: default_request_timeout(),
            max_page_chars: default_max_page_chars(),
        }
    }
}

impl AiConfig {
    /// Per-request timeout as a `Duration`.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_image() -> String {
    "consol/rocky-xfce-vnc".to_string()
}

fn default_network() -> String {
    "corral-network".to_string()
}

fn default_container_prefix() -> String {
    "corral-session".to_string()
}

fn default_stop_grace() -> u64 {
    5
}

fn default_resolution() -> String {
    "1280x800".to_string()
}

fn default_vnc_password() -> String {
    "vncpassword".to_string()
}

fn default_display_start() -> u16 {
    5901
}

fn default_display_end() -> u16 {
    5910
}

fn default_gateway_start() -> u16 {
    6901
}

fn default_gateway_end() -> u16 {
    6910
}

fn default_display_container() -> u16 {
    5901
}

fn default_gateway_container() -> u16 {
    6901
}

fn default_tick_ms() -> u64 {
    1000
}

fn default_stop_timeout() -> u64 {
    5
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_actions() -> Vec<String> {
    vec![
        "click".to_string(),
        "type".to_string(),
        "scroll".to_string(),
        "navigate".to_string(),
        "wait".to_string(),
    ]
}

fn default_instructions() -> String {
    "Browse the web and summarize content".to_string()
}

fn default_model() -> String {
    "claude-3-opus-20240229".to_string()
}

fn default_endpoint() -> String {
    "https://api.anthropic.com/v1/messages".to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_request_timeout() -> u64 {
    60
}

fn default_max_page_chars() -> usize {
    50_000
}

impl Config {
    /// Load configuration from file, using defaults if not found
    pub fn load(dir: &Path) -> Result<Self> {
        let config_path = dir.join(CONFIG_FILE);

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        Ok(config)
    }
}
