//! Browser endpoint capability: observing page state and executing
//! actions against a session's gateway.
//!
//! The in-guest stack behind the gateway is out of this crate's hands;
//! these traits pin down the contract the engine needs and nothing
//! more. [`http`] is the real client, `mock` the scripted test double.

pub mod http;
#[cfg(test)]
pub(crate) mod mock;

pub use http::HttpConnector;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// What the session's browser currently shows.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageState {
    /// Current URL
    #[serde(default)]
    pub url: String,
    /// Page title, if the gateway reports one
    #[serde(default)]
    pub title: String,
    /// Extracted page text
    #[serde(default)]
    pub content: String,
}

/// A live connection to one session's browser.
///
/// After `close`, `observe` and `execute` must fail: a loop task that
/// outlives its engine's stop deadline will eventually call one of
/// them, and failing is what makes that exit a safe no-op.
#[async_trait]
pub trait Browser: Send + Sync + std::fmt::Debug {
    /// Reads the current page state.
    async fn observe(&self) -> Result<PageState>;

    /// Performs one action against the page.
    async fn execute(
        &self,
        action: &str,
        parameters: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<()>;

    /// Tears the connection down. Idempotent.
    async fn close(&self);
}

/// Establishes [`Browser`] connections from an endpoint address.
///
/// Injected into the controller registry so engine construction stays
/// `(session_id, endpoint)` while tests substitute scripted browsers.
#[async_trait]
pub trait BrowserConnector: Send + Sync {
    /// Returns the connector name for display.
    fn name(&self) -> &'static str;

    /// Connects to the browser behind `endpoint`.
    async fn connect(&self, endpoint: &str) -> Result<std::sync::Arc<dyn Browser>>;
}
