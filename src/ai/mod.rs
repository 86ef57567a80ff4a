//! Decision providers: the capability that picks a session's next
//! browser action.
//!
//! The engine treats deciding as an opaque single-method call and
//! assumes the provider is unreliable — it may fail outright or pick
//! an action the session does not offer, and the engine compensates.

pub mod claude;
#[cfg(test)]
pub(crate) mod mock;

pub use claude::ClaudeDecider;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::browser::PageState;

/// A provider's choice of next action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    /// Action name, expected to be one of the offered actions
    pub action: String,
    /// Action arguments, opaque to the engine
    #[serde(default)]
    pub parameters: serde_json::Map<String, serde_json::Value>,
    /// Why the provider chose this action
    #[serde(default)]
    pub reasoning: String,
}

impl Decision {
    /// A bare decision with no parameters.
    pub fn action(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            parameters: serde_json::Map::new(),
            reasoning: String::new(),
        }
    }

    /// The deterministic stand-in used when a provider misbehaves.
    pub(crate) fn fallback(action: &str, reasoning: &str) -> Self {
        Self {
            action: action.to_string(),
            parameters: serde_json::Map::new(),
            reasoning: reasoning.to_string(),
        }
    }
}

/// Capability trait for "decide the next action given page state".
#[async_trait]
pub trait DecisionProvider: Send + Sync {
    /// Returns the provider name for display.
    fn name(&self) -> &'static str;

    /// Chooses the next action for a session.
    async fn decide_next_action(
        &self,
        page: &PageState,
        instructions: &str,
        available_actions: &[String],
    ) -> Result<Decision>;
}
