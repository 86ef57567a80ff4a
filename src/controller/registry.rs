//! Registry of live control loop engines.
//!
//! The registry is the only owner of engine handles: callers address
//! engines by session id and every lifecycle transition goes through
//! here. Holding the map lock across `create` is what guarantees at
//! most one engine per session ever exists.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::engine::{Controller, ControllerStatus};
use crate::ai::DecisionProvider;
use crate::browser::BrowserConnector;
use crate::config::ControllerConfig;
use crate::error::Error;

/// Owns every control loop engine, keyed by session id.
pub struct ControllerRegistry {
    controllers: Mutex<HashMap<String, Controller>>,
    connector: Arc<dyn BrowserConnector>,
    decider: Arc<dyn DecisionProvider>,
    config: ControllerConfig,
}

impl ControllerRegistry {
    /// Builds an empty registry around the given capabilities.
    pub fn new(
        connector: Arc<dyn BrowserConnector>,
        decider: Arc<dyn DecisionProvider>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            controllers: Mutex::new(HashMap::new()),
            connector,
            decider,
            config,
        }
    }

    /// Creates and starts an engine for a session.
    ///
    /// Fails with `AlreadyExists` when the session already has one, and
    /// with `ConnectionFailed` when the browser endpoint cannot be
    /// reached; in the latter case nothing is registered, so the call
    /// can simply be retried.
    pub async fn create(&self, session_id: &str, endpoint: &str) -> Result<ControllerStatus, Error> {
        let mut controllers = self.controllers.lock().await;
        if controllers.contains_key(session_id) {
            return Err(Error::already_exists(session_id));
        }

        let mut controller = Controller::new(
            session_id.to_string(),
            endpoint.to_string(),
            Arc::clone(&self.connector),
            Arc::clone(&self.decider),
            self.config.clone(),
        );
        controller.start().await?;

        let status = controller.status().await;
        controllers.insert(session_id.to_string(), controller);
        info!("Registered control loop for session {}", session_id);
        Ok(status)
    }

    /// Stops a session's engine and forgets it.
    pub async fn remove(&self, session_id: &str) -> Result<(), Error> {
        let mut controllers = self.controllers.lock().await;
        let mut controller = controllers
            .remove(session_id)
            .ok_or_else(|| Error::not_found(session_id))?;
        controller.stop().await;
        info!("Removed control loop for session {}", session_id);
        Ok(())
    }

    /// Suspends a session's engine.
    pub async fn pause(&self, session_id: &str) -> Result<ControllerStatus, Error> {
        let controllers = self.controllers.lock().await;
        let controller = controllers
            .get(session_id)
            .ok_or_else(|| Error::not_found(session_id))?;
        controller.pause().await;
        Ok(controller.status().await)
    }

    /// Resumes a session's engine.
    pub async fn resume(&self, session_id: &str) -> Result<ControllerStatus, Error> {
        let controllers = self.controllers.lock().await;
        let controller = controllers
            .get(session_id)
            .ok_or_else(|| Error::not_found(session_id))?;
        controller.resume().await;
        Ok(controller.status().await)
    }

    /// Hands a session's engine new instructions for its next cycle.
    pub async fn update_instructions(
        &self,
        session_id: &str,
        instructions: &str,
    ) -> Result<ControllerStatus, Error> {
        let controllers = self.controllers.lock().await;
        let controller = controllers
            .get(session_id)
            .ok_or_else(|| Error::not_found(session_id))?;
        controller.update_instructions(instructions).await;
        Ok(controller.status().await)
    }

    /// Reports a session's engine state.
    pub async fn status(&self, session_id: &str) -> Result<ControllerStatus, Error> {
        let controllers = self.controllers.lock().await;
        let controller = controllers
            .get(session_id)
            .ok_or_else(|| Error::not_found(session_id))?;
        Ok(controller.status().await)
    }

    /// Stops every engine. Used on process shutdown.
    pub async fn shutdown(&self) {
        let mut controllers = self.controllers.lock().await;
        for (session_id, mut controller) in controllers.drain() {
            debug!("Stopping control loop for session {}", session_id);
            controller.stop().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::mock::ScriptedDecider;
    use crate::browser::mock::{ScriptedBrowser, ScriptedConnector};

    fn fast_config() -> ControllerConfig {
        ControllerConfig {
            tick_ms: 10,
            stop_timeout_secs: 5,
            connect_timeout_secs: 1,
            actions: vec!["click".to_string(), "type".to_string()],
            default_instructions: "browse".to_string(),
        }
    }

    fn registry_with(browser: &Arc<ScriptedBrowser>) -> (ControllerRegistry, Arc<ScriptedConnector>) {
        let connector = Arc::new(ScriptedConnector::new(Arc::clone(browser)));
        let registry = ControllerRegistry::new(
            Arc::clone(&connector) as Arc<dyn BrowserConnector>,
            Arc::new(ScriptedDecider::always_action("click")),
            fast_config(),
        );
        (registry, connector)
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_session() {
        let browser = ScriptedBrowser::new();
        let (registry, connector) = registry_with(&browser);

        let status = registry.create("sess-1", "http://localhost:6901").await.unwrap();
        assert!(status.running);

        let err = registry.create("sess-1", "http://localhost:6901").await.unwrap_err();
        assert!(err.is_already_exists());
        assert_eq!(connector.connect_count(), 1);

        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_create_connect_failure_registers_nothing() {
        let registry = ControllerRegistry::new(
            Arc::new(ScriptedConnector::failing()),
            Arc::new(ScriptedDecider::always_action("click")),
            fast_config(),
        );

        let err = registry.create("sess-1", "http://localhost:6901").await.unwrap_err();
        assert!(err.is_connection_failed());
        assert!(registry.status("sess-1").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_remove_stops_engine_and_forgets_it() {
        let browser = ScriptedBrowser::new();
        let (registry, _) = registry_with(&browser);

        registry.create("sess-1", "http://localhost:6901").await.unwrap();
        registry.remove("sess-1").await.unwrap();

        assert!(browser.is_closed());
        assert!(registry.status("sess-1").await.unwrap_err().is_not_found());
        assert!(registry.remove("sess-1").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_pause_and_resume_forward_to_engine() {
        let browser = ScriptedBrowser::new();
        let (registry, _) = registry_with(&browser);

        registry.create("sess-1", "http://localhost:6901").await.unwrap();

        let status = registry.pause("sess-1").await.unwrap();
        assert!(status.running);
        assert!(status.paused);

        let status = registry.resume("sess-1").await.unwrap();
        assert!(!status.paused);

        assert!(registry.pause("ghost").await.unwrap_err().is_not_found());
        assert!(registry.resume("ghost").await.unwrap_err().is_not_found());

        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_update_instructions_forwards_to_engine() {
        let browser = ScriptedBrowser::new();
        let (registry, _) = registry_with(&browser);

        registry.create("sess-1", "http://localhost:6901").await.unwrap();
        let status = registry
            .update_instructions("sess-1", "check the docs")
            .await
            .unwrap();
        assert_eq!(status.instructions, "check the docs");

        assert!(registry
            .update_instructions("ghost", "anything")
            .await
            .unwrap_err()
            .is_not_found());

        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_stops_every_engine() {
        let browser = ScriptedBrowser::new();
        let (registry, _) = registry_with(&browser);

        registry.create("sess-1", "http://localhost:6901").await.unwrap();
        registry.create("sess-2", "http://localhost:6902").await.unwrap();

        registry.shutdown().await;

        assert!(browser.is_closed());
        assert!(registry.status("sess-1").await.unwrap_err().is_not_found());
        assert!(registry.status("sess-2").await.unwrap_err().is_not_found());
    }
}
