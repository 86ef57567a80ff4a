//! HTTP client for a session's gateway.
//!
//! The gateway exposes a small automation surface next to the human
//! viewer: `GET /health` to probe, `GET /page` returning page state as
//! JSON, and `POST /actions` accepting `{action, parameters}`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::{Browser, BrowserConnector, PageState};

/// Connects [`HttpBrowser`]s to gateway endpoints.
pub struct HttpConnector {
    client: reqwest::Client,
}

impl HttpConnector {
    /// Creates a connector whose requests time out after
    /// `request_timeout`.
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl BrowserConnector for HttpConnector {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn connect(&self, endpoint: &str) -> Result<Arc<dyn Browser>> {
        let base = endpoint.trim_end_matches('/').to_string();

        self.client
            .get(format!("{base}/health"))
            .send()
            .await
            .with_context(|| format!("Gateway unreachable at {base}"))?
            .error_for_status()
            .with_context(|| format!("Gateway at {base} is not healthy"))?;

        debug!("Connected to gateway at {}", base);
        Ok(Arc::new(HttpBrowser {
            client: self.client.clone(),
            base,
            closed: AtomicBool::new(false),
        }))
    }
}

/// One established gateway connection.
#[derive(Debug)]
pub struct HttpBrowser {
    client: reqwest::Client,
    base: String,
    closed: AtomicBool,
}

impl HttpBrowser {
    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            anyhow::bail!("browser connection is closed");
        }
        Ok(())
    }
}

#[async_trait]
impl Browser for HttpBrowser {
    async fn observe(&self) -> Result<PageState> {
        self.ensure_open()?;

        let page = self
            .client
            .get(format!("{}/page", self.base))
            .send()
            .await
            .context("Failed to fetch page state")?
            .error_for_status()
            .context("Gateway rejected the page state request")?
            .json::<PageState>()
            .await
            .context("Failed to decode page state")?;

        Ok(page)
    }

    async fn execute(
        &self,
        action: &str,
        parameters: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<()> {
        self.ensure_open()?;

        self.client
            .post(format!("{}/actions", self.base))
            .json(&json!({
                "action": action,
                "parameters": parameters,
            }))
            .send()
            .await
            .with_context(|| format!("Failed to send action '{action}'"))?
            .error_for_status()
            .with_context(|| format!("Gateway rejected action '{action}'"))?;

        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn closed_browser() -> HttpBrowser {
        HttpBrowser {
            client: reqwest::Client::new(),
            base: "http://localhost:1".to_string(),
            closed: AtomicBool::new(true),
        }
    }

    #[tokio::test]
    async fn test_closed_connection_refuses_observe() {
        let browser = closed_browser();
        let err = browser.observe().await.unwrap_err();
        assert!(err.to_string().contains("closed"));
    }

    #[tokio::test]
    async fn test_closed_connection_refuses_execute() {
        let browser = closed_browser();
        let err = browser
            .execute("click", &serde_json::Map::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("closed"));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let browser = HttpBrowser {
            client: reqwest::Client::new(),
            base: "http://localhost:1".to_string(),
            closed: AtomicBool::new(false),
        };
        browser.close().await;
        browser.close().await;
        assert!(browser.observe().await.is_err());
    }
}
