//! Scripted browser for engine tests.
//!
//! Serves a fixed page, records executed actions, and can be told to
//! fail its first observations, hang forever, or refuse to connect —
//! enough to exercise every loop-supervision path without a gateway.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::{Browser, BrowserConnector, PageState};

/// A scriptable [`Browser`].
#[derive(Debug, Default)]
pub(crate) struct ScriptedBrowser {
    page: Mutex<PageState>,
    executed: Mutex<Vec<(String, serde_json::Map<String, serde_json::Value>)>>,
    observe_failures: AtomicUsize,
    hang_observe: AtomicBool,
    closed: AtomicBool,
}

impl ScriptedBrowser {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Serves the given page.
    pub fn with_page(page: PageState) -> Arc<Self> {
        let browser = Self::default();
        *browser.page.lock().unwrap() = page;
        Arc::new(browser)
    }

    /// Makes the next `count` observations fail.
    pub fn fail_observations(&self, count: usize) {
        self.observe_failures.store(count, Ordering::SeqCst);
    }

    /// Makes every observation block forever.
    pub fn hang_observations(&self) {
        self.hang_observe.store(true, Ordering::SeqCst);
    }

    /// Actions executed so far, in order.
    pub fn executed(&self) -> Vec<(String, serde_json::Map<String, serde_json::Value>)> {
        self.executed.lock().unwrap().clone()
    }

    /// Names of the actions executed so far.
    pub fn executed_actions(&self) -> Vec<String> {
        self.executed
            .lock()
            .unwrap()
            .iter()
            .map(|(action, _)| action.clone())
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Browser for ScriptedBrowser {
    async fn observe(&self) -> Result<PageState> {
        if self.closed.load(Ordering::SeqCst) {
            anyhow::bail!("browser connection is closed");
        }
        if self.hang_observe.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }

        let remaining = self.observe_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.observe_failures.store(remaining - 1, Ordering::SeqCst);
            anyhow::bail!("scripted observe failure");
        }

        Ok(self.page.lock().unwrap().clone())
    }

    async fn execute(
        &self,
        action: &str,
        parameters: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            anyhow::bail!("browser connection is closed");
        }
        self.executed
            .lock()
            .unwrap()
            .push((action.to_string(), parameters.clone()));
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Hands out one shared [`ScriptedBrowser`], or refuses to.
pub(crate) struct ScriptedConnector {
    browser: Arc<ScriptedBrowser>,
    fail_connect: AtomicBool,
    connect_count: AtomicUsize,
}

impl ScriptedConnector {
    pub fn new(browser: Arc<ScriptedBrowser>) -> Self {
        Self {
            browser,
            fail_connect: AtomicBool::new(false),
            connect_count: AtomicUsize::new(0),
        }
    }

    /// A connector whose `connect` always fails.
    pub fn failing() -> Self {
        let connector = Self::new(ScriptedBrowser::new());
        connector.fail_connect.store(true, Ordering::SeqCst);
        connector
    }

    pub fn connect_count(&self) -> usize {
        self.connect_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserConnector for ScriptedConnector {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn connect(&self, endpoint: &str) -> Result<Arc<dyn Browser>> {
        self.connect_count.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect.load(Ordering::SeqCst) {
            anyhow::bail!("scripted connect failure: {endpoint}");
        }
        Ok(Arc::clone(&self.browser) as Arc<dyn Browser>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_browser_records_actions() {
        let browser = ScriptedBrowser::new();
        browser
            .execute("click", &serde_json::Map::new())
            .await
            .unwrap();
        assert_eq!(browser.executed_actions(), vec!["click"]);
    }

    #[tokio::test]
    async fn test_scripted_browser_observe_failures_run_out() {
        let browser = ScriptedBrowser::with_page(PageState {
            url: "https://example.com".to_string(),
            ..PageState::default()
        });
        browser.fail_observations(2);

        assert!(browser.observe().await.is_err());
        assert!(browser.observe().await.is_err());
        let page = browser.observe().await.unwrap();
        assert_eq!(page.url, "https://example.com");
    }

    #[tokio::test]
    async fn test_scripted_browser_closed_refuses_io() {
        let browser = ScriptedBrowser::new();
        browser.close().await;
        assert!(browser.is_closed());
        assert!(browser.observe().await.is_err());
        assert!(browser
            .execute("click", &serde_json::Map::new())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_failing_connector() {
        let connector = ScriptedConnector::failing();
        let err = connector.connect("http://localhost:6901").await.unwrap_err();
        assert!(err.to_string().contains("scripted connect failure"));
        assert_eq!(connector.connect_count(), 1);
    }
}
