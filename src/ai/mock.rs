//! Scripted decision provider for engine tests.
//!
//! Returns predetermined decisions (or failures) in order and records
//! the instruction text each cycle saw, so tests can assert when an
//! instruction update took effect.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::browser::PageState;

use super::{Decision, DecisionProvider};

/// One scripted reply.
#[derive(Debug, Clone)]
pub(crate) enum ScriptedDecision {
    /// Return this decision.
    Decide(Decision),
    /// Fail with this message.
    Fail(String),
}

/// A scriptable [`DecisionProvider`]. Cycles through its script if
/// asked more times than it has entries.
#[derive(Debug, Clone)]
pub(crate) struct ScriptedDecider {
    script: Arc<Vec<ScriptedDecision>>,
    invocation_count: Arc<AtomicUsize>,
    seen_instructions: Arc<Mutex<Vec<String>>>,
}

impl ScriptedDecider {
    pub fn new(script: Vec<ScriptedDecision>) -> Self {
        Self {
            script: Arc::new(script),
            invocation_count: Arc::new(AtomicUsize::new(0)),
            seen_instructions: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Always decides the given action.
    pub fn always_action(action: &str) -> Self {
        Self::new(vec![ScriptedDecision::Decide(Decision::action(action))])
    }

    /// Always fails with the given message.
    pub fn always_fail(message: &str) -> Self {
        Self::new(vec![ScriptedDecision::Fail(message.to_string())])
    }

    /// Number of times `decide_next_action` was called.
    pub fn invocation_count(&self) -> usize {
        self.invocation_count.load(Ordering::SeqCst)
    }

    /// Instruction text captured per call, in order.
    pub fn seen_instructions(&self) -> Vec<String> {
        self.seen_instructions.lock().unwrap().clone()
    }
}

#[async_trait]
impl DecisionProvider for ScriptedDecider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn decide_next_action(
        &self,
        _page: &PageState,
        instructions: &str,
        _available_actions: &[String],
    ) -> Result<Decision> {
        self.seen_instructions
            .lock()
            .unwrap()
            .push(instructions.to_string());
        let count = self.invocation_count.fetch_add(1, Ordering::SeqCst);

        match &self.script[count % self.script.len()] {
            ScriptedDecision::Decide(decision) => Ok(decision.clone()),
            ScriptedDecision::Fail(message) => anyhow::bail!("{message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_decider_cycles() {
        let decider = ScriptedDecider::new(vec![
            ScriptedDecision::Decide(Decision::action("click")),
            ScriptedDecision::Decide(Decision::action("type")),
        ]);
        let page = PageState::default();
        let actions = vec!["click".to_string(), "type".to_string()];

        let first = decider
            .decide_next_action(&page, "go", &actions)
            .await
            .unwrap();
        let second = decider
            .decide_next_action(&page, "go", &actions)
            .await
            .unwrap();
        let third = decider
            .decide_next_action(&page, "go", &actions)
            .await
            .unwrap();

        assert_eq!(first.action, "click");
        assert_eq!(second.action, "type");
        assert_eq!(third.action, "click");
        assert_eq!(decider.invocation_count(), 3);
    }

    #[tokio::test]
    async fn test_scripted_decider_records_instructions() {
        let decider = ScriptedDecider::always_action("wait");
        let page = PageState::default();
        let actions = vec!["wait".to_string()];

        decider
            .decide_next_action(&page, "first", &actions)
            .await
            .unwrap();
        decider
            .decide_next_action(&page, "second", &actions)
            .await
            .unwrap();

        assert_eq!(decider.seen_instructions(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_scripted_decider_failure() {
        let decider = ScriptedDecider::always_fail("api down");
        let page = PageState::default();
        let err = decider
            .decide_next_action(&page, "go", &["wait".to_string()])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("api down"));
    }
}
