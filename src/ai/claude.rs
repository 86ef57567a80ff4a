//! Claude-backed decision provider over the Anthropic Messages API.
//!
//! Sends the page state and operator instructions as one prompt, asks
//! for a JSON decision, and retries transient API failures with
//! exponential backoff. A response that cannot be parsed falls back to
//! the first available action rather than failing the cycle.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::fmt::Write as _;
use std::time::Duration;
use tracing::{debug, warn};

use crate::browser::PageState;
use crate::config::AiConfig;

use super::{Decision, DecisionProvider};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const ENV_API_KEY: &str = "CORRAL_API_KEY";
const ENV_API_KEY_FALLBACK: &str = "ANTHROPIC_API_KEY";
const MAX_TOKENS: u32 = 1024;

/// Chooses browser actions by asking a Claude model.
pub struct ClaudeDecider {
    client: reqwest::Client,
    config: AiConfig,
    api_key: String,
}

impl ClaudeDecider {
    /// Creates a provider with an explicit API key.
    pub fn new(config: AiConfig, api_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            config,
            api_key: api_key.into(),
        })
    }

    /// Creates a provider with the API key from `CORRAL_API_KEY` or
    /// `ANTHROPIC_API_KEY`.
    pub fn from_env(config: AiConfig) -> Result<Self> {
        let api_key = std::env::var(ENV_API_KEY)
            .or_else(|_| std::env::var(ENV_API_KEY_FALLBACK))
            .map_err(|_| {
                anyhow::anyhow!(
                    "Set {ENV_API_KEY} or {ENV_API_KEY_FALLBACK} to use the Claude decision provider"
                )
            })?;
        Self::new(config, api_key)
    }

    /// Sends one prompt, retrying transient failures, and returns the
    /// response text.
    async fn send_message(&self, prompt: &str) -> Result<String> {
        let payload = json!({
            "model": self.config.model,
            "max_tokens": MAX_TOKENS,
            "messages": [{"role": "user", "content": prompt}],
        });

        let max_attempts = self.config.max_retries.max(1);
        let mut last_error = None;

        for attempt in 0..max_attempts {
            if attempt > 0 {
                let delay_secs = 1u64 << attempt;
                debug!(
                    "Anthropic API retry attempt {} after {}s delay",
                    attempt + 1,
                    delay_secs
                );
                tokio::time::sleep(Duration::from_secs(delay_secs)).await;
            }

            match self
                .client
                .post(&self.config.endpoint)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&payload)
                .send()
                .await
            {
                Ok(response) => {
                    if response.status().is_success() {
                        let body: MessagesResponse = response
                            .json()
                            .await
                            .context("Failed to decode Anthropic API response")?;
                        return Ok(extract_text(&body));
                    }

                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();

                    // Retry on 5xx server errors and 429 rate limit
                    if status.is_server_error() || status.as_u16() == 429 {
                        last_error = Some(format!("Anthropic API returned {status}: {body}"));
                        continue;
                    }

                    // Don't retry client errors (4xx except 429)
                    anyhow::bail!("Anthropic API returned error status {status}: {body}");
                }
                Err(e) => {
                    // Retry on network errors
                    last_error = Some(e.to_string());
                }
            }
        }

        anyhow::bail!(
            "Anthropic API request failed after {max_attempts} attempts: {}",
            last_error.unwrap_or_else(|| "unknown error".to_string())
        )
    }
}

#[async_trait]
impl DecisionProvider for ClaudeDecider {
    fn name(&self) -> &'static str {
        "claude"
    }

    async fn decide_next_action(
        &self,
        page: &PageState,
        instructions: &str,
        available_actions: &[String],
    ) -> Result<Decision> {
        if available_actions.is_empty() {
            anyhow::bail!("no available actions to choose from");
        }

        let prompt = build_decision_prompt(
            page,
            instructions,
            available_actions,
            self.config.max_page_chars,
        );
        let text = self.send_message(&prompt).await?;
        Ok(parse_decision(&text, available_actions))
    }
}

/// Response shape of the Messages API, reduced to what we read.
#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    text: String,
}

fn extract_text(response: &MessagesResponse) -> String {
    response
        .content
        .iter()
        .filter(|block| block.kind == "text")
        .map(|block| block.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Assembles the decision prompt: URL, instructions, the offered
/// actions, and the page content capped at `max_page_chars`.
fn build_decision_prompt(
    page: &PageState,
    instructions: &str,
    available_actions: &[String],
    max_page_chars: usize,
) -> String {
    let content: String = page.content.chars().take(max_page_chars).collect();

    let mut prompt = String::new();
    prompt.push_str(
        "You are controlling a browser session. Choose the single next action to take.\n\n",
    );
    let _ = writeln!(prompt, "Current URL: {}\n", page.url);
    let _ = writeln!(prompt, "User Instructions: {instructions}\n");
    prompt.push_str("Available Actions:\n");
    for action in available_actions {
        let _ = writeln!(prompt, "- {action}");
    }
    let _ = write!(prompt, "\nPage Content (may be truncated):\n{content}\n\n");
    prompt.push_str(
        "Respond with only a JSON object of the form \
         {\"action\": \"...\", \"parameters\": {}, \"reasoning\": \"...\"}.",
    );
    prompt
}

/// Pulls the outermost JSON object out of free-form model text.
fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

/// Parses the model's reply into a [`Decision`], falling back to the
/// first available action when the reply is not usable.
fn parse_decision(text: &str, available_actions: &[String]) -> Decision {
    let parsed =
        extract_json(text).and_then(|json| serde_json::from_str::<Decision>(json).ok());

    match parsed {
        Some(decision) => decision,
        None => {
            warn!(
                "Model reply did not contain a usable decision; falling back to '{}'",
                available_actions[0]
            );
            Decision::fallback(
                &available_actions[0],
                "Model reply was not parseable as a decision",
            )
        }
    }
}
