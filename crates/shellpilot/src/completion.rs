//! Completion-service client.
//!
//! One request per attempt against an OpenAI-compatible chat endpoint:
//! zero temperature, hard 30 s timeout. The response body is bash,
//! optionally wrapped in a fenced code block that gets stripped before
//! use. Transport errors and timeouts never propagate; they degrade
//! into a synthetic failing script so the failure stays visible in the
//! run's final exit status instead of aborting the pipeline.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use tracing::warn;

use crate::config::PilotConfig;
use crate::prompt::SYSTEM_PREAMBLE;

/// Hard timeout for one completion request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Script substituted when the completion service is unreachable.
/// Exits with a distinct code and a diagnostic marker on stderr.
pub const FALLBACK_SCRIPT: &str = "echo 'completion service unavailable' >&2; exit 2";

/// Seam for the completion service, so the pipeline is testable
/// without a live endpoint.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// One single-turn completion. Returns the raw response text.
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Production backend over an OpenAI-compatible chat-completions API.
pub struct OpenAiBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiBackend {
    pub fn new(config: &PilotConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build completion HTTP client")?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl CompletionBackend for OpenAiBackend {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PREAMBLE },
                { "role": "user", "content": prompt },
            ],
            "temperature": 0,
        });

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("Completion request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Completion API error ({status}): {text}");
        }

        let json: serde_json::Value = response
            .json()
            .await
            .context("Completion response was not JSON")?;
        let content = json["choices"][0]["message"]["content"]
            .as_str()
            .context("Completion response missing message content")?;
        Ok(content.to_string())
    }
}

/// Strip fenced code blocks (```lang ... ```), keeping their content.
pub fn strip_code_fences(text: &str) -> String {
    let re = Regex::new(r"(?s)```[\w-]*\n(.*?)```").expect("static regex");
    re.replace_all(text, "$1").trim().to_string()
}

/// Obtain a script for `prompt`, degrading to [`FALLBACK_SCRIPT`] on
/// any service error.
pub async fn generate_script(backend: &dyn CompletionBackend, prompt: &str) -> String {
    match backend.complete(prompt).await {
        Ok(text) => strip_code_fences(&text),
        Err(e) => {
            warn!("Completion service error: {e:#}");
            FALLBACK_SCRIPT.to_string()
        }
    }
}
