//! Upstream dispatch to an OpenAI-compatible chat-completions service.
//!
//! One attempt per request. Every result is folded into an [`UpstreamOutcome`];
//! nothing in here returns an error to the caller.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::UpstreamConfig;
use crate::error::{GatewayError, Result};
use crate::prompt::PromptBundle;

/// Supplies the bearer credential for the upstream service
pub trait CredentialProvider: Send + Sync {
    fn api_key(&self) -> Option<String>;
}

/// Credential snapshotted from a named environment variable at construction
pub struct EnvCredentials {
    var: String,
    key: Option<String>,
}

impl EnvCredentials {
    pub fn from_env(var: &str) -> Self {
        Self::from_lookup(var, |key| std::env::var(key).ok())
    }

    pub fn from_lookup(var: &str, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let key = lookup(var).filter(|k| !k.trim().is_empty());
        if key.is_none() {
            warn!("{} is not set; upstream calls will fail", var);
        }
        Self {
            var: var.to_string(),
            key,
        }
    }
}

impl std::fmt::Debug for EnvCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvCredentials")
            .field("var", &self.var)
            .field("present", &self.key.is_some())
            .finish()
    }
}

impl CredentialProvider for EnvCredentials {
    fn api_key(&self) -> Option<String> {
        self.key.clone()
    }
}

/// Fixed credential, mainly for tests and the CLI
pub struct StaticCredentials(String);

impl StaticCredentials {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }
}

impl CredentialProvider for StaticCredentials {
    fn api_key(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

/// Result of the single upstream attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamOutcome {
    /// Reply received; `None` when the answer field was absent or blank
    Success(Option<String>),
    UpstreamFailure { status: u16, detail: String },
    TransportFailure { reason: String },
}

#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, bundle: &PromptBundle) -> UpstreamOutcome;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: u32,
    messages: &'a PromptBundle,
}

pub struct OpenAiDispatcher {
    client: reqwest::Client,
    url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    detail_limit: usize,
    credentials: Arc<dyn CredentialProvider>,
}

impl OpenAiDispatcher {
    pub fn new(config: &UpstreamConfig, credentials: Arc<dyn CredentialProvider>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(ms) = config.timeout_ms {
            builder = builder.timeout(Duration::from_millis(ms));
        }
        let client = builder.build().map_err(|e| GatewayError::Config {
            message: format!("Failed to build HTTP client: {}", e),
        })?;

        Ok(Self {
            client,
            url: config.completions_url(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            detail_limit: config.detail_limit,
            credentials,
        })
    }
}

#[async_trait]
impl CompletionService for OpenAiDispatcher {
    async fn complete(&self, bundle: &PromptBundle) -> UpstreamOutcome {
        let Some(api_key) = self.credentials.api_key() else {
            warn!("No upstream credential available; skipping call");
            return UpstreamOutcome::TransportFailure {
                reason: "missing upstream credential".to_string(),
            };
        };

        debug!(
            "Dispatching completion (model={}, messages={})",
            self.model,
            bundle.len()
        );

        let body = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            messages: bundle,
        };

        let started = Instant::now();
        let response = match self
            .client
            .post(&self.url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                warn!("Upstream transport failure: {}", e);
                return UpstreamOutcome::TransportFailure {
                    reason: e.to_string(),
                };
            }
        };

        let status = response.status();
        info!(
            "Upstream responded {} in {}ms",
            status.as_u16(),
            started.elapsed().as_millis()
        );

        if !status.is_success() {
            return match response.text().await {
                Ok(text) => UpstreamOutcome::UpstreamFailure {
                    status: status.as_u16(),
                    detail: excerpt(&text, self.detail_limit),
                },
                Err(e) => UpstreamOutcome::TransportFailure {
                    reason: format!("failed to read upstream error body: {}", e),
                },
            };
        }

        let bytes = match response.bytes().await {
            Ok(b) => b,
            Err(e) => {
                return UpstreamOutcome::TransportFailure {
                    reason: format!("failed to read upstream body: {}", e),
                };
            }
        };
        match serde_json::from_slice::<Value>(&bytes) {
            Ok(reply) => UpstreamOutcome::Success(extract_answer(&reply)),
            Err(e) => UpstreamOutcome::TransportFailure {
                reason: format!("malformed upstream body: {}", e),
            },
        }
    }
}

/// First choice's message content, trimmed; blank counts as absent
pub fn extract_answer(reply: &Value) -> Option<String> {
    reply
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|choice| choice.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Leading `limit` characters of an upstream error body
pub fn excerpt(body: &str, limit: usize) -> String {
    body.chars().take(limit).collect()
}

// Deterministic in-process completion service for tests and dry runs (no network)
pub struct StaticCompletion {
    outcome: UpstreamOutcome,
    calls: AtomicUsize,
    last_bundle: Mutex<Option<PromptBundle>>,
}

impl StaticCompletion {
    pub fn new(outcome: UpstreamOutcome) -> Self {
        Self {
            outcome,
            calls: AtomicUsize::new(0),
            last_bundle: Mutex::new(None),
        }
    }

    pub fn answering(text: impl Into<String>) -> Self {
        Self::new(UpstreamOutcome::Success(Some(text.into())))
    }

    /// Replies successfully without an answer field
    pub fn silent() -> Self {
        Self::new(UpstreamOutcome::Success(None))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_bundle(&self) -> Option<PromptBundle> {
        self.last_bundle.lock().ok().and_then(|b| b.clone())
    }
}

#[async_trait]
impl CompletionService for StaticCompletion {
    async fn complete(&self, bundle: &PromptBundle) -> UpstreamOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_bundle.lock() {
            *last = Some(bundle.clone());
        }
        self.outcome.clone()
    }
}
