//! Single-pass request pipeline:
//! ingress → redact → classify → assemble → dispatch → finalize.
//!
//! A [`Gateway`] is read-only after construction and is shared across
//! concurrent requests behind an `Arc`.

use std::sync::Arc;

use tracing::{Instrument, debug, info};
use uuid::Uuid;

use crate::config::{Config, PolicyConfig};
use crate::error::Result;
use crate::finalize::{FinalAnswer, ResponseFinalizer};
use crate::ingress::IncomingRequest;
use crate::prompt::{PromptAssembler, PromptBundle};
use crate::redact::{RedactedText, RedactionReport, Redactor};
use crate::scope::{ScopeClassifier, ScopeVerdict};
use crate::upstream::{CompletionService, EnvCredentials, OpenAiDispatcher};

/// Everything computed before the upstream call
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub redacted: RedactedText,
    pub report: RedactionReport,
    pub verdict: ScopeVerdict,
    pub bundle: PromptBundle,
}

pub struct Gateway {
    policy: Arc<PolicyConfig>,
    redactor: Redactor,
    classifier: ScopeClassifier,
    assembler: PromptAssembler,
    finalizer: ResponseFinalizer,
    upstream: Arc<dyn CompletionService>,
}

impl Gateway {
    pub fn new(config: &Config, upstream: Arc<dyn CompletionService>) -> Result<Self> {
        let policy = Arc::new(config.policy.clone());
        Ok(Self {
            redactor: Redactor::new(&config.redaction)?,
            classifier: ScopeClassifier::new(&policy.scope_phrases)?,
            assembler: PromptAssembler::new(policy.clone()),
            finalizer: ResponseFinalizer::new(policy.clone()),
            policy,
            upstream,
        })
    }

    /// Gateway wired to the configured upstream with the credential taken
    /// from the environment variable the config names.
    pub fn from_config(config: &Config) -> Result<Self> {
        let credentials = Arc::new(EnvCredentials::from_env(&config.upstream.credential_env));
        let dispatcher = OpenAiDispatcher::new(&config.upstream, credentials)?;
        info!(
            "Upstream {} (model={}, policy={})",
            config.upstream.completions_url(),
            config.upstream.model,
            config.policy.version
        );
        Self::new(config, Arc::new(dispatcher))
    }

    pub fn default_topic(&self) -> &str {
        &self.policy.default_topic
    }

    pub fn redactor(&self) -> &Redactor {
        &self.redactor
    }

    pub fn classifier(&self) -> &ScopeClassifier {
        &self.classifier
    }

    /// Run the pipeline over raw body bytes
    pub async fn handle_bytes(&self, body: &[u8]) -> Result<FinalAnswer> {
        let span = tracing::info_span!("chat", request_id = %Uuid::new_v4());
        async move {
            let request = IncomingRequest::from_bytes(body, self.default_topic())?;
            self.handle(request).await
        }
        .instrument(span)
        .await
    }

    pub async fn handle(&self, request: IncomingRequest) -> Result<FinalAnswer> {
        let prepared = self.prepare(&request);
        debug!(
            "Redacted {} span(s); scope={}",
            prepared.report.total(),
            prepared.verdict.as_str()
        );

        let outcome = self.upstream.complete(&prepared.bundle).await;
        let answer = self
            .finalizer
            .finalize(outcome, prepared.verdict, request.include_disclaimer)?;

        info!("Answered (scope={})", answer.scope.as_str());
        Ok(answer)
    }

    /// Pure stages only: no network, no side effects
    pub fn prepare(&self, request: &IncomingRequest) -> PreparedRequest {
        let (redacted, report) = self.redactor.redact(&request.question);
        let verdict = self.classifier.classify(&redacted);
        let bundle = self.assembler.assemble(&redacted, verdict, &request.topic);
        PreparedRequest {
            redacted,
            report,
            verdict,
            bundle,
        }
    }
}
