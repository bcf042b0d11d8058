use std::sync::Arc;

use serde::Serialize;

use crate::config::PolicyConfig;
use crate::error::{GatewayError, Result};
use crate::scope::ScopeVerdict;
use crate::upstream::UpstreamOutcome;

/// The only artifact returned to callers on success
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FinalAnswer {
    pub answer: String,
    pub scope: ScopeVerdict,
}

#[derive(Debug, Clone)]
pub struct ResponseFinalizer {
    policy: Arc<PolicyConfig>,
}

impl ResponseFinalizer {
    pub fn new(policy: Arc<PolicyConfig>) -> Self {
        Self { policy }
    }

    pub fn finalize(
        &self,
        outcome: UpstreamOutcome,
        verdict: ScopeVerdict,
        include_disclaimer: bool,
    ) -> Result<FinalAnswer> {
        let mut answer = match outcome {
            UpstreamOutcome::Success(Some(text)) => text,
            UpstreamOutcome::Success(None) => self.fallback(verdict).to_string(),
            UpstreamOutcome::UpstreamFailure { status, detail } => {
                return Err(GatewayError::Upstream { status, detail });
            }
            UpstreamOutcome::TransportFailure { reason } => {
                return Err(GatewayError::Transport { reason });
            }
        };

        if include_disclaimer {
            answer.push_str(&self.policy.disclaimer);
        }

        Ok(FinalAnswer {
            answer,
            scope: verdict,
        })
    }

    fn fallback(&self, verdict: ScopeVerdict) -> &str {
        if verdict.is_in_scope() {
            &self.policy.no_answer
        } else {
            &self.policy.refusal
        }
    }
}
