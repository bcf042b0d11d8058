//! Builds the role-tagged conversation sent upstream.
//!
//! Scope-narrowing instructions always precede the user content, and the
//! refusal text is supplied verbatim rather than left to the model to phrase.

use std::sync::Arc;

use serde::Serialize;

use crate::config::PolicyConfig;
use crate::redact::RedactedText;
use crate::scope::ScopeVerdict;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptEntry {
    pub role: Role,
    pub content: String,
}

impl PromptEntry {
    fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Ordered prompt entries for a single request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PromptBundle(Vec<PromptEntry>);

impl PromptBundle {
    pub fn entries(&self) -> &[PromptEntry] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct PromptAssembler {
    policy: Arc<PolicyConfig>,
}

impl PromptAssembler {
    pub fn new(policy: Arc<PolicyConfig>) -> Self {
        Self { policy }
    }

    pub fn assemble(&self, text: &RedactedText, verdict: ScopeVerdict, topic: &str) -> PromptBundle {
        let in_scope = verdict.is_in_scope();
        let mut entries = Vec::with_capacity(if in_scope { 2 } else { 4 });

        entries.push(PromptEntry::system(self.policy.system_policy.as_str()));
        if !in_scope {
            entries.push(PromptEntry::system(self.policy.out_of_scope_hint.as_str()));
        }

        let tag = if in_scope {
            "This appears IN SCOPE."
        } else {
            "This appears OUT OF SCOPE."
        };
        entries.push(PromptEntry::user(format!(
            "Topic: {}\nUser question (lightly redacted): {}\n{}\nRespond accordingly.",
            topic, text, tag
        )));

        if !in_scope {
            entries.push(PromptEntry::user(format!(
                "Refusal to use: {}",
                self.policy.refusal
            )));
        }

        PromptBundle(entries)
    }
}
