//! Topic guard: decides whether a redacted question is within the declared scope.

use regex::{RegexSet, RegexSetBuilder};
use serde::Serialize;

use crate::error::Result;
use crate::redact::RedactedText;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeVerdict {
    In,
    Out,
}

impl ScopeVerdict {
    pub fn is_in_scope(self) -> bool {
        matches!(self, ScopeVerdict::In)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ScopeVerdict::In => "in",
            ScopeVerdict::Out => "out",
        }
    }
}

impl From<bool> for ScopeVerdict {
    fn from(in_scope: bool) -> Self {
        if in_scope {
            ScopeVerdict::In
        } else {
            ScopeVerdict::Out
        }
    }
}

#[derive(Debug)]
pub struct ScopeClassifier {
    phrases: Vec<String>,
    set: RegexSet,
}

impl ScopeClassifier {
    pub fn new(phrases: &[String]) -> Result<Self> {
        let set = RegexSetBuilder::new(phrases)
            .case_insensitive(true)
            .build()?;
        Ok(Self {
            phrases: phrases.to_vec(),
            set,
        })
    }

    pub fn classify(&self, text: &RedactedText) -> ScopeVerdict {
        self.set.is_match(text.as_str()).into()
    }

    /// Phrases that matched, for diagnostics only
    pub fn matched_phrases(&self, text: &RedactedText) -> Vec<&str> {
        self.set
            .matches(text.as_str())
            .into_iter()
            .map(|i| self.phrases[i].as_str())
            .collect()
    }
}
